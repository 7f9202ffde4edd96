use std::future::Future;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use log::{info, warn};

use crate::analysis::{ClassifierConfig, Metric, DEFAULT_THRESHOLD_MINUTES, DEFAULT_WINDOW_SIZE};
use crate::merge::merge_builds;
use crate::output::{open_new_output, open_output, CsvBuildWriter, JsonArrayWriter, RecordWriter};
use crate::pipeline::{self, BuildSource};
use crate::progress::{log_progress, ProgressReporter, REPORT_INTERVAL};
use crate::providers::travis::{TravisProvider, DEFAULT_API_URL};

#[derive(Parser)]
#[command(name = "buildtrends")]
#[command(author, version, about = "CI build time trends", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output file path (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Download build history as a JSON array
    Fetch {
        /// GitHub user/repo name (e.g. "dimagi/commcare-hq") or repository id
        #[arg(required_unless_present = "builds_json")]
        slug: Option<String>,

        /// Maximum number of requests to make. Each request pulls 25 builds.
        #[arg(short, long, default_value_t = 40)]
        limit: usize,

        /// Get builds numbered before (less than) this build
        #[arg(short, long)]
        before: Option<u64>,

        /// API base URL
        #[arg(short, long, env = "BUILDTRENDS_API_URL", default_value = DEFAULT_API_URL)]
        url: String,

        /// Previously downloaded JSON file to replay instead of calling the API
        #[arg(long, conflicts_with = "before")]
        builds_json: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Merge build files, dropping builds of commits already seen
    Merge {
        /// JSON files to merge, earlier files take precedence
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Classify build times against the average of recent builds
    Analyze {
        /// Files containing JSON lists of builds; several files are merged first
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Flag builds more than this number of minutes above the recent average
        #[arg(long, default_value_t = DEFAULT_THRESHOLD_MINUTES)]
        max_diff: f64,

        /// Number of recent builds averaged
        #[arg(short, long, default_value_t = DEFAULT_WINDOW_SIZE)]
        window: usize,

        /// Use elapsed wall clock time instead of cumulative test run time
        #[arg(long, default_value_t = false)]
        wall_clock: bool,

        /// Comma-delimited PR numbers to add to the "Event" series
        #[arg(short, long, value_delimiter = ',')]
        events: Vec<u64>,
    },
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Fetch {
                slug,
                limit,
                before,
                url,
                builds_json,
                format,
            } => {
                let source = if let Some(path) = builds_json {
                    BuildSource::File(path.clone())
                } else {
                    let slug = slug.clone().unwrap_or_default();
                    BuildSource::Remote {
                        provider: TravisProvider::new(url, slug)?,
                        before: *before,
                        page_limit: *limit,
                    }
                };

                info!("Collecting builds from: {}", source.describe());
                self.fetch(&source, *format).await
            }
            Commands::Merge { files } => {
                let loaded = files
                    .iter()
                    .map(|path| pipeline::load_builds(path))
                    .collect::<crate::error::Result<Vec<_>>>()?;
                let outcome = merge_builds(loaded);

                // claimed only once every input has loaded
                let output = open_new_output(self.output.as_deref())?;
                let mut writer = JsonArrayWriter::new(output, self.pretty)?;
                for build in &outcome.builds {
                    writer.write(build)?;
                }
                writer.finish()?;

                if let Some(path) = &self.output {
                    info!("Merged builds written to: {}", path.display());
                }
                Ok(())
            }
            Commands::Analyze {
                paths,
                max_diff,
                window,
                wall_clock,
                events,
            } => {
                let metric = if *wall_clock {
                    Metric::WallClock
                } else {
                    Metric::Duration
                };
                let config =
                    ClassifierConfig::new(*window, *max_diff, metric, events.iter().copied())?;

                let sources: Vec<BuildSource> =
                    paths.iter().cloned().map(BuildSource::File).collect();
                let builds = pipeline::collect_builds(&sources).await?;
                let report = pipeline::analyze(
                    builds,
                    &config,
                    sources.iter().map(BuildSource::describe).collect(),
                );

                // Serialize to JSON
                let json_output = if self.pretty {
                    serde_json::to_string_pretty(&report)?
                } else {
                    serde_json::to_string(&report)?
                };

                // Write to output
                let mut output = open_output(self.output.as_deref())?;
                writeln!(output, "{json_output}")?;
                output.flush()?;
                if let Some(path) = &self.output {
                    info!("Trend report written to: {}", path.display());
                }

                Ok(())
            }
        }
    }

    async fn fetch(&self, source: &BuildSource, format: OutputFormat) -> Result<()> {
        let output = open_output(self.output.as_deref())?;
        let writer = match format {
            OutputFormat::Json => RecordWriter::Json(JsonArrayWriter::new(output, self.pretty)?),
            OutputFormat::Csv => RecordWriter::Csv(CsvBuildWriter::new(output)),
        };

        write_builds(source, writer, interrupted()).await?;
        Ok(())
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal can't be listened for.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C: {e}");
        futures::future::pending::<()>().await;
    }
}

/// Write builds as they arrive until the source is exhausted or `stop`
/// resolves. A source error also ends the run. The writer is finished on
/// every exit path so that partial output stays parseable.
async fn write_builds<W, F>(
    source: &BuildSource,
    mut writer: RecordWriter<W>,
    stop: F,
) -> crate::error::Result<()>
where
    W: Write,
    F: Future<Output = ()>,
{
    let mut reporter = ProgressReporter::new(REPORT_INTERVAL, log_progress);
    let mut builds = source.builds().inspect_ok(|_| reporter.record());
    tokio::pin!(stop);

    let outcome = loop {
        tokio::select! {
            biased;
            () = &mut stop => {
                warn!("Interrupted, aborting...");
                break Ok(());
            }
            next = builds.try_next() => match next {
                Ok(Some(build)) => writer.write(&build)?,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            },
        }
    };

    drop(builds);
    info!(
        "Fetched {} builds, wrote {}",
        reporter.processed(),
        writer.written()
    );
    writer.finish()?;

    outcome
}
