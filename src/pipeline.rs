use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use log::{info, warn};

use crate::analysis::{self, ClassifierConfig};
use crate::error::{BuildTrendsError, Result};
use crate::insights::TrendReport;
use crate::merge::BuildMerger;
use crate::models::BuildRecord;
use crate::providers::travis::TravisProvider;

/// Where builds come from: the live API or a previously saved JSON array.
pub enum BuildSource {
    Remote {
        provider: TravisProvider,
        before: Option<u64>,
        page_limit: usize,
    },
    File(PathBuf),
}

impl BuildSource {
    pub fn describe(&self) -> String {
        match self {
            Self::Remote { provider, .. } => provider.repo().to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Stream builds in source order.
    pub fn builds(&self) -> BoxStream<'_, Result<BuildRecord>> {
        match self {
            Self::Remote {
                provider,
                before,
                page_limit,
            } => provider.builds(*before, *page_limit).boxed(),
            Self::File(path) => stream::once(async move { load_builds(path) })
                .map_ok(|builds| stream::iter(builds.into_iter().map(Ok::<_, BuildTrendsError>)))
                .try_flatten()
                .boxed(),
        }
    }
}

/// Read a JSON array of builds written by `fetch` or `merge`.
pub fn load_builds(path: &Path) -> Result<Vec<BuildRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let builds: Vec<BuildRecord> = serde_json::from_reader(reader)?;
    info!("Loaded {} builds from {}", builds.len(), path.display());
    Ok(builds)
}

/// Gather builds from every source. A single source is passed through as
/// is; several sources are deduplicated by commit in the order given.
pub async fn collect_builds(sources: &[BuildSource]) -> Result<Vec<BuildRecord>> {
    if let [source] = sources {
        return source.builds().try_collect().await;
    }

    let mut merger = BuildMerger::new();
    for source in sources {
        let mut builds = source.builds();
        while let Some(build) = builds.try_next().await? {
            merger.push(build);
        }
    }

    let outcome = merger.finish();
    outcome.log_summary();
    Ok(outcome.builds)
}

/// Prepare, classify and shape builds into a report.
pub fn analyze(
    builds: Vec<BuildRecord>,
    config: &ClassifierConfig,
    sources: Vec<String>,
) -> TrendReport {
    let total_builds = builds.len();
    let prepared = analysis::prepare(builds);
    info!(
        "Analyzing {} of {total_builds} builds (passed pull request builds only)",
        prepared.len()
    );

    let classified: Vec<_> = analysis::classify(prepared, config).collect();
    if classified.is_empty() {
        warn!("No builds left to analyze");
    }

    let anomalous_builds = classified.iter().filter(|c| c.is_anomalous()).count();
    let event_builds = classified.iter().filter(|c| c.event).count();
    let series = analysis::build_series(&classified, config.threshold_minutes);

    TrendReport {
        sources,
        generated_at: Utc::now(),
        metric: config.metric,
        y_title: config.metric.axis_title().to_string(),
        window_size: config.window_size,
        threshold_minutes: config.threshold_minutes,
        total_builds,
        analyzed_builds: classified.len(),
        anomalous_builds,
        event_builds,
        series,
    }
}
