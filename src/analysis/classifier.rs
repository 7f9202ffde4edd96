use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};

use super::window::TrailingWindow;
use crate::error::{BuildTrendsError, Result};
use crate::models::BuildRecord;

pub const DEFAULT_WINDOW_SIZE: usize = 50;
pub const DEFAULT_THRESHOLD_MINUTES: f64 = 10.0;

/// What is measured for each build, always in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Cumulative run time of all test nodes.
    Duration,
    /// Elapsed time from start to finish.
    WallClock,
}

impl Metric {
    pub fn measure(self, build: &BuildRecord) -> Option<f64> {
        match self {
            Self::Duration => build.duration_minutes(),
            Self::WallClock => build.elapsed_minutes(),
        }
    }

    pub fn axis_title(self) -> &'static str {
        match self {
            Self::Duration => "Total Test Run Time (minutes)",
            Self::WallClock => "Elapsed Wall Clock Time (minutes)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Normal,
    Anomalous,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub window_size: usize,
    pub threshold_minutes: f64,
    pub metric: Metric,
    /// Pull request numbers whose builds are tagged as events.
    pub highlight: HashSet<u64>,
}

impl ClassifierConfig {
    pub fn new<I>(
        window_size: usize,
        threshold_minutes: f64,
        metric: Metric,
        highlight: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = u64>,
    {
        if window_size == 0 {
            return Err(BuildTrendsError::ConfigError(
                "Window size must be at least 1".to_string(),
            ));
        }

        if !threshold_minutes.is_finite() {
            return Err(BuildTrendsError::ConfigError(format!(
                "Threshold must be a finite number of minutes, got {threshold_minutes}"
            )));
        }

        Ok(Self {
            window_size,
            threshold_minutes,
            metric,
            highlight: highlight.into_iter().collect(),
        })
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            threshold_minutes: DEFAULT_THRESHOLD_MINUTES,
            metric: Metric::Duration,
            highlight: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedBuild {
    pub build: BuildRecord,
    pub classification: Classification,
    pub metric_minutes: f64,
    /// Set when the build's pull request is in the highlight set. Independent
    /// of `classification`.
    pub event: bool,
}

impl ClassifiedBuild {
    pub fn is_anomalous(&self) -> bool {
        self.classification == Classification::Anomalous
    }
}

fn is_analyzable(build: &BuildRecord) -> bool {
    build.started_at.is_some() && build.is_passed() && build.pull_request_number.is_some()
}

/// Keep passed pull request builds that have started, oldest first.
pub fn prepare<I>(builds: I) -> Vec<BuildRecord>
where
    I: IntoIterator<Item = BuildRecord>,
{
    let mut kept: Vec<BuildRecord> = builds.into_iter().filter(is_analyzable).collect();
    kept.sort_by_key(|b| b.started_at);
    kept
}

/// Judges each build against the mean of the previous `window_size` values.
///
/// Until the window has filled every build is normal. After that a build is
/// anomalous when it exceeds the mean by `threshold_minutes` or more. Every
/// measured value enters the window, anomalous or not.
pub struct WindowClassifier<'a> {
    config: &'a ClassifierConfig,
    window: TrailingWindow,
}

impl<'a> WindowClassifier<'a> {
    pub fn new(config: &'a ClassifierConfig) -> Self {
        Self {
            config,
            window: TrailingWindow::new(config.window_size),
        }
    }

    pub fn judge(&mut self, value: f64) -> Classification {
        let classification = match self.window.mean() {
            Some(avg) if self.window.is_full() => {
                if value - avg < self.config.threshold_minutes {
                    Classification::Normal
                } else {
                    Classification::Anomalous
                }
            }
            _ => Classification::Normal,
        };

        self.window.push(value);
        classification
    }

    /// Returns `None` when the configured metric can't be computed for the build.
    pub fn classify(&mut self, build: BuildRecord) -> Option<ClassifiedBuild> {
        let Some(metric_minutes) = self.config.metric.measure(&build) else {
            debug!(
                "Build #{} has no {:?} metric, leaving it out",
                build.number, self.config.metric
            );
            return None;
        };

        let classification = self.judge(metric_minutes);
        let event = build
            .pull_request_number
            .is_some_and(|pr| self.config.highlight.contains(&pr));

        Some(ClassifiedBuild {
            build,
            classification,
            metric_minutes,
            event,
        })
    }
}

/// Lazily classify builds that have already been through [`prepare`].
pub fn classify<'a, I>(
    builds: I,
    config: &'a ClassifierConfig,
) -> impl Iterator<Item = ClassifiedBuild> + 'a
where
    I: IntoIterator<Item = BuildRecord>,
    I::IntoIter: 'a,
{
    let mut classifier = WindowClassifier::new(config);
    builds
        .into_iter()
        .filter_map(move |build| classifier.classify(build))
}
