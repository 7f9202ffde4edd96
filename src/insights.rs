use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{Classification, Metric};

/// Classified build times, shaped for a chart renderer.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrendReport {
    pub sources: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub metric: Metric,
    pub y_title: String,
    pub window_size: usize,
    pub threshold_minutes: f64,
    pub total_builds: usize,
    pub analyzed_builds: usize,
    pub anomalous_builds: usize,
    pub event_builds: usize,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub color: String,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub number: u64,
    pub x: DateTime<Utc>,
    pub y: f64,
    pub text: String,
    /// Lets an event point be drawn as normal or anomalous too.
    pub classification: Classification,
}
