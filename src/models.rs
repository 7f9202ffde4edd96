use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only build state that takes part in trend analysis.
pub const PASSED_STATE: &str = "passed";

/// A single CI build as returned by the builds endpoint.
///
/// Only the fields the pipeline reads are typed; everything else the API
/// sends (`id`, `event_type`, `message`, ...) is carried through untouched in
/// `extra` so that merged files keep the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub number: u64,
    #[serde(default)]
    pub commit_id: Option<CommitId>,
    #[serde(default, with = "timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Cumulative run time of all test nodes, in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    pub state: String,
    #[serde(default)]
    pub pull_request_number: Option<u64>,
    #[serde(default)]
    pub pull_request_title: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl BuildRecord {
    pub fn is_passed(&self) -> bool {
        self.state == PASSED_STATE
    }

    pub fn duration_minutes(&self) -> Option<f64> {
        self.duration.map(|secs| secs / 60.0)
    }

    /// Wall-clock minutes between start and finish.
    pub fn elapsed_minutes(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;

        #[allow(clippy::cast_precision_loss)]
        let minutes = (finished - started).num_seconds() as f64 / 60.0;
        Some(minutes)
    }

    /// Hover label used for plotted points: `"<pr> - <title>"`.
    pub fn label(&self) -> String {
        let pr = self
            .pull_request_number
            .map(|n| n.to_string())
            .unwrap_or_default();
        let title = self.pull_request_title.as_deref().unwrap_or_default();
        format!("{pr} - {}", title.replace('<', ""))
    }
}

/// Opaque commit identifier. The API sends it as an integer; saved files from
/// other tools may carry strings. Written back in the shape it was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommitId {
    Number(u64),
    Text(String),
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Serde adapter for the API's `%Y-%m-%dT%H:%M:%SZ` timestamps.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(value, FORMAT).map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn travis_build() -> Value {
        json!({
            "id": 98765,
            "number": 1234,
            "commit_id": "c0ffee",
            "started_at": "2016-03-01T10:00:00Z",
            "finished_at": "2016-03-01T10:25:30Z",
            "duration": 3600,
            "state": "passed",
            "event_type": "pull_request",
            "pull_request_number": 42,
            "pull_request_title": "Speed up <b>tests</b>"
        })
    }

    #[test]
    fn test_deserialize_typed_fields() {
        let build: BuildRecord = serde_json::from_value(travis_build()).unwrap();

        assert_eq!(build.number, 1234);
        assert_eq!(build.commit_id, Some(CommitId::Text("c0ffee".to_string())));
        assert_eq!(build.duration, Some(3600.0));
        assert_eq!(build.pull_request_number, Some(42));
        assert!(build.is_passed());
        assert_eq!(
            build.started_at,
            Some(timestamp::parse("2016-03-01T10:00:00Z").unwrap())
        );
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let build: BuildRecord = serde_json::from_value(travis_build()).unwrap();

        assert_eq!(build.extra.get("id"), Some(&json!(98765)));
        assert_eq!(build.extra.get("event_type"), Some(&json!("pull_request")));

        // integer durations come back as floats
        let mut expected = travis_build();
        expected["duration"] = json!(3600.0);
        assert_eq!(serde_json::to_value(&build).unwrap(), expected);
    }

    #[test]
    fn test_null_and_missing_fields() {
        let build: BuildRecord = serde_json::from_value(json!({
            "number": 7,
            "started_at": null,
            "state": "created",
            "pull_request_number": null
        }))
        .unwrap();

        assert_eq!(build.commit_id, None);
        assert_eq!(build.started_at, None);
        assert_eq!(build.finished_at, None);
        assert_eq!(build.duration, None);
        assert_eq!(build.pull_request_number, None);
        assert!(!build.is_passed());
    }

    #[test]
    fn test_integer_commit_id_keeps_its_shape() {
        let mut value = travis_build();
        value["commit_id"] = json!(5551212);

        let build: BuildRecord = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(build.commit_id, Some(CommitId::Number(5551212)));
        assert_eq!(build.commit_id.as_ref().unwrap().to_string(), "5551212");

        let written = serde_json::to_value(&build).unwrap();
        assert_eq!(written["commit_id"], json!(5551212));
    }

    #[test]
    fn test_numeric_and_text_commit_ids_differ() {
        assert_ne!(CommitId::Number(7), CommitId::Text("7".to_string()));
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let result = serde_json::from_value::<BuildRecord>(json!({
            "number": 1,
            "started_at": "yesterday",
            "state": "passed"
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_timestamps_serialize_in_api_format() {
        let build: BuildRecord = serde_json::from_value(travis_build()).unwrap();
        let value = serde_json::to_value(&build).unwrap();

        assert_eq!(value["started_at"], json!("2016-03-01T10:00:00Z"));
        assert_eq!(value["finished_at"], json!("2016-03-01T10:25:30Z"));
    }

    #[test]
    fn test_metrics_in_minutes() {
        let build: BuildRecord = serde_json::from_value(travis_build()).unwrap();

        assert_eq!(build.duration_minutes(), Some(60.0));
        assert_eq!(build.elapsed_minutes(), Some(25.5));
    }

    #[test]
    fn test_elapsed_requires_both_timestamps() {
        let mut build: BuildRecord = serde_json::from_value(travis_build()).unwrap();
        build.finished_at = None;

        assert_eq!(build.elapsed_minutes(), None);
    }

    #[test]
    fn test_label_strips_angle_brackets() {
        let build: BuildRecord = serde_json::from_value(travis_build()).unwrap();

        assert_eq!(build.label(), "42 - Speed up b>tests/b>");
    }
}
