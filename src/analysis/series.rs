use super::classifier::ClassifiedBuild;
use crate::insights::{Series, SeriesPoint};

const NORMAL_COLOR: &str = "rgba(0, 147, 0, 0.9)";
const ANOMALOUS_COLOR: &str = "rgba(0, 128, 255, 0.9)";
const EVENT_COLOR: &str = "rgba(200, 0, 0, 0.9)";

/// Split classified builds into the plotted series: normal builds, anomalous
/// builds and highlighted events. An event build also appears in its
/// normal/anomalous series. Empty series are omitted.
pub fn build_series(classified: &[ClassifiedBuild], threshold_minutes: f64) -> Vec<Series> {
    let mut normals = Vec::new();
    let mut anomalies = Vec::new();
    let mut events = Vec::new();

    for item in classified {
        let Some(point) = to_point(item) else {
            continue;
        };

        if item.event {
            events.push(point.clone());
        }
        if item.is_anomalous() {
            anomalies.push(point);
        } else {
            normals.push(point);
        }
    }

    [
        ("Average".to_string(), NORMAL_COLOR, normals),
        (format!("+{threshold_minutes} min"), ANOMALOUS_COLOR, anomalies),
        ("Event".to_string(), EVENT_COLOR, events),
    ]
    .into_iter()
    .filter(|(_, _, points)| !points.is_empty())
    .map(|(name, color, points)| Series {
        name,
        color: color.to_string(),
        points,
    })
    .collect()
}

fn to_point(item: &ClassifiedBuild) -> Option<SeriesPoint> {
    Some(SeriesPoint {
        number: item.build.number,
        x: item.build.started_at?,
        y: item.metric_minutes,
        text: item.build.label(),
        classification: item.classification,
    })
}
