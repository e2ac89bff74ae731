//! Temporal context assembly: timeline, per-metric window trends, and the
//! snapshot delta between the two most recent documents.
//!
//! Trend classification here is sign-only by design; magnitude thresholding
//! belongs to the reasoning engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChangeDirection, MetricValue, PatientDocument};

/// A value change below this magnitude is treated as no change.
const CHANGE_EPSILON: f64 = 0.01;

// ---------------------------------------------------------------------------
// Context types
// ---------------------------------------------------------------------------

/// One chronological entry in a patient's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub document_type: String,
    pub document_id: Uuid,
    pub key_metrics: BTreeMap<String, MetricValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Window-level trend for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricTrend {
    Computed(MetricTrendData),
    InsufficientData,
    NonNumeric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrendData {
    pub first_value: f64,
    pub last_value: f64,
    pub change: f64,
    pub percent_change: f64,
    pub trend: TrendDirection,
    pub measurement_count: usize,
}

/// Metric-level difference between the two most recent documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricChange {
    pub previous: f64,
    pub current: f64,
    pub change: f64,
    pub direction: ChangeDirection,
}

/// A metric present in only one of the two compared documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub metric: String,
    pub value: MetricValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaReport {
    pub latest_timestamp: DateTime<Utc>,
    pub previous_timestamp: DateTime<Utc>,
    pub metric_changes: BTreeMap<String, MetricChange>,
    pub new_findings: Vec<Finding>,
    pub resolved_findings: Vec<Finding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SnapshotDelta {
    Computed(DeltaReport),
    InsufficientHistory,
}

/// The full temporal view for one patient within a lookback window.
#[derive(Debug, Clone, Serialize)]
pub struct TemporalContext {
    pub patient_id: i64,
    pub query_timestamp: DateTime<Utc>,
    pub lookback_days: i64,
    pub document_count: usize,
    /// Most recent first.
    pub documents: Vec<PatientDocument>,
    /// Oldest first.
    pub timeline: Vec<TimelineEntry>,
    pub metric_trends: BTreeMap<String, MetricTrend>,
    pub deltas: Option<SnapshotDelta>,
}

// ---------------------------------------------------------------------------
// Builders (input: documents ascending by sort key)
// ---------------------------------------------------------------------------

pub(crate) fn build_timeline(documents: &[PatientDocument]) -> Vec<TimelineEntry> {
    documents
        .iter()
        .map(|doc| TimelineEntry {
            timestamp: doc.timestamp,
            document_type: doc.document_type.clone(),
            document_id: doc.document_id,
            key_metrics: doc.metrics.clone(),
        })
        .collect()
}

pub(crate) fn compute_metric_trends(
    documents: &[PatientDocument],
) -> BTreeMap<String, MetricTrend> {
    let mut history: BTreeMap<&str, Vec<&MetricValue>> = BTreeMap::new();
    for doc in documents {
        for (name, value) in &doc.metrics {
            history.entry(name).or_default().push(value);
        }
    }

    let mut trends = BTreeMap::new();
    for (name, values) in history {
        if values.len() < 2 {
            trends.insert(name.to_string(), MetricTrend::InsufficientData);
            continue;
        }

        let first = values.first().and_then(|v| v.as_numeric());
        let last = values.last().and_then(|v| v.as_numeric());
        let (Some(first), Some(last)) = (first, last) else {
            trends.insert(name.to_string(), MetricTrend::NonNumeric);
            continue;
        };

        let change = last - first;
        let percent_change = if first != 0.0 {
            change / first * 100.0
        } else {
            0.0
        };
        let trend = if change > 0.0 {
            TrendDirection::Increasing
        } else if change < 0.0 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        trends.insert(
            name.to_string(),
            MetricTrend::Computed(MetricTrendData {
                first_value: first,
                last_value: last,
                change,
                percent_change,
                trend,
                measurement_count: values.len(),
            }),
        );
    }
    trends
}

pub(crate) fn compute_deltas(documents: &[PatientDocument]) -> SnapshotDelta {
    if documents.len() < 2 {
        return SnapshotDelta::InsufficientHistory;
    }

    let latest = &documents[documents.len() - 1];
    let previous = &documents[documents.len() - 2];

    let mut metric_changes = BTreeMap::new();
    let mut new_findings = Vec::new();
    let mut resolved_findings = Vec::new();

    for (name, latest_value) in &latest.metrics {
        match previous.metrics.get(name) {
            Some(previous_value) => {
                let (Some(current), Some(prior)) =
                    (latest_value.as_numeric(), previous_value.as_numeric())
                else {
                    continue;
                };
                let change = current - prior;
                if change.abs() > CHANGE_EPSILON {
                    metric_changes.insert(
                        name.clone(),
                        MetricChange {
                            previous: prior,
                            current,
                            change,
                            direction: if change > 0.0 {
                                ChangeDirection::Increased
                            } else {
                                ChangeDirection::Decreased
                            },
                        },
                    );
                }
            }
            None => new_findings.push(Finding {
                metric: name.clone(),
                value: latest_value.clone(),
            }),
        }
    }

    for (name, previous_value) in &previous.metrics {
        if !latest.metrics.contains_key(name) {
            resolved_findings.push(Finding {
                metric: name.clone(),
                value: previous_value.clone(),
            });
        }
    }

    SnapshotDelta::Computed(DeltaReport {
        latest_timestamp: latest.timestamp,
        previous_timestamp: previous.timestamp,
        metric_changes,
        new_findings,
        resolved_findings,
    })
}
