//! Clinical reference data: risk buckets and significance thresholds per
//! tracked metric. Ships with a built-in table covering the common metabolic
//! and cardiovascular panel; a JSON file can override it at load time.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallback for metrics without reference data, in absolute units.
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 5.0;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("Failed to load reference data: {0}")]
    Load(#[from] std::io::Error),

    #[error("Failed to parse reference data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One named value range with its clinical severity. Severity 0 is the
/// healthy band; higher is worse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBucket {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub severity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricReference {
    pub metric: String,
    pub unit: String,
    /// Scanned in order; the first bucket containing the value wins.
    pub buckets: Vec<RiskBucket>,
    /// Absolute change at or above this is clinically significant.
    pub significance_threshold: f64,
    /// False for metrics where higher values are healthier (HDL).
    #[serde(default = "default_worse_is_higher")]
    pub worse_is_higher: bool,
}

fn default_worse_is_higher() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalReferenceData {
    pub metrics: Vec<MetricReference>,
}

impl ClinicalReferenceData {
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let raw = fs::read_to_string(path)?;
        let data: Self = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            metrics = data.metrics.len(),
            "Clinical reference data loaded"
        );
        Ok(data)
    }

    fn lookup(&self, metric: &str) -> Option<&MetricReference> {
        let key = metric.to_lowercase().replace(' ', "_");
        self.metrics.iter().find(|m| m.metric == key)
    }

    /// Bucket name for a value, `"unknown"` for untracked metrics or values
    /// outside every bucket.
    pub fn risk_level(&self, metric: &str, value: f64) -> String {
        self.lookup(metric)
            .and_then(|reference| {
                reference
                    .buckets
                    .iter()
                    .find(|b| value >= b.min && value <= b.max)
            })
            .map(|b| b.name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Severity of a named level, `None` when the level is not in the table.
    pub fn severity_rank(&self, metric: &str, level: &str) -> Option<u8> {
        self.lookup(metric)?
            .buckets
            .iter()
            .find(|b| b.name == level)
            .map(|b| b.severity)
    }

    pub fn significance_threshold(&self, metric: &str) -> f64 {
        self.lookup(metric)
            .map(|m| m.significance_threshold)
            .unwrap_or(DEFAULT_SIGNIFICANCE_THRESHOLD)
    }

    pub fn worse_is_higher(&self, metric: &str) -> bool {
        self.lookup(metric).map(|m| m.worse_is_higher).unwrap_or(true)
    }

    /// The built-in panel used when no override file is supplied.
    pub fn built_in() -> Self {
        fn bucket(name: &str, min: f64, max: f64, severity: u8) -> RiskBucket {
            RiskBucket {
                name: name.to_string(),
                min,
                max,
                severity,
            }
        }
        fn reference(
            metric: &str,
            unit: &str,
            threshold: f64,
            worse_is_higher: bool,
            buckets: Vec<RiskBucket>,
        ) -> MetricReference {
            MetricReference {
                metric: metric.to_string(),
                unit: unit.to_string(),
                buckets,
                significance_threshold: threshold,
                worse_is_higher,
            }
        }

        Self {
            metrics: vec![
                reference(
                    "glucose_fasting",
                    "mg/dL",
                    10.0,
                    true,
                    vec![
                        bucket("normal", 70.0, 99.0, 0),
                        bucket("prediabetic", 100.0, 125.0, 2),
                        bucket("diabetic", 126.0, 999.0, 4),
                    ],
                ),
                reference(
                    "glucose_random",
                    "mg/dL",
                    20.0,
                    true,
                    vec![
                        bucket("normal", 70.0, 140.0, 0),
                        bucket("concerning", 141.0, 199.0, 2),
                        bucket("diabetic", 200.0, 999.0, 4),
                    ],
                ),
                reference(
                    "hba1c",
                    "%",
                    0.5,
                    true,
                    vec![
                        bucket("normal", 0.0, 5.6, 0),
                        bucket("prediabetic", 5.7, 6.4, 2),
                        bucket("diabetic", 6.5, 99.0, 4),
                    ],
                ),
                reference(
                    "blood_pressure_systolic",
                    "mmHg",
                    10.0,
                    true,
                    vec![
                        bucket("normal", 90.0, 120.0, 0),
                        bucket("elevated", 121.0, 129.0, 1),
                        bucket("stage1_hypertension", 130.0, 139.0, 3),
                        bucket("stage2_hypertension", 140.0, 179.0, 4),
                        bucket("crisis", 180.0, 999.0, 6),
                    ],
                ),
                reference(
                    "blood_pressure_diastolic",
                    "mmHg",
                    5.0,
                    true,
                    vec![
                        bucket("normal", 60.0, 80.0, 0),
                        bucket("elevated", 80.0, 84.0, 1),
                        bucket("stage1_hypertension", 85.0, 89.0, 3),
                        bucket("stage2_hypertension", 90.0, 119.0, 4),
                        bucket("crisis", 120.0, 999.0, 6),
                    ],
                ),
                reference(
                    "cholesterol_total",
                    "mg/dL",
                    20.0,
                    true,
                    vec![
                        bucket("desirable", 0.0, 199.0, 0),
                        bucket("borderline", 200.0, 239.0, 1),
                        bucket("high", 240.0, 999.0, 3),
                    ],
                ),
                reference(
                    "ldl",
                    "mg/dL",
                    15.0,
                    true,
                    vec![
                        bucket("optimal", 0.0, 99.0, 0),
                        bucket("near_optimal", 100.0, 129.0, 0),
                        bucket("borderline", 130.0, 159.0, 1),
                        bucket("high", 160.0, 189.0, 3),
                        bucket("very_high", 190.0, 999.0, 5),
                    ],
                ),
                reference(
                    "hdl",
                    "mg/dL",
                    5.0,
                    false,
                    vec![
                        bucket("low", 0.0, 39.0, 3),
                        bucket("borderline", 40.0, 59.0, 1),
                        bucket("optimal", 60.0, 999.0, 0),
                    ],
                ),
                reference(
                    "triglycerides",
                    "mg/dL",
                    30.0,
                    true,
                    vec![
                        bucket("normal", 0.0, 149.0, 0),
                        bucket("borderline", 150.0, 199.0, 1),
                        bucket("high", 200.0, 499.0, 3),
                        bucket("very_high", 500.0, 9999.0, 5),
                    ],
                ),
            ],
        }
    }
}
