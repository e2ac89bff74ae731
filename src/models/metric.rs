use serde::{Deserialize, Serialize};

/// Unit suffixes stripped before numeric parsing.
const KNOWN_UNITS: [&str; 3] = ["mg/dL", "mmHg", "%"];

/// A metric value as delivered by the extraction collaborators.
///
/// Extraction produces either a plain number or a string that may carry a
/// unit suffix (`"180 mg/dL"`). Values that fail numeric coercion are kept
/// verbatim in documents but excluded from trend and delta computation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Coerce to a numeric value. Known unit suffixes and surrounding
    /// whitespace are stripped before parsing, so `"180 mg/dL"` and `180`
    /// compare as the same value.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => {
                let mut clean = s.clone();
                for unit in KNOWN_UNITS {
                    clean = clean.replace(unit, "");
                }
                clean.trim().parse::<f64>().ok()
            }
        }
    }
}

impl From<f64> for MetricValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Direction of a metric-level change between two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    Increased,
    Decreased,
    Stable,
    New,
}

impl ChangeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increased => "increased",
            Self::Decreased => "decreased",
            Self::Stable => "stable",
            Self::New => "new",
        }
    }
}
