//! Output types of the temporal reasoning engine.
//!
//! Everything here serializes to JSON for API responses and persistence, so
//! field names are part of the external contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a metric's multi-measurement trend, interpreted clinically:
/// a rising HDL is `Improving`, a rising LDL is `Worsening`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    Improving,
    Worsening,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProgression {
    Improved,
    Worsened,
    Stable,
    NewRisk,
    ResolvedRisk,
}

impl RiskProgression {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProgression::Improved => "improved",
            RiskProgression::Worsened => "worsened",
            RiskProgression::Stable => "stable",
            RiskProgression::NewRisk => "new_risk",
            RiskProgression::ResolvedRisk => "resolved_risk",
        }
    }
}

/// One metric's current value placed in its historical context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalMetric {
    pub metric: String,
    pub current_value: f64,
    pub current_timestamp: DateTime<Utc>,
    /// Timestamp of the earliest observation of this metric in the window;
    /// equals `current_timestamp` on a first observation.
    pub first_observed: DateTime<Utc>,
    pub previous_value: Option<f64>,
    pub previous_timestamp: Option<DateTime<Utc>>,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
    pub direction: crate::models::ChangeDirection,
    pub trend: TrendClass,
    pub observation_count: usize,
    pub risk_level_current: String,
    pub risk_level_previous: Option<String>,
    pub risk_progression: RiskProgression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Moderate,
    High,
}

/// A between-report change whose magnitude crossed the metric's clinical
/// significance threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificantChange {
    pub metric: String,
    pub previous_value: f64,
    pub current_value: f64,
    pub change: f64,
    pub percent_change: Option<f64>,
    pub direction: crate::models::ChangeDirection,
    pub significance: Significance,
    pub threshold: f64,
    pub risk_progression: RiskProgression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProgressionDetail {
    pub metric: String,
    pub previous_level: Option<String>,
    pub current_level: String,
    pub progression: RiskProgression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallTrend {
    Improving,
    Worsening,
    #[default]
    Stable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskProgressionSummary {
    pub improved_count: usize,
    pub worsened_count: usize,
    pub stable_count: usize,
    pub new_risk_count: usize,
    pub resolved_risk_count: usize,
    /// Only non-stable progressions are detailed.
    pub details: Vec<RiskProgressionDetail>,
    pub overall_trend: OverallTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    SignificantChange,
    RiskIncrease,
    Improvement,
    TrendDetected,
}

/// A prioritized, human-readable conclusion with its supporting evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalInsight {
    pub insight_type: InsightKind,
    /// Higher sorts first.
    pub priority: u32,
    pub title: String,
    pub description: String,
    pub evidence: Vec<String>,
    pub temporal_context: String,
    pub recommendation: Option<String>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Complete engine output for one report against its history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAnalysis {
    pub temporal_metrics: Vec<TemporalMetric>,
    pub detected_changes: Vec<SignificantChange>,
    pub risk_progressions: RiskProgressionSummary,
    pub temporal_insights: Vec<TemporalInsight>,
    pub temporal_summary: String,
    pub analysis_timestamp: DateTime<Utc>,
}
