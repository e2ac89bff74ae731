//! Temporal reasoning over a patient's report history: per-metric framing,
//! significance and risk-progression detection, and prioritized insights.

mod detection;
mod engine;
mod insights;
mod reference;
mod types;

pub use engine::TemporalReasoningEngine;
pub use reference::{
    ClinicalReferenceData, MetricReference, ReferenceError, RiskBucket,
    DEFAULT_SIGNIFICANCE_THRESHOLD,
};
pub use types::{
    InsightKind, OverallTrend, RiskProgression, RiskProgressionDetail, RiskProgressionSummary,
    Significance, SignificantChange, TemporalAnalysis, TemporalInsight, TemporalMetric, TrendClass,
};
