//! Request and result types for the live adaptive analysis pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::memory::{MemoryError, MetricTrend, SnapshotDelta, TimelineEntry};
use crate::models::MetricValue;
use crate::reasoning::TemporalAnalysis;

use super::enrichment::{ExtractedEntity, Narrative};

#[derive(Debug, Error)]
pub enum AgentError {
    /// The new report could not be persisted. Nothing was analyzed.
    #[error("Failed to ingest report: {0}")]
    Ingestion(#[source] MemoryError),

    #[error("Memory query failed: {0}")]
    Memory(#[from] MemoryError),
}

/// A new report submitted for analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub patient_id: i64,
    pub document_type: String,
    pub text: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Temporal reasoning outcome: a first report has nothing to compare against.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TemporalReasoningOutcome {
    Analyzed(TemporalAnalysis),
    FirstAnalysis,
}

impl TemporalReasoningOutcome {
    pub fn is_first_analysis(&self) -> bool {
        matches!(self, TemporalReasoningOutcome::FirstAnalysis)
    }

    pub fn analysis(&self) -> Option<&TemporalAnalysis> {
        match self {
            TemporalReasoningOutcome::Analyzed(analysis) => Some(analysis),
            TemporalReasoningOutcome::FirstAnalysis => None,
        }
    }
}

/// History-free view of the current report.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentAnalysis {
    pub document_type: String,
    pub detected_metrics: BTreeMap<String, MetricValue>,
    pub entities: Vec<ExtractedEntity>,
    pub base_recommendations: Vec<String>,
    pub base_confidence: Option<f64>,
}

/// Condensed memory view carried in the result.
#[derive(Debug, Clone, Serialize)]
pub struct TemporalContextSummary {
    pub has_history: bool,
    pub historical_document_count: usize,
    pub lookback_period_days: i64,
    pub timeline: Vec<TimelineEntry>,
    pub metric_trends: BTreeMap<String, MetricTrend>,
    pub detected_deltas: Option<SnapshotDelta>,
}

/// Present only on results produced by auto-reanalysis.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateInfo {
    pub was_auto_reanalyzed: bool,
    pub trigger_timestamp: DateTime<Utc>,
    pub new_documents_processed: usize,
    pub reanalysis_timestamp: DateTime<Utc>,
}

/// Complete pipeline output for one report.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub document_id: Uuid,
    pub patient_id: i64,
    pub analysis_timestamp: DateTime<Utc>,
    pub current_analysis: CurrentAnalysis,
    pub temporal_context: TemporalContextSummary,
    pub temporal_reasoning: TemporalReasoningOutcome,
    pub narrative: Option<Narrative>,
    pub relevant_knowledge: Vec<String>,
    pub final_recommendations: Vec<String>,
    pub confidence_score: f64,
    /// False when the agent runs without a memory index.
    pub persisted: bool,
    pub update_info: Option<UpdateInfo>,
}
