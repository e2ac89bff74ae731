//! The live adaptive agent: orchestrates ingestion, temporal context lookup,
//! reasoning, knowledge retrieval, optional enrichment, and result assembly
//! for each incoming report.
//!
//! Degradation policy: persistence failure of a new report is fatal to that
//! call; every enrichment step (extraction, knowledge, narrative) is
//! best-effort and logged on failure.

mod enrichment;
mod types;

pub use enrichment::{
    BaseAnalysis, EnrichmentError, EntityExtractor, ExtractedEntity, Narrative,
    NarrativeGenerator, NarrativeInput, OllamaNarrativeClient,
};
pub use types::{
    AgentError, AnalysisResult, AnalyzeRequest, CurrentAnalysis, TemporalContextSummary,
    TemporalReasoningOutcome, UpdateInfo,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::{LiveMemoryIndex, MemoryStatus, TemporalContext};
use crate::models::{KnowledgeDocument, PatientDocument};
use crate::reasoning::TemporalReasoningEngine;

const DEFAULT_LOOKBACK_DAYS: i64 = 365;
const DEFAULT_ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(30);
/// Knowledge lookups are keyed by the report's first metrics, capped here.
const KNOWLEDGE_METRIC_LIMIT: usize = 3;
const KNOWLEDGE_RESULTS_PER_METRIC: usize = 2;
const RECOMMENDATION_CAP: usize = 3;

const DEFAULT_BASE_CONFIDENCE: f64 = 0.85;
const NARRATIVE_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub memory: Option<MemoryStatus>,
    pub extractor_configured: bool,
    pub narrator_configured: bool,
}

pub struct LiveAdaptiveAgent {
    memory: Option<Arc<LiveMemoryIndex>>,
    engine: TemporalReasoningEngine,
    extractor: Option<Arc<dyn EntityExtractor>>,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
    enrichment_timeout: Duration,
}

impl LiveAdaptiveAgent {
    /// `memory: None` runs the pipeline without persistence or history;
    /// every analysis is then a first analysis and `persisted` is false.
    pub fn new(memory: Option<Arc<LiveMemoryIndex>>, engine: TemporalReasoningEngine) -> Self {
        Self {
            memory,
            engine,
            extractor: None,
            narrator: None,
            enrichment_timeout: DEFAULT_ENRICHMENT_TIMEOUT,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn with_enrichment_timeout(mut self, timeout: Duration) -> Self {
        self.enrichment_timeout = timeout;
        self
    }

    /// Full pipeline for a newly submitted report.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisResult, AgentError> {
        let mut document = PatientDocument::new(
            request.patient_id,
            request.document_type,
            request.text,
            request.metrics,
        );
        document.metadata = request.metadata;

        self.analyze_document(document, true, None).await
    }

    /// Poll for reports newer than `since` and re-run the pipeline on the
    /// most recent one. The triggering report is already persisted, so the
    /// reanalysis must not append it again.
    pub async fn check_for_updates(
        &self,
        patient_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<AnalysisResult>, AgentError> {
        let Some(memory) = &self.memory else {
            return Ok(None);
        };

        let check = memory.detect_updates_since(patient_id, since)?;
        if !check.requires_reanalysis {
            return Ok(None);
        }

        let Some(mut newest) = check
            .new_documents
            .into_iter()
            .max_by_key(|doc| doc.sort_key())
        else {
            return Ok(None);
        };
        newest
            .metadata
            .insert("auto_reanalysis".to_string(), serde_json::Value::Bool(true));

        tracing::info!(
            patient_id,
            new_documents = check.new_document_count,
            document_id = %newest.document_id,
            "Auto-reanalysis triggered by new documents"
        );

        let update_info = UpdateInfo {
            was_auto_reanalyzed: true,
            trigger_timestamp: since,
            new_documents_processed: check.new_document_count,
            reanalysis_timestamp: check.checked_at,
        };

        self.analyze_document(newest, false, Some(update_info))
            .await
            .map(Some)
    }

    pub fn status(&self) -> Result<AgentStatus, AgentError> {
        let memory = match &self.memory {
            Some(memory) => Some(memory.status()?),
            None => None,
        };
        Ok(AgentStatus {
            memory,
            extractor_configured: self.extractor.is_some(),
            narrator_configured: self.narrator.is_some(),
        })
    }

    async fn analyze_document(
        &self,
        document: PatientDocument,
        ingest: bool,
        update_info: Option<UpdateInfo>,
    ) -> Result<AnalysisResult, AgentError> {
        // Step 1: persist.
        let persisted = match &self.memory {
            Some(memory) if ingest => {
                memory
                    .ingest_document(&document)
                    .map_err(AgentError::Ingestion)?;
                true
            }
            Some(_) => true,
            None => {
                tracing::warn!(
                    patient_id = document.patient_id,
                    "No memory index configured; report will not be persisted"
                );
                false
            }
        };

        // Step 2: temporal context.
        let context = match &self.memory {
            Some(memory) => Some(memory.get_temporal_context(
                document.patient_id,
                DEFAULT_LOOKBACK_DAYS,
                true,
            )?),
            None => None,
        };

        let historical: Vec<PatientDocument> = context
            .as_ref()
            .map(|ctx| {
                ctx.documents
                    .iter()
                    .filter(|doc| doc.document_id != document.document_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Step 3: temporal reasoning.
        let empty_trends = BTreeMap::new();
        let trends = context
            .as_ref()
            .map(|ctx| &ctx.metric_trends)
            .unwrap_or(&empty_trends);
        let outcome = if historical.is_empty() {
            tracing::info!(
                patient_id = document.patient_id,
                "First analysis for patient; no temporal comparison possible"
            );
            TemporalReasoningOutcome::FirstAnalysis
        } else {
            TemporalReasoningOutcome::Analyzed(self.engine.analyze(&document, &historical, trends))
        };

        // Step 4: knowledge retrieval, best-effort.
        let knowledge = self.retrieve_knowledge(&document);

        // Step 5: base analysis of the current report, best-effort.
        let base = match &self.extractor {
            Some(extractor) => {
                let fut = extractor.extract(&document.content, &document.metrics);
                match tokio::time::timeout(self.enrichment_timeout, fut).await {
                    Ok(Ok(base)) => Some(base),
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "Entity extraction failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!("Entity extraction timed out");
                        None
                    }
                }
            }
            None => None,
        };

        // Step 6: narrative, only when there is a temporal analysis.
        let narrative = match (&self.narrator, outcome.analysis()) {
            (Some(narrator), Some(analysis)) => {
                let fut = narrator.explain(NarrativeInput {
                    current: &document,
                    analysis,
                    knowledge: &knowledge,
                });
                match tokio::time::timeout(self.enrichment_timeout, fut).await {
                    Ok(Ok(narrative)) => Some(narrative),
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "Narrative generation failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!("Narrative generation timed out");
                        None
                    }
                }
            }
            _ => None,
        };

        // Step 7: assemble.
        let final_recommendations = merge_recommendations(base.as_ref(), &outcome);
        let confidence_score = aggregate_confidence(base.as_ref(), &outcome, narrative.is_some());

        let result = AnalysisResult {
            document_id: document.document_id,
            patient_id: document.patient_id,
            analysis_timestamp: Utc::now(),
            current_analysis: CurrentAnalysis {
                document_type: document.document_type.clone(),
                detected_metrics: document.metrics.clone(),
                entities: base
                    .as_ref()
                    .map(|b| b.entities.clone())
                    .unwrap_or_default(),
                base_recommendations: base
                    .as_ref()
                    .map(|b| b.recommendations.clone())
                    .unwrap_or_default(),
                base_confidence: base.as_ref().map(|b| b.confidence),
            },
            temporal_context: summarize_context(context, historical.len()),
            temporal_reasoning: outcome,
            narrative,
            relevant_knowledge: knowledge.iter().map(|doc| doc.title.clone()).collect(),
            final_recommendations,
            confidence_score,
            persisted,
            update_info,
        };

        tracing::info!(
            patient_id = result.patient_id,
            document_id = %result.document_id,
            first_analysis = result.temporal_reasoning.is_first_analysis(),
            confidence = result.confidence_score,
            "Analysis complete"
        );

        Ok(result)
    }

    fn retrieve_knowledge(&self, document: &PatientDocument) -> Vec<KnowledgeDocument> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };

        let mut knowledge = Vec::new();
        for name in document.metrics.keys().take(KNOWLEDGE_METRIC_LIMIT) {
            match memory.query_knowledge(name, None, KNOWLEDGE_RESULTS_PER_METRIC) {
                Ok(hits) => knowledge.extend(hits),
                Err(err) => {
                    tracing::warn!(metric = %name, error = %err, "Knowledge lookup failed");
                }
            }
        }
        knowledge
    }
}

fn summarize_context(
    context: Option<TemporalContext>,
    historical_count: usize,
) -> TemporalContextSummary {
    match context {
        Some(context) => TemporalContextSummary {
            has_history: historical_count > 0,
            historical_document_count: historical_count,
            lookback_period_days: context.lookback_days,
            timeline: context.timeline,
            metric_trends: context.metric_trends,
            detected_deltas: context.deltas,
        },
        None => TemporalContextSummary {
            has_history: false,
            historical_document_count: 0,
            lookback_period_days: DEFAULT_LOOKBACK_DAYS,
            timeline: Vec::new(),
            metric_trends: BTreeMap::new(),
            detected_deltas: None,
        },
    }
}

/// Temporal recommendations lead, base recommendations follow, each capped
/// and deduplicated. A monitoring reminder closes the list whenever a
/// temporal analysis ran.
fn merge_recommendations(
    base: Option<&BaseAnalysis>,
    outcome: &TemporalReasoningOutcome,
) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();

    if let Some(analysis) = outcome.analysis() {
        for insight in &analysis.temporal_insights {
            if let Some(rec) = &insight.recommendation {
                let rec = format!("[temporal] {rec}");
                if !merged.contains(&rec) {
                    merged.push(rec);
                }
            }
            if merged.len() >= RECOMMENDATION_CAP {
                break;
            }
        }
    }

    if let Some(base) = base {
        let mut taken = 0;
        for rec in &base.recommendations {
            if taken >= RECOMMENDATION_CAP {
                break;
            }
            if !merged.contains(rec) {
                merged.push(rec.clone());
                taken += 1;
            }
        }
    }

    if outcome.analysis().is_some() {
        merged.push("Continue regular monitoring so future reports keep temporal context".into());
    }

    merged
}

/// Mean of the available confidence signals: base extraction, insight
/// confidences, and a fixed bonus term when a narrative was generated.
fn aggregate_confidence(
    base: Option<&BaseAnalysis>,
    outcome: &TemporalReasoningOutcome,
    has_narrative: bool,
) -> f64 {
    let mut parts = vec![base.map(|b| b.confidence).unwrap_or(DEFAULT_BASE_CONFIDENCE)];

    if let Some(analysis) = outcome.analysis() {
        let insights = &analysis.temporal_insights;
        if !insights.is_empty() {
            let mean = insights.iter().map(|i| i.confidence).sum::<f64>() / insights.len() as f64;
            parts.push(mean);
        }
    }

    if has_narrative {
        parts.push(NARRATIVE_CONFIDENCE);
    }

    parts.iter().sum::<f64>() / parts.len() as f64
}
