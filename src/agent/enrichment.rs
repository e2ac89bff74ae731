//! Optional enrichment seams: entity extraction over the raw report text and
//! LLM-backed narrative generation. Both are best-effort; the orchestrator
//! degrades without them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{KnowledgeDocument, MetricValue, PatientDocument};
use crate::reasoning::TemporalAnalysis;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Enrichment request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed enrichment response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub label: String,
    pub text: String,
}

/// History-free analysis of the current report text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseAnalysis {
    pub entities: Vec<ExtractedEntity>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
}

pub trait EntityExtractor: Send + Sync {
    fn extract<'a>(
        &'a self,
        text: &'a str,
        metrics: &'a BTreeMap<String, MetricValue>,
    ) -> BoxFuture<'a, Result<BaseAnalysis, EnrichmentError>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrative {
    pub temporal_explanation: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

pub struct NarrativeInput<'a> {
    pub current: &'a PatientDocument,
    pub analysis: &'a TemporalAnalysis,
    pub knowledge: &'a [KnowledgeDocument],
}

pub trait NarrativeGenerator: Send + Sync {
    fn explain<'a>(
        &'a self,
        input: NarrativeInput<'a>,
    ) -> BoxFuture<'a, Result<Narrative, EnrichmentError>>;
}

// ---------------------------------------------------------------------------
// Ollama-backed narrative generation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Talks to a local Ollama daemon. One request per narrative, no streaming.
pub struct OllamaNarrativeClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaNarrativeClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn default_local() -> Self {
        Self::new("http://127.0.0.1:11434", "llama3.1:8b")
    }

    fn build_prompt(&self, input: &NarrativeInput<'_>) -> String {
        let mut prompt = String::new();

        prompt.push_str("You are a clinical assistant explaining how a patient's new medical report relates to their history.\n\n");

        prompt.push_str("CURRENT REPORT METRICS:\n");
        let metrics =
            serde_json::to_string_pretty(&input.current.metrics).unwrap_or_else(|_| "{}".into());
        prompt.push_str(&metrics);
        prompt.push_str("\n\nTEMPORAL ANALYSIS SUMMARY:\n");
        prompt.push_str(&input.analysis.temporal_summary);

        if !input.analysis.detected_changes.is_empty() {
            prompt.push_str("\n\nSIGNIFICANT CHANGES:\n");
            for change in &input.analysis.detected_changes {
                prompt.push_str(&format!(
                    "- {}: {:.1} -> {:.1} ({})\n",
                    change.metric,
                    change.previous_value,
                    change.current_value,
                    change.direction.as_str()
                ));
            }
        }

        let progressions = &input.analysis.risk_progressions;
        prompt.push_str(&format!(
            "\nRISK PROGRESSION: {} worsened, {} improved, {} stable, {} new\n",
            progressions.worsened_count,
            progressions.improved_count,
            progressions.stable_count,
            progressions.new_risk_count
        ));

        if !input.analysis.temporal_insights.is_empty() {
            prompt.push_str("\nTOP INSIGHTS:\n");
            for insight in input.analysis.temporal_insights.iter().take(3) {
                prompt.push_str(&format!("- {}: {}\n", insight.title, insight.description));
            }
        }

        if !input.knowledge.is_empty() {
            prompt.push_str("\nRELEVANT CLINICAL KNOWLEDGE:\n");
            for doc in input.knowledge {
                prompt.push_str(&format!("- {} ({})\n", doc.title, doc.source));
            }
        }

        prompt.push_str(
            "\nIn plain language, explain:\n\
             1. What changed since the previous report\n\
             2. Whether the changes are clinically meaningful\n\
             3. How the longer-term trend looks\n\
             4. What the patient should watch\n\
             5. What to discuss with their clinician\n",
        );

        prompt
    }
}

impl NarrativeGenerator for OllamaNarrativeClient {
    fn explain<'a>(
        &'a self,
        input: NarrativeInput<'a>,
    ) -> BoxFuture<'a, Result<Narrative, EnrichmentError>> {
        Box::pin(async move {
            let prompt = self.build_prompt(&input);
            let url = format!("{}/api/generate", self.base_url);

            let response = self
                .client
                .post(&url)
                .json(&GenerateRequest {
                    model: &self.model,
                    prompt: &prompt,
                    stream: false,
                })
                .send()
                .await?
                .error_for_status()?;

            let body: GenerateResponse = response.json().await?;
            let explanation = body.response.trim().to_string();
            if explanation.is_empty() {
                return Err(EnrichmentError::Malformed("empty model response".into()));
            }

            Ok(Narrative {
                temporal_explanation: explanation,
                model: self.model.clone(),
                generated_at: Utc::now(),
            })
        })
    }
}
