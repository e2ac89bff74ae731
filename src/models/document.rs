use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metric::MetricValue;

/// One medical-report ingestion event.
///
/// Immutable once appended: corrections are modeled as new documents, never
/// as updates. Within a patient's timeline documents are totally ordered by
/// `(timestamp, document_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientDocument {
    pub document_id: Uuid,
    pub patient_id: i64,
    /// Informational type tag (`lab_report`, `prescription`, `ecg`, ...).
    /// Not validated by the core.
    pub document_type: String,
    pub timestamp: DateTime<Utc>,
    /// Raw extracted text, passed through untouched.
    pub content: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PatientDocument {
    pub fn new(
        patient_id: i64,
        document_type: impl Into<String>,
        content: impl Into<String>,
        metrics: BTreeMap<String, MetricValue>,
    ) -> Self {
        Self {
            document_id: Uuid::new_v4(),
            patient_id,
            document_type: document_type.into(),
            timestamp: Utc::now(),
            content: content.into(),
            metrics,
            metadata: BTreeMap::new(),
        }
    }

    /// Total-order key within one patient's timeline. Ties on timestamp are
    /// broken by document id so concurrent ingestion stays deterministic.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.timestamp, self.document_id)
    }

    /// Numeric view of one metric, if it coerces.
    pub fn numeric_metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(MetricValue::as_numeric)
    }
}

/// A clinical-guideline or reference text, independent of any patient.
/// Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub knowledge_id: Uuid,
    pub document_type: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl KnowledgeDocument {
    pub fn new(
        document_type: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            knowledge_id: Uuid::new_v4(),
            document_type: document_type.into(),
            title: title.into(),
            content: content.into(),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}
