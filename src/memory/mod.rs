//! Live Memory Index — the continuously updated, queryable per-patient view
//! over the append-only document store.
//!
//! The "live" quality comes from re-reading the store on every query rather
//! than from a watcher process: a document appended moments ago appears in
//! the next `get_temporal_context` call. Per-patient reads never touch other
//! patients' data (filename prefix on the filesystem backend, indexed lookup
//! on SQLite).

mod context;
mod knowledge;
mod store;

pub use context::{
    DeltaReport, Finding, MetricChange, MetricTrend, MetricTrendData, SnapshotDelta,
    TemporalContext, TimelineEntry, TrendDirection,
};
pub use knowledge::{FsKnowledgeStore, KnowledgeStore};
pub use store::{DocumentStore, FsDocumentStore, SqliteDocumentStore, StoreError};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::models::{KnowledgeDocument, MetricValue, PatientDocument};

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The backing store refused the append of a new document. Fatal to the
    /// initiating call only.
    #[error("Document ingestion failed: {0}")]
    Ingestion(#[source] StoreError),

    #[error("Storage query failed: {0}")]
    Query(#[from] StoreError),
}

/// Result of polling for documents newer than a known timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCheck {
    pub checked_at: DateTime<Utc>,
    pub since_timestamp: DateTime<Utc>,
    pub new_document_count: usize,
    pub new_documents: Vec<PatientDocument>,
    pub requires_reanalysis: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryStatus {
    pub patient_documents: usize,
    pub knowledge_documents: usize,
    pub capabilities: Vec<&'static str>,
}

/// Handle over the document and knowledge stores. Constructed once at
/// startup and passed into the orchestrator — no process-wide singleton.
pub struct LiveMemoryIndex {
    store: Arc<dyn DocumentStore>,
    knowledge: Arc<dyn KnowledgeStore>,
}

impl LiveMemoryIndex {
    pub fn new(store: Arc<dyn DocumentStore>, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        Self { store, knowledge }
    }

    /// Filesystem-backed index under the application data directory.
    pub fn open_default() -> Result<Self, MemoryError> {
        let store = FsDocumentStore::new(config::patient_docs_dir())?;
        let knowledge = FsKnowledgeStore::new(config::knowledge_docs_dir())?;
        Ok(Self::new(Arc::new(store), Arc::new(knowledge)))
    }

    /// Append one patient document. Returns the generated document id.
    pub fn ingest(
        &self,
        patient_id: i64,
        document_type: &str,
        content: &str,
        metrics: BTreeMap<String, MetricValue>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<Uuid, MemoryError> {
        let mut document = PatientDocument::new(patient_id, document_type, content, metrics);
        document.metadata = metadata;
        self.ingest_document(&document)?;
        Ok(document.document_id)
    }

    /// Append a fully formed document (the orchestrator builds its own so the
    /// id and timestamp survive into the analysis result).
    pub fn ingest_document(&self, document: &PatientDocument) -> Result<(), MemoryError> {
        self.store
            .append(document)
            .map_err(MemoryError::Ingestion)?;
        tracing::info!(
            patient_id = document.patient_id,
            document_id = %document.document_id,
            document_type = %document.document_type,
            "Patient document ingested"
        );
        Ok(())
    }

    /// The key temporal query: all of a patient's documents within the
    /// lookback window, plus timeline, per-metric trends, and (optionally)
    /// the delta between the two most recent documents.
    ///
    /// A patient with zero documents gets an empty context, never an error.
    pub fn get_temporal_context(
        &self,
        patient_id: i64,
        lookback_days: i64,
        include_deltas: bool,
    ) -> Result<TemporalContext, MemoryError> {
        let query_timestamp = Utc::now();
        let cutoff = query_timestamp - Duration::days(lookback_days);

        let mut ascending = self.store.list_all(patient_id)?;
        ascending.retain(|d| d.timestamp >= cutoff);

        let timeline = context::build_timeline(&ascending);
        let metric_trends = if ascending.is_empty() {
            BTreeMap::new()
        } else {
            context::compute_metric_trends(&ascending)
        };
        let deltas = if include_deltas && !ascending.is_empty() {
            Some(context::compute_deltas(&ascending))
        } else {
            None
        };

        let mut documents = ascending;
        documents.reverse();

        Ok(TemporalContext {
            patient_id,
            query_timestamp,
            lookback_days,
            document_count: documents.len(),
            documents,
            timeline,
            metric_trends,
            deltas,
        })
    }

    /// Poll for documents newer than `since`. `requires_reanalysis` is true
    /// whenever at least one new document exists.
    pub fn detect_updates_since(
        &self,
        patient_id: i64,
        since: DateTime<Utc>,
    ) -> Result<UpdateCheck, MemoryError> {
        let new_documents = self.store.list_since(patient_id, since)?;
        Ok(UpdateCheck {
            checked_at: Utc::now(),
            since_timestamp: since,
            new_document_count: new_documents.len(),
            requires_reanalysis: !new_documents.is_empty(),
            new_documents,
        })
    }

    /// Append one knowledge document. Returns the generated id.
    pub fn ingest_knowledge(
        &self,
        document_type: &str,
        title: &str,
        content: &str,
        source: &str,
    ) -> Result<Uuid, MemoryError> {
        let document = KnowledgeDocument::new(document_type, title, content, source);
        self.knowledge
            .append(&document)
            .map_err(MemoryError::Ingestion)?;
        tracing::info!(title, source, "Knowledge document ingested");
        Ok(document.knowledge_id)
    }

    /// Case-insensitive substring match over title and content, first
    /// `limit` hits in storage iteration order. Known limitation: no
    /// relevance ranking.
    pub fn query_knowledge(
        &self,
        query: &str,
        document_types: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<KnowledgeDocument>, MemoryError> {
        let needle = query.to_lowercase();
        let mut results = Vec::new();

        for document in self.knowledge.list()? {
            if let Some(types) = document_types {
                if !types.contains(&document.document_type) {
                    continue;
                }
            }
            if document.title.to_lowercase().contains(&needle)
                || document.content.to_lowercase().contains(&needle)
            {
                results.push(document);
                if results.len() >= limit {
                    break;
                }
            }
        }

        Ok(results)
    }

    pub fn status(&self) -> Result<MemoryStatus, MemoryError> {
        Ok(MemoryStatus {
            patient_documents: self.store.count()?,
            knowledge_documents: self.knowledge.count()?,
            capabilities: vec![
                "temporal_query",
                "change_detection",
                "incremental_indexing",
                "knowledge_base",
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn open_index(dir: &std::path::Path) -> LiveMemoryIndex {
        LiveMemoryIndex::new(
            Arc::new(FsDocumentStore::new(dir.join("patient_docs")).unwrap()),
            Arc::new(FsKnowledgeStore::new(dir.join("knowledge_docs")).unwrap()),
        )
    }

    fn backdated_document(patient_id: i64, days_ago: i64, glucose: f64) -> PatientDocument {
        let mut metrics = BTreeMap::new();
        metrics.insert("glucose_fasting".to_string(), MetricValue::Number(glucose));
        let mut doc = PatientDocument::new(patient_id, "lab_report", "panel", metrics);
        doc.timestamp = Utc::now() - Duration::days(days_ago);
        doc
    }

    #[test]
    fn context_documents_descending_timeline_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        // Out-of-order insertion.
        index
            .ingest_document(&backdated_document(1, 10, 100.0))
            .unwrap();
        index
            .ingest_document(&backdated_document(1, 60, 95.0))
            .unwrap();
        index
            .ingest_document(&backdated_document(1, 30, 98.0))
            .unwrap();

        let context = index.get_temporal_context(1, 365, true).unwrap();
        assert_eq!(context.document_count, 3);

        for pair in context.documents.windows(2) {
            assert!(pair[0].sort_key() > pair[1].sort_key());
        }
        for pair in context.timeline.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn lookback_window_excludes_old_documents() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        index
            .ingest_document(&backdated_document(1, 400, 95.0))
            .unwrap();
        index
            .ingest_document(&backdated_document(1, 10, 110.0))
            .unwrap();

        let context = index.get_temporal_context(1, 365, true).unwrap();
        assert_eq!(context.document_count, 1);
        assert!(matches!(
            context.deltas,
            Some(SnapshotDelta::InsufficientHistory)
        ));
    }

    #[test]
    fn empty_patient_yields_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        let context = index.get_temporal_context(42, 365, true).unwrap();
        assert_eq!(context.document_count, 0);
        assert!(context.documents.is_empty());
        assert!(context.timeline.is_empty());
        assert!(context.metric_trends.is_empty());
        assert!(context.deltas.is_none());
    }

    #[test]
    fn deltas_computed_from_two_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        index
            .ingest_document(&backdated_document(1, 60, 100.0))
            .unwrap();
        index
            .ingest_document(&backdated_document(1, 30, 120.0))
            .unwrap();

        let context = index.get_temporal_context(1, 365, true).unwrap();
        let Some(SnapshotDelta::Computed(report)) = context.deltas else {
            panic!("expected computed delta");
        };
        assert_eq!(report.metric_changes["glucose_fasting"].change, 20.0);

        let without = index.get_temporal_context(1, 365, false).unwrap();
        assert!(without.deltas.is_none());
    }

    #[test]
    fn detect_updates_since_flags_reanalysis() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let pivot = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        index
            .ingest_document(&backdated_document(1, 10, 110.0))
            .unwrap();

        let check = index.detect_updates_since(1, pivot).unwrap();
        assert_eq!(check.new_document_count, 1);
        assert!(check.requires_reanalysis);

        let later = index.detect_updates_since(1, Utc::now()).unwrap();
        assert_eq!(later.new_document_count, 0);
        assert!(!later.requires_reanalysis);
    }

    #[test]
    fn knowledge_query_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        index
            .ingest_knowledge(
                "guideline",
                "Fasting Glucose Targets",
                "Diagnostic cut-offs for glucose_fasting per ADA.",
                "ADA",
            )
            .unwrap();
        index
            .ingest_knowledge(
                "protocol",
                "Hypertension follow-up",
                "Blood pressure rechecks within two weeks.",
                "AHA",
            )
            .unwrap();

        let hits = index.query_knowledge("GLUCOSE", None, 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Fasting Glucose Targets");

        let typed = index
            .query_knowledge("glucose", Some(&["protocol".to_string()]), 5)
            .unwrap();
        assert!(typed.is_empty());

        let limited = index.query_knowledge("o", None, 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn status_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());

        index
            .ingest_document(&backdated_document(1, 1, 95.0))
            .unwrap();
        index
            .ingest_knowledge("guideline", "t", "c", "s")
            .unwrap();

        let status = index.status().unwrap();
        assert_eq!(status.patient_documents, 1);
        assert_eq!(status.knowledge_documents, 1);
    }
}
