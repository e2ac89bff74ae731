//! Append-only document persistence behind the Live Memory Index.
//!
//! Two interchangeable backends: a JSON-file directory (one file per
//! document, per-patient filename prefix so listing one patient never scans
//! another's files) and SQLite with an index on `(patient_id, timestamp)`.
//! Both give atomic per-document appends, which is what makes same-patient
//! concurrent ingestion safe without an explicit lock.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;
use uuid::Uuid;

use crate::models::PatientDocument;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal lock failed")]
    LockFailed,
}

/// Append-only, per-patient document persistence.
///
/// Listings return ascending `(timestamp, document_id)` order regardless of
/// insertion order, so out-of-order arrival is corrected at read time.
/// Individually corrupt records are skipped with a warning, never fatal.
pub trait DocumentStore: Send + Sync {
    fn append(&self, document: &PatientDocument) -> Result<(), StoreError>;

    /// All documents for one patient, ascending.
    fn list_all(&self, patient_id: i64) -> Result<Vec<PatientDocument>, StoreError>;

    /// Documents strictly after `since` for one patient, ascending.
    fn list_since(
        &self,
        patient_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<PatientDocument>, StoreError>;

    /// Total record count across all patients.
    fn count(&self) -> Result<usize, StoreError>;
}

// ---------------------------------------------------------------------------
// FsDocumentStore
// ---------------------------------------------------------------------------

/// Directory of JSON records, one immutable file per document.
///
/// File names carry the patient id (`doc_<patient>_<uuid>.json`) so a
/// per-patient listing only touches that patient's files.
pub struct FsDocumentStore {
    dir: PathBuf,
}

impl FsDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn patient_prefix(patient_id: i64) -> String {
        format!("doc_{patient_id}_")
    }

    fn scan(&self, patient_id: i64) -> Result<Vec<PatientDocument>, StoreError> {
        let prefix = Self::patient_prefix(patient_id);
        let mut documents = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }

            let parsed = fs::read_to_string(entry.path())
                .map_err(StoreError::from)
                .and_then(|raw| {
                    serde_json::from_str::<PatientDocument>(&raw).map_err(StoreError::from)
                });
            match parsed {
                Ok(document) => documents.push(document),
                Err(err) => {
                    tracing::warn!(file = %name, error = %err, "Skipping unreadable document record");
                }
            }
        }

        documents.sort_by_key(PatientDocument::sort_key);
        Ok(documents)
    }
}

impl DocumentStore for FsDocumentStore {
    fn append(&self, document: &PatientDocument) -> Result<(), StoreError> {
        let name = format!(
            "doc_{}_{}.json",
            document.patient_id, document.document_id
        );
        let final_path = self.dir.join(&name);
        let staging_path = self.dir.join(format!("{name}.tmp"));

        // Write-then-rename keeps partially written records invisible to readers.
        fs::write(&staging_path, serde_json::to_string_pretty(document)?)?;
        fs::rename(&staging_path, &final_path)?;
        Ok(())
    }

    fn list_all(&self, patient_id: i64) -> Result<Vec<PatientDocument>, StoreError> {
        self.scan(patient_id)
    }

    fn list_since(
        &self,
        patient_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<PatientDocument>, StoreError> {
        let mut documents = self.scan(patient_id)?;
        documents.retain(|d| d.timestamp > since);
        Ok(documents)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let mut total = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("doc_") && name.ends_with(".json") {
                total += 1;
            }
        }
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// SqliteDocumentStore
// ---------------------------------------------------------------------------

/// SQLite-backed store with an index on `(patient_id, timestamp)`.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                document_id   TEXT PRIMARY KEY,
                patient_id    INTEGER NOT NULL,
                document_type TEXT NOT NULL,
                timestamp     TEXT NOT NULL,
                content       TEXT NOT NULL,
                metrics       TEXT NOT NULL,
                metadata      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_patient_time
                ON documents (patient_id, timestamp);",
        )
    }

    fn fetch_patient(&self, patient_id: i64) -> Result<Vec<PatientDocument>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockFailed)?;
        let mut stmt = conn.prepare(
            "SELECT document_id, patient_id, document_type, timestamp, content, metrics, metadata
             FROM documents WHERE patient_id = ?1",
        )?;

        let rows = stmt.query_map(params![patient_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, DateTime<Utc>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, patient_id, document_type, timestamp, content, metrics, metadata) = row?;
            let parsed = Uuid::parse_str(&id)
                .map_err(|e| e.to_string())
                .and_then(|document_id| {
                    Ok(PatientDocument {
                        document_id,
                        patient_id,
                        document_type,
                        timestamp,
                        content,
                        metrics: serde_json::from_str(&metrics).map_err(|e| e.to_string())?,
                        metadata: serde_json::from_str(&metadata).map_err(|e| e.to_string())?,
                    })
                });
            match parsed {
                Ok(document) => documents.push(document),
                Err(err) => {
                    tracing::warn!(document_id = %id, error = %err, "Skipping corrupt document row");
                }
            }
        }

        documents.sort_by_key(PatientDocument::sort_key);
        Ok(documents)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn append(&self, document: &PatientDocument) -> Result<(), StoreError> {
        let metrics = serde_json::to_string(&document.metrics)?;
        let metadata = serde_json::to_string(&document.metadata)?;
        let conn = self.conn.lock().map_err(|_| StoreError::LockFailed)?;
        conn.execute(
            "INSERT INTO documents
                (document_id, patient_id, document_type, timestamp, content, metrics, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                document.document_id.to_string(),
                document.patient_id,
                document.document_type,
                document.timestamp,
                document.content,
                metrics,
                metadata,
            ],
        )?;
        Ok(())
    }

    fn list_all(&self, patient_id: i64) -> Result<Vec<PatientDocument>, StoreError> {
        self.fetch_patient(patient_id)
    }

    fn list_since(
        &self,
        patient_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<PatientDocument>, StoreError> {
        let mut documents = self.fetch_patient(patient_id)?;
        documents.retain(|d| d.timestamp > since);
        Ok(documents)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockFailed)?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(total as usize)
    }
}
