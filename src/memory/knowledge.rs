//! Knowledge-base persistence: clinical guidelines and reference texts,
//! independent of any patient. Matching is plain keyword search in storage
//! iteration order; no ranking is guaranteed.

use std::fs;
use std::path::PathBuf;

use crate::models::KnowledgeDocument;

use super::store::StoreError;

pub trait KnowledgeStore: Send + Sync {
    fn append(&self, document: &KnowledgeDocument) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<KnowledgeDocument>, StoreError>;
    fn count(&self) -> Result<usize, StoreError>;
}

/// Directory of JSON records, one immutable file per knowledge document.
pub struct FsKnowledgeStore {
    dir: PathBuf,
}

impl FsKnowledgeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

impl KnowledgeStore for FsKnowledgeStore {
    fn append(&self, document: &KnowledgeDocument) -> Result<(), StoreError> {
        let name = format!("know_{}.json", document.knowledge_id);
        let final_path = self.dir.join(&name);
        let staging_path = self.dir.join(format!("{name}.tmp"));
        fs::write(&staging_path, serde_json::to_string_pretty(document)?)?;
        fs::rename(&staging_path, &final_path)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<KnowledgeDocument>, StoreError> {
        let mut documents = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("know_") || !name.ends_with(".json") {
                continue;
            }
            let parsed = fs::read_to_string(entry.path())
                .map_err(StoreError::from)
                .and_then(|raw| {
                    serde_json::from_str::<KnowledgeDocument>(&raw).map_err(StoreError::from)
                });
            match parsed {
                Ok(document) => documents.push(document),
                Err(err) => {
                    tracing::warn!(file = %name, error = %err, "Skipping unreadable knowledge record");
                }
            }
        }
        Ok(documents)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_list_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKnowledgeStore::new(dir.path()).unwrap();

        let doc = KnowledgeDocument::new(
            "guideline",
            "ADA glucose targets",
            "Fasting glucose above 126 mg/dL on two occasions indicates diabetes.",
            "ADA 2025",
        );
        store.append(&doc).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "ADA glucose targets");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn corrupt_record_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKnowledgeStore::new(dir.path()).unwrap();
        fs::write(dir.path().join("know_broken.json"), "not json").unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
