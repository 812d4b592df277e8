use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::vector_store::sibling_tmp_path;

/// One indexed chunk: which document it came from, its position within that
/// document's segmentation, and the chunk text itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub chunk_index: usize,
    pub text: String,
}

/// Ordered, append-only list of chunk records. The record at position `p`
/// describes the vector at position `p` of the vector store; keeping the two
/// sequences the same length is the job of the index handle that owns both.
#[derive(Debug, Default)]
pub struct MetadataStore {
    records: Vec<ChunkRecord>,
}

impl MetadataStore {
    /// Loads the record list persisted at `path`, or an empty store if the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let records: Vec<ChunkRecord> = serde_json::from_str(&contents).map_err(|err| {
            Error::Format(format!(
                "metadata store '{}' is not a valid record list: {}",
                path.display(),
                err
            ))
        })?;
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// Positional lookup mirroring the vector store's ordinals.
    pub fn get(&self, position: usize) -> Result<&ChunkRecord> {
        self.records.get(position).ok_or(Error::Range {
            position,
            len: self.records.len(),
        })
    }

    pub fn append(&mut self, records: Vec<ChunkRecord>) {
        self.records.extend(records);
    }

    /// Drops every record at or past `len`. Used to unwind a batch whose
    /// persist failed; the public surface stays append-only.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    /// Serializes the record list to `path` through a sibling temp file and
    /// an atomic rename.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let tmp_path = sibling_tmp_path(path);
        let contents = serde_json::to_string_pretty(&self.records).map_err(|err| {
            Error::Format(format!("metadata store could not be serialized: {}", err))
        })?;
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(doc_id: &str, chunk_index: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            doc_id: doc_id.to_string(),
            chunk_index,
            text: text.to_string(),
        }
    }

    #[test]
    fn load_without_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::load(&dir.path().join("missing.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn get_out_of_bounds_is_a_range_error() {
        let mut store = MetadataStore::default();
        store.append(vec![record("doc", 0, "text")]);
        assert!(store.get(0).is_ok());
        assert!(matches!(
            store.get(1),
            Err(Error::Range { position: 1, len: 1 })
        ));
    }

    #[test]
    fn persist_and_reload_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");

        let mut store = MetadataStore::default();
        store.append(vec![
            record("alpha", 0, "first chunk"),
            record("alpha", 1, "second chunk"),
            record("beta", 0, "other document"),
        ]);
        store.persist(&path).unwrap();

        let reloaded = MetadataStore::load(&path).unwrap();
        assert_eq!(reloaded.records(), store.records());
        assert_eq!(reloaded.get(2).unwrap().doc_id, "beta");
    }

    #[test]
    fn load_rejects_corrupt_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, "{ not a record list").unwrap();

        assert!(matches!(
            MetadataStore::load(&path),
            Err(Error::Format(_))
        ));
    }
}
