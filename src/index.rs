use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::State;
use crate::embeddings::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::metadata_store::{ChunkRecord, MetadataStore};
use crate::segmenter::split_into_chunks;
use crate::vector_store::VectorStore;

/// Per-document indexing summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutcome {
    /// Chunks embedded and appended by this call.
    pub indexed: usize,
    /// Chunks skipped because their (document, chunk index) pair was already
    /// in the ledger.
    pub skipped: usize,
}

/// Owned handle over the paired vector and metadata stores.
///
/// The handle is the single writer: `index_document` takes `&mut self`, so
/// the borrow checker serializes writers against each other and against any
/// outstanding reader. The two stores always change together; their lengths
/// are cross-checked at open and a mismatch refuses to load rather than
/// silently truncating either side.
pub struct Index {
    vectors: VectorStore,
    metadata: MetadataStore,
    ledger: HashSet<(String, usize)>,
    vector_path: PathBuf,
    metadata_path: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Index {
    /// Opens (or creates) the store pair described by `state` and rebuilds
    /// the dedup ledger from the metadata records.
    pub fn open(state: &State) -> Result<Self> {
        let vector_path = PathBuf::from(&state.path);
        let metadata_path = PathBuf::from(&state.metadata_path);

        let vectors = VectorStore::open(&vector_path, state.dimensions)?;
        let metadata = MetadataStore::load(&metadata_path)?;

        if vectors.len() != metadata.len() {
            return Err(Error::Format(format!(
                "vector store '{}' holds {} entries but metadata store '{}' holds {}",
                vector_path.display(),
                vectors.len(),
                metadata_path.display(),
                metadata.len()
            )));
        }

        let ledger = metadata
            .records()
            .iter()
            .map(|record| (record.doc_id.clone(), record.chunk_index))
            .collect();

        debug!(entries = vectors.len(), "opened index");

        Ok(Self {
            vectors,
            metadata,
            ledger,
            vector_path,
            metadata_path,
            chunk_size: state.chunk_size,
            chunk_overlap: state.chunk_overlap,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Segments `text`, embeds every chunk not yet in the ledger, and appends
    /// vectors and records to the two stores in the same order before
    /// persisting both.
    ///
    /// The call is transactional: an embedding failure on any chunk aborts
    /// the whole document with nothing appended or persisted. Stored ordinal
    /// positions follow append order across documents, independent of each
    /// chunk's index within its own document.
    pub fn index_document(
        &mut self,
        embedder: &dyn EmbeddingProvider,
        doc_id: &str,
        text: &str,
    ) -> Result<IndexOutcome> {
        let chunks = split_into_chunks(text, self.chunk_size, self.chunk_overlap)?;

        let mut new_vectors = Vec::new();
        let mut new_records = Vec::new();
        let mut skipped = 0usize;

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            if self.ledger.contains(&(doc_id.to_string(), chunk_index)) {
                skipped += 1;
                continue;
            }
            let vector = embedder.embed(&chunk)?;
            new_vectors.push(vector);
            new_records.push(ChunkRecord {
                doc_id: doc_id.to_string(),
                chunk_index,
                text: chunk,
            });
        }

        if new_records.is_empty() {
            debug!(doc_id, skipped, "document produced no new chunks");
            return Ok(IndexOutcome { indexed: 0, skipped });
        }

        let indexed = new_records.len();
        let first_new = self.metadata.len();

        self.vectors.append(&new_vectors)?;
        self.metadata.append(new_records);

        let persisted = self
            .vectors
            .persist(&self.vector_path)
            .and_then(|()| self.metadata.persist(&self.metadata_path));
        if let Err(err) = persisted {
            // Unwind the in-memory batch so the handle still mirrors the
            // ledger; the next successful persist rewrites both files.
            self.vectors.truncate(first_new);
            self.metadata.truncate(first_new);
            return Err(err);
        }

        // Only a fully persisted batch enters the ledger.
        for record in &self.metadata.records()[first_new..] {
            self.ledger.insert((record.doc_id.clone(), record.chunk_index));
        }

        info!(
            doc_id,
            indexed,
            skipped,
            total = self.vectors.len(),
            "indexed document"
        );

        Ok(IndexOutcome { indexed, skipped })
    }
}
