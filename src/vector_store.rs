use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use crate::config::Number;
use crate::error::{Error, Result};
use crate::vector_ops::compute_squared_distance_simd;

const MAGIC: [u8; 4] = *b"RGDX";
const FORMAT_VERSION: u32 = 1;

// magic + version + dimension + count
const HEADER_SIZE: usize = 4 + 4 + 4 + 8;

/// Append-only table of fixed-dimension vectors with exact nearest-neighbor
/// search and an atomically replaced on-disk image.
///
/// Positions are assigned in append order and never change, which is what the
/// metadata store's index alignment relies on.
pub struct VectorStore {
    dimensions: usize,
    data: Vec<Number>,
}

impl VectorStore {
    /// Loads the store persisted at `path`, or creates an empty one if no
    /// file exists yet. A file whose stored dimension differs from
    /// `dimensions` is rejected rather than reinterpreted.
    pub fn open(path: &Path, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Argument("dimensions must be at least 1".to_string()));
        }
        if !path.exists() {
            return Ok(Self {
                dimensions,
                data: Vec::new(),
            });
        }

        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(Error::Format(format!(
                "vector store file '{}' is empty",
                path.display()
            )));
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Self::decode(&mmap, dimensions, path)
    }

    fn decode(bytes: &[u8], dimensions: usize, path: &Path) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Format(format!(
                "vector store file '{}' is shorter than its header",
                path.display()
            )));
        }
        if bytes[0..4] != MAGIC {
            return Err(Error::Format(format!(
                "'{}' is not a vector store file",
                path.display()
            )));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(Error::Format(format!(
                "unsupported vector store version {} in '{}'",
                version,
                path.display()
            )));
        }
        let stored_dimensions = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        if stored_dimensions != dimensions {
            return Err(Error::Format(format!(
                "vector store '{}' holds {}-dimensional vectors, expected {}",
                path.display(),
                stored_dimensions,
                dimensions
            )));
        }
        let count = u64::from_le_bytes(bytes[12..HEADER_SIZE].try_into().unwrap()) as usize;

        let payload = &bytes[HEADER_SIZE..];
        let expected_bytes = count
            .checked_mul(dimensions)
            .and_then(|n| n.checked_mul(size_of::<Number>()))
            .ok_or_else(|| {
                Error::Format(format!(
                    "vector store '{}' declares an implausible count {}",
                    path.display(),
                    count
                ))
            })?;
        if payload.len() != expected_bytes {
            return Err(Error::Format(format!(
                "vector store '{}' declares {} vectors but carries {} payload bytes",
                path.display(),
                count,
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(size_of::<Number>())
            .map(|b| Number::from_le_bytes(b.try_into().unwrap()))
            .collect();

        Ok(Self { dimensions, data })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the vector stored at `position`.
    pub fn vector(&self, position: usize) -> Result<&[Number]> {
        if position >= self.len() {
            return Err(Error::Range {
                position,
                len: self.len(),
            });
        }
        let start = position * self.dimensions;
        Ok(&self.data[start..start + self.dimensions])
    }

    /// Appends `vectors` in order, assigning them consecutive positions
    /// starting at the current length. Every vector is validated before the
    /// first one is written, so a rejected batch leaves the store unchanged.
    pub fn append(&mut self, vectors: &[Vec<Number>]) -> Result<()> {
        for vector in vectors {
            if vector.len() != self.dimensions {
                return Err(Error::Dimension {
                    expected: self.dimensions,
                    actual: vector.len(),
                });
            }
        }
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Exact brute-force search: every stored vector is compared against
    /// `query` by squared Euclidean distance and the `k` closest positions
    /// are returned in ascending distance order. Fewer than `k` results are
    /// returned when the store is smaller than `k`.
    pub fn search(&self, query: &[Number], k: usize) -> Result<Vec<(usize, Number)>> {
        if k == 0 {
            return Err(Error::Argument("k must be at least 1".to_string()));
        }
        if query.len() != self.dimensions {
            return Err(Error::Argument(format!(
                "query vector has {} dimensions, store expects {}",
                query.len(),
                self.dimensions
            )));
        }

        let mut hits: Vec<(usize, Number)> = self
            .data
            .par_chunks_exact(self.dimensions)
            .enumerate()
            .map(|(position, stored)| (position, compute_squared_distance_simd(query, stored)))
            .collect();

        hits.sort_unstable_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Drops every vector at or past `len`. Used to unwind a batch whose
    /// persist failed; the public surface stays append-only.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimensions);
    }

    /// Serializes the store to `path` via a sibling temp file and an atomic
    /// rename, so a reader never observes a partially written image and a
    /// failed persist leaves the previous file untouched.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let tmp_path = sibling_tmp_path(path);
        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&MAGIC)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&(self.dimensions as u32).to_le_bytes())?;
            writer.write_all(&(self.len() as u64).to_le_bytes())?;
            for value in &self.data {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

pub(crate) fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with(vectors: &[Vec<Number>], dimensions: usize) -> VectorStore {
        let mut store = VectorStore::open(Path::new("/nonexistent/ragdex.idx"), dimensions).unwrap();
        store.append(vectors).unwrap();
        store
    }

    #[test]
    fn open_without_file_creates_empty_store() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(&dir.path().join("missing.idx"), 4).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dimensions(), 4);
    }

    #[test]
    fn append_rejects_wrong_dimension_without_mutating() {
        let mut store = store_with(&[vec![0.0, 0.0, 0.0]], 3);
        let err = store
            .append(&[vec![1.0, 2.0, 3.0], vec![1.0, 2.0]])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Dimension {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn search_rejects_zero_k_and_bad_query_width() {
        let store = store_with(&[vec![1.0, 0.0]], 2);
        assert!(matches!(store.search(&[1.0, 0.0], 0), Err(Error::Argument(_))));
        assert!(matches!(store.search(&[1.0], 1), Err(Error::Argument(_))));
    }

    #[test]
    fn search_returns_self_match_at_distance_zero() {
        let vectors = vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
        ];
        let store = store_with(&vectors, 4);
        for (i, vector) in vectors.iter().enumerate() {
            let hits = store.search(vector, 1).unwrap();
            assert_eq!(hits, vec![(i, 0.0)]);
        }
    }

    #[test]
    fn search_orders_ascending_and_caps_at_store_size() {
        let store = store_with(
            &[vec![0.0, 0.0], vec![3.0, 0.0], vec![1.0, 0.0]],
            2,
        );
        let hits = store.search(&[0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], (0, 0.0));
        assert_eq!(hits[1], (2, 1.0));
        assert_eq!(hits[2], (1, 9.0));
    }

    #[test]
    fn persist_and_reopen_preserves_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragdex.idx");

        let store = store_with(&[vec![0.5, -1.5, 2.0], vec![9.0, 8.0, 7.0]], 3);
        store.persist(&path).unwrap();
        assert!(!sibling_tmp_path(&path).exists());

        let reopened = VectorStore::open(&path, 3).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.vector(0).unwrap(), &[0.5, -1.5, 2.0]);
        assert_eq!(reopened.vector(1).unwrap(), &[9.0, 8.0, 7.0]);
    }

    #[test]
    fn open_rejects_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragdex.idx");
        store_with(&[vec![1.0, 2.0]], 2).persist(&path).unwrap();

        assert!(matches!(
            VectorStore::open(&path, 3),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn open_rejects_truncated_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragdex.idx");
        store_with(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2)
            .persist(&path)
            .unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        assert!(matches!(
            VectorStore::open(&path, 2),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn open_rejects_foreign_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragdex.idx");
        fs::write(&path, b"definitely not a vector store").unwrap();

        assert!(matches!(
            VectorStore::open(&path, 2),
            Err(Error::Format(_))
        ));
    }
}
