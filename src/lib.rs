//! Incremental vector indexing and retrieval for question answering over
//! local documents.
//!
//! Documents are split into overlapping character chunks, embedded through an
//! HTTP capability, and stored in a paired vector file + metadata record list
//! that only ever change together. Queries run exact nearest-neighbor search
//! over the vector store and narrow the candidates with a lexical filter
//! before any answer is synthesized.

pub mod chat;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod metadata_store;
pub mod retriever;
pub mod segmenter;
pub mod vector_ops;
pub mod vector_store;

pub use error::{Error, Result};
