use thiserror::Error;

/// Result alias for all ragdex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the stores, the gateways, and the pipeline on top of
/// them. Store-level errors propagate unchanged; only the retriever rewraps
/// an embedding failure so callers can tell a broken query apart from a
/// broken index build.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller passed an unusable value (zero k, bad chunk geometry, query of
    /// the wrong width).
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A persisted store is corrupt, incompatible, or the vector and metadata
    /// files disagree about how many entries exist.
    #[error("store format error: {0}")]
    Format(String),

    /// A vector offered for append does not match the store dimension.
    #[error("vector dimension mismatch: store holds {expected}-dimensional vectors, got {actual}")]
    Dimension { expected: usize, actual: usize },

    /// Positional lookup past the end of the metadata store.
    #[error("position {position} out of bounds for store of length {len}")]
    Range { position: usize, len: usize },

    /// An external capability (embedding or answer synthesis) failed or
    /// returned something unusable.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Query-time embedding failure; retrieval cannot proceed.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
