//! Load errors.
//!
//! Every stage returns `Result<T, LoadError>`. Columnar-level failures are
//! folded into [`LoadError::Io`] or [`LoadError::Type`] with the original
//! message kept for diagnostics.

use arrow::error::ArrowError;
use pgraph_comm::CommError;
use pgraph_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// File open/read/parse failure, or no worker holding rows for a label.
    #[error("IO error: {0}")]
    Io(String),

    /// A local table cannot be promoted to the canonical schema.
    #[error("type error: {0}")]
    Type(String),

    /// An external id was never registered in the vertex map.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// Malformed configuration or table layout.
    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("communication error: {0}")]
    Comm(#[from] CommError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Another worker failed; this worker stops at the same barrier.
    #[error("load aborted by worker {worker}: {message}")]
    Aborted { worker: usize, message: String },
}

pub type Result<T> = std::result::Result<T, LoadError>;

impl From<ArrowError> for LoadError {
    fn from(e: ArrowError) -> Self {
        match e {
            ArrowError::CastError(_) | ArrowError::SchemaError(_) => LoadError::Type(e.to_string()),
            _ => LoadError::Io(e.to_string()),
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e.to_string())
    }
}

impl From<bincode::Error> for LoadError {
    fn from(e: bincode::Error) -> Self {
        LoadError::Comm(CommError::from(e))
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(e: serde_json::Error) -> Self {
        LoadError::Invalid(format!("config: {e}"))
    }
}
