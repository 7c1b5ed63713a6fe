use flowsync_types::ContentId;
use thiserror::Error;

/// Errors surfaced by store and signer adapters.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("content not found: {0}")]
    NotFound(ContentId),

    #[error("content {id} failed integrity check (computed {computed})")]
    Integrity { id: ContentId, computed: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for AdapterError {
    fn from(e: serde_json::Error) -> Self {
        AdapterError::Serialization(e.to_string())
    }
}
