use flowsync_adapters::AdapterError;
use thiserror::Error;

/// Errors from CRDT state manager operations.
///
/// Conflict resolution has no error variant: every strategy falls back to
/// last-write-wins.
#[derive(Error, Debug)]
pub enum CrdtError {
    #[error("malformed operation: {0}")]
    MalformedOperation(String),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("repository error: {0}")]
    Repository(String),
}

impl From<serde_json::Error> for CrdtError {
    fn from(e: serde_json::Error) -> Self {
        CrdtError::Serialization(e.to_string())
    }
}
