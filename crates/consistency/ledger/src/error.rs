use flowsync_adapters::AdapterError;
use flowsync_types::ExecutionId;
use thiserror::Error;

/// Errors from execution ledger operations.
///
/// Integrity and signature problems are never raised here; they are
/// reported inside [`crate::LedgerValidation`].
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger not initialized; call initialize() first")]
    NotInitialized,

    #[error("replay in progress for execution {0}")]
    ReplayInProgress(ExecutionId),

    #[error("replay error: {0}")]
    Replay(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("repository error: {0}")]
    Repository(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
