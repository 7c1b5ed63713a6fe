use std::path::PathBuf;

use flowsync_adapters::AdapterError;
use flowsync_crdt::CrdtError;
use flowsync_ledger::LedgerError;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised while assembling a [`crate::ConsistencyCore`].
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Crdt(#[from] CrdtError),
}

pub type CoreResult<T> = Result<T, CoreError>;
