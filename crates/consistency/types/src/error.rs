use thiserror::Error;

/// Errors raised while parsing shared primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid digest length: {0} (expected 64 hex characters)")]
    InvalidDigestLength(usize),

    #[error("invalid hex character in digest")]
    InvalidHex,
}
