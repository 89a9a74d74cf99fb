//! Error types for fleet-state.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid port range {lower}..={upper}: lower bound must be below upper bound")]
    InvalidRange { lower: u16, upper: u16 },

    #[error("failed to read port counter {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist port counter {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("port counter store unavailable: {0}")]
    Unavailable(String),
}
