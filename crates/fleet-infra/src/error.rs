//! Error types for infrastructure calls.

use std::path::PathBuf;

use fleet_state::StateError;
use thiserror::Error;

/// Result type alias for capability calls.
pub type InfraResult<T> = Result<T, InfraError>;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("invalid endpoint url {0:?}")]
    InvalidEndpoint(String),

    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{method} {path} timed out")]
    Timeout { method: String, path: String },

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("image build for {image} failed: {message}")]
    Build { image: String, message: String },

    #[error("failed to prepare build context from {path}: {source}")]
    Context {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("port allocation failed: {0}")]
    Port(#[from] StateError),

    #[error("{operation} failed: {message}")]
    Injected { operation: String, message: String },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}
