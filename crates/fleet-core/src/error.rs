//! Error types for fleet-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for fleet-core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("tenant and artifact name must both be non-empty (tenant={tenant:?}, artifact={artifact:?})")]
    EmptyIdentity { tenant: String, artifact: String },

    #[error("build version label must not be empty")]
    EmptyVersion,

    #[error("malformed build identifier {identifier:?}: {reason}")]
    MalformedBuild { identifier: String, reason: String },

    #[error("artifact file name {0:?} is too short to carry an extension")]
    ArtifactName(String),

    #[error("configuration file {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("invalid setting {key}: {reason}")]
    Setting { key: String, reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
