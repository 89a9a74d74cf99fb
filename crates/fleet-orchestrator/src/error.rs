//! Orchestrator error types.
//!
//! Unmet preconditions are not errors; they come back as
//! [`LifecycleOutcome::Skipped`](crate::LifecycleOutcome::Skipped) or `false`.

use std::time::Duration;

use fleet_core::CoreError;
use fleet_infra::InfraError;
use fleet_readiness::{PollError, ReadinessError};
use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{message}: {source}")]
    Infrastructure {
        message: String,
        #[source]
        source: InfraError,
    },

    #[error("cluster infrastructure not ready: {0}")]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Identity(#[from] CoreError),

    #[error("cannot resolve release: {0}")]
    Release(String),

    #[error("timed out after {waited:?} waiting for {what}")]
    Settle { what: String, waited: Duration },

    #[error("cancelled while waiting for {what}")]
    Cancelled { what: String },
}

/// Wrap an infrastructure failure with what the orchestrator was doing.
pub(crate) fn infra(message: impl Into<String>) -> impl FnOnce(InfraError) -> OrchestratorError {
    let message = message.into();
    move |source| OrchestratorError::Infrastructure { message, source }
}

/// Map a failed wait. Check failures keep their infrastructure cause.
pub(crate) fn settle(message: impl Into<String>) -> impl FnOnce(PollError<InfraError>) -> OrchestratorError {
    let message = message.into();
    move |err| match err {
        PollError::Check(source) => OrchestratorError::Infrastructure { message, source },
        PollError::TimedOut { what, waited } => OrchestratorError::Settle { what, waited },
        PollError::Cancelled { what } => OrchestratorError::Cancelled { what },
    }
}
