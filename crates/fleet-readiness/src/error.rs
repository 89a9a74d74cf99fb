//! Error types for readiness and polling.

use std::time::Duration;

use fleet_infra::InfraError;
use thiserror::Error;

pub type ReadinessResult<T> = Result<T, ReadinessError>;

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("infrastructure processes still missing after {waited:?}: {}", missing.join(", "))]
    TimedOut {
        missing: Vec<String>,
        waited: Duration,
    },

    #[error("readiness wait cancelled")]
    Cancelled,

    #[error("failed to list running containers: {0}")]
    Runtime(#[from] InfraError),
}

/// Failure of a [`poll_until`](crate::poll_until) wait.
#[derive(Debug, Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    #[error("timed out after {waited:?} waiting for {what}")]
    TimedOut { what: String, waited: Duration },

    #[error("wait for {what} cancelled")]
    Cancelled { what: String },

    #[error("check failed while waiting: {0}")]
    Check(#[source] E),
}
