//! fleet-readiness — waiting for things to become true.
//!
//! [`ReadinessGate`] blocks until the cluster's own infrastructure
//! processes are running. [`poll_until`] is the general form used by the
//! orchestrator to wait for builds to appear and pods to restart. Both obey
//! a [`PollPolicy`] and stop early when the shutdown signal flips.

pub mod error;
pub mod gate;
pub mod poll;
pub mod signatures;

pub use error::{PollError, ReadinessError, ReadinessResult};
pub use gate::ReadinessGate;
pub use poll::{PollPolicy, poll_until};
pub use signatures::default_required_processes;
