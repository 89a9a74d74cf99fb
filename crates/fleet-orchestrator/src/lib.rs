//! fleet-orchestrator — the kernel deployment lifecycle.
//!
//! One tenant runs one artifact as a replicated workload behind a service.
//! [`Orchestrator`] builds images, creates and updates workloads, recycles
//! pods, and tears everything down again. It keeps no state of its own:
//! every operation asks the cluster what is deployed before acting.

pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod profile;

pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{Backends, Orchestrator, Timing};
pub use outcome::{DeploymentState, LifecycleOutcome, ServiceAccess, SkipReason};
pub use profile::{ArtifactProfile, Release, ReleaseSource};
