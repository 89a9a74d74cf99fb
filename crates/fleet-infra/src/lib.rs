//! fleet-infra — the narrow interface the orchestrator drives.
//!
//! The orchestrator never talks to a container engine or cluster API
//! directly. It goes through four capability traits:
//!
//! - [`ContainerRuntime`]: which containers are running (readiness gate)
//! - [`ImageBuilder`]: build, list, and remove images
//! - [`WorkloadController`]: replicated workloads and their pods
//! - [`ServiceController`]: externally reachable services
//!
//! [`DockerEngine`] and [`KubeApi`] speak the Docker Engine and Kubernetes
//! core/v1 REST APIs over a small hyper HTTP/1 client. [`InMemoryCluster`]
//! implements every capability in-process for tests.

pub mod capability;
pub mod docker;
pub mod error;
pub mod http;
pub mod kube;
pub mod memory;
pub mod types;

pub use capability::{
    ContainerRuntime, ImageBuilder, InfraFuture, ServiceController, WorkloadController,
    matching_tags, tag_matches,
};
pub use docker::DockerEngine;
pub use error::{InfraError, InfraResult};
pub use http::{Endpoint, HttpClient};
pub use kube::KubeApi;
pub use memory::{InMemoryCluster, Operation};
pub use types::{BuildContext, ContainerInfo, ImageRecord, PodInfo, ServiceInfo, Workload};
