//! fleet-core — identifiers, build versions, and configuration shared by
//! every kernel fleet crate.
//!
//! Nothing in this crate talks to the network. It derives the names the
//! orchestrator uses for workloads, services, and images, orders build
//! versions for rollback, renders the kernel Dockerfile, and parses the two
//! configuration files (`client_configuration.txt` and `fleet.toml`).

pub mod config;
pub mod dockerfile;
pub mod duration;
pub mod error;
pub mod ident;
pub mod settings;
pub mod version;

pub use config::ClientConfig;
pub use dockerfile::KernelDockerfile;
pub use duration::parse_duration;
pub use error::{CoreError, CoreResult};
pub use ident::TenantArtifact;
pub use settings::FleetSettings;
pub use version::{BuildIdentifier, BuildVersion};
