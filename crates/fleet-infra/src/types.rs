//! Records exchanged with the capability traits.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// An image known to the builder, with every tag it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub repo_tags: Vec<String>,
}

/// A running container, as reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub image: String,
    pub command: String,
}

/// A replicated workload (replication controller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub name: String,
    pub image: String,
    pub replicas: u32,
    pub selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub image: String,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub cluster_ip: Option<String>,
    pub port: u16,
    pub node_port: Option<u16>,
    pub selector: BTreeMap<String, String>,
}

/// What the builder needs: the rendered Dockerfile and the kernel package
/// it adds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub package: PathBuf,
    pub dockerfile: String,
}

impl BuildContext {
    /// File name the package is stored under inside the build context.
    pub fn package_file_name(&self) -> Option<&str> {
        self.package.file_name().and_then(|n| n.to_str())
    }
}
