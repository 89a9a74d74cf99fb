//! Results of lifecycle operations.

use fleet_infra::Workload;

/// Why a lifecycle operation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A workload for this tenant already exists.
    AlreadyDeployed,
    /// An image for this version was already built.
    BuildExists,
    /// No workload for this tenant exists.
    NotDeployed,
    /// No image for the requested version exists.
    NoMatchingBuild,
    /// The rollback target image is not known to the builder.
    UnknownImage,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::AlreadyDeployed => "already deployed",
            Self::BuildExists => "a build for this version already exists",
            Self::NotDeployed => "not deployed",
            Self::NoMatchingBuild => "no build exists for this version",
            Self::UnknownImage => "target image does not exist",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The change went through; the workload now runs `image`.
    Applied { image: String },
    Skipped(SkipReason),
}

impl LifecycleOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            Self::Applied { image } => Some(image),
            Self::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentState {
    Absent,
    Active(Workload),
}

impl DeploymentState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Where a deployed kernel can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccess {
    /// Reachable from inside the cluster.
    pub cluster: String,
    /// Reachable through the node port.
    pub external: String,
}
