//! Identifier scheme: workload, service, and image names.
//!
//! Every downstream name is derived verbatim from the tenant and artifact
//! strings. No normalisation happens here; callers are responsible for
//! passing strings the cluster and registry accept.

use crate::error::{CoreError, CoreResult};

/// Tag used when an image is addressed without a version.
pub const LATEST_TAG: &str = "latest";

/// Label key carried by every workload pod and service selector.
pub const SELECTOR_LABEL: &str = "name";

/// `artifact-tenant`, or `None` if either part is empty.
pub fn component_name(tenant: &str, artifact: &str) -> Option<String> {
    if tenant.is_empty() || artifact.is_empty() {
        return None;
    }
    Some(format!("{artifact}-{tenant}"))
}

/// `creator/artifact:version`, tagged `latest` when the version is absent or
/// empty. `None` if the creator or artifact is empty.
pub fn image_identifier(creator: &str, artifact: &str, version: Option<&str>) -> Option<String> {
    if creator.is_empty() || artifact.is_empty() {
        return None;
    }
    let tag = match version {
        Some(v) if !v.is_empty() => v,
        _ => LATEST_TAG,
    };
    Some(format!("{creator}/{artifact}:{tag}"))
}

/// Strip the four-character extension (`.zip`, `.jar`) from an artifact
/// file name.
///
/// Returns `None` when nothing would remain.
pub fn artifact_base_name(file_name: &str) -> Option<&str> {
    let count = file_name.chars().count();
    if count <= 4 {
        return None;
    }
    let cut = file_name
        .char_indices()
        .nth(count - 4)
        .map(|(idx, _)| idx)?;
    Some(&file_name[..cut])
}

/// The tag part of an image reference (everything after the last `:`).
pub fn image_version(image: &str) -> Option<&str> {
    let (repo, tag) = image.rsplit_once(':')?;
    // A colon inside a registry host (`host:5000/repo`) is not a tag.
    if tag.contains('/') || repo.is_empty() {
        return None;
    }
    Some(tag)
}

/// A tenant's deployment identity: one tenant running one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantArtifact {
    tenant: String,
    artifact: String,
}

impl TenantArtifact {
    pub fn new(tenant: &str, artifact: &str) -> CoreResult<Self> {
        if tenant.is_empty() || artifact.is_empty() {
            return Err(CoreError::EmptyIdentity {
                tenant: tenant.to_string(),
                artifact: artifact.to_string(),
            });
        }
        Ok(Self {
            tenant: tenant.to_string(),
            artifact: artifact.to_string(),
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Name shared by the workload, its pod label, and the service.
    pub fn component_name(&self) -> String {
        format!("{}-{}", self.artifact, self.tenant)
    }

    /// `tenant/artifact`, the repository all of this tenant's builds live in.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.tenant, self.artifact)
    }

    /// Image identifier for a version (or `latest`).
    pub fn image_identifier(&self, version: Option<&str>) -> String {
        match version {
            Some(v) if !v.is_empty() => format!("{}:{v}", self.repository()),
            _ => format!("{}:{LATEST_TAG}", self.repository()),
        }
    }
}

impl std::fmt::Display for TenantArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.component_name())
    }
}
