//! Artifact profiles: where a deployment's version and package come from.
//!
//! A supplied profile takes both from the caller on every deploy or update.
//! A bundled profile pins one version and one package in configuration.
//! Either way the lifecycle is the same; only [`ArtifactProfile::release`]
//! differs.

use std::path::{Path, PathBuf};

use fleet_core::KernelDockerfile;
use fleet_core::settings::{ArtifactSettings, SourceMode};
use tracing::warn;

use crate::error::{OrchestratorError, OrchestratorResult};

/// The version label and package used for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: String,
    pub package: PathBuf,
}

impl Release {
    pub fn new(version: impl Into<String>, package: impl Into<PathBuf>) -> Self {
        Self {
            version: version.into(),
            package: package.into(),
        }
    }

    /// File name of the package, as added to the image.
    pub fn package_file_name(&self) -> OrchestratorResult<&str> {
        self.package
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                OrchestratorError::Release(format!(
                    "package path {} has no usable file name",
                    self.package.display()
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseSource {
    Supplied,
    Bundled { version: String, package: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactProfile {
    /// Artifact name used when the caller does not give one.
    pub name: String,
    pub source: ReleaseSource,
    /// Path appended to service addresses.
    pub index_path: String,
    pub dockerfile: KernelDockerfile,
}

impl ArtifactProfile {
    pub fn supplied(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: ReleaseSource::Supplied,
            index_path: String::new(),
            dockerfile: KernelDockerfile::default(),
        }
    }

    pub fn bundled(name: &str, version: &str, package: impl Into<PathBuf>) -> Self {
        Self {
            source: ReleaseSource::Bundled {
                version: version.to_string(),
                package: package.into(),
            },
            ..Self::supplied(name)
        }
    }

    pub fn with_index_path(mut self, index_path: &str) -> Self {
        self.index_path = index_path.trim_matches('/').to_string();
        self
    }

    pub fn with_dockerfile(mut self, dockerfile: KernelDockerfile) -> Self {
        self.dockerfile = dockerfile;
        self
    }

    pub fn from_settings(
        artifact: &ArtifactSettings,
        dockerfile: KernelDockerfile,
    ) -> OrchestratorResult<Self> {
        let profile = match artifact.source {
            SourceMode::Supplied => Self::supplied(&artifact.name),
            SourceMode::Bundled => {
                let (Some(version), Some(package)) =
                    (&artifact.bundled_version, &artifact.bundled_package)
                else {
                    return Err(OrchestratorError::Release(
                        "bundled profile needs bundled_version and bundled_package".to_string(),
                    ));
                };
                Self::bundled(&artifact.name, version, package.clone())
            }
        };
        Ok(profile
            .with_index_path(&artifact.index_path)
            .with_dockerfile(dockerfile))
    }

    /// Resolve the release for one operation.
    ///
    /// Supplied profiles need both arguments. Bundled profiles always use
    /// their pinned release and ignore the arguments.
    pub fn release(
        &self,
        version: Option<&str>,
        package: Option<&Path>,
    ) -> OrchestratorResult<Release> {
        match &self.source {
            ReleaseSource::Supplied => match (version, package) {
                (Some(version), Some(package)) if !version.is_empty() => {
                    Ok(Release::new(version, package))
                }
                _ => Err(OrchestratorError::Release(format!(
                    "profile {} needs a version and a package",
                    self.name
                ))),
            },
            ReleaseSource::Bundled {
                version: pinned,
                package: pinned_package,
            } => {
                if version.is_some_and(|v| v != pinned) || package.is_some() {
                    warn!(
                        profile = %self.name,
                        %pinned,
                        "bundled profile ignores the requested version and package"
                    );
                }
                Ok(Release::new(pinned.clone(), pinned_package.clone()))
            }
        }
    }

    /// Append the index path to a service address.
    pub fn index_url(&self, address: &str) -> String {
        if self.index_path.is_empty() {
            address.to_string()
        } else {
            format!("{}/{}", address.trim_end_matches('/'), self.index_path)
        }
    }
}
