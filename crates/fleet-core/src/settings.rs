//! `fleet.toml`: orchestrator settings.
//!
//! Every field has a default, so an empty (or absent) file is valid. Timing
//! values are duration strings parsed with [`parse_duration`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dockerfile::KernelDockerfile;
use crate::duration::parse_duration;
use crate::error::{CoreError, CoreResult};

pub const DEFAULT_FILE_NAME: &str = "fleet.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    pub artifact: ArtifactSettings,
    pub ports: PortSettings,
    pub cluster: ClusterSettings,
    pub timing: TimingSettings,
    pub readiness: ReadinessSettings,
    pub dockerfile: KernelDockerfile,
}

/// Where a deployment's version and package come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Version and package are given on every deploy/update.
    #[default]
    Supplied,
    /// A single fixed version and package from this file.
    Bundled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    pub name: String,
    pub source: SourceMode,
    pub bundled_version: Option<String>,
    pub bundled_package: Option<PathBuf>,
    /// Path appended to service addresses (e.g. `carbon` → `http://ip:port/carbon`).
    pub index_path: String,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            name: "carbon".to_string(),
            source: SourceMode::Supplied,
            bundled_version: None,
            bundled_package: None,
            index_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub lower: u16,
    pub upper: u16,
    pub counter_file: PathBuf,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            lower: 30000,
            upper: 32767,
            counter_file: PathBuf::from("NodePortAllocation.txt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub namespace: String,
    /// Port the service targets inside each pod.
    pub container_port: u16,
    /// Host used in external addresses. Defaults to the cluster endpoint host.
    pub external_host: Option<String>,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            container_port: 9443,
            external_host: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub readiness_interval: String,
    /// Unset means wait until the processes appear or the operator cancels.
    pub readiness_timeout: Option<String>,
    pub image_interval: String,
    pub image_timeout: String,
    pub recycle_interval: String,
    pub recycle_timeout: String,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            readiness_interval: "1s".to_string(),
            readiness_timeout: None,
            image_interval: "1s".to_string(),
            image_timeout: "2m".to_string(),
            recycle_interval: "1s".to_string(),
            recycle_timeout: "3m".to_string(),
        }
    }
}

impl TimingSettings {
    pub fn readiness_interval(&self) -> CoreResult<Duration> {
        duration_setting("timing.readiness_interval", &self.readiness_interval)
    }

    pub fn readiness_timeout(&self) -> CoreResult<Option<Duration>> {
        self.readiness_timeout
            .as_deref()
            .map(|s| duration_setting("timing.readiness_timeout", s))
            .transpose()
    }

    pub fn image_interval(&self) -> CoreResult<Duration> {
        duration_setting("timing.image_interval", &self.image_interval)
    }

    pub fn image_timeout(&self) -> CoreResult<Duration> {
        duration_setting("timing.image_timeout", &self.image_timeout)
    }

    pub fn recycle_interval(&self) -> CoreResult<Duration> {
        duration_setting("timing.recycle_interval", &self.recycle_interval)
    }

    pub fn recycle_timeout(&self) -> CoreResult<Duration> {
        duration_setting("timing.recycle_timeout", &self.recycle_timeout)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    /// Command signature → expected image. Unset uses the built-in table;
    /// an empty table disables the gate.
    pub required: Option<BTreeMap<String, String>>,
}

fn duration_setting(key: &str, value: &str) -> CoreResult<Duration> {
    parse_duration(value).ok_or_else(|| CoreError::Setting {
        key: key.to_string(),
        reason: format!("{value:?} is not a duration"),
    })
}

impl FleetSettings {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            CoreError::Setting { key, reason } => CoreError::Config {
                path: path.to_path_buf(),
                reason: format!("{key}: {reason}"),
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> CoreResult<Self> {
        let settings: FleetSettings = toml::from_str(content).map_err(|e| CoreError::Setting {
            key: "fleet.toml".to_string(),
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Setting {
            key: "fleet.toml".to_string(),
            reason: e.to_string(),
        })
    }

    fn validate(&self) -> CoreResult<()> {
        if self.ports.lower >= self.ports.upper {
            return Err(CoreError::Setting {
                key: "ports".to_string(),
                reason: format!(
                    "lower bound {} must be below upper bound {}",
                    self.ports.lower, self.ports.upper
                ),
            });
        }
        if self.artifact.name.is_empty() {
            return Err(CoreError::Setting {
                key: "artifact.name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.artifact.source == SourceMode::Bundled
            && (self.artifact.bundled_version.is_none() || self.artifact.bundled_package.is_none())
        {
            return Err(CoreError::Setting {
                key: "artifact".to_string(),
                reason: "bundled source needs bundled_version and bundled_package".to_string(),
            });
        }
        self.timing.readiness_interval()?;
        self.timing.readiness_timeout()?;
        self.timing.image_interval()?;
        self.timing.image_timeout()?;
        self.timing.recycle_interval()?;
        self.timing.recycle_timeout()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let settings = FleetSettings::from_toml("").unwrap();
        assert_eq!(settings.artifact.name, "carbon");
        assert_eq!(settings.artifact.source, SourceMode::Supplied);
        assert_eq!(settings.ports.lower, 30000);
        assert_eq!(settings.ports.upper, 32767);
        assert_eq!(settings.cluster.container_port, 9443);
        assert_eq!(settings.timing.readiness_timeout().unwrap(), None);
        assert_eq!(settings.timing.image_interval().unwrap(), Duration::from_secs(1));
        assert!(settings.readiness.required.is_none());
    }

    #[test]
    fn parses_partial_sections() {
        let settings = FleetSettings::from_toml(
            r#"
[artifact]
name = "kernel"
index_path = "carbon"

[ports]
lower = 31000
upper = 31010

[timing]
readiness_timeout = "30s"
image_timeout = "500ms"

[readiness.required]
"/usr/local/bin/etcd " = "quay.io/coreos/etcd:v3"
"#,
        )
        .unwrap();
        assert_eq!(settings.artifact.name, "kernel");
        assert_eq!(settings.artifact.index_path, "carbon");
        assert_eq!(settings.ports.lower, 31000);
        assert_eq!(settings.ports.counter_file, PathBuf::from("NodePortAllocation.txt"));
        assert_eq!(
            settings.timing.readiness_timeout().unwrap(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(settings.timing.image_timeout().unwrap(), Duration::from_millis(500));
        assert_eq!(settings.readiness.required.unwrap().len(), 1);
    }

    #[test]
    fn bundled_source_requires_version_and_package() {
        let err = FleetSettings::from_toml("[artifact]\nsource = \"bundled\"\n").unwrap_err();
        assert!(matches!(err, CoreError::Setting { .. }));

        let ok = FleetSettings::from_toml(
            "[artifact]\nsource = \"bundled\"\nbundled_version = \"5.0.0-SNAPSHOT\"\nbundled_package = \"/artifact/kernel.zip\"\n",
        )
        .unwrap();
        assert_eq!(ok.artifact.source, SourceMode::Bundled);
    }

    #[test]
    fn inverted_port_range_is_rejected() {
        let err = FleetSettings::from_toml("[ports]\nlower = 32000\nupper = 31000\n").unwrap_err();
        assert!(err.to_string().contains("lower bound"));
    }

    #[test]
    fn bad_duration_is_rejected() {
        let err = FleetSettings::from_toml("[timing]\nimage_interval = \"fast\"\n").unwrap_err();
        assert!(err.to_string().contains("timing.image_interval"));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = FleetSettings::default().to_toml_string().unwrap();
        let back = FleetSettings::from_toml(&text).unwrap();
        assert_eq!(back.ports.upper, 32767);
        assert_eq!(back.dockerfile, KernelDockerfile::default());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = FleetSettings::load_or_default(&dir.path().join("fleet.toml")).unwrap();
        assert_eq!(settings.cluster.namespace, "default");
    }
}
