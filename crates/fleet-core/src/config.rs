//! `client_configuration.txt`: endpoint URLs for the image builder and the
//! cluster API.
//!
//! Plain `key=value` lines. Blank lines and lines starting with `#` are
//! ignored; whitespace around keys and values is trimmed. When the file does
//! not exist, [`ClientConfig::load_or_init`] writes the defaults so the
//! operator has something to edit.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_FILE_NAME: &str = "client_configuration.txt";

pub const BUILDER_URL_KEY: &str = "docker-url";
pub const CLUSTER_URL_KEY: &str = "kubernetes-url";

const DEFAULT_BUILDER_URL: &str = "unix:///var/run/docker.sock";
const DEFAULT_CLUSTER_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub builder_url: String,
    pub cluster_url: String,
    /// Keys the orchestrator does not interpret, kept for round-tripping.
    pub extra: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            builder_url: DEFAULT_BUILDER_URL.to_string(),
            cluster_url: DEFAULT_CLUSTER_URL.to_string(),
            extra: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Read the configuration, writing the defaults first if the file is
    /// missing.
    pub fn load_or_init(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            let config = Self::default();
            config.write(path)?;
            info!(path = %path.display(), "wrote default client configuration");
            return Ok(config);
        }
        Self::from_file(path)
    }

    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let pairs = parse_key_values(&content);
        debug!(path = %path.display(), keys = pairs.len(), "client configuration read");
        Self::from_pairs(pairs).map_err(|reason| CoreError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn from_pairs(mut pairs: BTreeMap<String, String>) -> Result<Self, String> {
        let builder_url = pairs
            .remove(BUILDER_URL_KEY)
            .ok_or_else(|| format!("missing `{BUILDER_URL_KEY}`"))?;
        let cluster_url = pairs
            .remove(CLUSTER_URL_KEY)
            .ok_or_else(|| format!("missing `{CLUSTER_URL_KEY}`"))?;
        Ok(Self {
            builder_url,
            cluster_url,
            extra: pairs,
        })
    }

    pub fn to_key_values(&self) -> String {
        let mut out = format!(
            "{BUILDER_URL_KEY}={}\n{CLUSTER_URL_KEY}={}\n",
            self.builder_url, self.cluster_url
        );
        for (key, value) in &self.extra {
            out.push_str(&format!("{key}={value}\n"));
        }
        out
    }

    pub fn write(&self, path: &Path) -> CoreResult<()> {
        std::fs::write(path, self.to_key_values()).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Parse `key=value` lines. Later duplicates win.
pub fn parse_key_values(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}
