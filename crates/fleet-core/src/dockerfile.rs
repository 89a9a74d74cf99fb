//! Dockerfile template for a kernel image.
//!
//! The kernel ships as a zip. The image unpacks it under `/opt` and runs the
//! launcher script from the unpacked directory.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ident::artifact_base_name;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelDockerfile {
    pub base_image: String,
    pub maintainer: String,
    /// Port the kernel listens on inside the container.
    pub exposed_port: u16,
    /// Launcher path relative to the unpacked kernel directory.
    pub launcher: String,
}

impl Default for KernelDockerfile {
    fn default() -> Self {
        Self {
            base_image: "java:openjdk-8".to_string(),
            maintainer: "dev@wso2.org".to_string(),
            exposed_port: 9443,
            launcher: "bin/wso2server.sh".to_string(),
        }
    }
}

impl KernelDockerfile {
    /// Render the Dockerfile for the given kernel package file name.
    pub fn render(&self, package_file: &str) -> CoreResult<String> {
        let unpacked = artifact_base_name(package_file)
            .ok_or_else(|| CoreError::ArtifactName(package_file.to_string()))?;
        let lines = [
            format!("FROM {}", self.base_image),
            format!("LABEL maintainer=\"{}\"", self.maintainer),
            format!("ADD {package_file} /opt/"),
            format!(
                "RUN  \\\n\tmkdir -p /opt && \\\n\tunzip /opt/{package_file} -d /opt && \\\n\trm /opt/{package_file}"
            ),
            format!("# kernel https port\nEXPOSE {}", self.exposed_port),
            "ENV JAVA_HOME=/usr".to_string(),
            format!(
                "ENTRYPOINT [\"/opt/{unpacked}/{}\"]",
                self.launcher.trim_start_matches('/')
            ),
        ];
        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out)
    }
}
