//! Docker Engine adapter: container listing and image builds.

use std::io::Read;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::Deserialize;
use tracing::{debug, info};

use crate::capability::{ContainerRuntime, ImageBuilder, InfraFuture, tag_matches};
use crate::error::{InfraError, InfraResult};
use crate::http::{HttpClient, decode, ensure_success};
use crate::types::{BuildContext, ContainerInfo, ImageRecord};

const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DockerContainer {
    id: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    command: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DockerImage {
    id: String,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
}

/// One line of the `/build` progress stream.
#[derive(Debug, Deserialize)]
struct BuildMessage {
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Docker Engine REST API client.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    client: HttpClient,
    build_timeout: Duration,
}

impl DockerEngine {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    async fn containers(&self) -> InfraResult<Vec<ContainerInfo>> {
        let listed: Vec<DockerContainer> = self
            .client
            .get_json("/containers/json")
            .await?
            .unwrap_or_default();
        Ok(listed
            .into_iter()
            .map(|c| ContainerInfo {
                id: c.id,
                image: c.image,
                command: c.command,
            })
            .collect())
    }

    async fn images(&self, pattern: &str) -> InfraResult<Vec<ImageRecord>> {
        let listed: Vec<DockerImage> = self
            .client
            .get_json("/images/json")
            .await?
            .unwrap_or_default();
        let records: Vec<ImageRecord> = listed
            .into_iter()
            .map(|i| ImageRecord {
                id: i.id,
                repo_tags: i.repo_tags.unwrap_or_default(),
            })
            .filter(|r| r.repo_tags.iter().any(|t| tag_matches(t, pattern)))
            .collect();
        debug!(%pattern, matched = records.len(), "images listed");
        Ok(records)
    }

    async fn build_image(&self, context: &BuildContext, image: &str) -> InfraResult<String> {
        let archive = {
            let context = context.clone();
            tokio::task::spawn_blocking(move || build_context_archive(&context))
                .await
                .map_err(|e| InfraError::Unavailable(e.to_string()))??
        };
        info!(%image, bytes = archive.len(), "building image");

        let path = format!("/build?t={image}&rm=1");
        let resp = self
            .client
            .clone()
            .with_timeout(self.build_timeout)
            .request(
                Method::POST,
                &path,
                Some("application/x-tar"),
                Bytes::from(archive),
            )
            .await?;
        let resp = ensure_success(Method::POST, "/build", resp)?;
        if let Some(message) = build_failure(&resp.body) {
            return Err(InfraError::Build {
                image: image.to_string(),
                message,
            });
        }
        info!(%image, "image built");
        Ok(image.to_string())
    }

    async fn remove_image(&self, image: &str) -> InfraResult<String> {
        let path = format!("/images/{image}");
        let resp = self
            .client
            .request(Method::DELETE, &path, None, Bytes::new())
            .await?;
        if resp.status == http::StatusCode::NOT_FOUND {
            return Err(InfraError::NotFound {
                kind: "image",
                name: image.to_string(),
            });
        }
        let resp = ensure_success(Method::DELETE, &path, resp)?;
        let _: serde_json::Value = decode(&path, &resp.body)?;
        info!(%image, "image removed");
        Ok(image.to_string())
    }
}

impl ContainerRuntime for DockerEngine {
    fn list_containers(&self) -> InfraFuture<'_, Vec<ContainerInfo>> {
        Box::pin(self.containers())
    }
}

impl ImageBuilder for DockerEngine {
    fn build<'a>(&'a self, context: &'a BuildContext, image: &'a str) -> InfraFuture<'a, String> {
        Box::pin(self.build_image(context, image))
    }

    fn list_images<'a>(&'a self, pattern: &'a str) -> InfraFuture<'a, Vec<ImageRecord>> {
        Box::pin(self.images(pattern))
    }

    fn remove<'a>(&'a self, image: &'a str) -> InfraFuture<'a, String> {
        Box::pin(self.remove_image(image))
    }
}

/// Tar the rendered Dockerfile together with the kernel package.
pub fn build_context_archive(context: &BuildContext) -> InfraResult<Vec<u8>> {
    let context_err = |source: std::io::Error| InfraError::Context {
        path: context.package.clone(),
        source,
    };
    let package_name = context.package_file_name().ok_or_else(|| {
        context_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "package path has no file name",
        ))
    })?;

    let mut package = Vec::new();
    std::fs::File::open(&context.package)
        .and_then(|mut f| f.read_to_end(&mut package))
        .map_err(context_err)?;

    let mut builder = tar::Builder::new(Vec::new());
    append_file(&mut builder, "Dockerfile", context.dockerfile.as_bytes()).map_err(context_err)?;
    append_file(&mut builder, package_name, &package).map_err(context_err)?;
    builder.into_inner().map_err(context_err)
}

fn append_file(builder: &mut tar::Builder<Vec<u8>>, name: &str, data: &[u8]) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data)
}

/// The first error reported in a `/build` progress stream.
fn build_failure(body: &[u8]) -> Option<String> {
    let stream = serde_json::Deserializer::from_slice(body).into_iter::<BuildMessage>();
    for message in stream {
        let Ok(message) = message else {
            debug!("unparsable build progress, ignoring remainder");
            return None;
        };
        if let Some(error) = message.error {
            return Some(error.trim().to_string());
        }
        if let Some(line) = message.stream {
            let line = line.trim();
            if !line.is_empty() {
                debug!(%line, "build");
            }
        }
    }
    None
}
