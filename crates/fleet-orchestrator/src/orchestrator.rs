//! The deployment state machine.
//!
//! Per tenant the states are `Absent` (no workload) and `Active` (workload
//! plus service). The workload controller is the only source of truth for
//! which state a tenant is in; nothing is cached between operations.
//!
//! | operation     | requires                          | does                                   |
//! |---------------|-----------------------------------|----------------------------------------|
//! | `deploy`      | Absent, no build for the version  | build, create workload, create service |
//! | `roll_update` | Active, a build for the version   | rebuild, swap image, recycle pods      |
//! | `rollback`    | a build for the version, Active   | swap to an older image, recycle pods   |
//! | `scale`       | Active                            | set replicas                           |
//! | `remove`      | Active                            | scale to 0, delete workload and service|

use std::sync::Arc;

use chrono::NaiveDateTime;
use fleet_core::{BuildIdentifier, BuildVersion, TenantArtifact, version};
use fleet_infra::{
    BuildContext, ContainerRuntime, ImageBuilder, InfraError, ServiceController,
    WorkloadController, Workload, matching_tags, tag_matches,
};
use fleet_readiness::{PollPolicy, ReadinessGate, poll_until};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorResult, infra, settle};
use crate::outcome::{DeploymentState, LifecycleOutcome, ServiceAccess, SkipReason};
use crate::profile::{ArtifactProfile, Release};

/// The infrastructure the orchestrator drives.
#[derive(Clone)]
pub struct Backends {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub images: Arc<dyn ImageBuilder>,
    pub workloads: Arc<dyn WorkloadController>,
    pub services: Arc<dyn ServiceController>,
}

impl Backends {
    /// Use one object for every capability.
    pub fn single<C>(cluster: Arc<C>) -> Self
    where
        C: ContainerRuntime + ImageBuilder + WorkloadController + ServiceController + 'static,
    {
        Self {
            runtime: cluster.clone(),
            images: cluster.clone(),
            workloads: cluster.clone(),
            services: cluster,
        }
    }
}

/// How long to wait for effects the infrastructure applies asynchronously.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timing {
    /// A fresh build showing up in image listings.
    pub image: PollPolicy,
    /// Recycled pods coming back on the new image.
    pub recycle: PollPolicy,
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub struct Orchestrator {
    backends: Backends,
    profile: ArtifactProfile,
    timing: Timing,
    shutdown: watch::Receiver<bool>,
    clock: fn() -> NaiveDateTime,
}

impl Orchestrator {
    /// Wait for the readiness gate, then hand out an orchestrator.
    pub async fn connect(
        backends: Backends,
        gate: &ReadinessGate,
        profile: ArtifactProfile,
        timing: Timing,
        shutdown: watch::Receiver<bool>,
    ) -> OrchestratorResult<Self> {
        gate.wait(backends.runtime.as_ref(), shutdown.clone())
            .await?;
        info!(profile = %profile.name, "orchestrator ready");
        Ok(Self {
            backends,
            profile,
            timing,
            shutdown,
            clock: local_now,
        })
    }

    /// Replace the clock used to stamp build versions.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn profile(&self) -> &ArtifactProfile {
        &self.profile
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Build the release and bring the tenant from `Absent` to `Active`.
    pub async fn deploy(
        &self,
        tenant: &str,
        artifact: &str,
        release: &Release,
        replicas: u32,
    ) -> OrchestratorResult<LifecycleOutcome> {
        let target = TenantArtifact::new(tenant, artifact)?;
        let component = target.component_name();

        if self.current_workload(&component).await?.is_some() {
            warn!(%component, "deploy skipped: already deployed");
            return Ok(LifecycleOutcome::Skipped(SkipReason::AlreadyDeployed));
        }
        let version_builds = self.builds_matching(&target.image_identifier(Some(&release.version))).await?;
        if !version_builds.is_empty() {
            warn!(%component, version = %release.version, "deploy skipped: build already exists");
            return Ok(LifecycleOutcome::Skipped(SkipReason::BuildExists));
        }

        let image = self.build_release(&target, release).await?;
        self.backends
            .workloads
            .create(&component, &component, &image, replicas)
            .await
            .map_err(infra(format!("failed to create workload {component}")))?;
        let service = self
            .backends
            .services
            .create(&component, &component)
            .await
            .map_err(infra(format!("failed to create service {component}")))?;

        info!(
            %component,
            %image,
            replicas,
            node_port = ?service.node_port,
            "deployed"
        );
        Ok(LifecycleOutcome::Applied { image })
    }

    /// Rebuild the release and roll the running workload onto it.
    pub async fn roll_update(
        &self,
        tenant: &str,
        artifact: &str,
        release: &Release,
    ) -> OrchestratorResult<LifecycleOutcome> {
        let target = TenantArtifact::new(tenant, artifact)?;
        let component = target.component_name();

        let Some(workload) = self.current_workload(&component).await? else {
            warn!(%component, "rolling update skipped: not deployed");
            return Ok(LifecycleOutcome::Skipped(SkipReason::NotDeployed));
        };
        let version_builds = self.builds_matching(&target.image_identifier(Some(&release.version))).await?;
        if version_builds.is_empty() {
            warn!(%component, version = %release.version, "rolling update skipped: no build for version");
            return Ok(LifecycleOutcome::Skipped(SkipReason::NoMatchingBuild));
        }

        let image = self.build_release(&target, release).await?;
        self.swap_image(&workload, &image).await?;
        info!(%component, %image, replicas = workload.replicas, "rolling update complete");
        Ok(LifecycleOutcome::Applied { image })
    }

    /// Point the workload back at `older_image`.
    ///
    /// `older_image` normally comes from [`rollback_candidates`](Self::rollback_candidates).
    pub async fn rollback(
        &self,
        tenant: &str,
        artifact: &str,
        version: &str,
        older_image: &str,
    ) -> OrchestratorResult<LifecycleOutcome> {
        let target = TenantArtifact::new(tenant, artifact)?;
        let component = target.component_name();

        let version_builds = self.builds_matching(&target.image_identifier(Some(version))).await?;
        if version_builds.is_empty() {
            warn!(%component, %version, "rollback skipped: no build for version");
            return Ok(LifecycleOutcome::Skipped(SkipReason::NoMatchingBuild));
        }
        let Some(workload) = self.current_workload(&component).await? else {
            warn!(%component, "rollback skipped: not deployed");
            return Ok(LifecycleOutcome::Skipped(SkipReason::NotDeployed));
        };
        // Only this tenant's own builds are rollback targets.
        let own_build = tag_matches(older_image, &format!("{}:", target.repository()));
        let known = own_build
            && self
                .builds_matching(older_image)
                .await?
                .iter()
                .any(|tag| tag == older_image);
        if !known {
            warn!(%component, image = %older_image, "rollback skipped: target image unknown");
            return Ok(LifecycleOutcome::Skipped(SkipReason::UnknownImage));
        }

        self.swap_image(&workload, older_image).await?;
        info!(%component, image = %older_image, from = %workload.image, "rolled back");
        Ok(LifecycleOutcome::Applied {
            image: older_image.to_string(),
        })
    }

    /// Set the replica count. `false` if the tenant is not deployed.
    pub async fn scale(&self, tenant: &str, artifact: &str, replicas: u32) -> OrchestratorResult<bool> {
        let component = TenantArtifact::new(tenant, artifact)?.component_name();
        let Some(workload) = self.current_workload(&component).await? else {
            warn!(%component, "scale skipped: not deployed");
            return Ok(false);
        };
        self.backends
            .workloads
            .update_replicas(&component, replicas)
            .await
            .map_err(infra(format!("failed to scale workload {component}")))?;
        info!(%component, from = workload.replicas, to = replicas, "scaled");
        Ok(true)
    }

    /// Tear the deployment down. `false` if the tenant is not deployed.
    pub async fn remove(&self, tenant: &str, artifact: &str) -> OrchestratorResult<bool> {
        let component = TenantArtifact::new(tenant, artifact)?.component_name();
        if self.current_workload(&component).await?.is_none() {
            warn!(%component, "remove skipped: not deployed");
            return Ok(false);
        }

        self.backends
            .workloads
            .update_replicas(&component, 0)
            .await
            .map_err(infra(format!("failed to scale down workload {component}")))?;
        self.backends
            .workloads
            .delete(&component)
            .await
            .map_err(infra(format!("failed to delete workload {component}")))?;
        let service = self
            .backends
            .services
            .delete(&component)
            .await
            .map_err(infra(format!("failed to delete service {component}")))?;
        if service.is_none() {
            debug!(%component, "no service to delete");
        }
        info!(%component, "removed");
        Ok(true)
    }

    // ── Queries ────────────────────────────────────────────────────

    pub async fn status(&self, tenant: &str, artifact: &str) -> OrchestratorResult<DeploymentState> {
        let component = TenantArtifact::new(tenant, artifact)?.component_name();
        Ok(match self.current_workload(&component).await? {
            Some(workload) => DeploymentState::Active(workload),
            None => DeploymentState::Absent,
        })
    }

    /// Desired replica count, 0 when not deployed.
    pub async fn replicas(&self, tenant: &str, artifact: &str) -> OrchestratorResult<u32> {
        let component = TenantArtifact::new(tenant, artifact)?.component_name();
        Ok(self
            .current_workload(&component)
            .await?
            .map(|w| w.replicas)
            .unwrap_or(0))
    }

    /// Cluster-internal and external addresses of the tenant's service.
    pub async fn access(&self, tenant: &str, artifact: &str) -> OrchestratorResult<Option<ServiceAccess>> {
        let component = TenantArtifact::new(tenant, artifact)?.component_name();
        let services = &self.backends.services;
        let cluster = services
            .cluster_address(&component)
            .await
            .map_err(infra(format!("failed to read service {component}")))?;
        let external = services
            .external_address(&component)
            .await
            .map_err(infra(format!("failed to read service {component}")))?;
        Ok(match (cluster, external) {
            (Some(cluster), Some(external)) => Some(ServiceAccess {
                cluster: self.profile.index_url(&cluster),
                external: self.profile.index_url(&external),
            }),
            _ => None,
        })
    }

    /// Every build tag for the tenant, narrowed to `version` when given.
    pub async fn list_builds(
        &self,
        tenant: &str,
        artifact: &str,
        version: Option<&str>,
    ) -> OrchestratorResult<Vec<String>> {
        let target = TenantArtifact::new(tenant, artifact)?;
        let pattern = match version {
            Some(v) if !v.is_empty() => target.image_identifier(Some(v)),
            _ => format!("{}:", target.repository()),
        };
        self.builds_matching(&pattern).await
    }

    /// Builds strictly older than the deployed image, in listing order.
    /// Empty when the tenant is not deployed.
    pub async fn rollback_candidates(
        &self,
        tenant: &str,
        artifact: &str,
        version: Option<&str>,
    ) -> OrchestratorResult<Vec<String>> {
        let target = TenantArtifact::new(tenant, artifact)?;
        let component = target.component_name();
        let Some(workload) = self.current_workload(&component).await? else {
            return Ok(Vec::new());
        };
        let current: BuildIdentifier = match workload.image.parse() {
            Ok(id) => id,
            Err(e) => {
                warn!(%component, image = %workload.image, error = %e, "deployed image carries no build stamp");
                return Ok(Vec::new());
            }
        };
        let builds = self.list_builds(tenant, artifact, version).await?;
        Ok(version::older_than(&current, builds.iter().map(String::as_str)))
    }

    /// Delete a build. Refuses (returns `false`) to delete the image a
    /// workload is running, and returns `false` for unknown images.
    pub async fn remove_build(&self, image: &str) -> OrchestratorResult<bool> {
        if let Some(component) = component_of_image(image) {
            if let Some(workload) = self.current_workload(&component).await? {
                if workload.image == image {
                    warn!(%component, %image, "refusing to remove the deployed image");
                    return Ok(false);
                }
            }
        }
        match self.backends.images.remove(image).await {
            Ok(removed) => {
                info!(image = %removed, "build removed");
                Ok(true)
            }
            Err(InfraError::NotFound { .. }) => {
                warn!(%image, "no such build");
                Ok(false)
            }
            Err(source) => Err(infra(format!("failed to remove image {image}"))(source)),
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    async fn current_workload(&self, component: &str) -> OrchestratorResult<Option<Workload>> {
        self.backends
            .workloads
            .get(component)
            .await
            .map_err(infra(format!("failed to look up workload {component}")))
    }

    async fn builds_matching(&self, pattern: &str) -> OrchestratorResult<Vec<String>> {
        let records = self
            .backends
            .images
            .list_images(pattern)
            .await
            .map_err(infra(format!("failed to list images matching {pattern}")))?;
        Ok(matching_tags(&records, pattern))
    }

    /// Stamp the version, build the image, and wait until it is listed.
    async fn build_release(&self, target: &TenantArtifact, release: &Release) -> OrchestratorResult<String> {
        let package_file = release.package_file_name()?;
        let dockerfile = self.profile.dockerfile.render(package_file)?;
        let version = BuildVersion::stamped(&release.version, (self.clock)())?;
        let image = target.image_identifier(Some(&version.to_string()));
        let context = BuildContext {
            package: release.package.clone(),
            dockerfile,
        };

        info!(component = %target, %image, "building");
        self.backends
            .images
            .build(&context, &image)
            .await
            .map_err(infra(format!("failed to build image {image}")))?;

        let images = self.backends.images.as_ref();
        let wanted = image.as_str();
        poll_until(
            &format!("image {image} to be listed"),
            self.timing.image,
            self.shutdown.clone(),
            move || async move {
                let records = images.list_images(wanted).await?;
                let listed = matching_tags(&records, wanted).iter().any(|tag| tag == wanted);
                Ok::<_, InfraError>(listed.then_some(()))
            },
        )
        .await
        .map_err(settle(format!("failed to list images while waiting for {image}")))?;
        Ok(image)
    }

    /// Swap the workload's image and wait for its pods to come back on it.
    async fn swap_image(&self, workload: &Workload, image: &str) -> OrchestratorResult<()> {
        let name = workload.name.as_str();
        let label = workload
            .selector
            .get(fleet_core::ident::SELECTOR_LABEL)
            .map(String::as_str)
            .unwrap_or(name);

        self.backends
            .workloads
            .update_image(name, image)
            .await
            .map_err(infra(format!("failed to update image of {name}")))?;
        self.backends
            .workloads
            .recycle_pods(name, label)
            .await
            .map_err(infra(format!("failed to recycle pods of {name}")))?;

        let workloads = self.backends.workloads.as_ref();
        let replicas = workload.replicas as usize;
        poll_until(
            &format!("pods of {name} to run {image}"),
            self.timing.recycle,
            self.shutdown.clone(),
            move || async move {
                let pods = workloads.list_pods(label).await?;
                let settled = pods.len() >= replicas
                    && pods.iter().all(|p| p.running && p.image == image);
                Ok::<_, InfraError>(settled.then_some(()))
            },
        )
        .await
        .map_err(settle(format!("failed to list pods of {name}")))?;
        Ok(())
    }
}

/// `artifact-tenant` for an image named `tenant/artifact:tag`.
fn component_of_image(image: &str) -> Option<String> {
    let (repository, _) = image.rsplit_once(':')?;
    let (tenant, artifact) = repository.split_once('/')?;
    fleet_core::ident::component_name(tenant, artifact)
}
