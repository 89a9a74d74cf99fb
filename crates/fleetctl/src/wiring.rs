//! Build a connected orchestrator from the configuration files.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use fleet_core::{ClientConfig, FleetSettings};
use fleet_core::settings::TimingSettings;
use fleet_infra::{DockerEngine, Endpoint, HttpClient, KubeApi};
use fleet_orchestrator::{ArtifactProfile, Backends, Orchestrator, Timing};
use fleet_readiness::{PollPolicy, ReadinessGate};
use fleet_state::{FilePortStore, PortAllocator, PortRange};
use tokio::sync::watch;
use tracing::{debug, info};

pub struct Paths {
    pub config: PathBuf,
    pub settings: PathBuf,
}

pub async fn connect(paths: &Paths, shutdown: watch::Receiver<bool>) -> anyhow::Result<Orchestrator> {
    let client = ClientConfig::load_or_init(&paths.config)
        .with_context(|| format!("failed to load client configuration {}", paths.config.display()))?;
    let settings = FleetSettings::load_or_default(&paths.settings)
        .with_context(|| format!("failed to load settings {}", paths.settings.display()))?;
    info!(
        builder = %client.builder_url,
        cluster = %client.cluster_url,
        namespace = %settings.cluster.namespace,
        "connecting"
    );

    let range = PortRange::new(settings.ports.lower, settings.ports.upper)?;
    let store = Arc::new(FilePortStore::new(&settings.ports.counter_file));
    let ports = PortAllocator::open(range, store).with_context(|| {
        format!(
            "failed to open port counter {}",
            settings.ports.counter_file.display()
        )
    })?;
    debug!(next = ports.current_port()?, "port counter opened");

    let builder = Endpoint::parse(&client.builder_url).context("invalid builder endpoint")?;
    let cluster = Endpoint::parse(&client.cluster_url).context("invalid cluster endpoint")?;
    let docker = Arc::new(DockerEngine::new(HttpClient::new(builder)));
    let kube = Arc::new(KubeApi::new(
        HttpClient::new(cluster),
        &settings.cluster.namespace,
        settings.cluster.container_port,
        settings.cluster.external_host.clone(),
        Arc::new(ports),
    ));
    let backends = Backends {
        runtime: docker.clone(),
        images: docker,
        workloads: kube.clone(),
        services: kube,
    };

    let readiness = PollPolicy::new(
        settings.timing.readiness_interval()?,
        settings.timing.readiness_timeout()?,
    );
    let gate = match &settings.readiness.required {
        Some(required) => ReadinessGate::new(required.clone(), readiness),
        None => ReadinessGate::with_default_processes(readiness),
    };
    let profile = ArtifactProfile::from_settings(&settings.artifact, settings.dockerfile.clone())?;

    Orchestrator::connect(backends, &gate, profile, timing(&settings.timing)?, shutdown)
        .await
        .context("cluster is not ready")
}

fn timing(settings: &TimingSettings) -> anyhow::Result<Timing> {
    Ok(Timing {
        image: PollPolicy::bounded(settings.image_interval()?, settings.image_timeout()?),
        recycle: PollPolicy::bounded(settings.recycle_interval()?, settings.recycle_timeout()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_from_files_without_touching_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("NodePortAllocation.txt");
        let paths = Paths {
            config: dir.path().join("client_configuration.txt"),
            settings: dir.path().join("fleet.toml"),
        };
        std::fs::write(
            &paths.settings,
            format!(
                "[artifact]\nname = \"kernel\"\nindex_path = \"carbon\"\n\n\
                 [ports]\ncounter_file = \"{}\"\n\n[readiness]\nrequired = {{}}\n",
                counter.display()
            ),
        )
        .unwrap();
        let (_tx, rx) = watch::channel(false);

        let orch = connect(&paths, rx).await.unwrap();
        assert_eq!(orch.profile().name, "kernel");
        assert_eq!(orch.profile().index_path, "carbon");

        let written = ClientConfig::from_file(&paths.config).unwrap();
        assert_eq!(written.builder_url, "unix:///var/run/docker.sock");
        assert_eq!(written.cluster_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn timing_follows_settings() {
        let settings = TimingSettings {
            image_interval: "500ms".into(),
            image_timeout: "30s".into(),
            ..TimingSettings::default()
        };
        let timing = timing(&settings).unwrap();
        assert_eq!(timing.image.interval, std::time::Duration::from_millis(500));
        assert_eq!(timing.image.timeout, Some(std::time::Duration::from_secs(30)));
        assert_eq!(timing.recycle.timeout, Some(std::time::Duration::from_secs(180)));
    }
}
