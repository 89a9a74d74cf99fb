use std::path::Path;

use fleet_orchestrator::{LifecycleOutcome, Orchestrator};

fn report(action: &str, component: &str, outcome: &LifecycleOutcome) {
    match outcome {
        LifecycleOutcome::Applied { image } => println!("✓ {action} {component}: {image}"),
        LifecycleOutcome::Skipped(reason) => println!("- {action} {component} skipped: {reason}"),
    }
}

pub async fn deploy(
    orch: &Orchestrator,
    tenant: &str,
    artifact: &str,
    version: Option<&str>,
    package: Option<&Path>,
    replicas: u32,
) -> anyhow::Result<()> {
    let release = orch.profile().release(version, package)?;
    let outcome = orch.deploy(tenant, artifact, &release, replicas).await?;
    report("deploy", &format!("{artifact}-{tenant}"), &outcome);
    if outcome.applied() {
        if let Some(access) = orch.access(tenant, artifact).await? {
            println!("  Cluster:  {}", access.cluster);
            println!("  External: {}", access.external);
        }
    }
    Ok(())
}

pub async fn update(
    orch: &Orchestrator,
    tenant: &str,
    artifact: &str,
    version: Option<&str>,
    package: Option<&Path>,
) -> anyhow::Result<()> {
    let release = orch.profile().release(version, package)?;
    let outcome = orch.roll_update(tenant, artifact, &release).await?;
    report("update", &format!("{artifact}-{tenant}"), &outcome);
    Ok(())
}

pub async fn rollback(
    orch: &Orchestrator,
    tenant: &str,
    artifact: &str,
    version: &str,
    image: Option<&str>,
) -> anyhow::Result<()> {
    let Some(image) = image else {
        let candidates = rollback_choices(orch, tenant, artifact, version).await?;
        if candidates.is_empty() {
            println!("No older builds to roll back to.");
        } else {
            println!("Builds older than the deployed one (pass one with --image):");
            for candidate in candidates {
                println!("  {candidate}");
            }
        }
        return Ok(());
    };
    let outcome = orch.rollback(tenant, artifact, version, image).await?;
    report("rollback", &format!("{artifact}-{tenant}"), &outcome);
    Ok(())
}

/// Builds of `version` older than the deployed one.
async fn rollback_choices(
    orch: &Orchestrator,
    tenant: &str,
    artifact: &str,
    version: &str,
) -> anyhow::Result<Vec<String>> {
    Ok(orch.rollback_candidates(tenant, artifact, Some(version)).await?)
}

pub async fn scale(orch: &Orchestrator, tenant: &str, artifact: &str, replicas: u32) -> anyhow::Result<()> {
    if orch.scale(tenant, artifact, replicas).await? {
        println!("✓ {artifact}-{tenant} scaled to {replicas}");
    } else {
        println!("- {artifact}-{tenant} is not deployed");
    }
    Ok(())
}

pub async fn remove(orch: &Orchestrator, tenant: &str, artifact: &str) -> anyhow::Result<()> {
    if orch.remove(tenant, artifact).await? {
        println!("✓ {artifact}-{tenant} removed");
    } else {
        println!("- {artifact}-{tenant} is not deployed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use fleet_infra::InMemoryCluster;
    use fleet_orchestrator::{ArtifactProfile, Backends, Release, Timing};
    use fleet_readiness::{PollPolicy, ReadinessGate};
    use tokio::sync::watch;

    #[tokio::test(start_paused = true)]
    async fn rollback_choices_stay_within_the_version() {
        let cluster = Arc::new(InMemoryCluster::new().unwrap());
        let (_tx, rx) = watch::channel(false);
        let orch = Orchestrator::connect(
            Backends::single(cluster.clone()),
            &ReadinessGate::new(BTreeMap::new(), PollPolicy::default()),
            ArtifactProfile::supplied("carbon"),
            Timing::default(),
            rx,
        )
        .await
        .unwrap();

        orch.deploy("acme", "carbon", &Release::new("1.0.0", "/tmp/kernel-1.0.0.zip"), 1)
            .await
            .unwrap();
        cluster.add_image("acme/carbon:1.1.0-2015-9-3-1000").unwrap();
        orch.roll_update("acme", "carbon", &Release::new("1.1.0", "/tmp/kernel-1.1.0.zip"))
            .await
            .unwrap();

        let choices = rollback_choices(&orch, "acme", "carbon", "1.1.0").await.unwrap();
        assert_eq!(choices, vec!["acme/carbon:1.1.0-2015-9-3-1000".to_string()]);
        let all = orch.rollback_candidates("acme", "carbon", None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
