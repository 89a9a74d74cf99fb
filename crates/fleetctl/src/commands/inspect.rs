use fleet_core::ident::image_version;
use fleet_orchestrator::{DeploymentState, Orchestrator};

/// The build tag of a deployed image, for display.
fn build_label(image: &str) -> &str {
    image_version(image).unwrap_or("untagged")
}

pub async fn status(orch: &Orchestrator, tenant: &str, artifact: &str) -> anyhow::Result<()> {
    match orch.status(tenant, artifact).await? {
        DeploymentState::Absent => println!("{artifact}-{tenant}: not deployed"),
        DeploymentState::Active(workload) => {
            println!("{}: active", workload.name);
            println!("  Image:    {}", workload.image);
            println!("  Build:    {}", build_label(&workload.image));
            println!("  Replicas: {}", workload.replicas);
            match orch.access(tenant, artifact).await? {
                Some(access) => {
                    println!("  Cluster:  {}", access.cluster);
                    println!("  External: {}", access.external);
                }
                None => println!("  No service"),
            }
        }
    }
    Ok(())
}

pub async fn builds(
    orch: &Orchestrator,
    tenant: &str,
    artifact: &str,
    version: Option<&str>,
) -> anyhow::Result<()> {
    let builds = orch.list_builds(tenant, artifact, version).await?;
    if builds.is_empty() {
        println!("No builds for {tenant}/{artifact}");
    }
    for build in builds {
        println!("{build}");
    }
    Ok(())
}

pub async fn remove_build(orch: &Orchestrator, image: &str) -> anyhow::Result<()> {
    if orch.remove_build(image).await? {
        println!("✓ {image} removed");
    } else {
        println!("- {image} not removed (unknown or currently deployed)");
    }
    Ok(())
}
