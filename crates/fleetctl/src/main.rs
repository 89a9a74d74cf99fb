//! fleetctl — drive tenant kernel deployments on a cluster.
//!
//! # Usage
//!
//! ```text
//! fleetctl deploy --tenant acme --version 1.0.0 --package wso2carbon-kernel-1.0.0.zip --replicas 3
//! fleetctl update --tenant acme --version 1.1.0 --package wso2carbon-kernel-1.1.0.zip
//! fleetctl rollback --tenant acme --version 1.1.0 --image acme/carbon:1.0.0-2015-9-4-36000000
//! fleetctl scale --tenant acme --replicas 5
//! fleetctl remove --tenant acme
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

mod commands;
mod wiring;

#[derive(Parser)]
#[command(
    name = "fleetctl",
    about = "Kernel fleet — per-tenant kernel deployments on a container cluster",
    version,
    propagate_version = true
)]
struct Cli {
    /// Builder and cluster endpoints (written with defaults when missing).
    #[arg(long, global = true, default_value = fleet_core::config::DEFAULT_FILE_NAME)]
    config: PathBuf,

    /// Orchestrator settings (optional).
    #[arg(long, global = true, default_value = fleet_core::settings::DEFAULT_FILE_NAME)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Tenant and artifact a command acts on.
#[derive(Args)]
struct Target {
    #[arg(short, long)]
    tenant: String,
    /// Artifact name (default: the configured artifact).
    #[arg(short, long)]
    artifact: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Build a release and deploy it for a tenant.
    Deploy {
        #[command(flatten)]
        target: Target,
        /// Version label (ignored for bundled artifacts).
        #[arg(long)]
        version: Option<String>,
        /// Kernel package zip (ignored for bundled artifacts).
        #[arg(long)]
        package: Option<PathBuf>,
        #[arg(short, long, default_value = "1")]
        replicas: u32,
    },
    /// Rebuild a release and roll the tenant's pods onto it.
    Update {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        package: Option<PathBuf>,
    },
    /// Switch the tenant back to an older build.
    ///
    /// Without --image, lists the builds that can be rolled back to.
    Rollback {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        version: String,
        /// Build to roll back to, as listed without this flag.
        #[arg(long)]
        image: Option<String>,
    },
    /// Set the tenant's replica count.
    Scale {
        #[command(flatten)]
        target: Target,
        #[arg(short, long)]
        replicas: u32,
    },
    /// Tear down the tenant's workload and service.
    Remove {
        #[command(flatten)]
        target: Target,
    },
    /// Show deployment state, replicas, and addresses.
    Status {
        #[command(flatten)]
        target: Target,
    },
    /// List the tenant's builds.
    Builds {
        #[command(flatten)]
        target: Target,
        /// Only builds of this version.
        #[arg(long)]
        version: Option<String>,
    },
    /// Delete a build that is not currently deployed.
    RemoveBuild {
        #[arg(long)]
        image: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,fleet=debug"))?,
        )
        .init();

    let cli = Cli::parse();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            let _ = shutdown_tx.send(true);
        }
    });

    let paths = wiring::Paths {
        config: cli.config,
        settings: cli.settings,
    };
    let result = run(cli.command, &paths, shutdown_rx).await;
    if let Err(e) = &result {
        error!(error = %e, "command failed");
    }
    result
}

async fn run(
    command: Command,
    paths: &wiring::Paths,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let orch = wiring::connect(paths, shutdown).await?;
    let name = |target: &Target| {
        target
            .artifact
            .clone()
            .unwrap_or_else(|| orch.profile().name.clone())
    };

    match command {
        Command::Deploy {
            target,
            version,
            package,
            replicas,
        } => {
            let artifact = name(&target);
            commands::lifecycle::deploy(
                &orch,
                &target.tenant,
                &artifact,
                version.as_deref(),
                package.as_deref(),
                replicas,
            )
            .await
        }
        Command::Update {
            target,
            version,
            package,
        } => {
            let artifact = name(&target);
            commands::lifecycle::update(
                &orch,
                &target.tenant,
                &artifact,
                version.as_deref(),
                package.as_deref(),
            )
            .await
        }
        Command::Rollback {
            target,
            version,
            image,
        } => {
            let artifact = name(&target);
            commands::lifecycle::rollback(&orch, &target.tenant, &artifact, &version, image.as_deref())
                .await
        }
        Command::Scale { target, replicas } => {
            let artifact = name(&target);
            commands::lifecycle::scale(&orch, &target.tenant, &artifact, replicas).await
        }
        Command::Remove { target } => {
            let artifact = name(&target);
            commands::lifecycle::remove(&orch, &target.tenant, &artifact).await
        }
        Command::Status { target } => {
            let artifact = name(&target);
            commands::inspect::status(&orch, &target.tenant, &artifact).await
        }
        Command::Builds { target, version } => {
            let artifact = name(&target);
            commands::inspect::builds(&orch, &target.tenant, &artifact, version.as_deref()).await
        }
        Command::RemoveBuild { image } => commands::inspect::remove_build(&orch, &image).await,
    }
}
