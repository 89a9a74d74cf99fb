//! End-to-end lifecycle runs against the in-memory cluster.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use fleet_infra::{InMemoryCluster, Operation};
use fleet_orchestrator::{
    ArtifactProfile, Backends, DeploymentState, LifecycleOutcome, Orchestrator, OrchestratorError,
    Release, SkipReason, Timing,
};
use fleet_readiness::{PollPolicy, ReadinessError, ReadinessGate};
use fleet_state::{FilePortStore, PortAllocator, PortRange};
use tokio::sync::watch;

const STAMP: &str = "2015-9-4-36000000";

fn ten_am() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2015, 9, 4)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn timing() -> Timing {
    let policy = PollPolicy::bounded(Duration::from_secs(1), Duration::from_secs(10));
    Timing {
        image: policy,
        recycle: policy,
    }
}

fn release(version: &str) -> Release {
    Release::new(version, format!("/tmp/wso2carbon-kernel-{version}.zip"))
}

async fn orchestrator(cluster: &Arc<InMemoryCluster>) -> Orchestrator {
    // Nothing cancels these runs; waits fall back to plain sleeps.
    let (_, rx) = watch::channel(false);
    let gate = ReadinessGate::new(BTreeMap::new(), PollPolicy::default());
    Orchestrator::connect(
        Backends::single(cluster.clone()),
        &gate,
        ArtifactProfile::supplied("carbon").with_index_path("carbon"),
        timing(),
        rx,
    )
    .await
    .unwrap()
    .with_clock(ten_am)
}

#[tokio::test(start_paused = true)]
async fn deploy_creates_workload_and_service_once() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let orch = orchestrator(&cluster).await;

    let first = orch.deploy("acme", "carbon", &release("1.0.0"), 3).await.unwrap();
    let image = format!("acme/carbon:1.0.0-{STAMP}");
    assert_eq!(first, LifecycleOutcome::Applied { image: image.clone() });

    let workload = cluster.workload("carbon-acme").unwrap();
    assert_eq!(workload.replicas, 3);
    assert_eq!(workload.image, image);
    let service = cluster.service("carbon-acme").unwrap();
    let node_port = service.node_port.unwrap();
    assert!((30001..=32767).contains(&node_port));

    let build = &cluster.builds()[0];
    assert!(build.dockerfile.contains("ADD wso2carbon-kernel-1.0.0.zip /opt/"));
    assert!(build.dockerfile.contains("/opt/wso2carbon-kernel-1.0.0/bin/wso2server.sh"));

    let second = orch.deploy("acme", "carbon", &release("1.0.0"), 3).await.unwrap();
    assert_eq!(second, LifecycleOutcome::Skipped(SkipReason::AlreadyDeployed));
    assert_eq!(cluster.builds().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn deploy_refuses_a_version_that_was_already_built() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    cluster.add_image("acme/carbon:1.0.0-2015-9-1-5").unwrap();
    let orch = orchestrator(&cluster).await;

    let outcome = orch.deploy("acme", "carbon", &release("1.0.0"), 1).await.unwrap();
    assert_eq!(outcome, LifecycleOutcome::Skipped(SkipReason::BuildExists));
    assert!(cluster.workload("carbon-acme").is_none());
    assert!(cluster.journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rolling_update_keeps_replicas_and_swaps_image() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let orch = orchestrator(&cluster).await;
    orch.deploy("acme", "carbon", &release("1.0.0"), 3).await.unwrap();
    cluster.add_image("acme/carbon:1.1.0-2015-9-3-1000").unwrap();

    let outcome = orch.roll_update("acme", "carbon", &release("1.1.0")).await.unwrap();
    let image = format!("acme/carbon:1.1.0-{STAMP}");
    assert_eq!(outcome.image(), Some(image.as_str()));

    let workload = cluster.workload("carbon-acme").unwrap();
    assert_eq!(workload.replicas, 3);
    assert_eq!(workload.image, image);

    let journal = cluster.journal();
    let tail: Vec<&str> = journal.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec![
            format!("build {image}").as_str(),
            format!("update-image carbon-acme {image}").as_str(),
            "recycle-pods carbon-acme",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn rolling_update_preconditions() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let orch = orchestrator(&cluster).await;

    let outcome = orch.roll_update("acme", "carbon", &release("1.1.0")).await.unwrap();
    assert_eq!(outcome, LifecycleOutcome::Skipped(SkipReason::NotDeployed));

    orch.deploy("acme", "carbon", &release("1.0.0"), 1).await.unwrap();
    let outcome = orch.roll_update("acme", "carbon", &release("2.0.0")).await.unwrap();
    assert_eq!(outcome, LifecycleOutcome::Skipped(SkipReason::NoMatchingBuild));
    assert_eq!(cluster.builds().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rollback_returns_to_an_older_build() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let orch = orchestrator(&cluster).await;
    orch.deploy("acme", "carbon", &release("1.0.0"), 2).await.unwrap();
    cluster.add_image("acme/carbon:1.1.0-2015-9-3-1000").unwrap();
    orch.roll_update("acme", "carbon", &release("1.1.0")).await.unwrap();

    let older = format!("acme/carbon:1.0.0-{STAMP}");
    let candidates = orch.rollback_candidates("acme", "carbon", None).await.unwrap();
    assert_eq!(
        candidates,
        vec![older.clone(), "acme/carbon:1.1.0-2015-9-3-1000".to_string()]
    );

    let outcome = orch.rollback("acme", "carbon", "1.0.0", &older).await.unwrap();
    assert_eq!(outcome, LifecycleOutcome::Applied { image: older.clone() });
    let workload = cluster.workload("carbon-acme").unwrap();
    assert_eq!(workload.image, older);
    assert_eq!(workload.replicas, 2);

    let unknown = orch
        .rollback("acme", "carbon", "1.0.0", "acme/carbon:0.9.0-2015-1-1-1")
        .await
        .unwrap();
    assert_eq!(unknown, LifecycleOutcome::Skipped(SkipReason::UnknownImage));
    let missing = orch.rollback("acme", "carbon", "0.1.0", &older).await.unwrap();
    assert_eq!(missing, LifecycleOutcome::Skipped(SkipReason::NoMatchingBuild));
}

#[tokio::test(start_paused = true)]
async fn scale_and_remove_tear_everything_down() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let orch = orchestrator(&cluster).await;
    orch.deploy("acme", "carbon", &release("1.0.0"), 3).await.unwrap();

    assert!(orch.scale("acme", "carbon", 0).await.unwrap());
    assert_eq!(orch.replicas("acme", "carbon").await.unwrap(), 0);
    assert!(orch.status("acme", "carbon").await.unwrap().is_active());

    assert!(orch.remove("acme", "carbon").await.unwrap());
    assert_eq!(orch.status("acme", "carbon").await.unwrap(), DeploymentState::Absent);
    assert!(cluster.workload("carbon-acme").is_none());
    assert!(cluster.service("carbon-acme").is_none());
    assert!(orch.access("acme", "carbon").await.unwrap().is_none());

    assert!(!orch.remove("acme", "carbon").await.unwrap());
    assert!(!orch.scale("acme", "carbon", 2).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn access_appends_the_index_path() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let orch = orchestrator(&cluster).await;
    orch.deploy("acme", "carbon", &release("1.0.0"), 1).await.unwrap();

    let access = orch.access("acme", "carbon").await.unwrap().unwrap();
    let node_port = cluster.service("carbon-acme").unwrap().node_port.unwrap();
    assert_eq!(access.external, format!("http://127.0.0.1:{node_port}/carbon"));
    assert!(access.cluster.starts_with("http://10.0."));
    assert!(access.cluster.ends_with(":9443/carbon"));
}

#[tokio::test(start_paused = true)]
async fn builds_are_listed_and_removed() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let orch = orchestrator(&cluster).await;
    cluster.add_image("acme/carbon:0.9.0-2015-8-1-1").unwrap();
    cluster.add_image("other/carbon:0.9.0-2015-8-1-1").unwrap();
    orch.deploy("acme", "carbon", &release("1.0.0"), 1).await.unwrap();
    let deployed = format!("acme/carbon:1.0.0-{STAMP}");

    let all = orch.list_builds("acme", "carbon", None).await.unwrap();
    assert_eq!(all, vec!["acme/carbon:0.9.0-2015-8-1-1".to_string(), deployed.clone()]);
    let narrowed = orch.list_builds("acme", "carbon", Some("0.9.0")).await.unwrap();
    assert_eq!(narrowed, vec!["acme/carbon:0.9.0-2015-8-1-1".to_string()]);

    assert!(!orch.remove_build(&deployed).await.unwrap());
    assert!(orch.remove_build("acme/carbon:0.9.0-2015-8-1-1").await.unwrap());
    assert!(!orch.remove_build("acme/carbon:0.9.0-2015-8-1-1").await.unwrap());
    assert_eq!(orch.list_builds("acme", "carbon", None).await.unwrap(), vec![deployed]);
}

#[tokio::test(start_paused = true)]
async fn deploy_waits_for_a_slow_build_to_be_listed() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    cluster.set_build_lag(3).unwrap();
    let orch = orchestrator(&cluster).await;

    let started = tokio::time::Instant::now();
    let outcome = orch.deploy("acme", "carbon", &release("1.0.0"), 1).await.unwrap();
    assert!(outcome.applied());
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn build_that_never_shows_up_times_out() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    cluster.set_build_lag(100).unwrap();
    let orch = orchestrator(&cluster).await;

    let err = orch
        .deploy("acme", "carbon", &release("1.0.0"), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Settle { .. }), "{err}");
    assert!(cluster.workload("carbon-acme").is_none());
}

#[tokio::test(start_paused = true)]
async fn infrastructure_failure_surfaces_with_context() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    cluster
        .fail_next(Operation::CreateService, "apiserver unavailable")
        .unwrap();
    let orch = orchestrator(&cluster).await;

    let err = orch
        .deploy("acme", "carbon", &release("1.0.0"), 1)
        .await
        .unwrap_err();
    match err {
        OrchestratorError::Infrastructure { message, .. } => {
            assert_eq!(message, "failed to create service carbon-acme");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(cluster.service("carbon-acme").is_none());
}

#[tokio::test]
async fn empty_identity_is_rejected() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let orch = orchestrator(&cluster).await;
    let err = orch.deploy("", "carbon", &release("1.0.0"), 1).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Identity(_)));
}

#[tokio::test(start_paused = true)]
async fn connect_waits_for_infrastructure() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let (_tx, rx) = watch::channel(false);
    let gate = ReadinessGate::new(
        BTreeMap::from([("/pause".to_string(), "pause:0.8.0".to_string())]),
        PollPolicy::bounded(Duration::from_secs(1), Duration::from_secs(3)),
    );

    let err = Orchestrator::connect(
        Backends::single(cluster.clone()),
        &gate,
        ArtifactProfile::supplied("carbon"),
        timing(),
        rx,
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(
        err,
        OrchestratorError::Readiness(ReadinessError::TimedOut { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn node_ports_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("NodePortAllocation.txt");
    let open = |path: &Path| {
        let store = Arc::new(FilePortStore::new(path));
        Arc::new(PortAllocator::open(PortRange::default(), store).unwrap())
    };

    let cluster = Arc::new(InMemoryCluster::with_ports(open(&counter)));
    let orch = orchestrator(&cluster).await;
    orch.deploy("acme", "carbon", &release("1.0.0"), 1).await.unwrap();
    assert_eq!(cluster.service("carbon-acme").unwrap().node_port, Some(30001));
    assert_eq!(std::fs::read_to_string(&counter).unwrap().trim(), "30002");

    // A fresh process picks up where the last one stopped.
    let cluster = Arc::new(InMemoryCluster::with_ports(open(&counter)));
    let orch = orchestrator(&cluster).await;
    orch.deploy("beta", "carbon", &release("1.0.0"), 1).await.unwrap();
    assert_eq!(cluster.service("carbon-beta").unwrap().node_port, Some(30002));
}

#[tokio::test(start_paused = true)]
async fn tenants_do_not_see_each_others_builds() {
    let cluster = Arc::new(InMemoryCluster::new().unwrap());
    let foreign = "acme/carbon:1.0.0-2015-9-1-5";
    cluster.add_image(foreign).unwrap();
    let orch = orchestrator(&cluster).await;

    // "cme/carbon:1.0.0" is a substring of acme's tag but not its repository.
    let outcome = orch.deploy("cme", "carbon", &release("1.0.0"), 1).await.unwrap();
    assert!(outcome.applied(), "{outcome:?}");
    assert_eq!(
        cluster.workload("carbon-cme").unwrap().image,
        format!("cme/carbon:1.0.0-{STAMP}")
    );

    assert!(orch.rollback_candidates("cme", "carbon", None).await.unwrap().is_empty());
    let outcome = orch.rollback("cme", "carbon", "1.0.0", foreign).await.unwrap();
    assert_eq!(outcome, LifecycleOutcome::Skipped(SkipReason::UnknownImage));
    assert_eq!(
        cluster.workload("carbon-cme").unwrap().image,
        format!("cme/carbon:1.0.0-{STAMP}")
    );
    assert_eq!(
        orch.list_builds("cme", "carbon", None).await.unwrap(),
        vec![format!("cme/carbon:1.0.0-{STAMP}")]
    );
}
