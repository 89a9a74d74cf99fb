//! Readiness gate: wait for the cluster's infrastructure processes.
//!
//! A process counts as running when some container's command contains its
//! signature and that container runs exactly the expected image. A
//! signature, once seen, stays satisfied for the rest of the wait.

use std::collections::BTreeMap;

use fleet_infra::{ContainerInfo, ContainerRuntime};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{ReadinessError, ReadinessResult};
use crate::poll::{Halt, PollPolicy, pause};
use crate::signatures::default_required_processes;

#[derive(Debug, Clone)]
pub struct ReadinessGate {
    required: BTreeMap<String, String>,
    policy: PollPolicy,
}

impl ReadinessGate {
    pub fn new(required: BTreeMap<String, String>, policy: PollPolicy) -> Self {
        Self { required, policy }
    }

    /// Gate over [`default_required_processes`].
    pub fn with_default_processes(policy: PollPolicy) -> Self {
        Self::new(default_required_processes(), policy)
    }

    pub fn required(&self) -> &BTreeMap<String, String> {
        &self.required
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Block until every required process is running.
    pub async fn wait(
        &self,
        runtime: &dyn ContainerRuntime,
        mut shutdown: watch::Receiver<bool>,
    ) -> ReadinessResult<()> {
        if self.required.is_empty() {
            debug!("no infrastructure processes required");
            return Ok(());
        }

        let started = Instant::now();
        let deadline = self.policy.deadline(started);
        let mut missing = self.required.clone();
        info!(required = missing.len(), "waiting for infrastructure processes");

        loop {
            if *shutdown.borrow() {
                return Err(ReadinessError::Cancelled);
            }
            let containers = runtime.list_containers().await?;
            prune_satisfied(&mut missing, &containers);
            if missing.is_empty() {
                info!(elapsed = ?started.elapsed(), "infrastructure processes running");
                return Ok(());
            }
            debug!(
                missing = ?missing.keys().collect::<Vec<_>>(),
                "infrastructure processes not running yet"
            );

            match pause(self.policy.interval, deadline, &mut shutdown).await {
                Ok(()) => {}
                Err(Halt::Cancelled) => return Err(ReadinessError::Cancelled),
                Err(Halt::TimedOut) => {
                    return Err(ReadinessError::TimedOut {
                        missing: missing.into_keys().collect(),
                        waited: started.elapsed(),
                    });
                }
            }
        }
    }
}

fn prune_satisfied(missing: &mut BTreeMap<String, String>, containers: &[ContainerInfo]) {
    missing.retain(|signature, image| {
        let running = containers
            .iter()
            .any(|c| c.command.contains(signature.as_str()) && c.image == *image);
        if running {
            debug!(%signature, %image, "infrastructure process found");
        }
        !running
    });
}
