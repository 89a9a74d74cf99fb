//! In-process implementation of every capability.
//!
//! Behaves like a small cluster: replication controllers reconcile their
//! pods whenever pods are listed, services get node ports from a real
//! [`PortAllocator`], and builds can be made to show up in image listings
//! only after a delay. Any operation can be made to fail once.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use fleet_core::ident::SELECTOR_LABEL;
use fleet_state::{MemoryPortStore, PortAllocator, PortRange};
use tracing::debug;

use crate::capability::{
    ContainerRuntime, ImageBuilder, InfraFuture, ServiceController, WorkloadController,
    tag_matches,
};
use crate::error::{InfraError, InfraResult};
use crate::types::{BuildContext, ContainerInfo, ImageRecord, PodInfo, ServiceInfo, Workload};

/// Capability calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListContainers,
    Build,
    ListImages,
    RemoveImage,
    GetWorkload,
    CreateWorkload,
    UpdateImage,
    UpdateReplicas,
    DeleteWorkload,
    RecyclePods,
    ListPods,
    CreateService,
    GetService,
    DeleteService,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    containers: Vec<ContainerInfo>,
    images: Vec<ImageRecord>,
    /// Built images not yet visible, with the number of listings left to skip.
    pending: Vec<(ImageRecord, u32)>,
    build_lag: u32,
    builds: Vec<BuildContext>,
    workloads: BTreeMap<String, Workload>,
    pods: BTreeMap<String, Vec<PodInfo>>,
    services: BTreeMap<String, ServiceInfo>,
    failures: HashMap<Operation, String>,
    journal: Vec<String>,
    next_id: u64,
}

impl ClusterState {
    fn take_failure(&mut self, op: Operation) -> InfraResult<()> {
        match self.failures.remove(&op) {
            Some(message) => Err(InfraError::Injected {
                operation: op.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Bring the pods behind `label` in line with their controller.
    fn reconcile(&mut self, label: &str) {
        let wanted = self
            .workloads
            .values()
            .find(|w| w.selector.get(SELECTOR_LABEL).map(String::as_str) == Some(label))
            .map(|w| (w.replicas as usize, w.image.clone()));
        let Some((replicas, image)) = wanted else {
            self.pods.remove(label);
            return;
        };
        let mut pods = self.pods.remove(label).unwrap_or_default();
        pods.truncate(replicas);
        while pods.len() < replicas {
            let id = self.next_id();
            pods.push(PodInfo {
                name: format!("{label}-{id}"),
                image: image.clone(),
                running: true,
            });
        }
        self.pods.insert(label.to_string(), pods);
    }
}

/// A whole cluster in one process.
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
    ports: Arc<PortAllocator>,
    external_host: String,
}

impl InMemoryCluster {
    /// Cluster with a fresh in-memory port counter over the default range.
    pub fn new() -> InfraResult<Self> {
        let ports = PortAllocator::open(PortRange::default(), Arc::new(MemoryPortStore::new()))?;
        Ok(Self::with_ports(Arc::new(ports)))
    }

    pub fn with_ports(ports: Arc<PortAllocator>) -> Self {
        Self {
            state: Mutex::new(ClusterState::default()),
            ports,
            external_host: "127.0.0.1".to_string(),
        }
    }

    fn state(&self) -> InfraResult<MutexGuard<'_, ClusterState>> {
        self.state
            .lock()
            .map_err(|e| InfraError::Unavailable(e.to_string()))
    }

    /// Add a running container.
    pub fn add_container(&self, image: &str, command: &str) -> InfraResult<()> {
        let mut st = self.state()?;
        let id = st.next_id();
        st.containers.push(ContainerInfo {
            id: format!("c{id}"),
            image: image.to_string(),
            command: command.to_string(),
        });
        Ok(())
    }

    /// Stop every running container.
    pub fn clear_containers(&self) -> InfraResult<()> {
        self.state()?.containers.clear();
        Ok(())
    }

    /// Add an already-built image carrying `tag`.
    pub fn add_image(&self, tag: &str) -> InfraResult<()> {
        let mut st = self.state()?;
        let id = st.next_id();
        st.images.push(ImageRecord {
            id: format!("sha256:{id:064x}"),
            repo_tags: vec![tag.to_string()],
        });
        Ok(())
    }

    /// Hide each new build from the next `listings` image listings.
    pub fn set_build_lag(&self, listings: u32) -> InfraResult<()> {
        self.state()?.build_lag = listings;
        Ok(())
    }

    /// Make the next call to `op` fail with `message`.
    pub fn fail_next(&self, op: Operation, message: &str) -> InfraResult<()> {
        self.state()?.failures.insert(op, message.to_string());
        Ok(())
    }

    pub fn workload(&self, name: &str) -> Option<Workload> {
        self.state().ok()?.workloads.get(name).cloned()
    }

    pub fn service(&self, name: &str) -> Option<ServiceInfo> {
        self.state().ok()?.services.get(name).cloned()
    }

    /// Every tag of every visible image.
    pub fn image_tags(&self) -> Vec<String> {
        self.state()
            .map(|st| {
                st.images
                    .iter()
                    .flat_map(|i| i.repo_tags.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Build contexts received, oldest first.
    pub fn builds(&self) -> Vec<BuildContext> {
        self.state().map(|st| st.builds.clone()).unwrap_or_default()
    }

    /// Mutating calls in the order they were applied.
    pub fn journal(&self) -> Vec<String> {
        self.state().map(|st| st.journal.clone()).unwrap_or_default()
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    fn do_build(&self, context: &BuildContext, image: &str) -> InfraResult<String> {
        let mut st = self.state()?;
        st.take_failure(Operation::Build)?;
        let id = st.next_id();
        let record = ImageRecord {
            id: format!("sha256:{id:064x}"),
            repo_tags: vec![image.to_string()],
        };
        if st.build_lag == 0 {
            st.images.push(record);
        } else {
            let lag = st.build_lag;
            st.pending.push((record, lag));
        }
        st.builds.push(context.clone());
        st.journal.push(format!("build {image}"));
        Ok(image.to_string())
    }

    fn do_list_images(&self, pattern: &str) -> InfraResult<Vec<ImageRecord>> {
        let mut st = self.state()?;
        st.take_failure(Operation::ListImages)?;
        let pending = std::mem::take(&mut st.pending);
        for (record, left) in pending {
            if left == 0 {
                st.images.push(record);
            } else {
                st.pending.push((record, left - 1));
            }
        }
        Ok(st
            .images
            .iter()
            .filter(|r| r.repo_tags.iter().any(|t| tag_matches(t, pattern)))
            .cloned()
            .collect())
    }

    fn do_remove_image(&self, image: &str) -> InfraResult<String> {
        let mut st = self.state()?;
        st.take_failure(Operation::RemoveImage)?;
        let before = st.images.len();
        st.images.retain(|r| !r.repo_tags.iter().any(|t| t == image));
        if st.images.len() == before {
            return Err(InfraError::NotFound {
                kind: "image",
                name: image.to_string(),
            });
        }
        st.journal.push(format!("remove-image {image}"));
        Ok(image.to_string())
    }

    fn do_create_workload(
        &self,
        name: &str,
        pod_label: &str,
        image: &str,
        replicas: u32,
    ) -> InfraResult<()> {
        let mut st = self.state()?;
        st.take_failure(Operation::CreateWorkload)?;
        if st.workloads.contains_key(name) {
            debug!(%name, "workload already exists");
            return Ok(());
        }
        st.workloads.insert(
            name.to_string(),
            Workload {
                name: name.to_string(),
                image: image.to_string(),
                replicas,
                selector: BTreeMap::from([(SELECTOR_LABEL.to_string(), pod_label.to_string())]),
            },
        );
        st.journal.push(format!("create-workload {name} {image} {replicas}"));
        Ok(())
    }

    fn update_workload(
        &self,
        op: Operation,
        name: &str,
        change: impl FnOnce(&mut Workload) -> String,
    ) -> InfraResult<()> {
        let mut st = self.state()?;
        st.take_failure(op)?;
        let workload = st.workloads.get_mut(name).ok_or_else(|| InfraError::NotFound {
            kind: "workload",
            name: name.to_string(),
        })?;
        let entry = change(workload);
        st.journal.push(entry);
        Ok(())
    }

    fn do_delete_workload(&self, name: &str) -> InfraResult<Option<Workload>> {
        let mut st = self.state()?;
        st.take_failure(Operation::DeleteWorkload)?;
        let removed = st.workloads.remove(name);
        if let Some(workload) = &removed {
            if let Some(label) = workload.selector.get(SELECTOR_LABEL).cloned() {
                st.pods.remove(&label);
            }
            st.journal.push(format!("delete-workload {name}"));
        }
        Ok(removed)
    }

    fn do_recycle_pods(&self, name: &str, label: &str) -> InfraResult<()> {
        let mut st = self.state()?;
        st.take_failure(Operation::RecyclePods)?;
        st.pods.remove(label);
        st.journal.push(format!("recycle-pods {name}"));
        Ok(())
    }

    fn do_list_pods(&self, label: &str) -> InfraResult<Vec<PodInfo>> {
        let mut st = self.state()?;
        st.take_failure(Operation::ListPods)?;
        st.reconcile(label);
        Ok(st.pods.get(label).cloned().unwrap_or_default())
    }

    fn do_create_service(&self, id: &str, label: &str) -> InfraResult<ServiceInfo> {
        let mut st = self.state()?;
        st.take_failure(Operation::CreateService)?;
        if let Some(existing) = st.services.get(id) {
            return Ok(existing.clone());
        }
        let node_port = self.ports.allocate()?;
        let ip = st.next_id();
        let service = ServiceInfo {
            name: id.to_string(),
            cluster_ip: Some(format!("10.0.{}.{}", (ip / 250) % 250, ip % 250 + 1)),
            port: 9443,
            node_port: Some(node_port),
            selector: BTreeMap::from([(SELECTOR_LABEL.to_string(), label.to_string())]),
        };
        st.services.insert(id.to_string(), service.clone());
        st.journal.push(format!("create-service {id} {node_port}"));
        Ok(service)
    }

    fn do_get_service(&self, id: &str) -> InfraResult<Option<ServiceInfo>> {
        let mut st = self.state()?;
        st.take_failure(Operation::GetService)?;
        Ok(st.services.get(id).cloned())
    }

    fn do_delete_service(&self, id: &str) -> InfraResult<Option<ServiceInfo>> {
        let mut st = self.state()?;
        st.take_failure(Operation::DeleteService)?;
        let removed = st.services.remove(id);
        if removed.is_some() {
            st.journal.push(format!("delete-service {id}"));
        }
        Ok(removed)
    }
}

impl ContainerRuntime for InMemoryCluster {
    fn list_containers(&self) -> InfraFuture<'_, Vec<ContainerInfo>> {
        let result = self.state().and_then(|mut st| {
            st.take_failure(Operation::ListContainers)?;
            Ok(st.containers.clone())
        });
        Box::pin(std::future::ready(result))
    }
}

impl ImageBuilder for InMemoryCluster {
    fn build<'a>(&'a self, context: &'a BuildContext, image: &'a str) -> InfraFuture<'a, String> {
        Box::pin(std::future::ready(self.do_build(context, image)))
    }

    fn list_images<'a>(&'a self, pattern: &'a str) -> InfraFuture<'a, Vec<ImageRecord>> {
        Box::pin(std::future::ready(self.do_list_images(pattern)))
    }

    fn remove<'a>(&'a self, image: &'a str) -> InfraFuture<'a, String> {
        Box::pin(std::future::ready(self.do_remove_image(image)))
    }
}

impl WorkloadController for InMemoryCluster {
    fn get<'a>(&'a self, name: &'a str) -> InfraFuture<'a, Option<Workload>> {
        let result = self.state().and_then(|mut st| {
            st.take_failure(Operation::GetWorkload)?;
            Ok(st.workloads.get(name).cloned())
        });
        Box::pin(std::future::ready(result))
    }

    fn create<'a>(
        &'a self,
        name: &'a str,
        pod_label: &'a str,
        image: &'a str,
        replicas: u32,
    ) -> InfraFuture<'a, ()> {
        Box::pin(std::future::ready(
            self.do_create_workload(name, pod_label, image, replicas),
        ))
    }

    fn update_image<'a>(&'a self, name: &'a str, image: &'a str) -> InfraFuture<'a, ()> {
        let result = self.update_workload(Operation::UpdateImage, name, |w| {
            w.image = image.to_string();
            format!("update-image {name} {image}")
        });
        Box::pin(std::future::ready(result))
    }

    fn update_replicas<'a>(&'a self, name: &'a str, replicas: u32) -> InfraFuture<'a, ()> {
        let result = self.update_workload(Operation::UpdateReplicas, name, |w| {
            w.replicas = replicas;
            format!("update-replicas {name} {replicas}")
        });
        Box::pin(std::future::ready(result))
    }

    fn delete<'a>(&'a self, name: &'a str) -> InfraFuture<'a, Option<Workload>> {
        Box::pin(std::future::ready(self.do_delete_workload(name)))
    }

    fn recycle_pods<'a>(&'a self, name: &'a str, selector_label: &'a str) -> InfraFuture<'a, ()> {
        Box::pin(std::future::ready(self.do_recycle_pods(name, selector_label)))
    }

    fn list_pods<'a>(&'a self, selector_label: &'a str) -> InfraFuture<'a, Vec<PodInfo>> {
        Box::pin(std::future::ready(self.do_list_pods(selector_label)))
    }
}

impl ServiceController for InMemoryCluster {
    fn create<'a>(&'a self, id: &'a str, label: &'a str) -> InfraFuture<'a, ServiceInfo> {
        Box::pin(std::future::ready(self.do_create_service(id, label)))
    }

    fn get<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<ServiceInfo>> {
        Box::pin(std::future::ready(self.do_get_service(id)))
    }

    fn cluster_address<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<String>> {
        let result = self.do_get_service(id).map(|svc| {
            svc.and_then(|s| s.cluster_ip.map(|ip| format!("http://{ip}:{}", s.port)))
        });
        Box::pin(std::future::ready(result))
    }

    fn external_address<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<String>> {
        let result = self.do_get_service(id).map(|svc| {
            svc.and_then(|s| {
                s.node_port
                    .map(|port| format!("http://{}:{port}", self.external_host))
            })
        });
        Box::pin(std::future::ready(result))
    }

    fn delete<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<ServiceInfo>> {
        Box::pin(std::future::ready(self.do_delete_service(id)))
    }
}
