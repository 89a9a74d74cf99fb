//! Kubernetes core/v1 adapter: replication controllers, pods, services.
//!
//! Request bodies are built with `serde_json::json!`; responses decode into
//! the handful of fields the orchestrator reads.

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet_core::ident::SELECTOR_LABEL;
use fleet_state::PortAllocator;
use http::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::capability::{InfraFuture, ServiceController, WorkloadController};
use crate::error::{InfraError, InfraResult};
use crate::http::HttpClient;
use crate::types::{PodInfo, ServiceInfo, Workload};

const JSON: &str = "application/json";
const MERGE_PATCH: &str = "application/strategic-merge-patch+json";

/// Name of the single service port.
pub const SERVICE_PORT_NAME: &str = "http-1";

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReplicationController {
    metadata: Meta,
    #[serde(default)]
    spec: ControllerSpec,
}

#[derive(Debug, Default, Deserialize)]
struct ControllerSpec {
    #[serde(default)]
    replicas: u32,
    #[serde(default)]
    selector: BTreeMap<String, String>,
    #[serde(default)]
    template: Option<PodTemplate>,
}

#[derive(Debug, Deserialize)]
struct PodTemplate {
    #[serde(default)]
    spec: Option<PodSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Debug, Deserialize)]
struct Container {
    name: String,
    #[serde(default)]
    image: String,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: Meta,
    #[serde(default)]
    spec: Option<PodSpec>,
    #[serde(default)]
    status: Option<PodStatus>,
}

#[derive(Debug, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Service {
    metadata: Meta,
    #[serde(default)]
    spec: ServiceSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceSpec {
    #[serde(default, rename = "clusterIP")]
    cluster_ip: Option<String>,
    #[serde(default)]
    ports: Vec<ServicePort>,
    #[serde(default)]
    selector: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicePort {
    port: u16,
    #[serde(default)]
    node_port: Option<u16>,
}

impl ReplicationController {
    fn first_container(&self) -> Option<&Container> {
        self.spec
            .template
            .as_ref()
            .and_then(|t| t.spec.as_ref())
            .and_then(|s| s.containers.first())
    }

    fn into_workload(self) -> Workload {
        let image = self
            .first_container()
            .map(|c| c.image.clone())
            .unwrap_or_default();
        Workload {
            name: self.metadata.name,
            image,
            replicas: self.spec.replicas,
            selector: self.spec.selector,
        }
    }
}

impl From<Pod> for PodInfo {
    fn from(pod: Pod) -> Self {
        let image = pod
            .spec
            .and_then(|s| s.containers.into_iter().next())
            .map(|c| c.image)
            .unwrap_or_default();
        let running = pod
            .status
            .and_then(|s| s.phase)
            .is_some_and(|phase| phase == "Running");
        PodInfo {
            name: pod.metadata.name,
            image,
            running,
        }
    }
}

impl From<Service> for ServiceInfo {
    fn from(svc: Service) -> Self {
        let port = svc.spec.ports.first();
        ServiceInfo {
            name: svc.metadata.name,
            cluster_ip: svc.spec.cluster_ip.filter(|ip| !ip.is_empty() && ip != "None"),
            port: port.map(|p| p.port).unwrap_or_default(),
            node_port: port.and_then(|p| p.node_port),
            selector: svc.spec.selector,
        }
    }
}

/// Kubernetes API client for one namespace.
pub struct KubeApi {
    client: HttpClient,
    namespace: String,
    container_port: u16,
    external_host: String,
    ports: Arc<PortAllocator>,
}

impl KubeApi {
    /// `external_host` defaults to the API endpoint's host.
    pub fn new(
        client: HttpClient,
        namespace: &str,
        container_port: u16,
        external_host: Option<String>,
        ports: Arc<PortAllocator>,
    ) -> Self {
        let external_host = external_host
            .or_else(|| client.endpoint().host().map(str::to_string))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        Self {
            client,
            namespace: namespace.to_string(),
            container_port,
            external_host,
            ports,
        }
    }

    fn collection(&self, kind: &str) -> String {
        format!("/api/v1/namespaces/{}/{kind}", self.namespace)
    }

    fn item(&self, kind: &str, name: &str) -> String {
        format!("{}/{name}", self.collection(kind))
    }

    fn pods_by_label(&self, label: &str) -> String {
        format!(
            "{}?labelSelector={SELECTOR_LABEL}%3D{label}",
            self.collection("pods")
        )
    }

    async fn get_controller(&self, name: &str) -> InfraResult<Option<ReplicationController>> {
        self.client
            .get_json(&self.item("replicationcontrollers", name))
            .await
    }

    async fn require_controller(&self, name: &str) -> InfraResult<ReplicationController> {
        self.get_controller(name)
            .await?
            .ok_or_else(|| InfraError::NotFound {
                kind: "replication controller",
                name: name.to_string(),
            })
    }

    async fn patch_controller(&self, name: &str, patch: serde_json::Value) -> InfraResult<()> {
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::PATCH,
                &self.item("replicationcontrollers", name),
                MERGE_PATCH,
                &patch,
            )
            .await?;
        Ok(())
    }

    async fn create_controller(
        &self,
        name: &str,
        pod_label: &str,
        image: &str,
        replicas: u32,
    ) -> InfraResult<()> {
        if self.get_controller(name).await?.is_some() {
            debug!(%name, "replication controller already exists");
            return Ok(());
        }
        let body = json!({
            "apiVersion": "v1",
            "kind": "ReplicationController",
            "metadata": { "name": name, "labels": { SELECTOR_LABEL: pod_label } },
            "spec": {
                "replicas": replicas,
                "selector": { SELECTOR_LABEL: pod_label },
                "template": {
                    "metadata": { "labels": { SELECTOR_LABEL: pod_label } },
                    "spec": {
                        "containers": [{
                            "name": pod_label,
                            "image": image,
                            "ports": [{ "containerPort": self.container_port }],
                        }],
                    },
                },
            },
        });
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::POST,
                &self.collection("replicationcontrollers"),
                JSON,
                &body,
            )
            .await?;
        info!(%name, %image, replicas, "replication controller created");
        Ok(())
    }

    async fn set_image(&self, name: &str, image: &str) -> InfraResult<()> {
        let rc = self.require_controller(name).await?;
        let container = rc
            .first_container()
            .map(|c| c.name.clone())
            .ok_or_else(|| InfraError::NotFound {
                kind: "container in replication controller",
                name: name.to_string(),
            })?;
        self.patch_controller(
            name,
            json!({
                "spec": { "template": { "spec": {
                    "containers": [{ "name": container, "image": image }],
                } } },
            }),
        )
        .await?;
        info!(%name, %image, "replication controller image updated");
        Ok(())
    }

    async fn set_replicas(&self, name: &str, replicas: u32) -> InfraResult<()> {
        self.require_controller(name).await?;
        self.patch_controller(name, json!({ "spec": { "replicas": replicas } }))
            .await?;
        info!(%name, replicas, "replication controller scaled");
        Ok(())
    }

    async fn delete_controller(&self, name: &str) -> InfraResult<Option<Workload>> {
        let Some(rc) = self.get_controller(name).await? else {
            return Ok(None);
        };
        self.client
            .delete(&self.item("replicationcontrollers", name))
            .await?;
        info!(%name, "replication controller deleted");
        Ok(Some(rc.into_workload()))
    }

    async fn pods(&self, label: &str) -> InfraResult<Vec<PodInfo>> {
        let list: Option<PodList> = self.client.get_json(&self.pods_by_label(label)).await?;
        Ok(list
            .map(|l| l.items.into_iter().map(PodInfo::from).collect())
            .unwrap_or_default())
    }

    async fn delete_pods(&self, name: &str, label: &str) -> InfraResult<()> {
        let pods = self.pods(label).await?;
        for pod in &pods {
            self.client.delete(&self.item("pods", &pod.name)).await?;
        }
        info!(%name, %label, deleted = pods.len(), "replica pods recycled");
        Ok(())
    }

    async fn get_service(&self, id: &str) -> InfraResult<Option<ServiceInfo>> {
        let svc: Option<Service> = self.client.get_json(&self.item("services", id)).await?;
        Ok(svc.map(ServiceInfo::from))
    }

    async fn create_service(&self, id: &str, label: &str) -> InfraResult<ServiceInfo> {
        if let Some(existing) = self.get_service(id).await? {
            debug!(%id, "service already exists");
            return Ok(existing);
        }
        // Only a created service consumes the port.
        let node_port = self.ports.current_port()?;
        let body = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": id, "labels": { SELECTOR_LABEL: label } },
            "spec": {
                "type": "NodePort",
                "sessionAffinity": "None",
                "selector": { SELECTOR_LABEL: label },
                "ports": [{
                    "name": SERVICE_PORT_NAME,
                    "protocol": "TCP",
                    "port": self.container_port,
                    "targetPort": self.container_port,
                    "nodePort": node_port,
                }],
            },
        });
        let created: Service = self
            .client
            .send_json(Method::POST, &self.collection("services"), JSON, &body)
            .await?;
        self.ports.commit(node_port)?;
        info!(%id, node_port, "service created");
        Ok(created.into())
    }

    async fn delete_service(&self, id: &str) -> InfraResult<Option<ServiceInfo>> {
        let Some(svc) = self.get_service(id).await? else {
            return Ok(None);
        };
        self.client.delete(&self.item("services", id)).await?;
        info!(%id, "service deleted");
        Ok(Some(svc))
    }

    async fn cluster_addr(&self, id: &str) -> InfraResult<Option<String>> {
        Ok(self
            .get_service(id)
            .await?
            .and_then(|svc| svc.cluster_ip.map(|ip| format!("http://{ip}:{}", svc.port))))
    }

    async fn external_addr(&self, id: &str) -> InfraResult<Option<String>> {
        Ok(self.get_service(id).await?.and_then(|svc| {
            svc.node_port
                .map(|port| format!("http://{}:{port}", self.external_host))
        }))
    }
}

impl WorkloadController for KubeApi {
    fn get<'a>(&'a self, name: &'a str) -> InfraFuture<'a, Option<Workload>> {
        Box::pin(async move {
            Ok(self
                .get_controller(name)
                .await?
                .map(ReplicationController::into_workload))
        })
    }

    fn create<'a>(
        &'a self,
        name: &'a str,
        pod_label: &'a str,
        image: &'a str,
        replicas: u32,
    ) -> InfraFuture<'a, ()> {
        Box::pin(self.create_controller(name, pod_label, image, replicas))
    }

    fn update_image<'a>(&'a self, name: &'a str, image: &'a str) -> InfraFuture<'a, ()> {
        Box::pin(self.set_image(name, image))
    }

    fn update_replicas<'a>(&'a self, name: &'a str, replicas: u32) -> InfraFuture<'a, ()> {
        Box::pin(self.set_replicas(name, replicas))
    }

    fn delete<'a>(&'a self, name: &'a str) -> InfraFuture<'a, Option<Workload>> {
        Box::pin(self.delete_controller(name))
    }

    fn recycle_pods<'a>(&'a self, name: &'a str, selector_label: &'a str) -> InfraFuture<'a, ()> {
        Box::pin(self.delete_pods(name, selector_label))
    }

    fn list_pods<'a>(&'a self, selector_label: &'a str) -> InfraFuture<'a, Vec<PodInfo>> {
        Box::pin(self.pods(selector_label))
    }
}

impl ServiceController for KubeApi {
    fn create<'a>(&'a self, id: &'a str, label: &'a str) -> InfraFuture<'a, ServiceInfo> {
        Box::pin(self.create_service(id, label))
    }

    fn get<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<ServiceInfo>> {
        Box::pin(self.get_service(id))
    }

    fn cluster_address<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<String>> {
        Box::pin(self.cluster_addr(id))
    }

    fn external_address<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<String>> {
        Box::pin(self.external_addr(id))
    }

    fn delete<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<ServiceInfo>> {
        Box::pin(self.delete_service(id))
    }
}
