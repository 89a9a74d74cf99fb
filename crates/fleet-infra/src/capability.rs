//! Capability traits.
//!
//! Methods return boxed `Send` futures so the traits stay object-safe and
//! the orchestrator can hold `Arc<dyn ...>` backends.

use std::future::Future;
use std::pin::Pin;

use crate::error::InfraResult;
use crate::types::{BuildContext, ContainerInfo, ImageRecord, PodInfo, ServiceInfo, Workload};

/// Boxed future returned by every capability call.
pub type InfraFuture<'a, T> = Pin<Box<dyn Future<Output = InfraResult<T>> + Send + 'a>>;

/// Source of truth for which infrastructure processes are running.
pub trait ContainerRuntime: Send + Sync {
    fn list_containers(&self) -> InfraFuture<'_, Vec<ContainerInfo>>;
}

pub trait ImageBuilder: Send + Sync {
    /// Build `context` and tag the result `image`. Resolves to the tag.
    fn build<'a>(&'a self, context: &'a BuildContext, image: &'a str) -> InfraFuture<'a, String>;

    /// Images with at least one tag matching `pattern` (see [`tag_matches`]).
    fn list_images<'a>(&'a self, pattern: &'a str) -> InfraFuture<'a, Vec<ImageRecord>>;

    /// Remove an image by tag. Resolves to the removed tag.
    fn remove<'a>(&'a self, image: &'a str) -> InfraFuture<'a, String>;
}

pub trait WorkloadController: Send + Sync {
    fn get<'a>(&'a self, name: &'a str) -> InfraFuture<'a, Option<Workload>>;

    /// Create the workload. Does nothing if one with this name exists.
    fn create<'a>(
        &'a self,
        name: &'a str,
        pod_label: &'a str,
        image: &'a str,
        replicas: u32,
    ) -> InfraFuture<'a, ()>;

    fn update_image<'a>(&'a self, name: &'a str, image: &'a str) -> InfraFuture<'a, ()>;

    fn update_replicas<'a>(&'a self, name: &'a str, replicas: u32) -> InfraFuture<'a, ()>;

    /// Delete the workload, resolving to what was deleted.
    fn delete<'a>(&'a self, name: &'a str) -> InfraFuture<'a, Option<Workload>>;

    /// Delete every pod carrying `selector_label`, so the controller
    /// recreates them from the current template.
    fn recycle_pods<'a>(&'a self, name: &'a str, selector_label: &'a str) -> InfraFuture<'a, ()>;

    fn list_pods<'a>(&'a self, selector_label: &'a str) -> InfraFuture<'a, Vec<PodInfo>>;
}

pub trait ServiceController: Send + Sync {
    /// Create the service, allocating its external port. Resolves to the
    /// existing service without allocating if one is already there.
    fn create<'a>(&'a self, id: &'a str, label: &'a str) -> InfraFuture<'a, ServiceInfo>;

    fn get<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<ServiceInfo>>;

    /// `http://<clusterIP>:<port>`, or `None` when the service is absent.
    fn cluster_address<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<String>>;

    /// `http://<externalHost>:<nodePort>`, or `None` when the service is
    /// absent.
    fn external_address<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<String>>;

    fn delete<'a>(&'a self, id: &'a str) -> InfraFuture<'a, Option<ServiceInfo>>;
}

/// Whether `tag` starts with `pattern`, ignoring a leading registry host
/// (`registry.local:5000/acme/carbon:1.0` matches `acme/carbon:`).
pub fn tag_matches(tag: &str, pattern: &str) -> bool {
    if tag.starts_with(pattern) {
        return true;
    }
    match tag.split_once('/') {
        Some((host, rest)) => {
            let is_registry = host.contains('.') || host.contains(':') || host == "localhost";
            is_registry && rest.starts_with(pattern)
        }
        None => false,
    }
}

/// Every tag matching `pattern`, in the order the records list them.
pub fn matching_tags(records: &[ImageRecord], pattern: &str) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.repo_tags.iter())
        .filter(|tag| tag_matches(tag, pattern))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_tags_keeps_record_order() {
        let records = vec![
            ImageRecord {
                id: "sha256:1".into(),
                repo_tags: vec!["acme/carbon:1.0-2015-9-4-1".into(), "other:latest".into()],
            },
            ImageRecord {
                id: "sha256:2".into(),
                repo_tags: vec!["acme/carbon:1.0-2015-9-3-1".into()],
            },
        ];
        assert_eq!(
            matching_tags(&records, "acme/carbon:1.0"),
            vec!["acme/carbon:1.0-2015-9-4-1", "acme/carbon:1.0-2015-9-3-1"]
        );
        assert!(matching_tags(&records, "globex/").is_empty());
    }

    #[test]
    fn tags_match_from_the_repository_start() {
        assert!(tag_matches("acme/carbon:1.0.0-2015-9-1-5", "acme/carbon:1.0.0"));
        assert!(!tag_matches("acme/carbon:1.0.0-2015-9-1-5", "cme/carbon:1.0.0"));
        assert!(!tag_matches("xacme/carbon:1.0.0-2015-9-1-5", "acme/carbon:"));
        assert!(tag_matches("registry.local:5000/acme/carbon:1.0", "acme/carbon:"));
        assert!(tag_matches("localhost/acme/carbon:1.0", "acme/carbon:"));
        assert!(!tag_matches("team/acme/carbon:1.0", "acme/carbon:"));
    }
}
