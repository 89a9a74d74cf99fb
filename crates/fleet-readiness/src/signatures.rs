//! Processes a hyperkube single-node cluster runs, keyed by a prefix of
//! their container command.

use std::collections::BTreeMap;

const HYPERKUBE: &str = "gcr.io/google_containers/hyperkube:v1.0.1";

/// Command signature → image every one of them must be running from.
pub fn default_required_processes() -> BTreeMap<String, String> {
    [
        ("/hyperkube scheduler", HYPERKUBE),
        ("/hyperkube apiserver", HYPERKUBE),
        ("/hyperkube controlle", HYPERKUBE),
        ("/pause", "gcr.io/google_containers/pause:0.8.0"),
        ("/usr/bin/cadvisor", "google/cadvisor:latest"),
        ("/hyperkube proxy --m", HYPERKUBE),
        ("/hyperkube kubelet -", HYPERKUBE),
        ("/usr/local/bin/etcd ", "gcr.io/google_containers/etcd:2.0.9"),
    ]
    .into_iter()
    .map(|(sig, image)| (sig.to_string(), image.to_string()))
    .collect()
}
