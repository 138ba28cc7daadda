//! Label keys shared by the controller and member agents.
//!
//! Labels on a member Service are the only channel between the two. Each
//! intent label records what one side expects the other to do.

use std::collections::BTreeMap;

use crate::cluster::ScyllaCluster;

/// Marks a member as a seed.
pub const SEED_LABEL: &str = "scylla/seed";

/// Address of the member. Used for replacement, seeds and listen/broadcast.
pub const IP_LABEL: &str = "scylla/ip";

/// Presence requests decommission, `"true"` means the member finished it.
pub const DECOMMISSION_LABEL: &str = "scylla/decommissioned";

/// Presence requests replacement of the member's pod, `"true"` means done.
pub const REPLACE_LABEL: &str = "scylla/replace";

/// Presence forces the member's readiness check to fail.
pub const MAINTENANCE_LABEL: &str = "scylla/node-maintenance";

pub const LABEL_VALUE_TRUE: &str = "true";
pub const LABEL_VALUE_FALSE: &str = "false";

pub const CLUSTER_NAME_LABEL: &str = "scylla/cluster";
pub const DATACENTER_NAME_LABEL: &str = "scylla/datacenter";
pub const RACK_NAME_LABEL: &str = "scylla/rack";
pub const MULTI_DC_SEED_LABEL: &str = "scylla/multi-dc-seed";

pub const APP_LABEL: &str = "app";
pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

pub const APP_NAME: &str = "scylla";
pub const OPERATOR_APP_NAME: &str = "scylla-operator";

/// Labels carried by every object of a cluster.
pub fn cluster_labels(cluster: &ScyllaCluster) -> BTreeMap<String, String> {
    let name = cluster.metadata.name.as_deref().unwrap_or_default();
    BTreeMap::from([
        (APP_LABEL.to_string(), APP_NAME.to_string()),
        (APP_NAME_LABEL.to_string(), APP_NAME.to_string()),
        (MANAGED_BY_LABEL.to_string(), OPERATOR_APP_NAME.to_string()),
        (CLUSTER_NAME_LABEL.to_string(), name.to_string()),
    ])
}

/// Labels carried by every object of the cluster's datacenter.
pub fn datacenter_labels(cluster: &ScyllaCluster) -> BTreeMap<String, String> {
    let mut labels = cluster_labels(cluster);
    labels.insert(
        DATACENTER_NAME_LABEL.to_string(),
        cluster.spec.datacenter.name.clone(),
    );
    labels
}

/// Labels selecting the pods and member Services of one rack.
pub fn rack_labels(cluster: &ScyllaCluster, rack: &str) -> BTreeMap<String, String> {
    let mut labels = datacenter_labels(cluster);
    labels.insert(RACK_NAME_LABEL.to_string(), rack.to_string());
    labels
}

/// Renders labels as a Kubernetes equality selector (`k=v,k=v`).
pub fn selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
