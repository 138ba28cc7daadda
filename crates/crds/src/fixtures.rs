//! Cluster fixtures for unit tests.

use std::collections::BTreeMap;

use kube::api::ObjectMeta;

use crate::cluster::{DatacenterSpec, NetworkSpec, ScyllaCluster, ScyllaClusterSpec};
use crate::rack::{RackSpec, ResourceRequirements, StorageSpec};

/// A rack with the given member count and default storage.
pub fn rack(name: &str, members: i32) -> RackSpec {
    RackSpec {
        name: name.to_string(),
        members,
        placement: None,
        storage: StorageSpec {
            capacity: "5Gi".to_string(),
            storage_class_name: None,
        },
        resources: ResourceRequirements {
            limits: BTreeMap::from([
                ("cpu".to_string(), "1".to_string()),
                ("memory".to_string(), "1Gi".to_string()),
            ]),
            requests: BTreeMap::new(),
        },
    }
}

/// Fully parameterised single-rack cluster.
pub fn detailed_single_rack_cluster(
    name: &str,
    namespace: &str,
    repository: &str,
    version: &str,
    datacenter: &str,
    rack_name: &str,
    members: i32,
) -> ScyllaCluster {
    cluster_with_racks(name, namespace, repository, version, datacenter, vec![rack(rack_name, members)])
}

/// `test-cluster` in `test-ns` running 2.3.1 with one rack `test-rack`.
pub fn single_rack_cluster(members: i32) -> ScyllaCluster {
    detailed_single_rack_cluster(
        "test-cluster",
        "test-ns",
        "repo",
        "2.3.1",
        "test-dc",
        "test-rack",
        members,
    )
}

/// `test-cluster` with one rack per entry of `members`, named `rack-{index}`.
pub fn multi_rack_cluster(members: &[i32]) -> ScyllaCluster {
    let racks = members
        .iter()
        .enumerate()
        .map(|(i, m)| rack(&format!("rack-{i}"), *m))
        .collect();
    cluster_with_racks("test-cluster", "test-ns", "repo", "2.3.1", "test-dc", racks)
}

fn cluster_with_racks(
    name: &str,
    namespace: &str,
    repository: &str,
    version: &str,
    datacenter: &str,
    racks: Vec<RackSpec>,
) -> ScyllaCluster {
    ScyllaCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{name}-uid")),
            generation: Some(1),
            ..Default::default()
        },
        spec: ScyllaClusterSpec {
            version: version.to_string(),
            repository: Some(repository.to_string()),
            agent_version: None,
            developer_mode: true,
            cpuset: false,
            automatic_orphaned_node_cleanup: false,
            network: NetworkSpec::default(),
            datacenter: DatacenterSpec {
                name: datacenter.to_string(),
                racks,
            },
            repairs: Vec::new(),
            backups: Vec::new(),
            multi_dc_cluster: None,
        },
        status: None,
    }
}
