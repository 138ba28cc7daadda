//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use std::sync::Arc;

use crds::ScyllaCluster;
use crds::labels::rack_labels;
use crds::naming::rack_stateful_set_name;
use member_store::{MockMemberStore, PodRecord};

use crate::config::ControllerConfig;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;

pub const TEST_NAMESPACE: &str = "test-ns";

/// Helper to create a reconciler over a fresh mock store
pub fn create_test_reconciler() -> (Reconciler, MockMemberStore) {
    let config = ControllerConfig::default();
    let store = MockMemberStore::new();
    let metrics = Metrics::new().expect("metrics register");
    let reconciler = Reconciler::new(store.clone(), Arc::new(config), Arc::new(metrics));
    (reconciler, store)
}

/// Name of the pod with `ordinal` in `rack` of `cluster`
pub fn pod_name(cluster: &ScyllaCluster, rack: &str, ordinal: i32) -> String {
    let set = rack_stateful_set_name(
        cluster.metadata.name.as_deref().unwrap_or_default(),
        &cluster.spec.datacenter.name,
        rack,
    );
    format!("{set}-{ordinal}")
}

/// Helper to create a ready pod of `rack` with a derived address
pub fn create_test_pod(cluster: &ScyllaCluster, rack: &str, ordinal: i32) -> PodRecord {
    PodRecord {
        name: pod_name(cluster, rack, ordinal),
        labels: rack_labels(cluster, rack),
        address: Some(format!("10.0.0.{}", ordinal + 1)),
        ready: true,
    }
}

/// Adds ready pods with ordinals `0..count` to `rack`
pub fn add_rack_pods(store: &MockMemberStore, cluster: &ScyllaCluster, rack: &str, count: i32) {
    for ordinal in 0..count {
        store.add_pod(TEST_NAMESPACE, create_test_pod(cluster, rack, ordinal));
    }
}
