//! Unit tests for member identity records

use super::*;
use crate::test_utils::*;
use crds::fixtures::{multi_rack_cluster, single_rack_cluster};
use crds::labels::{DECOMMISSION_LABEL, IP_LABEL, RACK_NAME_LABEL, REPLACE_LABEL, SEED_LABEL};
use member_store::Write;

fn rack_services(store: &member_store::MockMemberStore, rack: &str) -> Vec<ServiceRecord> {
    store
        .services(TEST_NAMESPACE)
        .into_iter()
        .filter(|s| s.label(RACK_NAME_LABEL) == Some(rack))
        .collect()
}

#[test]
fn test_member_record_for_new_pod() {
    let cluster = single_rack_cluster(3);
    let rack = &cluster.spec.datacenter.racks[0];
    let pod = create_test_pod(&cluster, "test-rack", 1);

    let record = member_record(None, &cluster, rack, &pod, 1).unwrap();

    assert_eq!(record.name, "test-cluster-test-dc-test-rack-1");
    assert_eq!(record.label(SEED_LABEL), Some("true"));
    assert_eq!(record.label(IP_LABEL), Some("10.0.0.2"));
    assert_eq!(record.label(RACK_NAME_LABEL), Some("test-rack"));
    assert_eq!(record.selector[POD_NAME_LABEL], pod.name);
    assert_eq!(record.ports.len(), MEMBER_PORTS.len());
    assert!(record.ports.iter().any(|p| p.name == "cql" && p.port == 9042));

    let owner = record.owner.expect("owner is set");
    assert_eq!(owner.kind, "ScyllaCluster");
    assert_eq!(owner.uid, "test-cluster-uid");
}

#[test]
fn test_member_record_drops_seed_flag_past_seed_ordinals() {
    let cluster = single_rack_cluster(3);
    let rack = &cluster.spec.datacenter.racks[0];
    let pod = create_test_pod(&cluster, "test-rack", 2);
    let mut existing = member_record(None, &cluster, rack, &pod, 2).unwrap();
    existing.labels.insert(SEED_LABEL.to_string(), "true".to_string());

    let record = member_record(Some(&existing), &cluster, rack, &pod, 2).unwrap();
    assert_eq!(record.label(SEED_LABEL), None);
}

#[tokio::test]
async fn test_seeds_per_rack_are_capped_at_two() {
    let cluster = multi_rack_cluster(&[0, 1, 2, 5]);
    let (reconciler, store) = create_test_reconciler();
    for rack in &cluster.spec.datacenter.racks {
        add_rack_pods(&store, &cluster, &rack.name, rack.members);
    }

    let report = reconciler.reconcile_cluster(&cluster).await.unwrap();
    assert_eq!(report.writes, 8);

    for (rack, members, seeds) in [("rack-0", 0, 0), ("rack-1", 1, 1), ("rack-2", 2, 2), ("rack-3", 5, 2)] {
        let services = rack_services(&store, rack);
        assert_eq!(services.len(), members, "members of {rack}");
        let seeded: Vec<_> = services.iter().filter(|s| s.label(SEED_LABEL).is_some()).collect();
        assert_eq!(seeded.len(), seeds, "seeds of {rack}");
        for service in seeded {
            let ordinal = index_from_name(&service.name).unwrap();
            assert!(ordinal < 2, "{} is a seed", service.name);
        }
        assert_eq!(report.racks[rack].seeds, i32::try_from(seeds).unwrap());
    }
}

#[tokio::test]
async fn test_second_pass_writes_nothing() {
    let cluster = single_rack_cluster(3);
    let (reconciler, store) = create_test_reconciler();
    add_rack_pods(&store, &cluster, "test-rack", 3);

    reconciler.reconcile_cluster(&cluster).await.unwrap();
    assert_eq!(store.write_count(), 3);
    store.clear_writes();

    let report = reconciler.reconcile_cluster(&cluster).await.unwrap();
    assert_eq!(report.writes, 0);
    assert_eq!(store.write_count(), 0);
    assert!(!report.pending);
}

#[tokio::test]
async fn test_pods_past_member_count_get_no_record() {
    let cluster = single_rack_cluster(2);
    let (reconciler, store) = create_test_reconciler();
    add_rack_pods(&store, &cluster, "test-rack", 2);
    store.add_pod(TEST_NAMESPACE, create_test_pod(&cluster, "test-rack", 2));

    let report = reconciler.reconcile_cluster(&cluster).await.unwrap();

    assert_eq!(report.racks["test-rack"].members, 2);
    assert!(store.service(TEST_NAMESPACE, &pod_name(&cluster, "test-rack", 2)).is_none());
}

#[tokio::test]
async fn test_empty_pod_address_keeps_recorded_address() {
    let cluster = single_rack_cluster(1);
    let (reconciler, store) = create_test_reconciler();
    add_rack_pods(&store, &cluster, "test-rack", 1);
    reconciler.reconcile_cluster(&cluster).await.unwrap();
    store.clear_writes();

    let mut pod = create_test_pod(&cluster, "test-rack", 0);
    pod.address = None;
    store.add_pod(TEST_NAMESPACE, pod);
    let report = reconciler.reconcile_cluster(&cluster).await.unwrap();

    let service = store.service(TEST_NAMESPACE, &pod_name(&cluster, "test-rack", 0)).unwrap();
    assert_eq!(service.label(IP_LABEL), Some("10.0.0.1"));
    assert_eq!(report.writes, 0);
}

#[tokio::test]
async fn test_conflicting_agent_write_survives_retry() {
    let cluster = single_rack_cluster(1);
    let (reconciler, store) = create_test_reconciler();
    add_rack_pods(&store, &cluster, "test-rack", 1);
    reconciler.reconcile_cluster(&cluster).await.unwrap();
    store.clear_writes();

    let name = pod_name(&cluster, "test-rack", 0);
    let mut pod = create_test_pod(&cluster, "test-rack", 0);
    pod.address = Some("10.0.1.1".to_string());
    store.add_pod(TEST_NAMESPACE, pod);
    store.set_service_label(TEST_NAMESPACE, &name, REPLACE_LABEL, "false");
    store.race_next_replace(&name, REPLACE_LABEL, "true");

    reconciler.reconcile_cluster(&cluster).await.unwrap();

    let service = store.service(TEST_NAMESPACE, &name).unwrap();
    assert_eq!(service.label(IP_LABEL), Some("10.0.1.1"));
    assert_eq!(service.label(REPLACE_LABEL), Some("true"));
    assert_eq!(store.writes(), [Write::Replace(name)]);
}

#[tokio::test]
async fn test_finished_decommission_flag_is_preserved() {
    let cluster = single_rack_cluster(2);
    let (reconciler, store) = create_test_reconciler();
    add_rack_pods(&store, &cluster, "test-rack", 2);
    reconciler.reconcile_cluster(&cluster).await.unwrap();

    let name = pod_name(&cluster, "test-rack", 1);
    store.set_service_label(TEST_NAMESPACE, &name, DECOMMISSION_LABEL, "true");
    let mut pod = create_test_pod(&cluster, "test-rack", 1);
    pod.address = Some("10.0.1.2".to_string());
    store.add_pod(TEST_NAMESPACE, pod);

    reconciler.reconcile_cluster(&cluster).await.unwrap();

    let service = store.service(TEST_NAMESPACE, &name).unwrap();
    assert_eq!(service.label(IP_LABEL), Some("10.0.1.2"));
    assert_eq!(service.label(DECOMMISSION_LABEL), Some("true"));
}

#[tokio::test]
async fn test_persistent_conflicts_give_up() {
    let cluster = single_rack_cluster(1);
    let (reconciler, store) = create_test_reconciler();
    add_rack_pods(&store, &cluster, "test-rack", 1);
    reconciler.reconcile_cluster(&cluster).await.unwrap();

    let name = pod_name(&cluster, "test-rack", 0);
    let mut pod = create_test_pod(&cluster, "test-rack", 0);
    pod.address = Some("10.0.1.1".to_string());
    store.add_pod(TEST_NAMESPACE, pod);
    // One racing agent write per attempt.
    for _ in 0..=reconciler.config.conflict_retries {
        store.race_next_replace(&name, REPLACE_LABEL, "false");
    }

    let err = reconciler.reconcile_cluster(&cluster).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("test-rack"));
}
