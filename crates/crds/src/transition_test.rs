//! Unit tests for spec transitions

use super::*;
use crate::cluster::ScyllaCluster;
use crate::fixtures::{detailed_single_rack_cluster, rack, single_rack_cluster};
use crate::rack::PlacementSpec;

fn with_version(version: &str) -> ScyllaCluster {
    detailed_single_rack_cluster("test-cluster", "test-ns", "repo", version, "test-dc", "test-rack", 3)
}

fn placement_changed(mut c: ScyllaCluster) -> ScyllaCluster {
    c.spec.datacenter.racks[0].placement = Some(PlacementSpec::default());
    c
}

fn resources_changed(mut c: ScyllaCluster) -> ScyllaCluster {
    c.spec.datacenter.racks[0]
        .resources
        .requests
        .insert("cpu".to_string(), "1000m".to_string());
    c
}

fn rack_deleted(mut c: ScyllaCluster) -> ScyllaCluster {
    c.spec.datacenter.racks.clear();
    c
}

fn storage_changed(mut c: ScyllaCluster) -> ScyllaCluster {
    c.spec.datacenter.racks[0].storage.capacity = "15Gi".to_string();
    c
}

#[test]
fn test_check_transitions() {
    let cases = [
        ("same as old", single_rack_cluster(3), true),
        ("major version changed", with_version("3.3.1"), true),
        ("minor version changed", with_version("2.4.2"), true),
        ("patch version changed", with_version("2.3.2"), true),
        (
            "repository changed",
            detailed_single_rack_cluster("test-cluster", "test-ns", "new-repo", "2.3.1", "test-dc", "test-rack", 3),
            true,
        ),
        (
            "dcName changed",
            detailed_single_rack_cluster("test-cluster", "test-ns", "repo", "2.3.1", "new-dc", "test-rack", 3),
            false,
        ),
        ("rackPlacement changed", placement_changed(single_rack_cluster(3)), false),
        ("rackStorage changed", storage_changed(single_rack_cluster(3)), false),
        ("rackResources changed", resources_changed(single_rack_cluster(3)), false),
        ("rack deleted", rack_deleted(single_rack_cluster(3)), false),
    ];

    let old = single_rack_cluster(3);
    for (name, new, allowed) in cases {
        let result = validate_transition(&old.spec, &new.spec);
        assert_eq!(result.is_ok(), allowed, "{name}: unexpected result {result:?}");
    }
}

#[test]
fn test_violation_names_offending_field() {
    let old = single_rack_cluster(3);

    let err = validate_transition(&old.spec, &storage_changed(single_rack_cluster(3)).spec)
        .expect_err("storage change must be rejected");
    assert_eq!(err.field_path(), "spec.datacenter.racks[test-rack].storage");

    let err = validate_transition(
        &old.spec,
        &detailed_single_rack_cluster("test-cluster", "test-ns", "repo", "2.3.1", "new-dc", "test-rack", 3).spec,
    )
    .expect_err("datacenter rename must be rejected");
    assert_eq!(err.field_path(), "spec.datacenter.name");

    let err = validate_transition(&old.spec, &rack_deleted(single_rack_cluster(3)).spec)
        .expect_err("rack removal must be rejected");
    assert_eq!(
        err,
        TransitionError::RackRemoved {
            rack: "test-rack".to_string()
        }
    );
}

#[test]
fn test_rack_addition_allowed() {
    let old = single_rack_cluster(3);
    let mut new = single_rack_cluster(3);
    new.spec.datacenter.racks.push(rack("second-rack", 2));

    assert_eq!(validate_transition(&old.spec, &new.spec), Ok(()));
}

#[test]
fn test_scale_out_allowed() {
    let old = single_rack_cluster(3);
    let new = single_rack_cluster(5);
    assert_eq!(validate_transition(&old.spec, &new.spec), Ok(()));
}

#[test]
fn test_scale_down_follows_policy() {
    let old = single_rack_cluster(3);
    let new = single_rack_cluster(2);

    let rejected = TransitionGuard::new(ScaleDownPolicy::Reject).validate_transition(&old.spec, &new.spec);
    assert_eq!(
        rejected,
        Err(TransitionError::ScaleDown {
            path: "spec.datacenter.racks[test-rack].members".to_string(),
            old: 3,
            new: 2,
        })
    );

    let allowed = TransitionGuard::new(ScaleDownPolicy::Allow).validate_transition(&old.spec, &new.spec);
    assert_eq!(allowed, Ok(()));
}

#[test]
fn test_renamed_rack_counts_as_removal() {
    let old = single_rack_cluster(3);
    let mut new = single_rack_cluster(3);
    new.spec.datacenter.racks[0].name = "renamed".to_string();

    assert!(matches!(
        validate_transition(&old.spec, &new.spec),
        Err(TransitionError::RackRemoved { .. })
    ));
}

#[test]
fn test_task_lists_are_mutable() {
    let old = single_rack_cluster(3);
    let mut new = single_rack_cluster(3);
    new.spec.repairs.push(Default::default());
    new.spec.backups.push(Default::default());

    assert_eq!(validate_transition(&old.spec, &new.spec), Ok(()));
}

#[test]
fn test_every_rack_field_is_covered() {
    // Guards against a new RackSpec field slipping past the table.
    let fields: Vec<_> = RACK_FIELDS.iter().map(|r| r.field).collect();
    assert_eq!(fields, ["members", "placement", "storage", "resources"]);
}
