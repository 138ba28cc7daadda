//! Cluster status derived from a reconcile pass.

use chrono::{DateTime, Utc};
use crds::intent::effective_readiness;
use crds::labels::SEED_LABEL;
use crds::{ClusterCondition, ConditionStatus, ConditionType, RackStatus, ScyllaCluster, ScyllaClusterStatus};

use super::{Member, ReconcileReport};

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Member accounting of one rack.
pub(crate) fn rack_status(members: &[Member], decommissioning: Vec<String>) -> RackStatus {
    RackStatus {
        members: count(members.len()),
        ready_members: count(
            members
                .iter()
                .filter(|m| effective_readiness(m.ready, &m.service.labels))
                .count(),
        ),
        seeds: count(
            members
                .iter()
                .filter(|m| m.service.label(SEED_LABEL).is_some())
                .count(),
        ),
        decommissioning,
    }
}

fn condition(
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: Option<String>,
    now: DateTime<Utc>,
) -> ClusterCondition {
    ClusterCondition {
        type_,
        status,
        reason: Some(reason.to_string()),
        message,
        last_transition_time: Some(now),
    }
}

/// Status of `cluster` after a pass that produced `report`.
///
/// Starts from the stored status so conditions keep their transition time
/// while their status does not flip. An invalid spec only updates the
/// `SpecValid` condition; the rest of the status stays as last observed.
pub fn cluster_status(cluster: &ScyllaCluster, report: &ReconcileReport, now: DateTime<Utc>) -> ScyllaClusterStatus {
    let mut status = cluster.status.clone().unwrap_or_default();

    if let Some(e) = &report.spec_error {
        status.set_condition(condition(
            ConditionType::SpecValid,
            ConditionStatus::False,
            "InvalidSpec",
            Some(e.to_string()),
            now,
        ));
        return status;
    }

    status.set_condition(condition(ConditionType::SpecValid, ConditionStatus::True, "Valid", None, now));
    status.racks.clone_from(&report.racks);
    status.observed_generation = cluster.metadata.generation;

    let complete = cluster
        .spec
        .datacenter
        .racks
        .iter()
        .all(|rack| report.racks.get(&rack.name).is_some_and(|r| r.members >= rack.members));
    status.set_condition(if complete && !report.pending {
        condition(ConditionType::Available, ConditionStatus::True, "MembersSynced", None, now)
    } else {
        condition(ConditionType::Available, ConditionStatus::False, "Progressing", None, now)
    });

    status.set_condition(if report.violations.is_empty() {
        condition(ConditionType::ProtocolViolation, ConditionStatus::False, "None", None, now)
    } else {
        let message = report
            .violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        condition(ConditionType::ProtocolViolation, ConditionStatus::True, "IntentRefused", Some(message), now)
    });

    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::Member;
    use chrono::TimeZone;
    use crds::fixtures::single_rack_cluster;
    use crds::labels::MAINTENANCE_LABEL;
    use crds::{ProtocolViolation, ValidationError};
    use member_store::ServiceRecord;
    use std::collections::BTreeMap;

    fn member(ordinal: i32, ready: bool, labels: &[(&str, &str)]) -> Member {
        Member {
            ordinal,
            ready,
            service: ServiceRecord {
                name: format!("m-{ordinal}"),
                labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                ..Default::default()
            },
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    #[test]
    fn test_rack_status_counts_maintenance_as_unready() {
        let members = [
            member(0, true, &[(SEED_LABEL, "true")]),
            member(1, true, &[(SEED_LABEL, "true"), (MAINTENANCE_LABEL, "")]),
            member(2, false, &[]),
        ];

        let status = rack_status(&members, vec!["m-3".to_string()]);
        assert_eq!(status.members, 3);
        assert_eq!(status.ready_members, 1);
        assert_eq!(status.seeds, 2);
        assert_eq!(status.decommissioning, ["m-3"]);
    }

    #[test]
    fn test_converged_cluster_is_available() {
        let cluster = single_rack_cluster(1);
        let report = ReconcileReport {
            racks: BTreeMap::from([(
                "test-rack".to_string(),
                RackStatus {
                    members: 1,
                    ready_members: 1,
                    seeds: 1,
                    decommissioning: Vec::new(),
                },
            )]),
            ..Default::default()
        };

        let status = cluster_status(&cluster, &report, at(10));
        let available = status.condition(ConditionType::Available).unwrap();
        assert_eq!(available.status, ConditionStatus::True);
        assert_eq!(status.condition(ConditionType::SpecValid).unwrap().status, ConditionStatus::True);
        assert_eq!(status.observed_generation, Some(1));
        assert_eq!(status.racks["test-rack"].members, 1);
    }

    #[test]
    fn test_pending_cluster_is_not_available() {
        let cluster = single_rack_cluster(2);
        let report = ReconcileReport {
            pending: true,
            ..Default::default()
        };

        let status = cluster_status(&cluster, &report, at(10));
        assert_eq!(status.condition(ConditionType::Available).unwrap().status, ConditionStatus::False);
    }

    #[test]
    fn test_invalid_spec_keeps_previous_status() {
        let mut cluster = single_rack_cluster(1);
        let converged = ReconcileReport::default();
        cluster.status = Some(cluster_status(&cluster, &converged, at(10)));

        let report = ReconcileReport {
            spec_error: Some(ValidationError::DuplicateRackName("test-rack".to_string())),
            ..Default::default()
        };
        let status = cluster_status(&cluster, &report, at(20));

        let spec_valid = status.condition(ConditionType::SpecValid).unwrap();
        assert_eq!(spec_valid.status, ConditionStatus::False);
        assert!(spec_valid.message.as_deref().unwrap().contains("test-rack"));
        assert_eq!(spec_valid.last_transition_time, Some(at(20)));
        assert_eq!(
            status.condition(ConditionType::Available),
            cluster.status.as_ref().unwrap().condition(ConditionType::Available)
        );
    }

    #[test]
    fn test_violation_condition_keeps_transition_time() {
        let mut cluster = single_rack_cluster(1);
        let report = ReconcileReport {
            violations: vec![ProtocolViolation::LastSeed {
                member: "m-2".to_string(),
                rack: "test-rack".to_string(),
            }],
            ..Default::default()
        };
        cluster.status = Some(cluster_status(&cluster, &report, at(10)));

        let status = cluster_status(&cluster, &report, at(20));
        let violation = status.condition(ConditionType::ProtocolViolation).unwrap();
        assert_eq!(violation.status, ConditionStatus::True);
        assert_eq!(violation.last_transition_time, Some(at(10)));
        assert!(violation.message.as_deref().unwrap().contains("m-2"));
        assert_eq!(status, *cluster.status.as_ref().unwrap());
    }
}
