//! Member identity records.
//!
//! Every pod of a rack whose ordinal is below the rack's member count gets a
//! Service named after the pod. The Service gives the member a stable address
//! and carries its intent labels. Pods past the member count are left to the
//! scale-down step and never get a record here.

use std::collections::BTreeMap;

use crds::intent::{self, is_seed_ordinal};
use crds::labels::rack_labels;
use crds::naming::{index_from_name, member_service_name};
use crds::{Actor, Intent, RackSpec, ScyllaCluster};
use kube::Resource;
use member_store::{OwnerRef, PodRecord, ServicePort, ServiceRecord};
use tracing::{debug, info, warn};

use super::{Member, OperationResult, Pass, ReconcileReport, Reconciler};
use crate::error::ControllerError;

/// Label set by the StatefulSet controller on each of its pods.
pub const POD_NAME_LABEL: &str = "statefulset.kubernetes.io/pod-name";

/// Ports exposed on member Services.
pub const MEMBER_PORTS: &[(&str, i32)] = &[
    ("inter-node", 7000),
    ("inter-node-ssl", 7001),
    ("jmx", 7199),
    ("cql", 9042),
    ("cql-ssl", 9142),
    ("prometheus", 9180),
    ("agent-api", 10001),
];

pub(crate) fn ports(ports: &[(&str, i32)]) -> Vec<ServicePort> {
    ports
        .iter()
        .map(|(name, port)| ServicePort {
            name: (*name).to_string(),
            port: *port,
        })
        .collect()
}

/// Controller owner reference pointing at `cluster`.
pub(crate) fn owner_ref(cluster: &ScyllaCluster) -> Option<OwnerRef> {
    cluster.controller_owner_ref(&()).map(|r| OwnerRef {
        api_version: r.api_version,
        kind: r.kind,
        name: r.name,
        uid: r.uid,
    })
}

/// Identity record of `pod`, merged onto `existing` when there is one.
///
/// Ownership labels and the seed flag are recomputed. The address is only
/// refreshed when the pod reports one. Every other label, in particular
/// agent-written completion flags, is carried over untouched.
pub fn member_record(
    existing: Option<&ServiceRecord>,
    cluster: &ScyllaCluster,
    rack: &RackSpec,
    pod: &PodRecord,
    ordinal: i32,
) -> Result<ServiceRecord, ControllerError> {
    let mut record = existing.cloned().unwrap_or_else(|| ServiceRecord {
        name: member_service_name(&pod.name),
        ..Default::default()
    });

    record.labels.extend(rack_labels(cluster, &rack.name));
    let seed = Intent::Seed(is_seed_ordinal(ordinal, rack.members));
    intent::apply(&mut record.labels, Actor::Controller, &seed)?;
    let address = Intent::Address(pod.address.clone().unwrap_or_default());
    intent::apply(&mut record.labels, Actor::Controller, &address)?;

    record.selector = BTreeMap::from([(POD_NAME_LABEL.to_string(), pod.name.clone())]);
    record.ports = ports(MEMBER_PORTS);
    record.owner = owner_ref(cluster);
    Ok(record)
}

/// Creates or updates the identity record of every in-range pod of `rack`.
///
/// `services` is the rack's Services as listed at the start of the pass.
pub(crate) async fn sync_members(
    reconciler: &Reconciler,
    pass: &Pass<'_>,
    rack: &RackSpec,
    pods: &[PodRecord],
    services: &BTreeMap<String, ServiceRecord>,
    report: &mut ReconcileReport,
) -> Result<Vec<Member>, ControllerError> {
    let mut members = Vec::with_capacity(pods.len());

    for pod in pods {
        let ordinal = match index_from_name(&pod.name) {
            Ok(ordinal) => ordinal,
            Err(e) => {
                warn!(rack = %rack.name, pod = %pod.name, error = %e, "Skipping pod without ordinal");
                continue;
            }
        };
        if ordinal >= rack.members {
            debug!(
                rack = %rack.name,
                pod = %pod.name,
                ordinal,
                members = rack.members,
                "Member service not synced as index is past the member count"
            );
            continue;
        }

        let name = member_service_name(&pod.name);
        let (service, op) = reconciler
            .upsert_service(pass, &name, services.get(&name), |existing| {
                member_record(existing, pass.cluster, rack, pod, ordinal)
            })
            .await
            .map_err(|e| e.for_member(&name))?;

        match op {
            OperationResult::Created => info!(cluster = pass.name, member = %name, labels = ?service.labels, "Member service created"),
            OperationResult::Updated => info!(cluster = pass.name, member = %name, labels = ?service.labels, "Member service updated"),
            OperationResult::Unchanged => {}
        }
        if op != OperationResult::Unchanged {
            report.writes += 1;
        }

        members.push(Member {
            ordinal,
            ready: pod.ready,
            service,
        });
    }

    members.sort_by_key(|m| m.ordinal);
    Ok(members)
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod identity_test;
