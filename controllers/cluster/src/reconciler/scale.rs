//! Scale-down and cleanup of members past a rack's member count.
//!
//! Members are removed one at a time, highest ordinal first:
//! 1. the controller requests decommission on the member's identity record
//! 2. the member's agent decommissions the node and marks the request finished
//! 3. the StatefulSet is scaled down and the pod goes away
//! 4. the identity record is deleted here
//!
//! The controller never waits for steps 2 and 3; it observes them on later passes.

use std::collections::{BTreeMap, BTreeSet};

use crds::intent;
use crds::labels::SEED_LABEL;
use crds::naming::{index_from_name, member_service_name};
use crds::{Actor, Intent, MemberIntents, Phase, ProtocolViolation, RackSpec, Workflow};
use member_store::{PodRecord, ServiceRecord, StoreError};
use tracing::{debug, info, warn};

use super::{OperationResult, Pass, ReconcileReport, Reconciler};
use crate::error::ControllerError;

/// Drives decommission of excess members of `rack` and deletes finished ones.
///
/// Returns the members whose decommission is requested but not finished.
pub(crate) async fn sync_scale_down(
    reconciler: &Reconciler,
    pass: &Pass<'_>,
    rack: &RackSpec,
    pods: &[PodRecord],
    services: &BTreeMap<String, ServiceRecord>,
    report: &mut ReconcileReport,
) -> Result<Vec<String>, ControllerError> {
    let ordinals: BTreeMap<i32, &PodRecord> = pods
        .iter()
        .filter_map(|pod| index_from_name(&pod.name).ok().map(|o| (o, pod)))
        .collect();

    if let Some((&ordinal, pod)) = ordinals.range(rack.members..).next_back() {
        let remaining_seeds = remaining_seeds(pods, &pod.name, services);
        request_decommission(reconciler, pass, rack, pod, ordinal, remaining_seeds, services, report).await?;
    }

    let pod_names: BTreeSet<&str> = pods.iter().map(|p| p.name.as_str()).collect();
    cleanup(reconciler, pass, rack, &pod_names, services, report).await?;

    let mut decommissioning: Vec<String> = services
        .values()
        .filter(|s| MemberIntents::decode(&s.labels).decommission == Phase::Requested)
        .map(|s| s.name.clone())
        .collect();
    // Requests issued in this pass are not in the snapshot yet.
    if let Some(requested) = report.racks.get(&rack.name).map(|r| r.decommissioning.clone()) {
        decommissioning.extend(requested);
    }
    decommissioning.sort();
    decommissioning.dedup();
    Ok(decommissioning)
}

/// Counts the present members other than `target` whose identity record is a seed.
fn remaining_seeds(pods: &[PodRecord], target: &str, services: &BTreeMap<String, ServiceRecord>) -> usize {
    pods.iter()
        .filter(|pod| pod.name != target)
        .filter_map(|pod| services.get(&member_service_name(&pod.name)))
        .filter(|service| service.label(SEED_LABEL).is_some())
        .count()
}

#[allow(clippy::too_many_arguments, reason = "one call site, all borrowed pass state")]
async fn request_decommission(
    reconciler: &Reconciler,
    pass: &Pass<'_>,
    rack: &RackSpec,
    pod: &PodRecord,
    ordinal: i32,
    remaining_seeds: usize,
    services: &BTreeMap<String, ServiceRecord>,
    report: &mut ReconcileReport,
) -> Result<(), ControllerError> {
    let name = member_service_name(&pod.name);
    report.pending = true;

    let Some(service) = services.get(&name) else {
        warn!(rack = %rack.name, member = %name, ordinal, "Excess member has no identity record, cannot request decommission");
        return Ok(());
    };

    match MemberIntents::decode(&service.labels).decommission {
        Phase::Requested => {
            debug!(rack = %rack.name, member = %name, "Waiting for member to decommission");
            return Ok(());
        }
        Phase::Finished => {
            debug!(rack = %rack.name, member = %name, "Member decommissioned, waiting for pod removal");
            return Ok(());
        }
        Phase::NotRequested => {}
    }

    if service.label(SEED_LABEL).is_some() && remaining_seeds == 0 {
        let violation = ProtocolViolation::LastSeed {
            member: name.clone(),
            rack: rack.name.clone(),
        };
        warn!(cluster = pass.name, error = %violation, "Refusing to request decommission");
        reconciler
            .metrics
            .protocol_violations_total
            .with_label_values(&["last_seed"])
            .inc();
        report.violations.push(violation);
        return Ok(());
    }

    let request = Intent::Request(Workflow::Decommission);
    let (_, op) = reconciler
        .upsert_service(pass, &name, Some(service), |existing| {
            let mut record = existing
                .cloned()
                .ok_or_else(|| StoreError::NotFound(name.clone()))?;
            intent::apply(&mut record.labels, Actor::Controller, &request)?;
            Ok(record)
        })
        .await
        .map_err(|e| e.for_member(&name))?;

    if op != OperationResult::Unchanged {
        report.writes += 1;
        info!(cluster = pass.name, rack = %rack.name, member = %name, "Decommission requested");
        report
            .racks
            .entry(rack.name.clone())
            .or_default()
            .decommissioning
            .push(name);
    }
    Ok(())
}

/// Deletes identity records of members that finished decommission and whose pod is gone.
async fn cleanup(
    reconciler: &Reconciler,
    pass: &Pass<'_>,
    rack: &RackSpec,
    pod_names: &BTreeSet<&str>,
    services: &BTreeMap<String, ServiceRecord>,
    report: &mut ReconcileReport,
) -> Result<(), ControllerError> {
    for service in services.values() {
        let Ok(ordinal) = index_from_name(&service.name) else {
            continue;
        };
        let finished = MemberIntents::decode(&service.labels).decommission == Phase::Finished;
        if ordinal < rack.members || !finished || pod_names.contains(service.name.as_str()) {
            continue;
        }

        reconciler
            .delete_service(pass, &service.name)
            .await
            .map_err(|e| e.for_member(&service.name))?;
        report.writes += 1;
    }
    Ok(())
}

#[cfg(test)]
#[path = "scale_test.rs"]
mod scale_test;
