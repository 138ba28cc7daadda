//! Seed Services for remote datacenters.
//!
//! Each configured remote seed address is published as a selector-less
//! Service so members can resolve it like a local member. The configured
//! host networking is not re-checked here; validation already requires it.

use std::collections::BTreeMap;

use crds::labels::{IP_LABEL, LABEL_VALUE_TRUE, MULTI_DC_SEED_LABEL, datacenter_labels, selector};
use crds::naming::multi_dc_seed_service_name;
use crds::ScyllaCluster;
use member_store::{ServiceRecord, with_deadline};
use tracing::info;

use super::identity::{owner_ref, ports};
use super::{OperationResult, Pass, ReconcileReport, Reconciler};
use crate::error::ControllerError;

/// Ports reachable on a remote seed.
pub const SEED_PORTS: &[(&str, i32)] = &[("inter-node", 7000), ("inter-node-ssl", 7001)];

/// Labels carried by the seed Services of the cluster's datacenter.
fn seed_labels(cluster: &ScyllaCluster) -> BTreeMap<String, String> {
    let mut labels = datacenter_labels(cluster);
    labels.insert(MULTI_DC_SEED_LABEL.to_string(), LABEL_VALUE_TRUE.to_string());
    labels
}

/// Seed Service for `seed`, merged onto `existing`.
pub fn seed_record(existing: Option<&ServiceRecord>, cluster: &ScyllaCluster, name: &str, seed: &str) -> ServiceRecord {
    let mut record = existing.cloned().unwrap_or_else(|| ServiceRecord {
        name: name.to_string(),
        ..Default::default()
    });
    record.labels.extend(seed_labels(cluster));
    record.labels.insert(IP_LABEL.to_string(), seed.to_string());
    record.selector.clear();
    record.ports = ports(SEED_PORTS);
    record.owner = owner_ref(cluster);
    record
}

/// Publishes one Service per remote seed and removes Services of seeds no longer listed.
pub(crate) async fn sync_multi_dc_seeds(
    reconciler: &Reconciler,
    pass: &Pass<'_>,
    report: &mut ReconcileReport,
) -> Result<(), ControllerError> {
    let cluster = pass.cluster;
    let seeds = cluster.spec.multi_dc_seeds();
    let existing: BTreeMap<String, ServiceRecord> = with_deadline(
        pass.deadline,
        "list services",
        reconciler.store.list_services(pass.namespace, &selector(&seed_labels(cluster))),
    )
    .await?
    .into_iter()
    .map(|s| (s.name.clone(), s))
    .collect();

    let mut wanted = Vec::with_capacity(seeds.len());
    for (index, seed) in seeds.iter().enumerate() {
        let name = multi_dc_seed_service_name(pass.name, &cluster.spec.datacenter.name, index);
        let (_, op) = reconciler
            .upsert_service(pass, &name, existing.get(&name), |current| {
                Ok(seed_record(current, cluster, &name, seed))
            })
            .await?;
        if op != OperationResult::Unchanged {
            report.writes += 1;
            info!(cluster = pass.name, service = %name, seed = %seed, "Multi-dc seed service synced");
        }
        wanted.push(name);
    }

    for name in existing.keys().filter(|name| !wanted.contains(name)) {
        reconciler.delete_service(pass, name).await?;
        report.writes += 1;
    }
    Ok(())
}

#[cfg(test)]
#[path = "multi_dc_test.rs"]
mod multi_dc_test;
