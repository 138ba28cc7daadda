//! Reconciliation of ScyllaCluster objects.
//!
//! A pass over one cluster runs these steps:
//! 1. validate the spec; an invalid spec ends the pass
//! 2. per rack: sync member identities (`identity`), then drive scale-down
//!    and clean up decommissioned members (`scale`)
//! 3. publish multi-dc seed Services (`multi_dc`)
//!
//! The pass returns a [`ReconcileReport`]; the watcher turns it into status
//! (`status`) and a requeue decision.

pub mod identity;
pub mod multi_dc;
pub mod scale;
pub mod status;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crds::{ProtocolViolation, RackSpec, RackStatus, ScyllaCluster, ValidationError, labels, validate};
use kube::ResourceExt;
use member_store::{MemberStore, ServiceRecord, StoreError, with_deadline};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;

/// Requeue interval once a cluster has converged.
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
    last_error: Instant,
}

impl BackoffState {
    fn new(config: &ControllerConfig) -> Self {
        Self {
            backoff: FibonacciBackoff::new(config.backoff_min, config.backoff_max),
            error_count: 0,
            last_error: Instant::now(),
        }
    }
}

/// What a pass observed and did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Member accounting per rack
    pub racks: BTreeMap<String, RackStatus>,
    /// Set when the spec failed validation; nothing else was done
    pub spec_error: Option<ValidationError>,
    /// Intents the controller refused to issue
    pub violations: Vec<ProtocolViolation>,
    /// Service creates, updates and deletes issued
    pub writes: usize,
    /// The cluster has not converged yet, e.g. a decommission is in flight
    pub pending: bool,
}

/// Result of a create-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl OperationResult {
    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "create",
            Self::Updated => "update",
            Self::Unchanged => "none",
        }
    }
}

/// One reconcile pass over one cluster.
#[derive(Debug)]
pub(crate) struct Pass<'a> {
    pub cluster: &'a ScyllaCluster,
    pub name: &'a str,
    pub namespace: &'a str,
    pub deadline: Instant,
}

/// A member inside its rack's member count, with its identity record.
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub ordinal: i32,
    pub ready: bool,
    pub service: ServiceRecord,
}

/// Reconciles ScyllaCluster objects against the member store.
pub struct Reconciler {
    pub(crate) store: Box<dyn MemberStore>,
    pub(crate) config: Arc<ControllerConfig>,
    pub(crate) metrics: Arc<Metrics>,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(store: impl MemberStore + 'static, config: Arc<ControllerConfig>, metrics: Arc<Metrics>) -> Self {
        Self {
            store: Box::new(store),
            config,
            metrics,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs one pass over `cluster`.
    ///
    /// A failing rack does not stop the other racks; the first error is
    /// returned once every rack and the multi-dc seeds have been tried.
    pub async fn reconcile_cluster(&self, cluster: &ScyllaCluster) -> Result<ReconcileReport, ControllerError> {
        let namespace = cluster.namespace().ok_or(ControllerError::MissingMetadata("namespace"))?;
        let name = cluster.metadata.name.as_deref().ok_or(ControllerError::MissingMetadata("name"))?;
        let mut report = ReconcileReport::default();

        if let Err(e) = validate(&cluster.spec) {
            warn!(cluster = name, namespace = %namespace, error = %e, "Spec is invalid, skipping reconciliation");
            self.metrics.reconcile_total.with_label_values(&["invalid_spec"]).inc();
            report.spec_error = Some(e);
            return Ok(report);
        }

        let pass = Pass {
            cluster,
            name,
            namespace: &namespace,
            deadline: Instant::now() + self.config.reconcile_deadline,
        };

        let mut first_error = None;
        for rack in &cluster.spec.datacenter.racks {
            if let Err(e) = self.sync_rack(&pass, rack, &mut report).await {
                let e = e.in_rack(&rack.name);
                error!(cluster = name, error = %e, "Rack sync failed");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = multi_dc::sync_multi_dc_seeds(self, &pass, &mut report).await {
            error!(cluster = name, error = %e, "Multi-dc seed sync failed");
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => {
                self.metrics.reconcile_total.with_label_values(&["error"]).inc();
                Err(e)
            }
            None => {
                self.metrics.reconcile_total.with_label_values(&["success"]).inc();
                debug!(cluster = name, writes = report.writes, pending = report.pending, "Reconciliation pass finished");
                Ok(report)
            }
        }
    }

    async fn sync_rack(&self, pass: &Pass<'_>, rack: &RackSpec, report: &mut ReconcileReport) -> Result<(), ControllerError> {
        let selector = labels::selector(&labels::rack_labels(pass.cluster, &rack.name));
        let pods = with_deadline(pass.deadline, "list pods", self.store.list_pods(pass.namespace, &selector)).await?;
        let services: BTreeMap<String, ServiceRecord> =
            with_deadline(pass.deadline, "list services", self.store.list_services(pass.namespace, &selector))
                .await?
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect();

        let members = identity::sync_members(self, pass, rack, &pods, &services, report).await?;
        let decommissioning = scale::sync_scale_down(self, pass, rack, &pods, &services, report).await?;

        let rack_status = status::rack_status(&members, decommissioning);
        if members.len() < usize::try_from(rack.members).unwrap_or_default()
            || members.iter().any(|m| m.service.label(labels::IP_LABEL).is_none())
        {
            report.pending = true;
        }
        report.racks.insert(rack.name.clone(), rack_status);
        Ok(())
    }

    /// Creates `name` or merges onto its stored version.
    ///
    /// `snapshot` is the record as listed at the start of the rack pass, `None`
    /// if it did not exist. `build` computes the record to store from the
    /// current one. On a write conflict the record is read again and rebuilt,
    /// up to the configured number of retries.
    pub(crate) async fn upsert_service<F>(
        &self,
        pass: &Pass<'_>,
        name: &str,
        snapshot: Option<&ServiceRecord>,
        build: F,
    ) -> Result<(ServiceRecord, OperationResult), ControllerError>
    where
        F: Fn(Option<&ServiceRecord>) -> Result<ServiceRecord, ControllerError>,
    {
        let mut current = snapshot.cloned();
        for attempt in 0..=self.config.conflict_retries {
            if attempt > 0 {
                current = with_deadline(pass.deadline, "get service", self.store.get_service(pass.namespace, name)).await?;
            }

            let mut desired = build(current.as_ref())?;
            let written = match &current {
                Some(existing) if existing.same_content(&desired) => {
                    return Ok((existing.clone(), OperationResult::Unchanged));
                }
                Some(existing) => {
                    desired.resource_version.clone_from(&existing.resource_version);
                    with_deadline(pass.deadline, "replace service", self.store.replace_service(pass.namespace, &desired))
                        .await
                        .map(|stored| (stored, OperationResult::Updated))
                }
                None => with_deadline(pass.deadline, "create service", self.store.create_service(pass.namespace, &desired))
                    .await
                    .map(|stored| (stored, OperationResult::Created)),
            };

            match written {
                Ok((stored, op)) => {
                    self.metrics.identity_writes_total.with_label_values(&[op.as_str()]).inc();
                    return Ok((stored, op));
                }
                Err(StoreError::Conflict(_)) => {
                    debug!(service = name, attempt, "Write conflict, re-reading service");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(service = name, retries = self.config.conflict_retries, "Giving up after repeated write conflicts");
        Err(StoreError::Conflict(name.to_string()).into())
    }

    /// Deletes `name`, counting the write.
    pub(crate) async fn delete_service(&self, pass: &Pass<'_>, name: &str) -> Result<(), ControllerError> {
        with_deadline(pass.deadline, "delete service", self.store.delete_service(pass.namespace, name)).await?;
        self.metrics.identity_writes_total.with_label_values(&["delete"]).inc();
        info!(cluster = pass.name, service = name, "Member service deleted");
        Ok(())
    }

    /// Requeue delay after a successful pass.
    pub fn requeue_after(&self, report: &ReconcileReport) -> Duration {
        if report.pending {
            self.config.requeue_interval
        } else {
            RESYNC_INTERVAL
        }
    }

    /// Next backoff for a failing resource, advancing its sequence.
    pub fn next_backoff(&self, key: &str) -> Duration {
        let mut states = match self.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A failing cluster is retried at least every `backoff_max`; older
        // entries belong to clusters deleted while failing.
        let stale_after = self.config.backoff_max * 2;
        states.retain(|_, state| state.last_error.elapsed() <= stale_after);

        let state = states
            .entry(key.to_string())
            .or_insert_with(|| BackoffState::new(&self.config));
        state.error_count += 1;
        state.last_error = Instant::now();
        let delay = state.backoff.next_backoff();
        debug!(resource = key, error_count = state.error_count, delay = ?delay, "Backing off");
        delay
    }

    /// Forgets the backoff of a resource after a successful pass.
    pub fn reset_backoff(&self, key: &str) {
        let mut states = match self.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        states.remove(key);
    }
}

/// `namespace/name` key of a cluster, used for backoff tracking and logs.
pub fn object_key(cluster: &ScyllaCluster) -> String {
    format!(
        "{}/{}",
        cluster.namespace().unwrap_or_default(),
        cluster.name_any()
    )
}
