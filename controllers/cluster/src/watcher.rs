//! Kubernetes resource watchers.
//!
//! This module watches ScyllaCluster objects, the member Services they own and
//! the Scylla pods, and drives reconciliation through `kube_runtime::Controller`.
//! Status is patched after every successful pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crds::labels::{APP_LABEL, APP_NAME, CLUSTER_NAME_LABEL, MANAGED_BY_LABEL, OPERATOR_APP_NAME};
use crds::ScyllaCluster;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use tracing::{debug, error, info, warn};

use crate::error::ControllerError;
use crate::reconciler::status::cluster_status;
use crate::reconciler::{ReconcileReport, Reconciler, object_key};

/// State shared by all reconcile calls.
pub struct Context {
    pub reconciler: Arc<Reconciler>,
    pub client: Client,
}

/// Watches ScyllaCluster objects and their members.
pub struct Watcher {
    context: Arc<Context>,
    namespace: Option<String>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, client: Client, namespace: Option<String>) -> Self {
        Self {
            context: Arc::new(Context { reconciler, client }),
            namespace,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        let client = self.context.client.clone();
        match &self.namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }

    /// Runs the ScyllaCluster controller until its stream ends.
    pub async fn watch_clusters(&self) -> Result<(), ControllerError> {
        info!(namespace = self.namespace.as_deref().unwrap_or("<all>"), "Starting ScyllaCluster watcher");

        let managed = watcher::Config::default().labels(&format!("{MANAGED_BY_LABEL}={OPERATOR_APP_NAME}"));
        let scylla_pods = watcher::Config::default().labels(&format!("{APP_LABEL}={APP_NAME}"));

        // Debounce batches bursts of pod and Service events into one pass
        let config = RuntimeConfig::default()
            .debounce(Duration::from_secs(5))
            .concurrency(self.context.reconciler.config.concurrency);

        Controller::new(self.api::<ScyllaCluster>(), watcher::Config::default())
            .owns(self.api::<Service>(), managed)
            .watches(self.api::<Pod>(), scylla_pods, |pod: Pod| {
                let namespace = pod.namespace();
                pod.labels()
                    .get(CLUSTER_NAME_LABEL)
                    .zip(namespace)
                    .map(|(cluster, ns)| ObjectRef::<ScyllaCluster>::new(cluster).within(&ns))
            })
            .with_config(config)
            .run(reconcile, error_policy, self.context.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!(cluster = %obj, "Reconciled"),
                    Err(e) => warn!(error = %e, "Controller error"),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(cluster: Arc<ScyllaCluster>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = object_key(&cluster);
    debug!(cluster = %key, "Reconciling ScyllaCluster");

    let report = ctx.reconciler.reconcile_cluster(&cluster).await?;
    patch_status(&ctx.client, &cluster, &report).await?;
    ctx.reconciler.reset_backoff(&key);

    if report.spec_error.is_some() {
        // Nothing to do until the spec is fixed.
        return Ok(Action::await_change());
    }
    Ok(Action::requeue(ctx.reconciler.requeue_after(&report)))
}

fn error_policy(cluster: Arc<ScyllaCluster>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = object_key(&cluster);
    if !error.is_retryable() {
        error!(cluster = %key, error = %error, "Reconciliation failed, waiting for a change");
        return Action::await_change();
    }
    let delay = ctx.reconciler.next_backoff(&key);
    error!(cluster = %key, error = %error, retry_in = ?delay, "Reconciliation failed");
    Action::requeue(delay)
}

/// Merge-patches the status subresource, skipping the call when nothing changed.
async fn patch_status(client: &Client, cluster: &ScyllaCluster, report: &ReconcileReport) -> Result<(), ControllerError> {
    let status = cluster_status(cluster, report, Utc::now());
    if cluster.status.as_ref() == Some(&status) {
        debug!(cluster = %cluster.name_any(), "Status unchanged");
        return Ok(());
    }

    let namespace = cluster
        .namespace()
        .ok_or(ControllerError::MissingMetadata("namespace"))?;
    let api: Api<ScyllaCluster> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(&cluster.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    debug!(cluster = %cluster.name_any(), "Status patched");
    Ok(())
}
