//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the member store,
//! the reconciler, the ScyllaCluster watcher and the webhook server together.

use std::sync::Arc;

use crds::TransitionGuard;
use kube::Client;
use member_store::KubeMemberStore;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crate::webhook::{self, WebhookState};

/// Scylla cluster controller.
pub struct Controller {
    cluster_watcher: JoinHandle<Result<(), ControllerError>>,
    webhook_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: Arc<ControllerConfig>) -> Result<Self, ControllerError> {
        info!("Initializing Scylla cluster controller");

        let kube_client = Client::try_default().await?;
        let metrics = Arc::new(Metrics::new().map_err(|e| ControllerError::Metrics(e.to_string()))?);

        let reconciler = Arc::new(Reconciler::new(
            KubeMemberStore::new(kube_client.clone()),
            config.clone(),
            metrics.clone(),
        ));
        let watcher = Watcher::new(reconciler, kube_client, config.namespace.clone());
        let cluster_watcher = tokio::spawn(async move { watcher.watch_clusters().await });

        let state = WebhookState {
            guard: TransitionGuard::new(config.scale_down),
            metrics,
        };
        let webhook_server = tokio::spawn(webhook::serve(config.webhook_addr, config.webhook_tls.clone(), state));

        Ok(Self {
            cluster_watcher,
            webhook_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Scylla cluster controller running");

        // Both tasks run forever; whichever exits first ends the process
        tokio::select! {
            result = &mut self.cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("ScyllaCluster watcher panicked: {e}")))?
                    .map_err(|e| ControllerError::Watch(format!("ScyllaCluster watcher error: {e}")))?;
            }
            result = &mut self.webhook_server => {
                result.map_err(|e| ControllerError::Watch(format!("Webhook server panicked: {e}")))??;
            }
        }

        Ok(())
    }
}
