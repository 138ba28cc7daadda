//! Scylla Cluster Controller
//!
//! Keeps the identity Services of every ScyllaCluster member in line with the
//! cluster spec:
//! - one Service per member, carrying the intent labels shared with its agent
//! - the seed set of each rack
//! - decommission requests on scale-down and cleanup of removed members
//! - Services for the seeds of remote datacenters
//!
//! It also serves the validating admission webhook for ScyllaCluster objects.

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;
mod webhook;

use std::sync::Arc;

use config::ControllerConfig;
use controller::Controller;
use error::ControllerError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls client needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    info!("Starting Scylla Cluster Controller");

    let config = Arc::new(ControllerConfig::from_env()?);
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Webhook address: {}", config.webhook_addr);
    info!("  Webhook TLS: {:?}", config.webhook_tls);
    info!("  Reconcile deadline: {:?}", config.reconcile_deadline);
    info!("  Scale-down: {:?}", config.scale_down);

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
