//! Controller configuration.
//!
//! Built once at startup from environment variables and shared by reference.
//! Every variable is optional; unparsable values fail startup.
//!
//! | variable                     | default        |
//! |------------------------------|----------------|
//! | `WATCH_NAMESPACE`            | all namespaces |
//! | `WEBHOOK_ADDR`               | `0.0.0.0:8080` |
//! | `RECONCILE_DEADLINE_SECONDS` | `30`           |
//! | `CONFLICT_RETRIES`           | `3`            |
//! | `REQUEUE_SECONDS`            | `30`           |
//! | `ALLOW_SCALE_DOWN`           | `false`        |
//! | `CONTROLLER_CONCURRENCY`     | `3`            |
//! | `BACKOFF_MIN_SECONDS`        | `5`            |
//! | `BACKOFF_MAX_SECONDS`        | `300`          |
//! | `WEBHOOK_CERT`               | `/tmp/k8s-webhook-server/serving-certs/tls.crt` |
//! | `WEBHOOK_KEY`                | `/tmp/k8s-webhook-server/serving-certs/tls.key` |
//! | `WEBHOOK_INSECURE`           | `false`        |
//!
//! The webhook is served over TLS with the PEM certificate chain and key from
//! `WEBHOOK_CERT` and `WEBHOOK_KEY`. `WEBHOOK_INSECURE=true` serves plain HTTP
//! instead and cannot be combined with either file.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crds::ScaleDownPolicy;

use crate::error::ControllerError;

const DEFAULT_CERT_DIR: &str = "/tmp/k8s-webhook-server/serving-certs";

/// Transport of the webhook server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookTls {
    /// HTTPS with a PEM certificate chain and private key
    Files { cert: PathBuf, key: PathBuf },
    /// Plain HTTP, for local runs
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch, `None` for the whole cluster
    pub namespace: Option<String>,
    /// Listen address of the webhook, probe and metrics server
    pub webhook_addr: SocketAddr,
    pub webhook_tls: WebhookTls,
    /// Upper bound on one reconcile pass
    pub reconcile_deadline: Duration,
    /// Re-read and retry attempts after a write conflict
    pub conflict_retries: u32,
    /// Requeue interval while intents are outstanding
    pub requeue_interval: Duration,
    pub scale_down: ScaleDownPolicy,
    /// Clusters reconciled in parallel
    pub concurrency: u16,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            webhook_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            webhook_tls: WebhookTls::Files {
                cert: PathBuf::from(DEFAULT_CERT_DIR).join("tls.crt"),
                key: PathBuf::from(DEFAULT_CERT_DIR).join("tls.key"),
            },
            reconcile_deadline: Duration::from_secs(30),
            conflict_retries: 3,
            requeue_interval: Duration::from_secs(30),
            scale_down: ScaleDownPolicy::Reject,
            concurrency: 3,
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();
        let seconds = |key: &str, default: Duration| -> Result<Duration, ControllerError> {
            parse(&lookup, key, default.as_secs()).map(Duration::from_secs)
        };

        let allow_scale_down: bool = parse(&lookup, "ALLOW_SCALE_DOWN", false)?;
        let config = Self {
            namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            webhook_addr: parse(&lookup, "WEBHOOK_ADDR", defaults.webhook_addr)?,
            webhook_tls: webhook_tls(&lookup, defaults.webhook_tls)?,
            reconcile_deadline: seconds("RECONCILE_DEADLINE_SECONDS", defaults.reconcile_deadline)?,
            conflict_retries: parse(&lookup, "CONFLICT_RETRIES", defaults.conflict_retries)?,
            requeue_interval: seconds("REQUEUE_SECONDS", defaults.requeue_interval)?,
            scale_down: if allow_scale_down {
                ScaleDownPolicy::Allow
            } else {
                ScaleDownPolicy::Reject
            },
            concurrency: parse(&lookup, "CONTROLLER_CONCURRENCY", defaults.concurrency)?,
            backoff_min: seconds("BACKOFF_MIN_SECONDS", defaults.backoff_min)?,
            backoff_max: seconds("BACKOFF_MAX_SECONDS", defaults.backoff_max)?,
        };

        if config.reconcile_deadline.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_DEADLINE_SECONDS must be positive".to_string(),
            ));
        }
        if config.backoff_min.is_zero() || config.backoff_min > config.backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff bounds must satisfy 0 < BACKOFF_MIN_SECONDS <= BACKOFF_MAX_SECONDS, got {}s and {}s",
                config.backoff_min.as_secs(),
                config.backoff_max.as_secs()
            )));
        }
        Ok(config)
    }
}

fn webhook_tls(lookup: &impl Fn(&str) -> Option<String>, default: WebhookTls) -> Result<WebhookTls, ControllerError> {
    let cert = lookup("WEBHOOK_CERT").filter(|v| !v.is_empty()).map(PathBuf::from);
    let key = lookup("WEBHOOK_KEY").filter(|v| !v.is_empty()).map(PathBuf::from);

    if parse(lookup, "WEBHOOK_INSECURE", false)? {
        if cert.is_some() || key.is_some() {
            return Err(ControllerError::InvalidConfig(
                "WEBHOOK_INSECURE cannot be combined with WEBHOOK_CERT or WEBHOOK_KEY".to_string(),
            ));
        }
        return Ok(WebhookTls::Disabled);
    }

    match (default, cert, key) {
        (_, Some(cert), Some(key)) => Ok(WebhookTls::Files { cert, key }),
        (WebhookTls::Files { cert, key }, None, None) => Ok(WebhookTls::Files { cert, key }),
        _ => Err(ControllerError::InvalidConfig(
            "WEBHOOK_CERT and WEBHOOK_KEY must be set together".to_string(),
        )),
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
    }
}
