//! Prometheus metrics of the controller.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Reconcile passes by outcome (`success`, `error`, `invalid_spec`).
    pub reconcile_total: IntCounterVec,
    /// Service writes by kind (`create`, `update`, `delete`).
    pub identity_writes_total: IntCounterVec,
    /// Protocol violations by kind.
    pub protocol_violations_total: IntCounterVec,
}

impl Metrics {
    /// Creates the metrics in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("scylla_operator".to_string()), None)?;
        let reconcile_total = IntCounterVec::new(
            Opts::new("reconcile_total", "Reconcile passes of ScyllaCluster objects"),
            &["outcome"],
        )?;
        let identity_writes_total = IntCounterVec::new(
            Opts::new("identity_writes_total", "Writes of member and seed Services"),
            &["kind"],
        )?;
        let protocol_violations_total = IntCounterVec::new(
            Opts::new("protocol_violations_total", "Intents that could not be applied safely"),
            &["kind"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(identity_writes_total.clone()))?;
        registry.register(Box::new(protocol_violations_total.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            identity_writes_total,
            protocol_violations_total,
        })
    }

    /// Renders all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
