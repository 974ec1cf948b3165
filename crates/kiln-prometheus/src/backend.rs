use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use kiln_core::{DestroyReason, MetricsBackend, PassOutcome, Procedure};

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    passes: IntCounterVec,
    requested: IntCounterVec,
    destroyed: IntCounterVec,
    unresolved: IntCounter,
}

impl PrometheusMetrics {
    /// Metrics registered in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let passes = IntCounterVec::new(
            Opts::new("kiln_reconcile_passes_total", "Reconcile passes by outcome"),
            &["procedure", "outcome"],
        )?;
        let requested = IntCounterVec::new(
            Opts::new("kiln_nodes_requested_total", "Nodes requested from the registry"),
            &["node_type"],
        )?;
        let destroyed = IntCounterVec::new(
            Opts::new("kiln_nodes_destroyed_total", "Nodes destroyed at a provider"),
            &["provider", "reason"],
        )?;
        let unresolved = IntCounter::new(
            "kiln_unresolved_tasks_total",
            "Blocked tasks no node type could satisfy",
        )?;

        registry.register(Box::new(passes.clone()))?;
        registry.register(Box::new(requested.clone()))?;
        registry.register(Box::new(destroyed.clone()))?;
        registry.register(Box::new(unresolved.clone()))?;

        Ok(Self {
            registry,
            passes,
            requested,
            destroyed,
            unresolved,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.gather())
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_pass(&self, procedure: Procedure, outcome: PassOutcome) {
        self.passes
            .with_label_values(&[procedure.as_str(), outcome.as_str()])
            .inc();
    }

    fn record_requested(&self, node_type: &str, count: u32) {
        self.requested
            .with_label_values(&[node_type])
            .inc_by(u64::from(count));
    }

    fn record_unresolved(&self) {
        self.unresolved.inc();
    }

    fn record_destroyed(&self, provider: &str, reason: DestroyReason, count: usize) {
        self.destroyed
            .with_label_values(&[provider, reason.as_str()])
            .inc_by(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_label() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_pass(Procedure::Provision, PassOutcome::Empty);
        metrics.record_pass(Procedure::Provision, PassOutcome::Empty);
        metrics.record_pass(Procedure::Provision, PassOutcome::Aborted);
        metrics.record_requested("xenial", 3);
        metrics.record_destroyed("openstack", DestroyReason::ErrorState, 2);
        metrics.record_unresolved();

        assert_eq!(
            metrics
                .passes
                .with_label_values(&["provision", "empty"])
                .get(),
            2
        );
        assert_eq!(metrics.requested.with_label_values(&["xenial"]).get(), 3);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"kiln_reconcile_passes_total{outcome="aborted",procedure="provision"} 1"#));
        assert!(text.contains(r#"kiln_nodes_destroyed_total{provider="openstack",reason="error_state"} 2"#));
        assert!(text.contains("kiln_unresolved_tasks_total 1"));
    }

    #[test]
    fn shared_registry_rejects_second_instance() {
        let registry = Registry::new();
        PrometheusMetrics::with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }
}
