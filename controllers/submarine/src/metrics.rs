//! Prometheus metrics
//!
//! Collectors are registered on a [`Registry`] constructed in `main` and
//! passed in; nothing touches the process-wide default registry.

use crate::error::Severity;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metrics for the reconcile loop and its work queue
#[derive(Debug, Clone)]
pub struct ControllerMetrics {
    /// Reconcile passes by result (success, transient, terminal)
    pub reconcile_total: IntCounterVec,

    /// Keys waiting in the work queue
    pub workqueue_depth: IntGauge,

    /// Rate-limited requeues
    pub workqueue_retries_total: IntCounter,
}

impl ControllerMetrics {
    /// Create and register controller metrics
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let reconcile_total = IntCounterVec::new(
            Opts::new("submarine_reconcile_total", "Reconcile passes by result"),
            &["result"],
        )?;
        registry.register(Box::new(reconcile_total.clone()))?;

        let workqueue_depth =
            IntGauge::new("submarine_workqueue_depth", "Keys waiting in the work queue")?;
        registry.register(Box::new(workqueue_depth.clone()))?;

        let workqueue_retries_total =
            IntCounter::new("submarine_workqueue_retries_total", "Rate-limited requeues")?;
        registry.register(Box::new(workqueue_retries_total.clone()))?;

        Ok(Self {
            reconcile_total,
            workqueue_depth,
            workqueue_retries_total,
        })
    }

    /// Count one reconcile pass
    pub fn record_reconcile(&self, outcome: Option<Severity>) {
        let result = outcome.map_or("success", Severity::as_str);
        self.reconcile_total.with_label_values(&[result]).inc();
    }
}

/// Export metrics in Prometheus text format
pub fn export_metrics(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
