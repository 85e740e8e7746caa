use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub operations_total: IntCounterVec,
    pub operation_latency_seconds: HistogramVec,
    pub status_transitions_total: IntCounterVec,
    pub commit_retries_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new(
                "engine_operations_total",
                "Total engine operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid engine_operations_total metric");

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "engine_operation_latency_seconds",
                "Latency of engine operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid engine_operation_latency_seconds metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "shipment_transitions_total",
                "Committed shipment status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid shipment_transitions_total metric");

        let commit_retries_total = IntCounter::new(
            "commit_retries_total",
            "Units of work re-run after a concurrent modification",
        )
        .expect("valid commit_retries_total metric");

        registry
            .register(Box::new(operations_total.clone()))
            .expect("register engine_operations_total");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("register engine_operation_latency_seconds");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register shipment_transitions_total");
        registry
            .register(Box::new(commit_retries_total.clone()))
            .expect("register commit_retries_total");

        Self {
            registry,
            operations_total,
            operation_latency_seconds,
            status_transitions_total,
            commit_retries_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
