use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub transition_latency_seconds: HistogramVec,
    pub collections_tracking: IntGauge,
    pub pings_ingested_total: IntCounterVec,
    pub reminders_processed_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "collection_transitions_total",
                "Collection lifecycle operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid collection_transitions_total metric");

        let transition_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "collection_transition_latency_seconds",
                "Latency of collection lifecycle operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid collection_transition_latency_seconds metric");

        let collections_tracking = IntGauge::new(
            "collections_tracking",
            "Collections currently in progress under a tracking agent",
        )
        .expect("valid collections_tracking metric");

        let pings_ingested_total = IntCounterVec::new(
            Opts::new("pings_ingested_total", "Location pings stored by source"),
            &["source"],
        )
        .expect("valid pings_ingested_total metric");

        let reminders_processed_total = IntCounterVec::new(
            Opts::new("reminders_processed_total", "Due reminders processed by outcome"),
            &["outcome"],
        )
        .expect("valid reminders_processed_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register collection_transitions_total");
        registry
            .register(Box::new(transition_latency_seconds.clone()))
            .expect("register collection_transition_latency_seconds");
        registry
            .register(Box::new(collections_tracking.clone()))
            .expect("register collections_tracking");
        registry
            .register(Box::new(pings_ingested_total.clone()))
            .expect("register pings_ingested_total");
        registry
            .register(Box::new(reminders_processed_total.clone()))
            .expect("register reminders_processed_total");

        Self {
            registry,
            transitions_total,
            transition_latency_seconds,
            collections_tracking,
            pings_ingested_total,
            reminders_processed_total,
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
