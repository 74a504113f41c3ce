use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub dispatch_queue_depth: IntGauge,
    pub assignments_active: IntGauge,
    pub assignment_timeouts_total: IntCounter,
    pub settlements_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let dispatch_queue_depth =
            IntGauge::new("dispatch_queue_depth", "Dispatch jobs waiting in the queue")
                .expect("valid dispatch_queue_depth metric");

        let assignments_active =
            IntGauge::new("assignments_active", "Assignments currently in a non-terminal state")
                .expect("valid assignments_active metric");

        let assignment_timeouts_total = IntCounter::new(
            "assignment_timeouts_total",
            "Assignments that expired without a courier response",
        )
        .expect("valid assignment_timeouts_total metric");

        let settlements_total = IntCounterVec::new(
            Opts::new("settlements_total", "Balance settlements by transition"),
            &["transition"],
        )
        .expect("valid settlements_total metric");

        registry
            .register(Box::new(dispatch_total.clone()))
            .expect("register dispatch_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(dispatch_queue_depth.clone()))
            .expect("register dispatch_queue_depth");
        registry
            .register(Box::new(assignments_active.clone()))
            .expect("register assignments_active");
        registry
            .register(Box::new(assignment_timeouts_total.clone()))
            .expect("register assignment_timeouts_total");
        registry
            .register(Box::new(settlements_total.clone()))
            .expect("register settlements_total");

        Self {
            registry,
            dispatch_total,
            dispatch_latency_seconds,
            dispatch_queue_depth,
            assignments_active,
            assignment_timeouts_total,
            settlements_total,
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
