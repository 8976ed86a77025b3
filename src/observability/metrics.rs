use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub claims_total: IntCounterVec,
    pub position_reports_total: IntCounterVec,
    pub lifecycle_transitions_total: IntCounterVec,
    pub reconciled_claims_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Dispatch runs by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of a full dispatch saga in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let claims_total = IntCounterVec::new(
            Opts::new("claims_total", "Courier claim attempts by result"),
            &["result"],
        )
        .expect("valid claims_total metric");

        let position_reports_total = IntCounterVec::new(
            Opts::new("position_reports_total", "Courier position reports by result"),
            &["result"],
        )
        .expect("valid position_reports_total metric");

        let lifecycle_transitions_total = IntCounterVec::new(
            Opts::new(
                "lifecycle_transitions_total",
                "Committed order transitions by resulting status",
            ),
            &["status"],
        )
        .expect("valid lifecycle_transitions_total metric");

        let reconciled_claims_total = IntCounterVec::new(
            Opts::new(
                "reconciled_claims_total",
                "Stale claims resolved by the reconciliation sweep",
            ),
            &["action"],
        )
        .expect("valid reconciled_claims_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Courier notifications by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        registry
            .register(Box::new(dispatch_total.clone()))
            .expect("register dispatch_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("register claims_total");
        registry
            .register(Box::new(position_reports_total.clone()))
            .expect("register position_reports_total");
        registry
            .register(Box::new(lifecycle_transitions_total.clone()))
            .expect("register lifecycle_transitions_total");
        registry
            .register(Box::new(reconciled_claims_total.clone()))
            .expect("register reconciled_claims_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");

        Self {
            registry,
            dispatch_total,
            dispatch_latency_seconds,
            claims_total,
            position_reports_total,
            lifecycle_transitions_total,
            reconciled_claims_total,
            notifications_total,
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
