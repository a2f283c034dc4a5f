use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub stage_calls_total: IntCounterVec,
    pub stage_call_latency_seconds: HistogramVec,
    pub active_sessions: IntGauge,
    pub accounts_total: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let stage_calls_total = IntCounterVec::new(
            Opts::new("stage_calls_total", "Session operations by outcome"),
            &["operation", "outcome"],
        )
        .expect("valid stage_calls_total metric");

        let stage_call_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "stage_call_latency_seconds",
                "Latency of session operations in seconds",
            ),
            &["operation", "outcome"],
        )
        .expect("valid stage_call_latency_seconds metric");

        let active_sessions = IntGauge::new("active_sessions", "Currently open ride sessions")
            .expect("valid active_sessions metric");

        let accounts_total = IntGauge::new("accounts_total", "Accounts in the account store")
            .expect("valid accounts_total metric");

        registry
            .register(Box::new(stage_calls_total.clone()))
            .expect("register stage_calls_total");
        registry
            .register(Box::new(stage_call_latency_seconds.clone()))
            .expect("register stage_call_latency_seconds");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("register active_sessions");
        registry
            .register(Box::new(accounts_total.clone()))
            .expect("register accounts_total");

        Self {
            registry,
            stage_calls_total,
            stage_call_latency_seconds,
            active_sessions,
            accounts_total,
        }
    }

    pub fn observe_call(&self, operation: &str, succeeded: bool, elapsed: Duration) {
        let outcome = if succeeded { "success" } else { "error" };
        self.stage_call_latency_seconds
            .with_label_values(&[operation, outcome])
            .observe(elapsed.as_secs_f64());
        self.stage_calls_total
            .with_label_values(&[operation, outcome])
            .inc();
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
