//! Prometheus metrics for the HTTP surface, checks and baseline syncs

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,
    pub checks_total: IntCounterVec,
    pub poll_attempts_total: IntCounter,
    pub sync_series_fetches_total: IntCounter,
    pub sync_failures_total: IntCounter,
    pub cached_alphas: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total =
            IntCounter::new("http_requests_total", "Total HTTP requests served")?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests currently in flight")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        ))?;
        let checks_total = IntCounterVec::new(
            Opts::new("checks_total", "Submission checks by pool and outcome"),
            &["pool_kind", "outcome"],
        )?;
        let poll_attempts_total = IntCounter::new(
            "poll_attempts_total",
            "Polls issued against long-running operations",
        )?;
        let sync_series_fetches_total = IntCounter::new(
            "sync_series_fetches_total",
            "Return series downloaded during baseline syncs",
        )?;
        let sync_failures_total = IntCounter::new(
            "sync_failures_total",
            "Alphas skipped during baseline syncs because their series could not be fetched",
        )?;
        let cached_alphas = IntGauge::new("cached_alphas", "Alphas held in the returns cache")?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(checks_total.clone()))?;
        registry.register(Box::new(poll_attempts_total.clone()))?;
        registry.register(Box::new(sync_series_fetches_total.clone()))?;
        registry.register(Box::new(sync_failures_total.clone()))?;
        registry.register(Box::new(cached_alphas.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_requests_in_flight,
            http_request_duration_seconds,
            checks_total,
            poll_attempts_total,
            sync_series_fetches_total,
            sync_failures_total,
            cached_alphas,
        })
    }

    /// Render all metrics in the Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_check(&self, pool_kind: &str, outcome: &str) {
        self.checks_total
            .with_label_values(&[pool_kind, outcome])
            .inc();
    }
}
