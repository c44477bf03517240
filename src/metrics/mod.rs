//! Prometheus metrics shared by the gateway and the workers.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,

    pub http_requests_total: IntCounter,
    pub http_request_duration_seconds: Histogram,
    pub http_requests_in_flight: IntGauge,

    pub screen_requests_total: IntCounter,
    pub screen_requests_rejected_total: IntCounter,
    pub screen_matches_total: IntCounter,
    pub screen_tickers_skipped_total: IntCounter,
    pub screen_duration_seconds: Histogram,

    pub notifications_sent_total: IntCounter,
    pub notifications_retried_total: IntCounter,
    pub notifications_failed_total: IntCounter,
    pub jobs_reclaimed_total: IntCounter,
    pub delivery_duration_seconds: Histogram,

    pub database_connected: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total =
            IntCounter::new("http_requests_total", "Total HTTP requests handled")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency",
        ))?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests currently being served")?;

        let screen_requests_total =
            IntCounter::new("screen_requests_total", "Screen requests processed")?;
        let screen_requests_rejected_total = IntCounter::new(
            "screen_requests_rejected_total",
            "Screen requests rejected by validation",
        )?;
        let screen_matches_total =
            IntCounter::new("screen_matches_total", "Option contracts matched by strategies")?;
        let screen_tickers_skipped_total = IntCounter::new(
            "screen_tickers_skipped_total",
            "Tickers skipped due to missing data or strategy errors",
        )?;
        let screen_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "screen_duration_seconds",
            "Time to screen one request",
        ))?;

        let notifications_sent_total =
            IntCounter::new("notifications_sent_total", "Notifications delivered")?;
        let notifications_retried_total = IntCounter::new(
            "notifications_retried_total",
            "Notifications returned to pending after a transient failure",
        )?;
        let notifications_failed_total =
            IntCounter::new("notifications_failed_total", "Notifications terminally failed")?;
        let jobs_reclaimed_total = IntCounter::new(
            "jobs_reclaimed_total",
            "Jobs reclaimed after being abandoned mid-processing",
        )?;
        let delivery_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("delivery_duration_seconds", "Delivery provider call latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        let database_connected =
            Gauge::new("database_connected", "1 when the durable store is reachable")?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(screen_requests_total.clone()))?;
        registry.register(Box::new(screen_requests_rejected_total.clone()))?;
        registry.register(Box::new(screen_matches_total.clone()))?;
        registry.register(Box::new(screen_tickers_skipped_total.clone()))?;
        registry.register(Box::new(screen_duration_seconds.clone()))?;
        registry.register(Box::new(notifications_sent_total.clone()))?;
        registry.register(Box::new(notifications_retried_total.clone()))?;
        registry.register(Box::new(notifications_failed_total.clone()))?;
        registry.register(Box::new(jobs_reclaimed_total.clone()))?;
        registry.register(Box::new(delivery_duration_seconds.clone()))?;
        registry.register(Box::new(database_connected.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            screen_requests_total,
            screen_requests_rejected_total,
            screen_matches_total,
            screen_tickers_skipped_total,
            screen_duration_seconds,
            notifications_sent_total,
            notifications_retried_total,
            notifications_failed_total,
            jobs_reclaimed_total,
            delivery_duration_seconds,
            database_connected,
        })
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
