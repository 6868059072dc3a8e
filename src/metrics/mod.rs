use crate::error::{ProxyError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router as AxumRouter,
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Label used for requests that matched no route
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ProxyError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "tinyrp_requests_total",
            "Total number of HTTP requests handled, by endpoint and status"
        );
        describe_histogram!(
            "tinyrp_request_duration_seconds",
            "Request latencies in seconds, by endpoint"
        );
        describe_counter!(
            "tinyrp_rate_limit_decisions_total",
            "Rate limit verdicts, by decision"
        );
        describe_counter!(
            "tinyrp_store_errors_total",
            "Rate limit checks that failed because the store could not be consulted"
        );
        describe_counter!(
            "tinyrp_backend_errors_total",
            "Forwarded requests that failed to reach a backend"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Router serving `GET /metrics`
    pub fn router(self) -> AxumRouter {
        AxumRouter::new()
            .route("/metrics", get(metrics_handler))
            .with_state(self)
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record a handled request
pub fn record_request(endpoint: &str, status: u16, duration: f64) {
    let labels = [
        ("endpoint", endpoint.to_string()),
        ("status", status.to_string()),
    ];
    counter!("tinyrp_requests_total", &labels).increment(1);

    let labels = [("endpoint", endpoint.to_string())];
    histogram!("tinyrp_request_duration_seconds", &labels).record(duration);
}

/// Record a rate limit verdict
pub fn record_rate_limit_decision(allowed: bool) {
    let decision = if allowed { "allowed" } else { "denied" };
    counter!("tinyrp_rate_limit_decisions_total", "decision" => decision).increment(1);
}

/// Record a store failure during a rate limit check
pub fn record_store_error() {
    counter!("tinyrp_store_errors_total").increment(1);
}

/// Record a failed backend call
pub fn record_backend_error(backend: &str) {
    let labels = [("backend", backend.to_string())];
    counter!("tinyrp_backend_errors_total", &labels).increment(1);
}

/// Timer for measuring request duration
pub struct Timer {
    start: Instant,
    endpoint: String,
}

impl Timer {
    /// Start a new timer for a request on `endpoint`
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.into(),
        }
    }

    /// Record the elapsed time with the given status code
    pub fn record(self, status: u16) {
        record_request(&self.endpoint, status, self.elapsed());
    }

    /// Get the elapsed time in seconds
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Elapsed time in milliseconds, for log lines
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed() * 1000.0
    }
}
