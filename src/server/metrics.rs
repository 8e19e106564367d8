use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::time::Duration;
use tracing::{error, info};

/// Metric name prefix for all jukebox metrics
const PREFIX: &str = "jukebox";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Admission Metrics
    pub static ref ADMISSION_OUTCOMES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_admission_outcomes_total"), "Admission decisions by outcome"),
        &["outcome"]
    ).expect("Failed to create admission_outcomes_total metric");

    // Prequeue Metrics
    pub static ref PREQUEUE_TRANSITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_prequeue_transitions_total"), "Prequeue entries by transition"),
        &["transition"]
    ).expect("Failed to create prequeue_transitions_total metric");
}

/// Registers all metrics with the global registry. Call once at startup.
pub fn init_metrics() {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(ADMISSION_OUTCOMES_TOTAL.clone()),
        Box::new(PREQUEUE_TRANSITIONS_TOTAL.clone()),
    ];

    for metric in metrics {
        if let Err(err) = REGISTRY.register(metric) {
            // Re-registration happens in tests; not fatal.
            error!("Failed to register metric: {err}");
        }
    }
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_admission_outcome(outcome: &str) {
    ADMISSION_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_prequeue_transition(transition: &str) {
    PREQUEUE_TRANSITIONS_TOTAL
        .with_label_values(&[transition])
        .inc();
}

async fn serve_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("Content-Type", encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(err) => {
            error!("Failed to encode metrics: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serves `/metrics` on its own port for Prometheus scraping.
pub async fn run_metrics_server(port: u16) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(serve_metrics));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("Metrics available at port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}
