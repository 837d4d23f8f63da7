use crate::errors::Result;
use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tracing::{error, info};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "generator_readings_total",
        "Total readings persisted"
    ))
    .expect("valid metric opts");
    pub static ref INGEST_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "generator_ingest_failures_total",
            "Total failed generate/register/insert cycles"
        ),
        &["kind"]
    )
    .expect("valid metric opts");
    pub static ref REGISTRATION_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "generator_registration_failures_total",
        "Total failed device upserts"
    ))
    .expect("valid metric opts");
    pub static ref RECONNECTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "generator_reconnects_total",
            "Reconnect attempts made while recovering"
        ),
        &["outcome"]
    )
    .expect("valid metric opts");
    pub static ref DB_WAIT_PROBES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "generator_db_wait_probes_total",
        "Liveness probes issued while waiting for the database"
    ))
    .expect("valid metric opts");
    pub static ref INSERT_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "generator_insert_latency_seconds",
            "Time taken to register and insert one reading"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .expect("valid metric opts");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INGEST_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REGISTRATION_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONNECTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DB_WAIT_PROBES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INSERT_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve `/metrics` until the listener fails
pub async fn serve(addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics listening on {}", addr);
    axum::serve(listener, router()).await?;
    Ok(())
}

async fn metrics_handler() -> std::result::Result<String, (StatusCode, String)> {
    gather_metrics().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}
