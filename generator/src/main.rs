use generator::clock::TokioClock;
use generator::config::{GeneratorConfig, RegistrationPolicy};
use generator::db::{PgStore, TelemetryStore};
use generator::ingest::{IngestLoop, LoopSettings};
use generator::telemetry::DEVICE_POOL_SIZE;
use generator::{metrics, registry, wait};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match GeneratorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let instance = format!("generator-{}", uuid::Uuid::new_v4());
    info!("Starting IoT telemetry generator ({})", instance);
    info!("Database: {}", config.db.describe());

    if let Err(e) = metrics::init_metrics() {
        warn!("Failed to register metrics: {}", e);
    }
    if let Some(addr) = config.metrics_addr.clone() {
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(&addr).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    let options = config.db.connect_options().application_name(&instance);
    let mut store = PgStore::new(options);
    let clock = TokioClock;

    if let Err(e) = wait::wait_for_db(&mut store, &clock, config.wait_retries, config.wait_delay).await {
        error!("{}", e);
        std::process::exit(1);
    }

    if config.run_migrations {
        if let Err(e) = store.run_migrations().await {
            error!("Failed to prepare schema: {}", e);
            std::process::exit(1);
        }
    }

    if config.registration == RegistrationPolicy::Startup {
        let registered = registry::register_catalog(&mut store).await;
        if registered < DEVICE_POOL_SIZE {
            warn!(
                "{} devices not registered at startup; they will be registered on first rejected insert",
                DEVICE_POOL_SIZE - registered
            );
        }
    }

    let mut ingest = IngestLoop::new(store, clock, LoopSettings::from(&config));
    ingest
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Err(e) = ingest.into_store().close().await {
        warn!("Failed to close database connection: {}", e);
    }

    info!("Shutting down");
}
