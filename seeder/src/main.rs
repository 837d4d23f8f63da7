use anyhow::{Context, Result};
use clap::Parser;
use generator::config::DbConfig;
use generator::db::{PgStore, TelemetryStore};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Insert a single device row and read it back
#[derive(Debug, Parser)]
#[command(name = "seeder", version)]
struct Args {
    #[arg(long, env = "SEED_DEVICE_ID", default_value = "test_device")]
    device_id: String,

    #[arg(long, env = "SEED_LOCATION", default_value = "Test Location")]
    location: String,

    /// Give the database time to come up before connecting
    #[arg(long, env = "SEED_STARTUP_DELAY_SECS", default_value_t = 5)]
    startup_delay_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if let Err(e) = run(args, DbConfig::from_env()).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args, db: DbConfig) -> Result<()> {
    info!("Waiting {}s for the database to be ready...", args.startup_delay_secs);
    tokio::time::sleep(Duration::from_secs(args.startup_delay_secs)).await;

    info!("Connecting to PostgreSQL at {}...", db.describe());
    let mut store = PgStore::new(db.connect_options());

    info!("Inserting device {}...", args.device_id);
    store
        .ensure_device(&args.device_id, &args.location)
        .await
        .with_context(|| format!("failed to insert device {}", args.device_id))?;

    match store
        .fetch_device(&args.device_id)
        .await
        .context("failed to read device back")?
    {
        Some(device) => info!(
            "Device inserted: {}",
            serde_json::to_string(&device).context("failed to encode device")?
        ),
        None => warn!("Device {} not found after insert", args.device_id),
    }

    store.close().await.context("failed to close connection")?;
    info!("Connection closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn default_of(id: &str) -> Option<String> {
        Args::command()
            .get_arguments()
            .find(|arg| arg.get_id().as_str() == id)
            .and_then(|arg| arg.get_default_values().first())
            .and_then(|value| value.to_str())
            .map(str::to_string)
    }

    #[test]
    fn test_defaults_seed_test_device() {
        // Read from the command definition so SEED_* in the environment
        // cannot leak in.
        assert_eq!(default_of("device_id").as_deref(), Some("test_device"));
        assert_eq!(default_of("location").as_deref(), Some("Test Location"));
        assert_eq!(default_of("startup_delay_secs").as_deref(), Some("5"));
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::try_parse_from([
            "seeder",
            "--device-id",
            "DEVICE_42",
            "--location",
            "Porto",
            "--startup-delay-secs",
            "0",
        ])
        .unwrap();
        assert_eq!(args.device_id, "DEVICE_42");
        assert_eq!(args.location, "Porto");
        assert_eq!(args.startup_delay_secs, 0);
    }
}
