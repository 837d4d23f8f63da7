use crate::clock::Clock;
use crate::db::TelemetryStore;
use crate::errors::{Error, Result};
use crate::metrics::DB_WAIT_PROBES_TOTAL;
use std::time::Duration;
use tracing::{info, warn};

/// Probe the store until it answers or `max_retries` probes have failed.
///
/// Returns the number of the attempt that succeeded. Exhausting the budget
/// is fatal for the caller; there is no retry beyond it.
pub async fn wait_for_db<S, C>(
    store: &mut S,
    clock: &C,
    max_retries: u32,
    delay: Duration,
) -> Result<u32>
where
    S: TelemetryStore,
    C: Clock,
{
    info!("Waiting for database ({} attempts, {:?} apart)", max_retries, delay);

    let mut last_error = String::from("no attempts made");

    for attempt in 1..=max_retries {
        DB_WAIT_PROBES_TOTAL.inc();

        match store.probe().await {
            Ok(()) => {
                info!("Database reachable after {} attempt(s)", attempt);
                return Ok(attempt);
            }
            Err(e) => {
                warn!(
                    "Database not ready (attempt {}/{}): {}",
                    attempt, max_retries, e
                );
                last_error = e.to_string();
            }
        }

        if attempt < max_retries {
            clock.sleep(delay).await;
        }
    }

    Err(Error::Unreachable {
        attempts: max_retries,
        last_error,
    })
}
