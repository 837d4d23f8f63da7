use crate::db::TelemetryStore;
use crate::metrics::REGISTRATION_FAILURES_TOTAL;
use crate::telemetry::{device_id, location_for, DEVICE_POOL_SIZE};
use tracing::{info, warn};

/// Upsert the device row so readings referencing it can be inserted.
///
/// Failures are logged and reported as `false`; it is up to the caller
/// whether to go on with the insert.
pub async fn ensure_device_exists<S: TelemetryStore>(store: &mut S, device_id: &str) -> bool {
    let location = location_for(device_id);

    match store.ensure_device(device_id, &location).await {
        Ok(()) => true,
        Err(e) => {
            REGISTRATION_FAILURES_TOTAL.inc();
            warn!("Failed to register device {}: {}", device_id, e);
            false
        }
    }
}

/// Register every device in the pool. Returns how many upserts succeeded.
pub async fn register_catalog<S: TelemetryStore>(store: &mut S) -> u32 {
    let mut registered = 0;
    for n in 1..=DEVICE_POOL_SIZE {
        if ensure_device_exists(store, &device_id(n)).await {
            registered += 1;
        }
    }
    info!("Registered {}/{} devices", registered, DEVICE_POOL_SIZE);
    registered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    #[test]
    fn test_registering_twice_keeps_one_row() {
        tokio_test::block_on(async {
            let mut store = FakeStore::default();

            assert!(ensure_device_exists(&mut store, "DEVICE_7").await);
            assert!(ensure_device_exists(&mut store, "DEVICE_7").await);

            assert_eq!(store.devices.len(), 1);
            assert_eq!(
                store.devices.get("DEVICE_7").map(String::as_str),
                Some("Bilbao site 7")
            );
        });
    }

    #[test]
    fn test_failure_reported_as_false() {
        tokio_test::block_on(async {
            let mut store = FakeStore {
                device_failures: 1,
                ..FakeStore::default()
            };

            assert!(!ensure_device_exists(&mut store, "DEVICE_1").await);
            assert!(store.devices.is_empty());
            assert!(ensure_device_exists(&mut store, "DEVICE_1").await);
        });
    }

    #[test]
    fn test_register_catalog_covers_pool() {
        tokio_test::block_on(async {
            let mut store = FakeStore {
                device_failures: 2,
                ..FakeStore::default()
            };

            assert_eq!(register_catalog(&mut store).await, DEVICE_POOL_SIZE - 2);
            assert!(!store.devices.contains_key("DEVICE_1"));
            assert!(store.devices.contains_key("DEVICE_100"));

            assert_eq!(register_catalog(&mut store).await, DEVICE_POOL_SIZE);
            assert_eq!(store.devices.len(), DEVICE_POOL_SIZE as usize);
        });
    }
}
