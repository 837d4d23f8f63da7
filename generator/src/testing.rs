//! In-memory store and clock for unit tests.

use crate::clock::Clock;
use crate::db::TelemetryStore;
use crate::errors::{Error, Result};
use crate::model::SensorReading;
use sqlx::error::{DatabaseError, ErrorKind as SqlxErrorKind};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) fn refused() -> Error {
    Error::Connection(sqlx::Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
    )))
}

/// Server-side error carrying a SQLSTATE code
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub(crate) struct SqlStateError {
    code: &'static str,
    message: String,
}

impl DatabaseError for SqlStateError {
    fn message(&self) -> &str {
        &self.message
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.code))
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> SqlxErrorKind {
        match self.code {
            "23503" => SqlxErrorKind::ForeignKeyViolation,
            "23505" => SqlxErrorKind::UniqueViolation,
            _ => SqlxErrorKind::Other,
        }
    }
}

pub(crate) fn sqlstate(code: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(SqlStateError {
        code,
        message: format!("server error {}", code),
    }))
}

#[derive(Debug, Default)]
pub(crate) struct FakeStore {
    /// Probes that fail before the store comes up
    pub probe_failures: u32,
    pub probes: u32,
    pub devices: BTreeMap<String, String>,
    pub device_failures: u32,
    pub readings: Vec<SensorReading>,
    pub insert_failures: u32,
    pub insert_attempts: u32,
    pub closed: bool,
    pub reconnect_failures: u32,
    pub reconnects: u32,
    /// Reject readings whose device row is missing, like the foreign key
    pub enforce_devices: bool,
}

impl TelemetryStore for FakeStore {
    async fn probe(&mut self) -> Result<()> {
        self.probes += 1;
        if self.probe_failures > 0 {
            self.probe_failures -= 1;
            return Err(refused());
        }
        Ok(())
    }

    async fn ensure_device(&mut self, device_id: &str, location_name: &str) -> Result<()> {
        if self.device_failures > 0 {
            self.device_failures -= 1;
            return Err(refused());
        }
        self.devices
            .entry(device_id.to_string())
            .or_insert_with(|| location_name.to_string());
        Ok(())
    }

    async fn insert_reading(&mut self, reading: &SensorReading) -> Result<()> {
        self.insert_attempts += 1;
        if self.insert_failures > 0 {
            self.insert_failures -= 1;
            return Err(refused());
        }
        if self.enforce_devices && !self.devices.contains_key(&reading.device_id) {
            return Err(sqlstate("23503").into());
        }
        self.readings.push(reading.clone());
        Ok(())
    }

    async fn is_closed(&mut self) -> bool {
        self.closed
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.reconnects += 1;
        if self.reconnect_failures > 0 {
            self.reconnect_failures -= 1;
            return Err(refused());
        }
        self.closed = false;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

/// Records requested sleeps instead of sleeping. With `stop_after` set, the
/// n-th sleep fires `stop` and never returns.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeClock {
    pub sleeps: Rc<RefCell<Vec<Duration>>>,
    pub stop_after: Option<usize>,
    pub stop: Arc<Notify>,
}

impl FakeClock {
    pub fn stopping_after(sleeps: usize) -> Self {
        Self {
            stop_after: Some(sleeps),
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut sleeps = self.sleeps.borrow_mut();
            sleeps.push(duration);
            sleeps.len()
        };
        if self.stop_after == Some(count) {
            self.stop.notify_one();
            std::future::pending::<()>().await;
        }
    }
}
