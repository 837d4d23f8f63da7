use crate::clock::Clock;
use crate::config::{GeneratorConfig, RegistrationPolicy};
use crate::db::TelemetryStore;
use crate::errors::{ErrorKind, Result};
use crate::metrics::{INGEST_FAILURES_TOTAL, INSERT_LATENCY_SECONDS, READINGS_TOTAL, RECONNECTS_TOTAL};
use crate::model::SensorReading;
use crate::registry::ensure_device_exists;
use crate::telemetry::generate_sensor_data;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub pacing: Duration,
    pub backoff: Duration,
    pub registration: RegistrationPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(1),
            backoff: Duration::from_secs(5),
            registration: RegistrationPolicy::PerReading,
        }
    }
}

impl From<&GeneratorConfig> for LoopSettings {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            pacing: config.pacing,
            backoff: config.backoff,
            registration: config.registration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Recovering,
}

/// What a single `step` did
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Persisted(SensorReading),
    /// The reading was dropped; the next step recovers.
    Failed(ErrorKind),
    Recovered { reconnected: bool },
}

/// Generate → register → insert → pace, forever
pub struct IngestLoop<S, C> {
    store: S,
    clock: C,
    settings: LoopSettings,
    state: LoopState,
    persisted: u64,
}

impl<S: TelemetryStore, C: Clock> IngestLoop<S, C> {
    pub fn new(store: S, clock: C, settings: LoopSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            state: LoopState::Running,
            persisted: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn persisted(&self) -> u64 {
        self.persisted
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Hand the connection back, e.g. to close it on shutdown.
    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn step(&mut self) -> StepOutcome {
        match self.state {
            LoopState::Running => self.run_once().await,
            LoopState::Recovering => self.recover().await,
        }
    }

    /// Step until `shutdown` resolves. An in-flight step is abandoned.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting data generation every {:?} (backoff {:?})",
            self.settings.pacing, self.settings.backoff
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.step() => {}
            }
        }

        info!("Shutdown requested after {} readings", self.persisted);
    }

    async fn run_once(&mut self) -> StepOutcome {
        let reading = generate_sensor_data();

        match self.persist(&reading).await {
            Ok(()) => {
                self.persisted += 1;
                READINGS_TOTAL.inc();
                debug!(
                    "Inserted reading for {} ({:.1} C, {})",
                    reading.device_id, reading.temperature, reading.status
                );
                if self.persisted % 1000 == 0 {
                    info!("Persisted {} readings", self.persisted);
                }
                self.clock.sleep(self.settings.pacing).await;
                StepOutcome::Persisted(reading)
            }
            Err(e) => {
                let kind = e.kind();
                INGEST_FAILURES_TOTAL.with_label_values(&[kind.as_str()]).inc();
                match kind {
                    ErrorKind::Connection => {
                        error!("Lost database connection, dropping reading: {}", e)
                    }
                    ErrorKind::ConstraintViolation => {
                        error!("Reading for {} rejected by schema: {}", reading.device_id, e)
                    }
                    ErrorKind::Serialization => error!("Reading could not be encoded: {}", e),
                    ErrorKind::Other => error!("Failed to persist reading: {}", e),
                }
                self.state = LoopState::Recovering;
                StepOutcome::Failed(kind)
            }
        }
    }

    async fn persist(&mut self, reading: &SensorReading) -> Result<()> {
        let start = Instant::now();

        if self.settings.registration == RegistrationPolicy::PerReading
            && !ensure_device_exists(&mut self.store, &reading.device_id).await
        {
            warn!("Inserting reading for unregistered device {}", reading.device_id);
        }
        if let Err(e) = self.store.insert_reading(reading).await {
            if e.kind() == ErrorKind::ConstraintViolation {
                // Device row missing, e.g. its startup upsert failed. The
                // reading is still dropped; the next one for it can land.
                ensure_device_exists(&mut self.store, &reading.device_id).await;
            }
            return Err(e);
        }

        INSERT_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        Ok(())
    }

    async fn recover(&mut self) -> StepOutcome {
        self.clock.sleep(self.settings.backoff).await;

        let mut reconnected = false;
        if self.store.is_closed().await {
            match self.store.reconnect().await {
                Ok(()) => {
                    RECONNECTS_TOTAL.with_label_values(&["success"]).inc();
                    reconnected = true;
                }
                Err(e) => {
                    // Not escalated: the next insert fails and lands here again.
                    RECONNECTS_TOTAL.with_label_values(&["failure"]).inc();
                    warn!("Reconnect failed, continuing anyway: {}", e);
                }
            }
        }

        self.state = LoopState::Running;
        StepOutcome::Recovered { reconnected }
    }
}
