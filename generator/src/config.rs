use crate::errors::{Error, Result};
use sqlx::postgres::PgConnectOptions;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DB_PORT: u16 = 5432;

/// Connection settings shared by the generator and the seeder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            name: lookup("DB_NAME").unwrap_or_else(|| "iotdata".to_string()),
            user: lookup("DB_USER").unwrap_or_else(|| "iotuser".to_string()),
            password: lookup("DB_PASS").unwrap_or_else(|| "iotpass".to_string()),
        }
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(DB_PORT)
            .database(&self.name)
            .username(&self.user)
            .password(&self.password)
    }

    /// `user@host:port/db`, safe to log
    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, DB_PORT, self.name)
    }
}

/// When device rows are upserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPolicy {
    /// Before every insert
    PerReading,
    /// Whole catalog once, before the loop starts
    Startup,
}

impl FromStr for RegistrationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_reading" => Ok(RegistrationPolicy::PerReading),
            "startup" => Ok(RegistrationPolicy::Startup),
            other => Err(Error::Config(format!(
                "DEVICE_REGISTRATION must be per_reading or startup, got {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub db: DbConfig,
    pub wait_retries: u32,
    pub wait_delay: Duration,
    pub pacing: Duration,
    pub backoff: Duration,
    pub registration: RegistrationPolicy,
    pub run_migrations: bool,
    pub metrics_addr: Option<String>,
}

impl GeneratorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db = DbConfig::from_lookup(&lookup);

        let wait_retries: u32 = parse_or(&lookup, "DB_WAIT_RETRIES", 30);
        let wait_delay_secs: u64 = parse_or(&lookup, "DB_WAIT_DELAY_SECS", 2);
        let pacing_ms: u64 = parse_or(&lookup, "GENERATOR_INTERVAL_MS", 1000);
        let backoff_ms: u64 = parse_or(&lookup, "GENERATOR_BACKOFF_MS", 5000);
        let run_migrations: bool = parse_or(&lookup, "DB_RUN_MIGRATIONS", true);
        let registration = match lookup("DEVICE_REGISTRATION") {
            Some(value) => value.parse()?,
            None => RegistrationPolicy::PerReading,
        };
        let metrics_addr = lookup("METRICS_ADDR").filter(|addr| !addr.trim().is_empty());

        if wait_retries == 0 {
            return Err(Error::Config("DB_WAIT_RETRIES must be at least 1".to_string()));
        }
        if backoff_ms <= pacing_ms {
            return Err(Error::Config(format!(
                "GENERATOR_BACKOFF_MS ({}) must be greater than GENERATOR_INTERVAL_MS ({})",
                backoff_ms, pacing_ms
            )));
        }

        Ok(Self {
            db,
            wait_retries,
            wait_delay: Duration::from_secs(wait_delay_secs),
            pacing: Duration::from_millis(pacing_ms),
            backoff: Duration::from_millis(backoff_ms),
            registration,
            run_migrations,
            metrics_addr,
        })
    }
}

fn parse_or<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
    }
}
