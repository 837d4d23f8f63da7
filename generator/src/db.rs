use crate::errors::Result;
use crate::model::{Device, SensorReading, SensorRow};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Persistence operations the waiter, registrar and ingestion loop need.
#[allow(async_fn_in_trait)]
pub trait TelemetryStore {
    /// Connect if needed and run a trivial round trip.
    async fn probe(&mut self) -> Result<()>;

    /// Insert the device unless a row with the same id already exists.
    async fn ensure_device(&mut self, device_id: &str, location_name: &str) -> Result<()>;

    async fn insert_reading(&mut self, reading: &SensorReading) -> Result<()>;

    /// True when there is no usable connection.
    async fn is_closed(&mut self) -> bool;

    /// Drop the current connection, if any, and open a fresh one.
    async fn reconnect(&mut self) -> Result<()>;

    async fn close(self) -> Result<()>;
}

/// A single long-lived Postgres connection, opened lazily
pub struct PgStore {
    options: PgConnectOptions,
    conn: Option<PgConnection>,
}

impl PgStore {
    pub fn new(options: PgConnectOptions) -> Self {
        Self {
            options,
            conn: None,
        }
    }

    async fn connection(&mut self) -> Result<&mut PgConnection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                debug!("Opening database connection");
                PgConnection::connect_with(&self.options).await?
            }
        };
        Ok(self.conn.insert(conn))
    }

    pub async fn run_migrations(&mut self) -> Result<()> {
        info!("Running database migrations...");
        let conn = self.connection().await?;
        MIGRATOR.run(conn).await?;
        info!("Migrations completed");
        Ok(())
    }

    pub async fn fetch_device(&mut self, device_id: &str) -> Result<Option<Device>> {
        let conn = self.connection().await?;
        let device = sqlx::query_as::<_, Device>(
            "SELECT device_id, location_name FROM devices WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(device)
    }

    pub async fn count_devices(&mut self, device_id: &str) -> Result<i64> {
        let conn = self.connection().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices WHERE device_id = $1")
            .bind(device_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    pub async fn fetch_latest_reading(&mut self, device_id: &str) -> Result<Option<SensorReading>> {
        let conn = self.connection().await?;
        let row = sqlx::query_as::<_, SensorRow>(
            r#"
            SELECT time, device_id, temperature, humidity, pressure,
                   latitude, longitude, status, event_type
            FROM sensor_data
            WHERE device_id = $1
            ORDER BY time DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(SensorReading::try_from).transpose()
    }
}

impl TelemetryStore for PgStore {
    async fn probe(&mut self) -> Result<()> {
        let conn = self.connection().await?;
        let ping = conn.ping().await;
        if let Err(e) = ping {
            self.conn = None;
            return Err(e.into());
        }
        Ok(())
    }

    async fn ensure_device(&mut self, device_id: &str, location_name: &str) -> Result<()> {
        let conn = self.connection().await?;
        sqlx::query(
            "INSERT INTO devices (device_id, location_name) VALUES ($1, $2) \
             ON CONFLICT (device_id) DO NOTHING",
        )
        .bind(device_id)
        .bind(location_name)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn insert_reading(&mut self, reading: &SensorReading) -> Result<()> {
        let conn = self.connection().await?;
        sqlx::query(
            r#"
            INSERT INTO sensor_data (
                time, device_id, temperature, humidity,
                pressure, latitude, longitude, status, event_type
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(reading.time)
        .bind(&reading.device_id)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.pressure)
        .bind(reading.latitude)
        .bind(reading.longitude)
        .bind(reading.status.as_str())
        .bind(reading.event_type.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn is_closed(&mut self) -> bool {
        match self.conn.as_mut() {
            Some(conn) => conn.ping().await.is_err(),
            None => true,
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        // The old handle is usually dead; dropping it is enough.
        self.conn = None;
        self.connection().await?;
        info!("Database connection re-established");
        Ok(())
    }

    async fn close(self) -> Result<()> {
        if let Some(conn) = self.conn {
            conn.close().await?;
            info!("Database connection closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hypertable_setup_cannot_fail_bootstrap() {
        let init = MIGRATOR
            .iter()
            .find(|m| m.description == "init")
            .expect("init migration embedded");

        let sql: &str = &init.sql;
        let guard = sql.find("pg_available_extensions").expect("availability check");
        let extension = sql.find("CREATE EXTENSION").expect("extension step");
        let handler = sql.find("EXCEPTION WHEN OTHERS").expect("exception handler");

        // Extension and hypertable run in their own block with a handler.
        assert!(sql[guard..extension].contains("BEGIN"));
        assert!(extension < handler);
        assert!(sql[extension..handler].contains("create_hypertable"));
        assert!(sql.contains("REFERENCES devices"));
    }
}
