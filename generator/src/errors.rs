use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(#[source] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Database unreachable after {attempts} attempts: {last_error}")]
    Unreachable { attempts: u32, last_error: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure class used where the ingestion loop decides what to log
/// and how to label the failure metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    ConstraintViolation,
    Serialization,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::ConstraintViolation => "constraint_violation",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) | Error::Unreachable { .. } | Error::Io(_) => ErrorKind::Connection,
            Error::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Database(_) | Error::Migration(_) | Error::Config(_) => ErrorKind::Other,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Error::Connection(err),
            sqlx::Error::Decode(_)
            | sqlx::Error::Encode(_)
            | sqlx::Error::ColumnDecode { .. } => Error::Serialization(err.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
                if is_connection_state(&code) {
                    Error::Connection(err)
                } else if code.starts_with("23") {
                    // integrity_constraint_violation class
                    Error::ConstraintViolation(err)
                } else if code.starts_with("22") {
                    // data_exception class
                    Error::Serialization(err.to_string())
                } else {
                    Error::Database(err)
                }
            }
            _ => Error::Database(err),
        }
    }
}

fn is_connection_state(code: &str) -> bool {
    code.starts_with("08") // connection_exception class
        || code == "57P01" // admin_shutdown
        || code == "57P02" // crash_shutdown
        || code == "57P03" // cannot_connect_now
        || code == "53300" // too_many_connections
}
