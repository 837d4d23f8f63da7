pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod telemetry;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;
