//! Configuration module for the sensor logger.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (path, pool size, channel capacity, query limit)
//! - Serial settings (device, baud rate, timeouts)
//! - Ingest settings (field order, separator, retry delay)

mod app;
mod validation;

pub use app::{
    AppConfig, DatabaseConfig, IngestConfig, SerialConfig, ServerConfig,
    DEFAULT_BAUD_RATE, DEFAULT_CHANNEL_CAPACITY, DEFAULT_DB_PATH, DEFAULT_POOL_SIZE,
    DEFAULT_PORT, DEFAULT_SERIAL_PORT,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
