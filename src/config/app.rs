//! Application configuration structures.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{DEFAULT_SEPARATOR, Field, FieldOrder, LineCodec};
use crate::ingest::{DEFAULT_READ_TIMEOUT, DEFAULT_RETRY_DELAY};
use crate::storage::DEFAULT_MAX_LIMIT;
use crate::transport::{DEFAULT_MAX_LINE_LEN, SerialSettings};

use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default database file.
pub const DEFAULT_DB_PATH: &str = "data/sensor_data.db";

/// Default connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default serial device.
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";

/// Default baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default wait after opening the port.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 5000).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path; parent directories are created on start.
    pub path: PathBuf,

    /// Connection pool size for read operations (default: 4).
    pub pool_size: u32,

    /// MPSC channel capacity for write operations (default: 1024).
    pub channel_capacity: usize,

    /// Largest `limit` a query may request (default: 1000).
    pub max_query_limit: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            pool_size: DEFAULT_POOL_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_query_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

// =============================================================================
// Serial Configuration
// =============================================================================

/// Serial device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (default: "/dev/ttyACM0").
    pub port: String,

    /// Baud rate (default: 9600).
    pub baud_rate: u32,

    /// Longest wait for one line before re-checking for shutdown (default: 1s).
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Wait after opening before reading (default: 2s).
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,

    /// Longest accepted line in bytes.
    pub max_line_len: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl SerialConfig {
    pub fn settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            read_timeout: self.read_timeout,
            settle_delay: self.settle_delay,
            max_line_len: self.max_line_len,
        }
    }
}

// =============================================================================
// Ingest Configuration
// =============================================================================

/// Line format and reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Wait between failed connection attempts (default: 10s).
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Position of each field in a device line.
    pub field_order: Vec<Field>,

    /// Field separator (default: ",").
    pub field_separator: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            field_order: Field::ALL.to_vec(),
            field_separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl IngestConfig {
    /// Build the line codec this section describes.
    pub fn line_codec(&self) -> Result<LineCodec, ConfigError> {
        let order = FieldOrder::new(&self.field_order)?;
        Ok(LineCodec::new(order, self.field_separator.clone())?)
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server configuration.
    pub server: ServerConfig,

    /// Database configuration.
    pub database: DatabaseConfig,

    /// Serial device configuration.
    pub serial: SerialConfig,

    /// Ingest configuration.
    pub ingest: IngestConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content)?;
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate server bind address
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        // Validate server port
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "database path must not be empty".to_string(),
            ));
        }

        // Validate database pool size
        if self.database.pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "database pool_size must be positive".to_string(),
            ));
        }

        // Validate channel capacity
        if self.database.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "database channel_capacity must be positive".to_string(),
            ));
        }

        if self.database.max_query_limit == 0 {
            return Err(ConfigError::ValidationError(
                "database max_query_limit must be positive".to_string(),
            ));
        }

        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "serial port must not be empty".to_string(),
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(ConfigError::ValidationError(
                "serial baud_rate must be positive".to_string(),
            ));
        }

        if self.serial.read_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "serial read_timeout must be positive".to_string(),
            ));
        }

        if self.serial.max_line_len == 0 {
            return Err(ConfigError::ValidationError(
                "serial max_line_len must be positive".to_string(),
            ));
        }

        if self.ingest.retry_delay.is_zero() {
            return Err(ConfigError::ValidationError(
                "ingest retry_delay must be positive".to_string(),
            ));
        }

        // Field order must be a permutation of the three fields
        self.ingest.line_codec()?;

        Ok(())
    }

    /// Address the HTTP server binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.bind.parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}
