//! Sensor Logger - serial sensor ingestion library
//!
//! Reads delimited text lines from a measurement device on a serial port,
//! turns them into validated readings, stores them in SQLite with duplicate
//! suppression and serves them over HTTP. It can be used as a library or run
//! as the `sensor-logger` binary.
//!
//! # Architecture
//!
//! - **Transport**: serial link with bounded line reads and reconnects
//! - **Codec**: configurable field order and separator, pure parsing
//! - **Ingest**: cancellable state machine tying transport, codec and storage together
//! - **Storage**: SQLite single-writer actor plus a read pool
//! - **Server**: axum query API, manual entry and health probes
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sensor_logger::{IngestLoop, LineCodec, SerialConnector, SerialSettings, StorageBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! let storage = StorageBuilder::new("data/sensor_data.db").build().await?;
//! let connector = SerialConnector::new(SerialSettings::new("/dev/ttyACM0", 9600));
//! let ingest = IngestLoop::new(
//!     Box::new(connector),
//!     LineCodec::default(),
//!     Arc::new(storage.writer.clone()),
//! );
//! let snapshot = ingest.run(CancellationToken::new()).await;
//! ```

pub mod codec;
pub mod config;
pub mod ingest;
pub mod manual;
pub mod reading;
pub mod server;
pub mod storage;
pub mod transport;

pub use codec::{Field, FieldOrder, LineCodec, Rejection};
pub use config::{AppConfig, ConfigError};
pub use ingest::{IngestLoop, IngestMonitor, IngestSnapshot, IngestState};
pub use reading::{Clock, Reading, ReadingError, SystemClock};
pub use storage::{
    ReadingQuery, ReadingReader, ReadingSink, StorageBuilder, StorageError, StorageHandles,
    StorageWriter, WriteOutcome,
};
pub use transport::{ConnectionError, ConnectionManager, Link, SerialConnector, SerialSettings};
