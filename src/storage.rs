//! Storage Layer
//!
//! SQLite storage with async read/write separation:
//! - **Writer**: Async task with exclusive writes using tokio mpsc channel
//! - **Reader**: Connection pool for concurrent reads
//!
//! Readings are keyed by `(timestamp, sensor_id, sensor_type)`. Writing a key
//! that already exists leaves the stored record untouched and reports
//! [`WriteOutcome::Duplicate`].
//!
//! # Components
//!
//! - [`StorageWriter`] / [`ReadingSink`]: write facade via async channel
//! - [`ReadingReader`]: async read facade
//! - [`StorageAdmin`]: checkpoint and shutdown
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management

mod actor;
mod builder;
pub mod db;
mod error;
mod facades;
mod schema;
mod types;

pub use builder::{StorageBuilder, StorageHandles, init_db};
pub use error::StorageError;
pub use facades::{ReadingReader, ReadingSink, StorageAdmin, StorageWriter};
pub use types::{DEFAULT_LIMIT, DEFAULT_MAX_LIMIT, MIN_LIMIT, ReadingQuery, WriteOutcome};
