//! Ingest Layer
//!
//! Drives the device: opens a link through a [`ConnectionManager`], reads
//! lines, parses them with a [`LineCodec`] and hands readings to a
//! [`ReadingSink`]. A lost or missing device is retried with a fixed delay
//! until the loop is cancelled.
//!
//! # Components
//!
//! - [`IngestLoop`]: the reconnecting state machine
//! - [`IngestState`] / [`IngestStats`] / [`IngestSnapshot`]: what it is doing and what it has done
//! - [`IngestMonitor`]: cloneable read-only view for the HTTP status endpoint
//!
//! [`ConnectionManager`]: crate::transport::ConnectionManager
//! [`LineCodec`]: crate::codec::LineCodec
//! [`ReadingSink`]: crate::storage::ReadingSink

mod runner;
mod state;

pub use runner::{DEFAULT_READ_TIMEOUT, DEFAULT_RETRY_DELAY, IngestLoop};
pub use state::{IngestMonitor, IngestSnapshot, IngestState, IngestStats};
