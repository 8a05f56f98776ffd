//! Core transport traits and types.

use std::time::Duration;

use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Errors raised by the transport.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Device could not be opened (not found, permission, busy).
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    /// Device went away mid-stream.
    #[error("device disconnected: {0}")]
    Disconnected(String),

    /// I/O error while reading.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Read attempted on a link that is already closed.
    #[error("link is closed")]
    Closed,
}

/// Result of a single bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete, non-empty line (trimmed).
    Line(String),
    /// No complete line arrived within the timeout. This is the idle case,
    /// not a failure.
    Timeout,
}

/// Lifecycle of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum LinkState {
    Closed,
    Open,
}

/// An open handle on the device.
///
/// Once `read_line` returns a [`ConnectionError`] the link is closed and
/// every later read fails with [`ConnectionError::Closed`].
#[async_trait::async_trait]
pub trait Link: Send {
    /// Wait up to `timeout` for the next complete line.
    async fn read_line(&mut self, timeout: Duration) -> Result<ReadOutcome, ConnectionError>;

    /// Release the transport. Idempotent.
    async fn close(&mut self);

    /// Current link state.
    fn state(&self) -> LinkState;
}

/// Opens links to one physical device.
#[async_trait::async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    /// Human-readable description of the device address (for logs).
    fn describe(&self) -> String;

    /// Open a new link.
    async fn open(&self) -> Result<Box<dyn Link>, ConnectionError>;
}
