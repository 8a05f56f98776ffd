//! Transport Layer
//!
//! Owns the physical link to the device. A [`ConnectionManager`] opens a
//! [`Link`]; the link yields complete text lines with a bounded wait and
//! reports a lost device as a [`ConnectionError`], after which it is closed
//! for good and a fresh one must be opened.
//!
//! # Components
//!
//! - [`ConnectionManager`] / [`Link`]: async traits the ingest loop drives
//! - [`LineBuffer`]: byte-to-line framing with lossy UTF-8 decoding
//! - [`SerialConnector`] / [`SerialLink`]: serial port implementation

mod line_buffer;
pub mod serial;
mod traits;

pub use line_buffer::{DEFAULT_MAX_LINE_LEN, LineBuffer};
pub use serial::{SerialConnector, SerialLink, SerialSettings, list_ports};
pub use traits::{ConnectionError, ConnectionManager, Link, LinkState, ReadOutcome};
