//! Serial port transport.
//!
//! Blocking `serialport` reads run on the blocking thread pool so the async
//! runtime is never stalled by a quiet device.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, FlowControl, SerialPort, SerialPortType};

use super::line_buffer::{DEFAULT_MAX_LINE_LEN, LineBuffer};
use super::traits::{ConnectionError, ConnectionManager, Link, LinkState, ReadOutcome};

/// Read chunk size.
const READ_CHUNK: usize = 256;

/// Settings for opening a serial device.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub port: String,
    /// Baud rate; must match the device firmware.
    pub baud_rate: u32,
    /// Port-level read timeout.
    pub read_timeout: Duration,
    /// Wait after opening before the first read. Many boards reset when the
    /// port opens and print garbage while booting.
    pub settle_delay: Duration,
    /// Longest accepted line in bytes.
    pub max_line_len: usize,
}

impl SerialSettings {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            read_timeout: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// Opens [`SerialLink`]s to one device.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait::async_trait]
impl ConnectionManager for SerialConnector {
    fn describe(&self) -> String {
        format!("{} @ {} baud", self.settings.port, self.settings.baud_rate)
    }

    async fn open(&self) -> Result<Box<dyn Link>, ConnectionError> {
        let settings = self.settings.clone();
        let port_name = settings.port.clone();

        let port = tokio::task::spawn_blocking(move || open_port(&settings))
            .await
            .map_err(|e| ConnectionError::Open {
                port: port_name.clone(),
                reason: e.to_string(),
            })??;

        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        // Drop whatever the device printed while settling
        port.clear(ClearBuffer::Input)
            .map_err(|e| ConnectionError::Open {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(port = %port_name, baud_rate = self.settings.baud_rate, "Serial port opened");
        Ok(Box::new(SerialLink::new(
            port_name,
            port,
            self.settings.max_line_len,
        )))
    }
}

fn open_port(settings: &SerialSettings) -> Result<Box<dyn SerialPort>, ConnectionError> {
    serialport::new(&settings.port, settings.baud_rate)
        .timeout(settings.read_timeout)
        .flow_control(FlowControl::None)
        .open()
        .map_err(|e| ConnectionError::Open {
            port: settings.port.clone(),
            reason: e.to_string(),
        })
}

/// An open serial port framed into lines.
///
/// The port is released on [`Link::close`], on a transport error, and on
/// drop, whichever comes first.
pub struct SerialLink {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    buffer: LineBuffer,
}

impl SerialLink {
    fn new(name: String, port: Box<dyn SerialPort>, max_line_len: usize) -> Self {
        Self {
            name,
            port: Some(port),
            buffer: LineBuffer::new(max_line_len),
        }
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Link for SerialLink {
    async fn read_line(&mut self, timeout: Duration) -> Result<ReadOutcome, ConnectionError> {
        if let Some(line) = self.buffer.next_line() {
            return Ok(ReadOutcome::Line(line));
        }

        let Some(mut port) = self.port.take() else {
            return Err(ConnectionError::Closed);
        };
        let mut buffer = std::mem::take(&mut self.buffer);

        // If this future is dropped mid-read the port is released when the
        // blocking task finishes.
        let (port, buffer, result) = tokio::task::spawn_blocking(move || {
            let result = read_until_line(port.as_mut(), &mut buffer, timeout);
            (port, buffer, result)
        })
        .await
        .map_err(|e| ConnectionError::Disconnected(format!("read task failed: {e}")))?;

        self.buffer = buffer;
        match result {
            Ok(outcome) => {
                self.port = Some(port);
                Ok(outcome)
            }
            Err(e) => {
                drop(port);
                tracing::warn!(port = %self.name, error = %e, "Serial link lost");
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!(port = %self.name, "Serial port closed");
        }
    }

    fn state(&self) -> LinkState {
        if self.port.is_some() {
            LinkState::Open
        } else {
            LinkState::Closed
        }
    }
}

/// Read until a complete line is framed or `timeout` elapses.
fn read_until_line(
    port: &mut dyn SerialPort,
    buffer: &mut LineBuffer,
    timeout: Duration,
) -> Result<ReadOutcome, ConnectionError> {
    let deadline = Instant::now() + timeout;
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if let Some(line) = buffer.next_line() {
            return Ok(ReadOutcome::Line(line));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(ReadOutcome::Timeout);
        }
        port.set_timeout(remaining)
            .map_err(|e| ConnectionError::Disconnected(e.to_string()))?;

        match port.read(&mut chunk) {
            Ok(0) => return Err(ConnectionError::Disconnected("end of stream".to_string())),
            Ok(n) => buffer.push(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(ConnectionError::Io(e)),
        }
    }
}

/// Describe the serial ports present on this machine.
pub fn list_ports() -> Result<Vec<String>, ConnectionError> {
    let ports = serialport::available_ports().map_err(|e| ConnectionError::Open {
        port: "*".to_string(),
        reason: e.to_string(),
    })?;

    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(info) => format!(
                "{} - USB (VID: 0x{:04x}, PID: 0x{:04x}){}",
                port.port_name,
                info.vid,
                info.pid,
                info.product
                    .map(|p| format!(" {p}"))
                    .unwrap_or_default()
            ),
            SerialPortType::PciPort => format!("{} - PCI", port.port_name),
            _ => port.port_name,
        })
        .collect())
}
