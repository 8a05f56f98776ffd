//! The reconnecting ingest loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::codec::LineCodec;
use crate::ingest::state::{IngestMonitor, IngestSnapshot, IngestState, IngestStats};
use crate::reading::{Clock, SystemClock};
use crate::storage::{ReadingSink, WriteOutcome};
use crate::transport::{ConnectionManager, Link, ReadOutcome};

/// Wait between failed connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Longest single wait for a line before re-checking for cancellation.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// What happened during one listening step.
enum Step {
    Continue,
    LinkLost,
    Cancelled,
}

/// Reconnecting device reader.
///
/// One loop owns at most one link at a time. Cancellation is observed at
/// every wait (open, read, retry delay); a write that has started is always
/// allowed to finish.
pub struct IngestLoop {
    connector: Box<dyn ConnectionManager>,
    codec: LineCodec,
    sink: Arc<dyn ReadingSink>,
    clock: Arc<dyn Clock>,
    retry_delay: Duration,
    read_timeout: Duration,
    state: watch::Sender<IngestState>,
    stats: Arc<IngestStats>,
}

impl std::fmt::Debug for IngestLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestLoop")
            .field("device", &self.connector.describe())
            .field("retry_delay", &self.retry_delay)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl IngestLoop {
    pub fn new(
        connector: Box<dyn ConnectionManager>,
        codec: LineCodec,
        sink: Arc<dyn ReadingSink>,
    ) -> Self {
        let (state, _) = watch::channel(IngestState::Disconnected);
        Self {
            connector,
            codec,
            sink,
            clock: Arc::new(SystemClock),
            retry_delay: DEFAULT_RETRY_DELAY,
            read_timeout: DEFAULT_READ_TIMEOUT,
            state,
            stats: Arc::new(IngestStats::default()),
        }
    }

    /// Replace the clock used to stamp readings.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Read-only view of this loop's state and counters.
    pub fn monitor(&self) -> IngestMonitor {
        IngestMonitor::new(self.state.subscribe(), Arc::clone(&self.stats))
    }

    /// Run until `cancel` fires. Returns the final counters.
    pub async fn run(self, cancel: CancellationToken) -> IngestSnapshot {
        let device = self.connector.describe();
        tracing::info!(device = %device, "Ingest loop started");

        let mut link: Option<Box<dyn Link>> = None;
        loop {
            match link.as_deref_mut() {
                None => {
                    self.set_state(IngestState::Connecting);
                    match self.connect(&cancel).await {
                        Some(opened) => {
                            self.set_state(IngestState::Listening);
                            link = Some(opened);
                        }
                        None if cancel.is_cancelled() => break,
                        None => {}
                    }
                }
                Some(active) => match self.listen(active, &cancel).await {
                    Step::Continue => {}
                    Step::LinkLost => {
                        active.close().await;
                        link = None;
                        self.set_state(IngestState::Disconnected);
                    }
                    Step::Cancelled => break,
                },
            }
        }

        self.set_state(IngestState::Draining);
        if let Some(mut active) = link.take() {
            active.close().await;
        }

        let snapshot = self.stats.snapshot(IngestState::Draining);
        tracing::info!(
            device = %device,
            lines = snapshot.lines_received,
            written = snapshot.readings_written,
            duplicates = snapshot.duplicates,
            rejections = snapshot.rejections,
            storage_errors = snapshot.storage_errors,
            "Ingest loop stopped"
        );
        snapshot
    }

    /// One connection attempt, followed by the retry delay if it failed.
    ///
    /// Returns `None` on failure or cancellation.
    async fn connect(&self, cancel: &CancellationToken) -> Option<Box<dyn Link>> {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = self.connector.open() => result,
        };

        match opened {
            Ok(link) => {
                tracing::info!(device = %self.connector.describe(), "Device connected");
                Some(link)
            }
            Err(e) => {
                self.stats.connect_failure();
                tracing::warn!(
                    device = %self.connector.describe(),
                    error = %e,
                    retry_in = ?self.retry_delay,
                    "Connection failed"
                );
                self.stats.retry_wait();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
                None
            }
        }
    }

    async fn listen(&self, link: &mut dyn Link, cancel: &CancellationToken) -> Step {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Step::Cancelled,
            result = link.read_line(self.read_timeout) => result,
        };

        match outcome {
            Ok(ReadOutcome::Line(raw)) => {
                self.handle_line(&raw).await;
                Step::Continue
            }
            Ok(ReadOutcome::Timeout) => Step::Continue,
            Err(e) => {
                self.stats.disconnect();
                tracing::warn!(error = %e, "Device link lost");
                Step::LinkLost
            }
        }
    }

    async fn handle_line(&self, raw: &str) {
        self.stats.line_received();

        let reading = match self.codec.parse(raw, self.clock.as_ref()) {
            Ok(reading) => reading,
            Err(rejection) => {
                self.stats.rejection();
                tracing::warn!(error = %rejection, line = %raw, "Line rejected");
                return;
            }
        };

        let summary = reading.to_string();
        match self.sink.write(reading).await {
            Ok(WriteOutcome::Written) => {
                self.stats.reading_written();
                tracing::debug!(reading = %summary, "Reading stored");
            }
            Ok(WriteOutcome::Duplicate) => {
                self.stats.duplicate();
                tracing::debug!(reading = %summary, "Duplicate reading skipped");
            }
            Err(e) => {
                self.stats.storage_error();
                tracing::error!(error = %e, reading = %summary, "Failed to store reading");
            }
        }
    }

    fn set_state(&self, next: IngestState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "Ingest state changed");
        }
    }
}
