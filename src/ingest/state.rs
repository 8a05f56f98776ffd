//! Ingest state and counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::sync::watch;

/// Where the ingest loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IngestState {
    /// No link; about to connect.
    Disconnected,
    /// Opening the device, or waiting out the retry delay.
    Connecting,
    /// Link open, reading lines.
    Listening,
    /// Cancelled; closing the link and returning.
    Draining,
}

/// Running counters, shared between the loop and its monitors.
#[derive(Debug, Default)]
pub struct IngestStats {
    lines_received: AtomicU64,
    readings_written: AtomicU64,
    duplicates: AtomicU64,
    rejections: AtomicU64,
    storage_errors: AtomicU64,
    connect_failures: AtomicU64,
    retry_waits: AtomicU64,
    disconnects: AtomicU64,
}

impl IngestStats {
    pub(crate) fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reading_written(&self) {
        self.readings_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retry_wait(&self) {
        self.retry_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self, state: IngestState) -> IngestSnapshot {
        IngestSnapshot {
            state,
            lines_received: self.lines_received.load(Ordering::Relaxed),
            readings_written: self.readings_written.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            retry_waits: self.retry_waits.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub state: IngestState,
    pub lines_received: u64,
    pub readings_written: u64,
    pub duplicates: u64,
    pub rejections: u64,
    pub storage_errors: u64,
    pub connect_failures: u64,
    pub retry_waits: u64,
    pub disconnects: u64,
}

/// Read-only handle on a running loop.
#[derive(Debug, Clone)]
pub struct IngestMonitor {
    state: watch::Receiver<IngestState>,
    stats: Arc<IngestStats>,
}

impl IngestMonitor {
    pub(crate) fn new(state: watch::Receiver<IngestState>, stats: Arc<IngestStats>) -> Self {
        Self { state, stats }
    }

    /// Current state.
    pub fn state(&self) -> IngestState {
        *self.state.borrow()
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        self.stats.snapshot(self.state())
    }

    /// Wait until the loop reaches `target`.
    ///
    /// Returns `false` if the loop is gone without reaching it.
    pub async fn wait_for(&mut self, target: IngestState) -> bool {
        self.state.wait_for(|s| *s == target).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = IngestStats::default();
        stats.line_received();
        stats.line_received();
        stats.reading_written();
        stats.rejection();
        stats.retry_wait();

        let snap = stats.snapshot(IngestState::Listening);
        assert_eq!(snap.lines_received, 2);
        assert_eq!(snap.readings_written, 1);
        assert_eq!(snap.rejections, 1);
        assert_eq!(snap.retry_waits, 1);
        assert_eq!(snap.duplicates, 0);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(IngestState::Listening.to_string(), "listening");
        let json = serde_json::to_value(IngestStats::default().snapshot(IngestState::Draining))
            .unwrap();
        assert_eq!(json["state"], "draining");
        assert_eq!(json["storage_errors"], 0);
    }

    #[tokio::test]
    async fn test_monitor_follows_state() {
        let (tx, rx) = watch::channel(IngestState::Disconnected);
        let mut monitor = IngestMonitor::new(rx, Arc::new(IngestStats::default()));
        assert_eq!(monitor.state(), IngestState::Disconnected);

        tx.send_replace(IngestState::Listening);
        assert!(monitor.wait_for(IngestState::Listening).await);
        assert_eq!(monitor.snapshot().state, IngestState::Listening);

        drop(tx);
        assert!(!monitor.wait_for(IngestState::Draining).await);
    }
}
