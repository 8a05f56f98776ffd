//! User-facing storage facades.
//!
//! Provides ergonomic APIs for storage operations:
//! - `StorageWriter`: writes through the actor channel, one reply per reading
//! - `ReadingReader`: most-recent-first queries on the read pool
//! - `StorageAdmin`: checkpoint and shutdown

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::DateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tokio::sync::{mpsc, oneshot};

use crate::reading::Reading;
use crate::storage::StorageError;
use crate::storage::actor::Command;
use crate::storage::db::SqlitePool;
use crate::storage::types::{ReadingQuery, WriteOutcome};

// =============================================================================
// Sink
// =============================================================================

/// Destination for validated readings.
///
/// The ingest loop and the manual-entry endpoint write through this trait so
/// either can be driven against an in-memory sink in tests.
#[async_trait::async_trait]
pub trait ReadingSink: Send + Sync + 'static {
    /// Persist one reading. A duplicate key is `Ok(WriteOutcome::Duplicate)`.
    async fn write(&self, reading: Reading) -> Result<WriteOutcome, StorageError>;
}

// =============================================================================
// Writer
// =============================================================================

/// Storage writer.
///
/// Uses `try_send`: if the actor's queue is full the reading is refused with
/// [`StorageError::ChannelSend`] instead of blocking the caller.
#[derive(Clone)]
pub struct StorageWriter {
    tx: mpsc::Sender<Command>,
    dropped_writes: Arc<AtomicU64>,
}

impl std::fmt::Debug for StorageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageWriter").finish_non_exhaustive()
    }
}

impl StorageWriter {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self {
            tx,
            dropped_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total readings refused because the writer queue was full or closed.
    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes.load(Ordering::Relaxed)
    }

    /// Queue a reading and wait for the actor to commit it.
    pub async fn insert(&self, reading: Reading) -> Result<WriteOutcome, StorageError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.try_send(Command::Write { reading, reply }).is_err() {
            tracing::warn!("Writer queue full or closed, dropping reading");
            self.dropped_writes.fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::ChannelSend);
        }
        rx.await.map_err(|_| StorageError::ChannelRecv)?
    }
}

#[async_trait::async_trait]
impl ReadingSink for StorageWriter {
    async fn write(&self, reading: Reading) -> Result<WriteOutcome, StorageError> {
        self.insert(reading).await
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Reading query facade over the read pool.
#[derive(Clone)]
pub struct ReadingReader {
    pool: SqlitePool,
    max_limit: u32,
}

impl std::fmt::Debug for ReadingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingReader")
            .field("max_limit", &self.max_limit)
            .finish_non_exhaustive()
    }
}

impl ReadingReader {
    pub(crate) fn new(pool: SqlitePool, max_limit: u32) -> Self {
        Self { pool, max_limit }
    }

    /// Upper bound applied to query limits.
    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// Readings matching `q`, newest first.
    ///
    /// Ties on timestamp are broken by insertion order, newest first.
    pub async fn query(&self, q: &ReadingQuery) -> Result<Vec<Reading>, StorageError> {
        let limit = q.clamped_limit(self.max_limit);

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT timestamp, sensor_id, sensor_type, value FROM readings");
        push_filters(&mut qb, q);
        qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(self.pool.inner()).await?;
        rows.iter().map(row_to_reading).collect()
    }

    /// Number of readings matching the filters of `q`. The limit is ignored.
    pub async fn count(&self, q: &ReadingQuery) -> Result<i64, StorageError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM readings");
        push_filters(&mut qb, q);

        let row = qb.build().fetch_one(self.pool.inner()).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    /// Cheap round trip used by readiness checks.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(self.pool.inner()).await?;
        Ok(())
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, q: &ReadingQuery) {
    let mut sep = " WHERE ";
    if let Some(sensor_id) = &q.sensor_id {
        qb.push(sep).push("sensor_id = ").push_bind(sensor_id.clone());
        sep = " AND ";
    }
    if let Some(sensor_type) = &q.sensor_type {
        qb.push(sep)
            .push("sensor_type = ")
            .push_bind(sensor_type.clone());
    }
}

/// Rebuild a reading from a row, re-checking its invariants.
fn row_to_reading(row: &SqliteRow) -> Result<Reading, StorageError> {
    let micros: i64 = row.try_get("timestamp")?;
    let timestamp = DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp {micros} out of range")))?;
    let sensor_id: String = row.try_get("sensor_id")?;
    let sensor_type: String = row.try_get("sensor_type")?;
    let value: f64 = row.try_get("value")?;

    Reading::new(sensor_id, sensor_type, value, timestamp)
        .map_err(|e| StorageError::InvalidData(e.to_string()))
}

// =============================================================================
// Admin
// =============================================================================

/// Maintenance facade.
#[derive(Clone)]
pub struct StorageAdmin {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for StorageAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdmin").finish_non_exhaustive()
    }
}

impl StorageAdmin {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Fold the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), StorageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Checkpoint { reply })
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        rx.await.map_err(|_| StorageError::ChannelRecv)?
    }

    /// Ask the writer to stop after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| StorageError::ChannelSend)
    }
}
