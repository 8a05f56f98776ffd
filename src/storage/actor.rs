//! Writer actor with dedicated connection and MPSC channel.
//!
//! Single-writer pattern: one task owns the write connection and processes
//! commands in arrival order. Each write is answered over a oneshot channel
//! once it has committed or failed, so a write that has started always
//! finishes cleanly even if the caller stops waiting.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::reading::Reading;
use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::schema::init_schema;
use crate::storage::types::WriteOutcome;

// =============================================================================
// Constants
// =============================================================================

/// Insert that reports a duplicate key as zero affected rows.
const INSERT_READING_SQL: &str = "INSERT INTO readings (timestamp, sensor_id, sensor_type, value)
     VALUES (?, ?, ?, ?)
     ON CONFLICT (timestamp, sensor_id, sensor_type) DO NOTHING";

const CHECKPOINT_SQL: &str = "PRAGMA wal_checkpoint(TRUNCATE)";

// =============================================================================
// Commands
// =============================================================================

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Insert one reading.
    Write {
        reading: Reading,
        reply: oneshot::Sender<Result<WriteOutcome, StorageError>>,
    },
    /// Force WAL checkpoint.
    Checkpoint {
        reply: oneshot::Sender<Result<(), StorageError>>,
    },
    /// Graceful shutdown.
    Shutdown,
}

// =============================================================================
// Actor
// =============================================================================

/// Database writer actor.
pub struct DbActor {
    pool: SqlitePool,
    rx: mpsc::Receiver<Command>,
}

impl DbActor {
    /// Open the write connection, create the schema and spawn the actor task.
    ///
    /// Returns the task handle and the command sender.
    pub async fn spawn(
        db_path: &Path,
        channel_capacity: usize,
    ) -> Result<(JoinHandle<()>, mpsc::Sender<Command>), StorageError> {
        let pool = SqlitePool::connect(db_path, 1).await?;
        init_schema(pool.inner()).await?;

        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let actor = DbActor { pool, rx };
        let handle = tokio::spawn(actor.run());

        Ok((handle, tx))
    }

    async fn run(mut self) {
        tracing::info!("DbActor started");

        while let Some(cmd) = self.rx.recv().await {
            if self.handle_command(cmd).await {
                break; // Shutdown requested
            }
        }

        if let Err(e) = self.checkpoint().await {
            tracing::warn!(error = %e, "Final checkpoint failed");
        }
        self.pool.close().await;
        tracing::info!("DbActor stopped");
    }

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Write { reading, reply } => {
                let result = self.insert_reading(&reading).await;
                if let Err(e) = &result {
                    tracing::debug!(error = %e, reading = %reading, "Reading insert failed");
                }
                // Caller may have given up waiting; the write is done either way
                let _ = reply.send(result);
            }
            Command::Checkpoint { reply } => {
                let _ = reply.send(self.checkpoint().await);
            }
            Command::Shutdown => {
                tracing::info!("DbActor shutting down");
                return true;
            }
        }
        false
    }

    async fn insert_reading(&self, r: &Reading) -> Result<WriteOutcome, StorageError> {
        let result = sqlx::query(INSERT_READING_SQL)
            .bind(r.timestamp().timestamp_micros())
            .bind(r.sensor_id())
            .bind(r.sensor_type())
            .bind(r.value())
            .execute(self.pool.inner())
            .await?;

        if result.rows_affected() == 0 {
            Ok(WriteOutcome::Duplicate)
        } else {
            Ok(WriteOutcome::Written)
        }
    }

    async fn checkpoint(&self) -> Result<(), StorageError> {
        sqlx::query(CHECKPOINT_SQL)
            .execute(self.pool.inner())
            .await?;
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use tempfile::tempdir;

    fn reading(id: &str) -> Reading {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Reading::new(id, "pH", 7.0, ts).unwrap()
    }

    async fn write(tx: &mpsc::Sender<Command>, reading: Reading) -> WriteOutcome {
        let (reply, rx) = oneshot::channel();
        tx.send(Command::Write { reading, reply }).await.unwrap();
        rx.await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_actor_lifecycle() {
        let dir = tempdir().unwrap();
        let (handle, tx) = DbActor::spawn(&dir.path().join("test.db"), 16)
            .await
            .unwrap();
        tx.send(Command::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_then_duplicate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("dup.db");
        let (handle, tx) = DbActor::spawn(&db_path, 16).await.unwrap();

        assert_eq!(write(&tx, reading("probe")).await, WriteOutcome::Written);
        assert_eq!(write(&tx, reading("probe")).await, WriteOutcome::Duplicate);
        assert_eq!(write(&tx, reading("other")).await, WriteOutcome::Written);

        let (reply, rx) = oneshot::channel();
        tx.send(Command::Checkpoint { reply }).await.unwrap();
        rx.await.unwrap().unwrap();

        tx.send(Command::Shutdown).await.unwrap();
        handle.await.unwrap();

        let pool = SqlitePool::connect(&db_path, 1).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM readings")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(count.0, 2);
    }

    #[tokio::test]
    async fn test_actor_stops_when_senders_dropped() {
        let dir = tempdir().unwrap();
        let (handle, tx) = DbActor::spawn(&dir.path().join("drop.db"), 4)
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
