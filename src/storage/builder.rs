//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::actor::DbActor;
use crate::storage::db::SqlitePool;
use crate::storage::types::DEFAULT_MAX_LIMIT;
use crate::storage::{ReadingReader, StorageAdmin, StorageWriter};

/// Default channel capacity for writer commands.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Minimum connection pool size.
const MIN_POOL_SIZE: u32 = 2;

/// Maximum connection pool size.
const MAX_POOL_SIZE: u32 = 32;

/// Calculate default pool size based on available CPU parallelism.
///
/// Returns the number of available CPUs, clamped between MIN_POOL_SIZE and MAX_POOL_SIZE.
fn default_pool_size() -> u32 {
    std::thread::available_parallelism()
        .map(|p| (p.get() as u32).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE))
        .unwrap_or(4)
}

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    db_path: PathBuf,
    pool_size: u32,
    channel_capacity: usize,
    max_query_limit: u32,
}

impl StorageBuilder {
    /// Create a new storage builder.
    ///
    /// Pool size defaults to the number of available CPUs (clamped to 2-32).
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            pool_size: default_pool_size(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_query_limit: DEFAULT_MAX_LIMIT,
        }
    }

    /// Set the connection pool size for readers.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the upper bound applied to query limits.
    pub fn max_query_limit(mut self, limit: u32) -> Self {
        self.max_query_limit = limit;
        self
    }

    /// Build the storage layer and return handles.
    ///
    /// Creates the database file and schema if they do not exist yet.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        ensure_parent_dir(&self.db_path)?;

        // The actor creates the schema, so it must be up before readers query
        let (actor_handle, tx) = DbActor::spawn(&self.db_path, self.channel_capacity).await?;
        let read_pool = SqlitePool::connect(&self.db_path, self.pool_size).await?;

        tracing::info!(
            path = %self.db_path.display(),
            pool_size = self.pool_size,
            channel_capacity = self.channel_capacity,
            "Storage ready"
        );

        Ok(StorageHandles {
            writer: StorageWriter::new(tx.clone()),
            reader: ReadingReader::new(read_pool.clone(), self.max_query_limit),
            admin: StorageAdmin::new(tx),
            actor_handle: Some(actor_handle),
            read_pool,
        })
    }
}

fn ensure_parent_dir(db_path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Create the database file and schema, then close everything.
pub async fn init_db(db_path: impl AsRef<Path>) -> Result<(), StorageError> {
    StorageBuilder::new(db_path)
        .pool_size(1)
        .build()
        .await?
        .shutdown()
        .await
}

/// Handles to all storage layer facades.
pub struct StorageHandles {
    /// Writer facade.
    pub writer: StorageWriter,
    /// Facade for reading readings.
    pub reader: ReadingReader,
    /// Facade for storage administration.
    pub admin: StorageAdmin,
    /// Internal actor handle for graceful shutdown.
    actor_handle: Option<JoinHandle<()>>,
    read_pool: SqlitePool,
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Sends shutdown command to the writer actor, waits for it to finish its
    /// queue, then closes the read pool.
    pub async fn shutdown(mut self) -> Result<(), StorageError> {
        self.admin.shutdown().await?;

        if let Some(handle) = self.actor_handle.take() {
            handle
                .await
                .map_err(|e| StorageError::Internal(format!("Failed to join actor task: {e}")))?;
        }

        self.read_pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Reading;
    use crate::storage::{ReadingQuery, WriteOutcome};
    use chrono::{DateTime, Duration, Utc};
    use tempfile::tempdir;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn reading(id: &str, ty: &str, value: f64, offset_secs: i64) -> Reading {
        Reading::new(id, ty, value, base() + Duration::seconds(offset_secs)).unwrap()
    }

    #[tokio::test]
    async fn test_storage_roundtrip() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("roundtrip.db"))
            .build()
            .await
            .unwrap();

        let original = reading("PHProbe-Tank1", "pH", 6.75, 0);
        assert_eq!(
            handles.writer.insert(original.clone()).await.unwrap(),
            WriteOutcome::Written
        );

        let results = handles.reader.query(&ReadingQuery::default()).await.unwrap();
        assert_eq!(results, vec![original]);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_key_not_stored_twice() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("dup.db"))
            .build()
            .await
            .unwrap();

        let first = reading("probe", "pH", 7.0, 0);
        // Same key, different value
        let second = reading("probe", "pH", 8.0, 0);
        assert_eq!(
            handles.writer.insert(first).await.unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(
            handles.writer.insert(second).await.unwrap(),
            WriteOutcome::Duplicate
        );

        let results = handles.reader.query(&ReadingQuery::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value(), 7.0);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_query_order_filters_and_limit() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("query.db"))
            .build()
            .await
            .unwrap();

        for (i, (id, ty)) in [
            ("PHProbe-Tank1", "pH"),
            ("Temp-Tank", "Water temperature"),
            ("PHProbe-Tank1", "pH"),
            ("PHProbe-Tank2", "pH"),
        ]
        .into_iter()
        .enumerate()
        {
            handles
                .writer
                .insert(reading(id, ty, i as f64, i as i64))
                .await
                .unwrap();
        }

        let all = handles.reader.query(&ReadingQuery::default()).await.unwrap();
        let values: Vec<f64> = all.iter().map(Reading::value).collect();
        assert_eq!(values, vec![3.0, 2.0, 1.0, 0.0]);

        let by_id = handles
            .reader
            .query(&ReadingQuery::default().with_sensor_id("PHProbe-Tank1"))
            .await
            .unwrap();
        assert!(by_id.iter().all(|r| r.sensor_id() == "PHProbe-Tank1"));
        let values: Vec<f64> = by_id.iter().map(Reading::value).collect();
        assert_eq!(values, vec![2.0, 0.0]);

        let by_both = ReadingQuery::default()
            .with_sensor_id("PHProbe-Tank2")
            .with_sensor_type("pH");
        assert_eq!(handles.reader.count(&by_both).await.unwrap(), 1);

        let none = ReadingQuery::default().with_sensor_type("EC");
        assert!(handles.reader.query(&none).await.unwrap().is_empty());

        let limited = handles.reader.query(&ReadingQuery::latest(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].value(), 3.0);

        // Zero is clamped up, not rejected
        let one = handles.reader.query(&ReadingQuery::latest(0)).await.unwrap();
        assert_eq!(one.len(), 1);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_equal_timestamps_newest_insert_first() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("ties.db"))
            .build()
            .await
            .unwrap();

        handles.writer.insert(reading("a", "pH", 1.0, 0)).await.unwrap();
        handles.writer.insert(reading("b", "pH", 2.0, 0)).await.unwrap();

        let results = handles.reader.query(&ReadingQuery::default()).await.unwrap();
        assert_eq!(results[0].sensor_id(), "b");
        assert_eq!(results[1].sensor_id(), "a");

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_max_query_limit() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("max.db"))
            .max_query_limit(2)
            .build()
            .await
            .unwrap();

        for i in 0..5 {
            handles
                .writer
                .insert(reading("probe", "EC", 1.0, i))
                .await
                .unwrap();
        }
        let results = handles.reader.query(&ReadingQuery::latest(50)).await.unwrap();
        assert_eq!(results.len(), 2);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("persist.db");

        let handles = StorageBuilder::new(&db_path).build().await.unwrap();
        handles
            .writer
            .insert(reading("probe", "ORP", -210.5, 0))
            .await
            .unwrap();
        handles.admin.checkpoint().await.unwrap();
        handles.shutdown().await.unwrap();

        let handles = StorageBuilder::new(&db_path).build().await.unwrap();
        let results = handles.reader.query(&ReadingQuery::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value(), -210.5);
        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_after_shutdown_fails() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("closed.db"))
            .build()
            .await
            .unwrap();
        let writer = handles.writer.clone();
        handles.shutdown().await.unwrap();

        let err = writer.insert(reading("probe", "pH", 7.0, 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::ChannelSend));
        assert_eq!(writer.dropped_writes(), 1);
    }

    #[tokio::test]
    async fn test_init_db_creates_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("data").join("sensor_data.db");
        init_db(&db_path).await.unwrap();
        assert!(db_path.exists());

        // Idempotent
        init_db(&db_path).await.unwrap();
    }

    #[test]
    fn test_default_pool_size_within_bounds() {
        let size = super::default_pool_size();
        assert!(size >= super::MIN_POOL_SIZE);
        assert!(size <= super::MAX_POOL_SIZE);
    }
}
