//! Database backend.
//!
//! SQLite via sqlx. The writer and the readers use separate pools over the
//! same file; WAL mode lets readers proceed while the writer commits.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect(Path::new("data/sensor_data.db"), 4).await?;
//! let row: (i64,) = sqlx::query_as("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::SqlitePool;
