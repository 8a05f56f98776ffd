//! Database schema definitions.

use sqlx::SqlitePool;

use crate::storage::StorageError;

/// SQL statement for creating the readings table.
///
/// Append-only. `timestamp` is unix microseconds (UTC); `id` records
/// insertion order and breaks ties between equal timestamps. The unique
/// constraint is the duplicate key.
pub const READINGS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS readings (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   INTEGER NOT NULL,
    sensor_id   TEXT NOT NULL,
    sensor_type TEXT NOT NULL,
    value       REAL NOT NULL,
    UNIQUE (timestamp, sensor_id, sensor_type)
)
"#;

/// Most-recent-first lookup by sensor id.
pub const READINGS_SENSOR_ID_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_readings_sensor_id_ts
    ON readings (sensor_id, timestamp DESC, id DESC)
"#;

/// Most-recent-first lookup by sensor type.
pub const READINGS_SENSOR_TYPE_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_readings_sensor_type_ts
    ON readings (sensor_type, timestamp DESC, id DESC)
"#;

/// Initialize the database schema.
///
/// Creates the table and indexes if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    for ddl in [
        READINGS_TABLE_DDL,
        READINGS_SENSOR_ID_INDEX_DDL,
        READINGS_SENSOR_TYPE_INDEX_DDL,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Database schema initialized");
    Ok(())
}
