//! Core data types for the storage layer.
//!
//! - [`WriteOutcome`]: result of a successful write (stored or duplicate)
//! - [`ReadingQuery`]: filters and limit for reading retrieval

use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// Default number of readings returned when no limit is given.
pub const DEFAULT_LIMIT: u32 = 100;

/// Smallest limit a query is clamped to.
pub const MIN_LIMIT: u32 = 1;

/// Default upper bound a query limit is clamped to.
pub const DEFAULT_MAX_LIMIT: u32 = 1000;

/// Non-error result of writing a reading.
///
/// A duplicate is an expected outcome: the device or clock resolution can
/// legitimately repeat a `(timestamp, sensor_id, sensor_type)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WriteOutcome {
    /// Record persisted.
    Written,
    /// A record with the same key already exists; nothing was written.
    Duplicate,
}

/// Query for readings, most recent first.
///
/// Filters are ANDed when both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingQuery {
    /// Requested row count; clamped rather than rejected.
    pub limit: Option<i64>,
    /// Only readings from this sensor.
    pub sensor_id: Option<String>,
    /// Only readings of this type.
    pub sensor_type: Option<String>,
}

impl ReadingQuery {
    /// Latest `limit` readings without filters.
    pub fn latest(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn with_sensor_id(mut self, sensor_id: impl Into<String>) -> Self {
        self.sensor_id = Some(sensor_id.into());
        self
    }

    pub fn with_sensor_type(mut self, sensor_type: impl Into<String>) -> Self {
        self.sensor_type = Some(sensor_type.into());
        self
    }

    /// Limit clamped to `[MIN_LIMIT, max_limit]`, or the default if unset.
    pub fn clamped_limit(&self, max_limit: u32) -> i64 {
        let max = i64::from(max_limit.max(MIN_LIMIT));
        self.limit
            .unwrap_or(i64::from(DEFAULT_LIMIT))
            .clamp(i64::from(MIN_LIMIT), max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_limit() {
        let max = DEFAULT_MAX_LIMIT;
        assert_eq!(ReadingQuery::default().clamped_limit(max), 100);
        assert_eq!(ReadingQuery::latest(0).clamped_limit(max), 1);
        assert_eq!(ReadingQuery::latest(-5).clamped_limit(max), 1);
        assert_eq!(ReadingQuery::latest(25).clamped_limit(max), 25);
        assert_eq!(ReadingQuery::latest(1_000_000).clamped_limit(max), 1000);
        assert_eq!(ReadingQuery::default().clamped_limit(50), 50);
    }

    #[test]
    fn test_write_outcome_names() {
        assert_eq!(WriteOutcome::Written.as_ref(), "written");
        assert_eq!(WriteOutcome::Duplicate.to_string(), "duplicate");
        assert_eq!(
            serde_json::to_value(WriteOutcome::Duplicate).unwrap(),
            serde_json::json!("duplicate")
        );
    }

    #[test]
    fn test_builder_filters() {
        let q = ReadingQuery::latest(10)
            .with_sensor_id("PHProbe-Tank1")
            .with_sensor_type("pH");
        assert_eq!(q.sensor_id.as_deref(), Some("PHProbe-Tank1"));
        assert_eq!(q.sensor_type.as_deref(), Some("pH"));
    }
}
