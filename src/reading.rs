//! Reading value object.
//!
//! A [`Reading`] is one validated, timestamped measurement. [`Reading::new`]
//! is the only way to build one, so every reading in the system (serial,
//! manual entry, or loaded back from storage) passed the same checks:
//!
//! - `sensor_id` and `sensor_type` are non-empty after trimming
//! - `value` is finite
//!
//! No range validation is applied to `value`; zero and negative numbers are
//! valid measurements.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors produced when a reading fails validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadingError {
    /// Sensor identifier is empty after trimming.
    #[error("sensor id is empty")]
    EmptySensorId,

    /// Sensor type is empty after trimming.
    #[error("sensor type is empty")]
    EmptySensorType,

    /// Value text could not be parsed as a number.
    #[error("value '{0}' is not a number")]
    UnparseableValue(String),

    /// Value is NaN or infinite.
    #[error("value {0} is not finite")]
    NonFiniteValue(f64),
}

/// Source of "now" for stamping readings.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to the microsecond precision the store persists.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// One validated measurement from a sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(serialize_with = "serialize_rfc3339")]
    timestamp: DateTime<Utc>,
    sensor_id: String,
    #[serde(rename = "type")]
    sensor_type: String,
    value: f64,
}

impl Reading {
    /// Build a reading, trimming the identifiers and checking the invariants.
    pub fn new(
        sensor_id: impl AsRef<str>,
        sensor_type: impl AsRef<str>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ReadingError> {
        let sensor_id = sensor_id.as_ref().trim();
        if sensor_id.is_empty() {
            return Err(ReadingError::EmptySensorId);
        }
        let sensor_type = sensor_type.as_ref().trim();
        if sensor_type.is_empty() {
            return Err(ReadingError::EmptySensorType);
        }
        if !value.is_finite() {
            return Err(ReadingError::NonFiniteValue(value));
        }

        Ok(Self {
            timestamp,
            sensor_id: sensor_id.to_string(),
            sensor_type: sensor_type.to_string(),
            value,
        })
    }

    /// Build a reading from an unparsed value field.
    ///
    /// Parsing is locale independent (`.` is the only decimal separator).
    pub fn parse(
        sensor_id: impl AsRef<str>,
        sensor_type: impl AsRef<str>,
        value: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ReadingError> {
        let trimmed = value.trim();
        let parsed = trimmed
            .parse::<f64>()
            .map_err(|_| ReadingError::UnparseableValue(trimmed.to_string()))?;
        Self::new(sensor_id, sensor_type, parsed, timestamp)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn sensor_type(&self) -> &str {
        &self.sensor_type
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}={} @ {}",
            self.sensor_id,
            self.sensor_type,
            self.value,
            self.timestamp.to_rfc3339()
        )
    }
}

fn serialize_rfc3339<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_new_trims_identifiers() {
        let reading = Reading::new("  PHProbe-Tank1 ", "\tpH", 6.75, ts()).unwrap();
        assert_eq!(reading.sensor_id(), "PHProbe-Tank1");
        assert_eq!(reading.sensor_type(), "pH");
        assert_eq!(reading.value(), 6.75);
        assert_eq!(reading.timestamp(), ts());
    }

    #[test]
    fn test_new_rejects_empty_fields() {
        assert_eq!(
            Reading::new("   ", "pH", 1.0, ts()).unwrap_err(),
            ReadingError::EmptySensorId
        );
        assert_eq!(
            Reading::new("probe", "", 1.0, ts()).unwrap_err(),
            ReadingError::EmptySensorType
        );
    }

    #[test]
    fn test_new_rejects_non_finite() {
        assert!(matches!(
            Reading::new("probe", "pH", f64::NAN, ts()),
            Err(ReadingError::NonFiniteValue(_))
        ));
        assert!(matches!(
            Reading::new("probe", "pH", f64::NEG_INFINITY, ts()),
            Err(ReadingError::NonFiniteValue(_))
        ));
    }

    #[test]
    fn test_zero_and_negative_values_are_valid() {
        assert!(Reading::new("probe", "ORP", 0.0, ts()).is_ok());
        assert!(Reading::new("probe", "ORP", -210.5, ts()).is_ok());
    }

    #[test]
    fn test_parse_value() {
        let reading = Reading::parse("probe", "EC", " 1.42 ", ts()).unwrap();
        assert_eq!(reading.value(), 1.42);

        assert_eq!(
            Reading::parse("probe", "EC", "high", ts()).unwrap_err(),
            ReadingError::UnparseableValue("high".to_string())
        );
        // Comma decimal separators are not accepted
        assert!(Reading::parse("probe", "EC", "1,42", ts()).is_err());
        assert!(matches!(
            Reading::parse("probe", "EC", "inf", ts()),
            Err(ReadingError::NonFiniteValue(_))
        ));
    }

    #[test]
    fn test_serialize_shape() {
        let reading = Reading::new("PHProbe-Tank1", "pH", 6.75, ts()).unwrap();
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["sensor_id"], "PHProbe-Tank1");
        assert_eq!(json["type"], "pH");
        assert_eq!(json["value"], 6.75);
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_system_clock_microsecond_precision() {
        let now = SystemClock.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }
}
