//! Manual entry.
//!
//! Readings typed in by an operator instead of read from the device. The
//! entry goes through [`Reading::new`], so it obeys exactly the same rules
//! as a parsed device line. The timestamp is optional; when given it may be
//! RFC 3339 or the minute-precision form `YYYY-MM-DDTHH:MM`, which is taken
//! as UTC.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::reading::{Clock, Reading, ReadingError};

/// Minute-precision timestamp accepted for manual entry.
pub const MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Why a manual entry was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManualEntryError {
    #[error(transparent)]
    Invalid(#[from] ReadingError),

    #[error("invalid timestamp '{0}': expected RFC 3339 or YYYY-MM-DDTHH:MM")]
    Timestamp(String),
}

/// One operator-supplied measurement (wire format).
#[derive(Debug, Clone, Deserialize)]
pub struct ManualEntry {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub value: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ManualEntry {
    /// Validate into a reading, stamping it with `clock` if no timestamp was given.
    pub fn into_reading(self, clock: &dyn Clock) -> Result<Reading, ManualEntryError> {
        let timestamp = match self.timestamp.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => parse_timestamp(raw)?,
            _ => clock.now(),
        };
        Ok(Reading::new(
            self.sensor_id,
            self.sensor_type,
            self.value,
            timestamp,
        )?)
    }
}

/// Parse an RFC 3339 or `YYYY-MM-DDTHH:MM` timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ManualEntryError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc).trunc_subsecs(6));
    }
    NaiveDateTime::parse_from_str(raw, MINUTE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ManualEntryError::Timestamp(raw.to_string()))
}
