//! Line codec.
//!
//! Turns one raw delimited text line from the device into a [`Reading`].
//! The position of each field is described by a [`FieldOrder`], a
//! permutation of the closed [`Field`] set that is validated once when the
//! codec is built. Parsing is pure: no I/O, and a bad line is returned as a
//! [`Rejection`] value so the caller can skip it and carry on.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::reading::{Clock, Reading, ReadingError};

/// Number of fields in a device line.
pub const FIELD_COUNT: usize = 3;

/// Default field separator.
pub const DEFAULT_SEPARATOR: &str = ",";

/// A named field of a device line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
pub enum Field {
    /// Sensor identifier.
    #[serde(rename = "SensorID", alias = "sensor_id")]
    #[strum(to_string = "SensorID", serialize = "sensor_id")]
    SensorId,
    /// Measurement category.
    #[serde(rename = "SensorType", alias = "sensor_type")]
    #[strum(to_string = "SensorType", serialize = "sensor_type")]
    SensorType,
    /// Numeric value.
    #[serde(rename = "Value", alias = "value")]
    #[strum(to_string = "Value", serialize = "value")]
    Value,
}

impl Field {
    /// All fields, in canonical order.
    pub const ALL: [Field; FIELD_COUNT] = [Field::SensorId, Field::SensorType, Field::Value];

    const fn slot(self) -> usize {
        match self {
            Self::SensorId => 0,
            Self::SensorType => 1,
            Self::Value => 2,
        }
    }
}

/// Errors building a codec from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecConfigError {
    /// Field order has the wrong number of entries.
    #[error("field order must list exactly 3 fields, got {0}")]
    WrongLength(usize),

    /// A field appears more than once.
    #[error("field '{0}' appears more than once in field order")]
    DuplicateField(Field),

    /// A required field is missing.
    #[error("field '{0}' is missing from field order")]
    MissingField(Field),

    /// Separator is empty.
    #[error("field separator must not be empty")]
    EmptySeparator,
}

/// Validated mapping from line position to [`Field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOrder {
    fields: [Field; FIELD_COUNT],
    /// Line position of each field, indexed by `Field::slot`.
    positions: [usize; FIELD_COUNT],
}

impl FieldOrder {
    /// Validate a configured field list.
    pub fn new(fields: &[Field]) -> Result<Self, CodecConfigError> {
        if fields.len() != FIELD_COUNT {
            return Err(CodecConfigError::WrongLength(fields.len()));
        }

        let mut positions = [None; FIELD_COUNT];
        for (index, field) in fields.iter().enumerate() {
            let slot = &mut positions[field.slot()];
            if slot.is_some() {
                return Err(CodecConfigError::DuplicateField(*field));
            }
            *slot = Some(index);
        }

        let mut resolved = [0; FIELD_COUNT];
        for field in Field::ALL {
            resolved[field.slot()] =
                positions[field.slot()].ok_or(CodecConfigError::MissingField(field))?;
        }

        Ok(Self {
            fields: [fields[0], fields[1], fields[2]],
            positions: resolved,
        })
    }

    /// Line position of `field`.
    pub fn position(&self, field: Field) -> usize {
        self.positions[field.slot()]
    }

    /// Fields in line order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        FIELD_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for FieldOrder {
    fn default() -> Self {
        Self {
            fields: Field::ALL,
            positions: [0, 1, 2],
        }
    }
}

/// Why a line did not produce a reading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    /// Wrong field count or an empty identifier.
    #[error("malformed line: {0}")]
    MalformedLine(String),

    /// Value field is not a finite number.
    #[error("invalid value: {0}")]
    InvalidValue(ReadingError),
}

impl From<ReadingError> for Rejection {
    fn from(err: ReadingError) -> Self {
        match err {
            ReadingError::EmptySensorId | ReadingError::EmptySensorType => {
                Self::MalformedLine(err.to_string())
            }
            ReadingError::UnparseableValue(_) | ReadingError::NonFiniteValue(_) => {
                Self::InvalidValue(err)
            }
        }
    }
}

/// Parser for device lines.
#[derive(Debug, Clone)]
pub struct LineCodec {
    order: FieldOrder,
    separator: String,
}

impl LineCodec {
    /// Create a codec with the given field order and separator.
    pub fn new(order: FieldOrder, separator: impl Into<String>) -> Result<Self, CodecConfigError> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(CodecConfigError::EmptySeparator);
        }
        Ok(Self { order, separator })
    }

    pub fn order(&self) -> &FieldOrder {
        &self.order
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Parse `raw_line` into a reading stamped with `clock.now()`.
    pub fn parse(&self, raw_line: &str, clock: &dyn Clock) -> Result<Reading, Rejection> {
        let parts: Vec<&str> = raw_line.trim().split(self.separator.as_str()).collect();
        if parts.len() != self.order.len() {
            return Err(Rejection::MalformedLine(format!(
                "expected {} fields, found {}",
                self.order.len(),
                parts.len()
            )));
        }

        let field = |f: Field| parts[self.order.position(f)].trim();
        let reading = Reading::parse(
            field(Field::SensorId),
            field(Field::SensorType),
            field(Field::Value),
            clock.now(),
        )?;
        Ok(reading)
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self {
            order: FieldOrder::default(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::FixedClock;
    use chrono::{DateTime, Utc};
    use std::str::FromStr;

    fn clock() -> FixedClock {
        FixedClock(
            DateTime::parse_from_rfc3339("2024-05-01T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    #[test]
    fn test_parse_well_formed_line() {
        let codec = LineCodec::default();
        let clock = clock();
        let reading = codec.parse("PHProbe-Tank1,pH,6.75", &clock).unwrap();
        assert_eq!(reading.sensor_id(), "PHProbe-Tank1");
        assert_eq!(reading.sensor_type(), "pH");
        assert_eq!(reading.value(), 6.75);
        assert_eq!(reading.timestamp(), clock.0);
    }

    #[test]
    fn test_parse_trims_fields_and_line_endings() {
        let codec = LineCodec::default();
        let reading = codec
            .parse("  Temp-Tank , Water temperature ,  21.5 \r\n", &clock())
            .unwrap();
        assert_eq!(reading.sensor_id(), "Temp-Tank");
        assert_eq!(reading.sensor_type(), "Water temperature");
        assert_eq!(reading.value(), 21.5);
    }

    #[test]
    fn test_parse_wrong_field_count() {
        let codec = LineCodec::default();
        for line in ["LevelSensor,95", "a,b,1.0,extra", "", "bad,line"] {
            assert!(
                matches!(codec.parse(line, &clock()), Err(Rejection::MalformedLine(_))),
                "line {line:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_empty_identifiers() {
        let codec = LineCodec::default();
        assert!(matches!(
            codec.parse(" ,pH,7.0", &clock()),
            Err(Rejection::MalformedLine(_))
        ));
        assert!(matches!(
            codec.parse("probe,  ,7.0", &clock()),
            Err(Rejection::MalformedLine(_))
        ));
    }

    #[test]
    fn test_parse_invalid_values() {
        let codec = LineCodec::default();
        for line in [
            "ORP-Main,ORP,high",
            "probe,pH,NaN",
            "probe,pH,inf",
            "probe,pH,-infinity",
            "probe,pH,",
        ] {
            assert!(
                matches!(codec.parse(line, &clock()), Err(Rejection::InvalidValue(_))),
                "line {line:?} should have an invalid value"
            );
        }
    }

    #[test]
    fn test_parse_custom_order_and_separator() {
        let order = FieldOrder::new(&[Field::Value, Field::SensorId, Field::SensorType]).unwrap();
        let codec = LineCodec::new(order, ";").unwrap();
        let reading = codec.parse("1.42;ECMeter-Res;EC", &clock()).unwrap();
        assert_eq!(reading.sensor_id(), "ECMeter-Res");
        assert_eq!(reading.sensor_type(), "EC");
        assert_eq!(reading.value(), 1.42);

        // Default separator no longer splits
        assert!(matches!(
            codec.parse("1.42,ECMeter-Res,EC", &clock()),
            Err(Rejection::MalformedLine(_))
        ));
    }

    #[test]
    fn test_multi_char_separator() {
        let codec = LineCodec::new(FieldOrder::default(), "::").unwrap();
        let reading = codec.parse("probe::pH::7", &clock()).unwrap();
        assert_eq!(reading.value(), 7.0);
    }

    #[test]
    fn test_field_order_validation() {
        assert_eq!(
            FieldOrder::new(&[Field::SensorId, Field::Value]).unwrap_err(),
            CodecConfigError::WrongLength(2)
        );
        assert_eq!(
            FieldOrder::new(&[Field::SensorId, Field::SensorId, Field::Value]).unwrap_err(),
            CodecConfigError::DuplicateField(Field::SensorId)
        );
        let order = FieldOrder::new(&[Field::SensorType, Field::Value, Field::SensorId]).unwrap();
        assert_eq!(order.position(Field::SensorId), 2);
        assert_eq!(order.position(Field::SensorType), 0);
        assert_eq!(order.position(Field::Value), 1);
        assert_eq!(order.fields(), &[Field::SensorType, Field::Value, Field::SensorId]);
    }

    #[test]
    fn test_empty_separator_rejected() {
        assert_eq!(
            LineCodec::new(FieldOrder::default(), "").unwrap_err(),
            CodecConfigError::EmptySeparator
        );
    }

    #[test]
    fn test_field_names() {
        assert_eq!(Field::from_str("SensorID").unwrap(), Field::SensorId);
        assert_eq!(Field::from_str("sensor_type").unwrap(), Field::SensorType);
        assert_eq!(Field::Value.to_string(), "Value");
        assert!(Field::from_str("Timestamp").is_err());

        let fields: Vec<Field> = serde_yaml::from_str("[SensorID, sensor_type, Value]").unwrap();
        assert_eq!(fields, Field::ALL.to_vec());
    }
}
