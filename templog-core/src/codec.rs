//! Log line codec.
//!
//! Field loggers append one JSON object per line:
//!
//! ```text
//! {"id":"sensor1","timestamp":"2024-01-14T23:59:00-05:00","humidity":41.2,
//!  "tempC":20.1,"tempF":68.2,"heatIndexC":19.6,"heatIndexF":67.3}
//! ```
//!
//! Decoding is split in two steps. [`decode`] turns a line into a [`LogRecord`]
//! whose timestamp is still the logger's RFC 3339 string, and
//! [`LogRecord::canonicalize`] turns that into a [`Reading`] keyed by epoch
//! seconds. Both steps fail per line; callers skip the line and carry on.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest sensor id accepted as a table name.
pub const MAX_SENSOR_ID_LEN: usize = 64;

static SENSOR_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("sensor id pattern is valid")
});

/// Returns true if `sensor_id` can safely name a storage table.
///
/// Names starting with `sqlite_` are reserved by SQLite and rejected.
pub fn is_valid_sensor_id(sensor_id: &str) -> bool {
    !sensor_id.is_empty()
        && sensor_id.len() <= MAX_SENSOR_ID_LEN
        && !sensor_id.to_ascii_lowercase().starts_with("sqlite_")
        && SENSOR_ID_RE.is_match(sensor_id)
}

/// Per-line decode failure.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("line is empty")]
    Empty,

    #[error("not a valid reading: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sensor id {0:?} is not a valid table name")]
    InvalidSensorId(String),
}

/// Timestamp that does not follow RFC 3339.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid timestamp {value:?}: {reason}")]
pub struct TimeParseError {
    pub value: String,
    pub reason: String,
}

/// One line of a logger file, before timestamp canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Sensor identifier, also the name of the sensor's table
    #[serde(rename = "id")]
    pub sensor_id: String,

    /// RFC 3339 timestamp as written by the logger
    pub timestamp: String,

    pub humidity: f64,
    pub temp_c: f64,
    pub temp_f: f64,
    pub heat_index_c: f64,
    pub heat_index_f: f64,
}

/// A stored sensor observation keyed by epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub sensor_id: String,

    /// Seconds since the Unix epoch; unique within a sensor's table
    pub timestamp: i64,

    pub humidity: f64,
    pub temp_c: f64,
    pub temp_f: f64,
    pub heat_index_c: f64,
    pub heat_index_f: f64,
}

impl LogRecord {
    /// Parse the timestamp and produce a reading keyed by epoch seconds.
    pub fn canonicalize(&self) -> Result<Reading, TimeParseError> {
        let timestamp = canonical_timestamp(&self.timestamp)?;
        Ok(Reading {
            sensor_id: self.sensor_id.clone(),
            timestamp,
            humidity: self.humidity,
            temp_c: self.temp_c,
            temp_f: self.temp_f,
            heat_index_c: self.heat_index_c,
            heat_index_f: self.heat_index_f,
        })
    }
}

impl Reading {
    /// Reading time as a UTC datetime.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// Format the reading back into a logger record (UTC timestamp).
    pub fn to_log_record(&self) -> LogRecord {
        let timestamp = self
            .time()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        LogRecord {
            sensor_id: self.sensor_id.clone(),
            timestamp,
            humidity: self.humidity,
            temp_c: self.temp_c,
            temp_f: self.temp_f,
            heat_index_c: self.heat_index_c,
            heat_index_f: self.heat_index_f,
        }
    }
}

/// Decode one log line.
pub fn decode(line: &[u8]) -> Result<LogRecord, DecodeError> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }
    let record: LogRecord = serde_json::from_slice(line)?;
    if !is_valid_sensor_id(&record.sensor_id) {
        return Err(DecodeError::InvalidSensorId(record.sensor_id));
    }
    Ok(record)
}

/// Encode a record as a single log line, without the trailing newline.
pub fn encode(record: &LogRecord) -> Result<String, DecodeError> {
    Ok(serde_json::to_string(record)?)
}

/// Convert an RFC 3339 timestamp into epoch seconds.
///
/// Sub-second precision is truncated.
pub fn canonical_timestamp(value: &str) -> Result<i64, TimeParseError> {
    DateTime::parse_from_rfc3339(value).map(|t| t.timestamp()).map_err(|e| TimeParseError {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"{"id":"sensor1","timestamp":"2024-01-15T01:03:00-05:00","humidity":38.5,"tempC":20.3,"tempF":68.54,"heatIndexC":19.71,"heatIndexF":67.48}"#;

    #[test]
    fn test_decode_valid_line() {
        let record = decode(LINE.as_bytes()).unwrap();
        assert_eq!(record.sensor_id, "sensor1");
        assert_eq!(record.timestamp, "2024-01-15T01:03:00-05:00");
        assert_eq!(record.temp_f, 68.54);
        assert_eq!(record.heat_index_f, 67.48);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode(br#"{"id":"sensor1","timestamp":"#), Err(DecodeError::Json(_))));
        assert!(matches!(decode(b"   "), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let line = r#"{"id":"sensor1","timestamp":"2024-01-15T01:03:00Z","humidity":38.5,"tempC":20.3,"tempF":68.5,"heatIndexC":19.7}"#;
        assert!(matches!(decode(line.as_bytes()), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_unsafe_sensor_id() {
        let line = LINE.replace("sensor1", "x; DROP TABLE tltables");
        assert!(matches!(decode(line.as_bytes()), Err(DecodeError::InvalidSensorId(_))));
    }

    #[test]
    fn test_sensor_id_validation() {
        assert!(is_valid_sensor_id("sensor1"));
        assert!(is_valid_sensor_id("_outside"));
        assert!(!is_valid_sensor_id(""));
        assert!(!is_valid_sensor_id("1sensor"));
        assert!(!is_valid_sensor_id("sensor-1"));
        assert!(!is_valid_sensor_id("sqlite_master"));
        assert!(!is_valid_sensor_id(&"a".repeat(MAX_SENSOR_ID_LEN + 1)));
    }

    #[test]
    fn test_canonical_timestamp() {
        assert_eq!(canonical_timestamp("2024-01-15T06:03:00Z").unwrap(), 1705298580);
        assert_eq!(canonical_timestamp("2024-01-15T01:03:00-05:00").unwrap(), 1705298580);

        let err = canonical_timestamp("2024-01-15 01:03:00").unwrap_err();
        assert_eq!(err.value, "2024-01-15 01:03:00");
        // Timezone is mandatory
        assert!(canonical_timestamp("2024-01-15T01:03:00").is_err());
    }

    #[test]
    fn test_log_record_round_trip() {
        let record = decode(LINE.as_bytes()).unwrap();
        let reading = record.canonicalize().unwrap();
        assert_eq!(reading.timestamp, 1705298580);

        let back = reading.to_log_record();
        assert_eq!(back.timestamp, "2024-01-15T06:03:00Z");
        let line = encode(&back).unwrap();
        assert_eq!(decode(line.as_bytes()).unwrap().canonicalize().unwrap(), reading);
    }
}
