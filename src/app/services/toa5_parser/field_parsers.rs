//! Field parsing utilities for TOA5 data rows
//!
//! Typed conversions for the few columns the relay interprets itself:
//! the record timestamp and the battery voltage.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::error::ParseError;
use crate::constants::{TIMESTAMP_FORMATS, TIMESTAMP_FORMAT_WITH_OFFSET};

/// Parse a logger timestamp, reading naive values as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT_WITH_OFFSET) {
        return Some(dt.with_timezone(&Utc));
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Parse the voltage column as a decimal number
pub fn parse_voltage(column: &str, value: &str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ParseError::VoltageParse {
            column: column.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_timestamp_formats() {
        let plain = parse_timestamp("2024-03-05 10:20:30").unwrap();
        assert_eq!((plain.year(), plain.month(), plain.day()), (2024, 3, 5));
        assert_eq!((plain.hour(), plain.minute(), plain.second()), (10, 20, 30));

        let fractional = parse_timestamp("2024-03-05 10:20:30.5").unwrap();
        assert_eq!(fractional.second(), 30);
        assert_eq!(fractional.nanosecond(), 500_000_000);

        let offset = parse_timestamp("2024-03-05 10:20:30 +0100").unwrap();
        assert_eq!(offset.hour(), 9);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_parse_voltage() {
        assert_eq!(parse_voltage("BattV", " 12.61 ").unwrap(), 12.61);
        assert_eq!(
            parse_voltage("BattV", "low"),
            Err(ParseError::VoltageParse {
                column: "BattV".to_string(),
                value: "low".to_string(),
            })
        );
    }
}
