//! Data row to record extraction
//!
//! Zips a decoded data row against the active column mapping, applies the
//! freshness policy and pulls out the battery voltage.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use super::column_mapping::ColumnMapping;
use super::error::ParseError;
use super::field_parsers::{parse_timestamp, parse_voltage};
use crate::app::models::{LogicalSource, Record};

/// Outcome of extracting one data row
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Row is live and should be counted and forwarded
    Accepted(ExtractedRow),
    /// Row is older than the freshness window
    Stale { timestamp: DateTime<Utc> },
}

/// A record plus the values derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub record: Record,

    /// Battery voltage, when the column is configured and present
    pub voltage: Option<f64>,

    /// Record timestamp, when the column is configured, present and parseable
    pub timestamp: Option<DateTime<Utc>>,
}

/// Builds records for one logical source
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    file_name: String,
    site: String,
    voltage_column: Option<String>,
    timestamp_column: Option<String>,
    freshness_window: TimeDelta,
}

impl RecordExtractor {
    /// Extractor for the given source's columns and freshness window
    pub fn for_source(source: &LogicalSource, freshness_window: TimeDelta) -> Self {
        Self {
            file_name: source.file_name.to_string_lossy().into_owned(),
            site: source.site.clone(),
            voltage_column: source.battery_column().map(str::to_string),
            timestamp_column: source.timestamp_column().map(str::to_string),
            freshness_window,
        }
    }

    pub fn voltage_column(&self) -> Option<&str> {
        self.voltage_column.as_deref()
    }

    pub fn timestamp_column(&self) -> Option<&str> {
        self.timestamp_column.as_deref()
    }

    /// Extract a record from a data row
    pub fn extract(
        &self,
        fields: Vec<String>,
        mapping: &ColumnMapping,
        now: DateTime<Utc>,
    ) -> Result<Extraction, ParseError> {
        if fields.len() != mapping.len() {
            return Err(ParseError::FieldCountMismatch {
                expected: mapping.len(),
                found: fields.len(),
            });
        }

        // A window reaching past the representable range marks nothing stale
        let cutoff = now.checked_sub_signed(self.freshness_window);
        let timestamp = self.resolve_timestamp(&fields, mapping);
        if let (Some(timestamp), Some(cutoff)) = (timestamp, cutoff) {
            if timestamp < cutoff {
                return Ok(Extraction::Stale { timestamp });
            }
        }

        let voltage = match self.resolve(&self.voltage_column, mapping) {
            Some((column, index)) => Some(parse_voltage(column, &fields[index])?),
            None => None,
        };

        let record = Record {
            fields: zip_fields(mapping, fields),
            file_name: self.file_name.clone(),
            site: self.site.clone(),
        };

        Ok(Extraction::Accepted(ExtractedRow {
            record,
            voltage,
            timestamp,
        }))
    }

    fn resolve_timestamp(
        &self,
        fields: &[String],
        mapping: &ColumnMapping,
    ) -> Option<DateTime<Utc>> {
        let (column, index) = self.resolve(&self.timestamp_column, mapping)?;
        let value = &fields[index];
        let parsed = parse_timestamp(value);
        if parsed.is_none() {
            debug!(
                "Unparseable timestamp in column '{}': '{}'; skipping freshness check",
                column, value
            );
        }
        parsed
    }

    fn resolve<'a>(
        &self,
        column: &'a Option<String>,
        mapping: &ColumnMapping,
    ) -> Option<(&'a str, usize)> {
        let column = column.as_deref()?;
        mapping.position(column).map(|index| (column, index))
    }
}

/// Pair each column name with the value at the same position
///
/// With duplicate column names the first value wins, matching
/// [`ColumnMapping::position`].
pub fn zip_fields(mapping: &ColumnMapping, fields: Vec<String>) -> BTreeMap<String, String> {
    let mut record = BTreeMap::new();
    for (name, value) in mapping.names().iter().zip(fields) {
        record.entry(name.clone()).or_insert(value);
    }
    record
}
