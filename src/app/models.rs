//! Core data structures for the datalogger relay
//!
//! Defines the configured logical sources, the records extracted from
//! data rows, derived voltage samples and outbound messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::constants::{DEFAULT_TIMESTAMP_COLUMN, FILENAME_FIELD, MESSAGE_CONTENT_TYPE};

/// One configured datalogger file and how to interpret it
///
/// Deserializes from the descriptor shape operators already use:
/// `{"file-name": "...", "site": "...", "battery-variate-name": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogicalSource {
    /// Path of the file to tail
    pub file_name: PathBuf,

    /// Site identifier used as metric label and message routing key
    pub site: String,

    /// Column carrying battery voltage; empty means no voltage metric
    #[serde(default)]
    pub battery_variate_name: Option<String>,

    /// Column carrying the record timestamp; empty disables freshness checks
    #[serde(default = "default_timestamp_column")]
    pub timestamp_variate_name: Option<String>,
}

fn default_timestamp_column() -> Option<String> {
    Some(DEFAULT_TIMESTAMP_COLUMN.to_string())
}

impl LogicalSource {
    /// Create a source with the default timestamp column and no voltage column
    pub fn new(file_name: impl Into<PathBuf>, site: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            site: site.into(),
            battery_variate_name: None,
            timestamp_variate_name: default_timestamp_column(),
        }
    }

    /// Set the battery voltage column
    pub fn with_battery_column(mut self, column: impl Into<String>) -> Self {
        self.battery_variate_name = Some(column.into());
        self
    }

    /// Set the timestamp column
    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_variate_name = Some(column.into());
        self
    }

    /// Disable the freshness check for this source
    pub fn without_timestamp_column(mut self) -> Self {
        self.timestamp_variate_name = None;
        self
    }

    /// Battery column name, treating an empty string as absent
    pub fn battery_column(&self) -> Option<&str> {
        non_empty(self.battery_variate_name.as_deref())
    }

    /// Timestamp column name, treating an empty string as absent
    pub fn timestamp_column(&self) -> Option<&str> {
        non_empty(self.timestamp_variate_name.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// A data row keyed by column name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Column name to raw string value
    pub fields: BTreeMap<String, String>,

    /// File the row was read from
    pub file_name: String,

    /// Site of the originating source
    pub site: String,
}

impl Record {
    /// Raw value of a column
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Flat payload sent downstream: every field plus the file name
    ///
    /// A column literally named `filename` is overwritten by the path.
    pub fn to_payload(&self) -> BTreeMap<String, String> {
        let mut payload = self.fields.clone();
        payload.insert(FILENAME_FIELD.to_string(), self.file_name.clone());
        payload
    }
}

/// Last-seen battery voltage for a site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageSample<'a> {
    pub site: &'a str,
    pub volts: f64,
}

/// Serialized record ready for a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Site the record came from
    pub site: String,

    /// MIME-ish content type of `body`
    pub content_type: &'static str,

    /// When the message was built
    pub timestamp: DateTime<Utc>,

    /// Encoded payload
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// Encode a record as a JSON message
    pub fn from_record(record: &Record) -> crate::Result<Self> {
        let body = serde_json::to_vec(&record.to_payload())?;
        Ok(Self {
            site: record.site.clone(),
            content_type: MESSAGE_CONTENT_TYPE,
            timestamp: Utc::now(),
            body,
        })
    }

    /// Body as text, lossily
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_source_deserializes_descriptor() {
        let json = r#"{"file-name": "/data/site1.dat", "site": "site1", "battery-variate-name": "BattV_Min"}"#;
        let source: LogicalSource = serde_json::from_str(json).unwrap();

        assert_eq!(source.file_name, PathBuf::from("/data/site1.dat"));
        assert_eq!(source.site, "site1");
        assert_eq!(source.battery_column(), Some("BattV_Min"));
        assert_eq!(source.timestamp_column(), Some("TIMESTAMP"));
    }

    #[test]
    fn test_empty_column_names_mean_absent() {
        let json = r#"{"file-name": "a.dat", "site": "a", "battery-variate-name": "", "timestamp-variate-name": ""}"#;
        let source: LogicalSource = serde_json::from_str(json).unwrap();

        assert_eq!(source.battery_column(), None);
        assert_eq!(source.timestamp_column(), None);
    }

    #[test]
    fn test_payload_includes_filename() {
        let mut fields = BTreeMap::new();
        fields.insert("Temp".to_string(), "12.5".to_string());
        let record = Record {
            fields,
            file_name: "/data/a.dat".to_string(),
            site: "a".to_string(),
        };

        let message = OutboundMessage::from_record(&record).unwrap();
        let decoded: BTreeMap<String, String> = serde_json::from_slice(&message.body).unwrap();

        assert_eq!(decoded.get("Temp").map(String::as_str), Some("12.5"));
        assert_eq!(decoded.get("filename").map(String::as_str), Some("/data/a.dat"));
        assert_eq!(message.content_type, "text/json");
        assert_eq!(message.site, "a");
    }
}
