//! Per-source parsing statistics
//!
//! Counters kept by each pipeline and logged when it stops.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a line was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Malformed,
    NoMapping,
    FieldCount,
    VoltageParse,
}

impl DropReason {
    /// All reasons, in label order
    pub const ALL: [DropReason; 4] = [
        DropReason::Malformed,
        DropReason::NoMapping,
        DropReason::FieldCount,
        DropReason::VoltageParse,
    ];

    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::NoMapping => "no_mapping",
            DropReason::FieldCount => "field_count",
            DropReason::VoltageParse => "voltage_parse",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for a single source pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    /// Lines received from the line source
    pub lines_read: u64,

    /// Marker lines seen (header cycles started)
    pub header_cycles: u64,

    /// Data rows counted and forwarded
    pub rows_accepted: u64,

    /// Data rows older than the freshness window
    pub rows_stale: u64,

    /// Lines that failed to decode
    pub rows_malformed: u64,

    /// Data lines seen before a column header
    pub rows_without_mapping: u64,

    /// Data rows whose field count did not match the header
    pub rows_field_mismatch: u64,

    /// Data rows with a non-numeric voltage
    pub rows_bad_voltage: u64,

    /// Accepted rows the publisher refused to queue
    pub messages_dropped: u64,
}

impl SourceStats {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a dropped line
    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::Malformed => self.rows_malformed += 1,
            DropReason::NoMapping => self.rows_without_mapping += 1,
            DropReason::FieldCount => self.rows_field_mismatch += 1,
            DropReason::VoltageParse => self.rows_bad_voltage += 1,
        }
    }

    /// Lines dropped for any parse reason
    pub fn rows_dropped(&self) -> u64 {
        self.rows_malformed
            + self.rows_without_mapping
            + self.rows_field_mismatch
            + self.rows_bad_voltage
    }

    /// Share of data rows accepted, as a percentage
    pub fn acceptance_rate(&self) -> f64 {
        let data_rows = self.rows_accepted + self.rows_stale + self.rows_dropped();
        if data_rows == 0 {
            0.0
        } else {
            (self.rows_accepted as f64 / data_rows as f64) * 100.0
        }
    }
}
