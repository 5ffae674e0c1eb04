//! Row-level parse failures
//!
//! Every variant here is recoverable: the offending line is dropped and the
//! pipeline keeps reading.

use thiserror::Error;

use super::stats::DropReason;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The line is not a well-formed delimited record
    #[error("Malformed row: {reason}")]
    MalformedRow { reason: String },

    /// A data line arrived before any header block defined the columns
    #[error("Data row received before a column header was established")]
    NoMappingYet,

    /// The row and the active column mapping disagree on field count
    #[error("Row has {found} fields but the column mapping has {expected}")]
    FieldCountMismatch { expected: usize, found: usize },

    /// The designated voltage column holds a non-numeric value
    #[error("Voltage column '{column}' is not numeric: '{value}'")]
    VoltageParse { column: String, value: String },
}

impl ParseError {
    /// Create a malformed row error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            reason: reason.into(),
        }
    }

    /// Reason label used for drop counters
    pub fn reason(&self) -> DropReason {
        match self {
            Self::MalformedRow { .. } => DropReason::Malformed,
            Self::NoMappingYet => DropReason::NoMapping,
            Self::FieldCountMismatch { .. } => DropReason::FieldCount,
            Self::VoltageParse { .. } => DropReason::VoltageParse,
        }
    }
}
