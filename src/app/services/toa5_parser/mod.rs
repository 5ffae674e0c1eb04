//! Streaming parser for Campbell Scientific TOA5 datalogger files
//!
//! TOA5 files are append-only CSV tables. Each time the logger reboots or
//! the file is reopened, a fresh header block is written before data rows
//! resume:
//!
//! ```text
//! "TOA5","CR1000_Site1","CR1000","1234","CR1000.Std.32","CPU:prog.CR1","5678","Table1"
//! "TIMESTAMP","RECORD","BattV_Min","AirTC_Avg"
//! "TS","RN","Volts","Deg C"
//! "","","Min","Avg"
//! "2024-01-01 00:00:00",0,12.6,4.21
//! ```
//!
//! ## Architecture
//!
//! - [`row_decoder`] - Quote-aware splitting of one line into fields
//! - [`header_state`] - Marker detection, header countdown and column mapping rebuilds
//! - [`column_mapping`] - Column name to position lookup
//! - [`record_extractor`] - Zipping data rows into records, freshness and voltage extraction
//! - [`field_parsers`] - Timestamp and voltage conversions
//! - [`error`] - Row-level, recoverable parse failures
//! - [`stats`] - Per-source counters
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Utc;
//! use datalogger_relay::app::services::toa5_parser::{
//!     Extraction, HeaderLayout, HeaderStateMachine, LineEvent, RecordExtractor,
//! };
//! use datalogger_relay::LogicalSource;
//!
//! let source = LogicalSource::new("site1.dat", "site1").with_battery_column("BattV_Min");
//! let mut machine = HeaderStateMachine::new(HeaderLayout::default());
//! let extractor = RecordExtractor::for_source(&source, chrono::Duration::hours(24));
//!
//! for line in ["\"TOA5\",\"x\"", "BattV_Min,Temp", "V,C", ",", "12.6,4.2"] {
//!     if let Ok(LineEvent::Data { fields, mapping }) = machine.feed(line) {
//!         if let Ok(Extraction::Accepted(row)) = extractor.extract(fields, &mapping, Utc::now()) {
//!             assert_eq!(row.voltage, Some(12.6));
//!         }
//!     }
//! }
//! ```

pub mod column_mapping;
pub mod error;
pub mod field_parsers;
pub mod header_state;
pub mod record_extractor;
pub mod row_decoder;
pub mod stats;

#[cfg(test)]
pub mod tests;

pub use column_mapping::ColumnMapping;
pub use error::ParseError;
pub use header_state::{CursorState, HeaderLayout, HeaderStateMachine, LineEvent};
pub use record_extractor::{ExtractedRow, Extraction, RecordExtractor};
pub use row_decoder::RowDecoder;
pub use stats::{DropReason, SourceStats};
