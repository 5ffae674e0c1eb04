//! Application constants for the datalogger relay
//!
//! Default values for the TOA5 header layout, freshness policy,
//! tailing, publishing and metrics exposition.

use std::time::Duration;

// =============================================================================
// TOA5 File Layout
// =============================================================================

/// Substring identifying the first line of a TOA5 header block
pub const TOA5_MARKER: &str = "TOA5";

/// Number of lines in a header block, marker line included
pub const HEADER_BLOCK_LEN: usize = 4;

/// Offset of the column-names line from the marker line
///
/// A TOA5 block is: environment (marker), field names, units, processing.
pub const COLUMN_NAMES_OFFSET: usize = 1;

/// Field delimiter used by TOA5 files
pub const FIELD_DELIMITER: u8 = b',';

/// Quote character used by TOA5 files
pub const QUOTE_CHAR: u8 = b'"';

// =============================================================================
// Record Extraction
// =============================================================================

/// Column holding the record timestamp in TOA5 tables
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "TIMESTAMP";

/// Timestamp formats accepted for the freshness check, tried in order
pub const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// Timestamp format carrying an explicit UTC offset
pub const TIMESTAMP_FORMAT_WITH_OFFSET: &str = "%Y-%m-%d %H:%M:%S %z";

/// Rows older than this (relative to wall-clock now) are dropped
pub const DEFAULT_FRESHNESS_HOURS: u64 = 24;

/// Key added to every outbound message carrying the source file path
pub const FILENAME_FIELD: &str = "filename";

// =============================================================================
// Tailing
// =============================================================================

/// Poll interval for appended lines and file recreation checks
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

// =============================================================================
// Publishing
// =============================================================================

/// Content type stamped on outbound messages
pub const MESSAGE_CONTENT_TYPE: &str = "text/json";

/// Publish attempts before a message is dropped
pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 3;

/// First retry delay, doubled per attempt
pub const DEFAULT_PUBLISH_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound on a single retry delay
pub const MAX_PUBLISH_BACKOFF: Duration = Duration::from_secs(2);

/// Limit on one delivery attempt, connect included
pub const DEFAULT_PUBLISH_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages waiting for the writer before new ones are dropped
pub const DEFAULT_PUBLISH_QUEUE_CAPACITY: usize = 1024;

/// How long shutdown waits for queued messages to be delivered
pub const DEFAULT_PUBLISH_DRAIN_GRACE: Duration = Duration::from_secs(5);

// =============================================================================
// Metrics
// =============================================================================

/// Default bind address of the metrics endpoint
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9094";

/// Path the metrics endpoint serves
pub const METRICS_PATH: &str = "/metrics";

/// Accepted-row counter, labelled by site
pub const ROWS_LOADED_METRIC: &str = "datalogger_rows_loaded";

/// Last observed battery voltage, labelled by site
pub const BATTERY_VOLTAGE_METRIC: &str = "datalogger_battery_voltage";

/// Dropped-row counter, labelled by site and reason
pub const ROWS_DROPPED_METRIC: &str = "datalogger_rows_dropped";

/// Messages that could not be published, labelled by site
pub const MESSAGES_DROPPED_METRIC: &str = "datalogger_messages_dropped";
