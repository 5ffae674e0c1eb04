//! Test utilities for TOA5 parser testing
//!
//! Shared fixtures for the header, decoder and extraction tests.

use chrono::{DateTime, TimeDelta, Utc};

use super::{HeaderLayout, HeaderStateMachine, LineEvent};

mod header_state_tests;

/// Format a timestamp the way a logger writes it
pub fn logger_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Timestamp `hours` before now, in logger format
pub fn hours_ago(hours: i64) -> String {
    logger_timestamp(Utc::now() - TimeDelta::hours(hours))
}

/// A complete TOA5 header block with the given column names
pub fn toa5_header(columns: &[&str]) -> Vec<String> {
    let quoted: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
    let units: Vec<&str> = columns.iter().map(|_| "\"\"").collect();
    vec![
        r#""TOA5","CR1000_Test","CR1000","1234","CR1000.Std.32","CPU:test.CR1","5678","Table1""#
            .to_string(),
        quoted.join(","),
        units.join(","),
        units.join(","),
    ]
}

/// Feed every line, collecting the events and errors
pub fn feed_all(
    machine: &mut HeaderStateMachine,
    lines: &[String],
) -> Vec<Result<LineEvent, super::ParseError>> {
    lines.iter().map(|line| machine.feed(line)).collect()
}

/// Machine already past a default-layout header with the given columns
pub fn streaming_machine(columns: &[&str]) -> HeaderStateMachine {
    let mut machine = HeaderStateMachine::new(HeaderLayout::default());
    for line in toa5_header(columns) {
        machine.feed(&line).unwrap();
    }
    machine
}
