//! Quote-aware decoding of a single delimited line
//!
//! Field splitting is delegated to the `csv` crate. `csv` is lenient about
//! stray quotes, so the line is first scanned for quoting errors that a
//! strict reader rejects: unterminated quoted fields, quotes inside
//! unquoted fields, and text trailing a closing quote.

use csv::{ReaderBuilder, StringRecord};

use super::error::ParseError;
use crate::constants::{FIELD_DELIMITER, QUOTE_CHAR};

/// Decoder for one line of a TOA5 table
#[derive(Debug, Clone, Copy)]
pub struct RowDecoder {
    delimiter: u8,
    quote: u8,
}

impl Default for RowDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RowDecoder {
    /// Comma-delimited, double-quoted decoder
    pub fn new() -> Self {
        Self {
            delimiter: FIELD_DELIMITER,
            quote: QUOTE_CHAR,
        }
    }

    /// Use a different field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Split a line into its fields
    pub fn decode(&self, line: &str) -> Result<Vec<String>, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ParseError::malformed("empty line"));
        }

        self.check_quoting(line)?;

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .from_reader(line.as_bytes());

        let mut record = StringRecord::new();
        match reader.read_record(&mut record) {
            Ok(true) => Ok(record.iter().map(str::to_string).collect()),
            Ok(false) => Err(ParseError::malformed("no record found")),
            Err(e) => Err(ParseError::malformed(e.to_string())),
        }
    }

    fn check_quoting(&self, line: &str) -> Result<(), ParseError> {
        let bytes = line.as_bytes();
        let mut in_quotes = false;
        let mut at_field_start = true;
        let mut i = 0;

        while i < bytes.len() {
            let byte = bytes[i];

            if in_quotes {
                if byte == self.quote {
                    // Doubled quote is an escaped quote character
                    if bytes.get(i + 1) == Some(&self.quote) {
                        i += 2;
                        continue;
                    }
                    in_quotes = false;
                    if let Some(&next) = bytes.get(i + 1) {
                        if next != self.delimiter {
                            return Err(ParseError::malformed(format!(
                                "unexpected character after closing quote at column {}",
                                i + 2
                            )));
                        }
                    }
                }
            } else if byte == self.delimiter {
                at_field_start = true;
                i += 1;
                continue;
            } else if byte == self.quote {
                if !at_field_start {
                    return Err(ParseError::malformed(format!(
                        "bare quote in unquoted field at column {}",
                        i + 1
                    )));
                }
                in_quotes = true;
            }

            at_field_start = false;
            i += 1;
        }

        if in_quotes {
            return Err(ParseError::malformed("unterminated quoted field"));
        }

        Ok(())
    }
}
