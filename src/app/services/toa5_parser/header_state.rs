//! Header block state machine
//!
//! Tracks where a reader is inside a TOA5 file whose content restarts with
//! a new header block whenever the logger reboots or the file is reopened.
//!
//! ```text
//! AwaitingMarker --marker--> InHeader(N-1) --...--> InHeader(1) --> Streaming
//!        ^                        |                                    |
//!        +------------------------+------------ marker (any state) ----+
//! ```

use std::sync::Arc;

use super::column_mapping::ColumnMapping;
use super::error::ParseError;
use super::row_decoder::RowDecoder;
use crate::constants::{COLUMN_NAMES_OFFSET, HEADER_BLOCK_LEN, TOA5_MARKER};
use crate::{Error, Result};

/// Shape of a header block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLayout {
    /// Substring identifying the first line of a block
    pub marker: String,

    /// Lines in the block, marker included
    pub block_len: usize,

    /// Offset of the column-names line from the marker line
    pub names_offset: usize,
}

impl Default for HeaderLayout {
    fn default() -> Self {
        Self {
            marker: TOA5_MARKER.to_string(),
            block_len: HEADER_BLOCK_LEN,
            names_offset: COLUMN_NAMES_OFFSET,
        }
    }
}

impl HeaderLayout {
    /// Layout with a custom marker token
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Layout with custom block length and names offset
    pub fn with_block(mut self, block_len: usize, names_offset: usize) -> Self {
        self.block_len = block_len;
        self.names_offset = names_offset;
        self
    }

    /// Check the layout can ever produce a column mapping
    pub fn validate(&self) -> Result<()> {
        if self.marker.trim().is_empty() {
            return Err(Error::configuration("Header marker cannot be empty"));
        }

        if self.names_offset == 0 || self.names_offset >= self.block_len {
            return Err(Error::configuration(format!(
                "Column names offset {} must lie within the {}-line header block after the marker",
                self.names_offset, self.block_len
            )));
        }

        Ok(())
    }
}

/// Parse cursor position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No marker seen yet
    AwaitingMarker,
    /// Inside a header block with `remaining` header lines still to come
    InHeader { remaining: usize },
    /// Past the header block; lines are data rows
    Streaming,
}

/// What a single line turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// Empty or whitespace-only line, ignored
    Blank,
    /// Start of a header block; the previous mapping is discarded
    Marker,
    /// Header metadata line (units, processing, ...)
    HeaderSkipped,
    /// Column-names line parsed into a new mapping
    ColumnsDefined(Arc<ColumnMapping>),
    /// Data row together with the mapping it must be read against
    Data {
        fields: Vec<String>,
        mapping: Arc<ColumnMapping>,
    },
}

/// Classifies lines and maintains the active column mapping
#[derive(Debug, Clone)]
pub struct HeaderStateMachine {
    layout: HeaderLayout,
    decoder: RowDecoder,
    state: CursorState,
    mapping: Option<Arc<ColumnMapping>>,
}

impl HeaderStateMachine {
    pub fn new(layout: HeaderLayout) -> Self {
        Self {
            layout,
            decoder: RowDecoder::new(),
            state: CursorState::AwaitingMarker,
            mapping: None,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Mapping currently in force, if a header cycle has completed
    pub fn mapping(&self) -> Option<&Arc<ColumnMapping>> {
        self.mapping.as_ref()
    }

    /// Advance the machine by one raw line
    pub fn feed(&mut self, line: &str) -> std::result::Result<LineEvent, ParseError> {
        if line.trim().is_empty() {
            return Ok(LineEvent::Blank);
        }

        if line.contains(self.layout.marker.as_str()) {
            self.mapping = None;
            self.state = Self::countdown(self.layout.block_len.saturating_sub(1));
            return Ok(LineEvent::Marker);
        }

        match self.state {
            CursorState::AwaitingMarker => Err(ParseError::NoMappingYet),
            CursorState::InHeader { remaining } => {
                let offset = self.layout.block_len - remaining;
                self.state = Self::countdown(remaining - 1);

                if offset != self.layout.names_offset {
                    return Ok(LineEvent::HeaderSkipped);
                }

                let names = self.decoder.decode(line)?;
                let mapping = Arc::new(ColumnMapping::from_names(names)?);
                self.mapping = Some(Arc::clone(&mapping));
                Ok(LineEvent::ColumnsDefined(mapping))
            }
            CursorState::Streaming => {
                let mapping = self.mapping.clone().ok_or(ParseError::NoMappingYet)?;
                let fields = self.decoder.decode(line)?;
                Ok(LineEvent::Data { fields, mapping })
            }
        }
    }

    fn countdown(remaining: usize) -> CursorState {
        if remaining == 0 {
            CursorState::Streaming
        } else {
            CursorState::InHeader { remaining }
        }
    }
}
