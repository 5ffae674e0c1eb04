//! Column name to position mapping for the active header
//!
//! A mapping is built from the column-names line of each header block and
//! stays in force until the next marker line.

use std::collections::HashMap;

use super::error::ParseError;

/// Ordered column names with name lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Column names in file order
    names: Vec<String>,

    /// Column name to index of its first occurrence
    name_to_index: HashMap<String, usize>,
}

impl ColumnMapping {
    /// Build a mapping from the decoded column-names line
    pub fn from_names(names: Vec<String>) -> Result<Self, ParseError> {
        let names: Vec<String> = names.into_iter().map(|n| n.trim().to_string()).collect();

        if names.iter().all(String::is_empty) {
            return Err(ParseError::malformed("column header line has no names"));
        }

        let mut name_to_index = HashMap::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            name_to_index.entry(name.clone()).or_insert(index);
        }

        Ok(Self {
            names,
            name_to_index,
        })
    }

    /// Zero-based position of a column, `None` when the header lacks it
    pub fn position(&self, column_name: &str) -> Option<usize> {
        self.name_to_index.get(column_name).copied()
    }

    /// Check if a column exists in the mapping
    pub fn has_column(&self, column_name: &str) -> bool {
        self.name_to_index.contains_key(column_name)
    }

    /// Column names in file order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns every data row must have
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
