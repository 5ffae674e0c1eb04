//! Error handling for datalogger relay operations.
//!
//! Process- and pipeline-level failures live here. Row-level parse
//! failures are recoverable and have their own type in
//! [`crate::app::services::toa5_parser::ParseError`].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or missing configuration, fatal at startup
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The line source could not be opened or followed
    #[error("Line source unavailable for {path}: {source}")]
    LineSourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Publishing to the configured transport failed
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Processing interrupted
    #[error("Processing interrupted: {reason}")]
    ProcessingInterrupted { reason: String },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a line source error for the given path
    pub fn line_source_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LineSourceUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>, source: Option<std::io::Error>) -> Self {
        Self::Transport {
            message: message.into(),
            source,
        }
    }

    /// Create a processing interrupted error
    pub fn processing_interrupted(reason: impl Into<String>) -> Self {
        Self::ProcessingInterrupted {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: error,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
