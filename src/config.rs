//! Configuration management and validation.
//!
//! The source list is a JSON array of [`LogicalSource`] descriptors, read
//! from a file or stdin. Process-wide pipeline settings come from the
//! command line and are carried alongside it in [`RelayConfig`].

use chrono::TimeDelta;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::app::models::LogicalSource;
use crate::app::services::toa5_parser::HeaderLayout;
use crate::constants::{DEFAULT_FRESHNESS_HOURS, DEFAULT_POLL_INTERVAL_MS};
use crate::{Error, Result};

/// Settings shared by every source pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Header block layout
    pub layout: HeaderLayout,

    /// Rows older than this are stale
    pub freshness_window: TimeDelta,

    /// How long the tailer waits at end of file
    pub poll_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            layout: HeaderLayout::default(),
            freshness_window: TimeDelta::hours(DEFAULT_FRESHNESS_HOURS as i64),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl PipelineSettings {
    pub fn with_layout(mut self, layout: HeaderLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_freshness_window(mut self, window: TimeDelta) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;

        if self.freshness_window <= TimeDelta::zero() {
            return Err(Error::configuration(
                "Freshness window must be greater than zero",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::configuration(
                "Poll interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Sources to relay plus the settings applied to each
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub sources: Vec<LogicalSource>,
    pub settings: PipelineSettings,
}

impl RelayConfig {
    pub fn new(sources: Vec<LogicalSource>) -> Self {
        Self {
            sources,
            settings: PipelineSettings::default(),
        }
    }

    /// Parse the JSON source list from any reader
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let sources: Vec<LogicalSource> = serde_json::from_reader(reader)
            .map_err(|e| Error::configuration(format!("Invalid source list: {}", e)))?;

        debug!("Loaded {} source descriptors", sources.len());
        Ok(Self::new(sources))
    }

    /// Parse the JSON source list from a file
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::io(format!("Failed to open config {}", path.display()), e)
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Check the source list and settings before any pipeline starts
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::configuration("No sources configured"));
        }

        let mut seen = HashSet::new();
        let mut sites = HashSet::new();
        for (index, source) in self.sources.iter().enumerate() {
            if source.file_name.as_os_str().is_empty() {
                return Err(Error::configuration(format!(
                    "Source {} has an empty file-name",
                    index
                )));
            }
            if source.site.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "Source {} ({}) has an empty site",
                    index,
                    source.file_name.display()
                )));
            }
            if !seen.insert((&source.file_name, &source.site)) {
                return Err(Error::configuration(format!(
                    "Source {} duplicates {} for site {}",
                    index,
                    source.file_name.display(),
                    source.site
                )));
            }
            if !sites.insert(source.site.as_str()) {
                warn!(
                    "Site {} is configured more than once; its metrics will be combined",
                    source.site
                );
            }
        }

        self.settings.validate()
    }
}
