//! Source supervision
//!
//! [`SourceSupervisor`] runs one [`SourcePipeline`] per configured source,
//! each on its own tokio task. A source whose file cannot be opened, or
//! whose pipeline fails or panics, is reported without affecting the others.
//!
//! # Example
//!
//! ```no_run
//! use datalogger_relay::app::services::metrics::SiteMetrics;
//! use datalogger_relay::app::services::publisher::Publisher;
//! use datalogger_relay::app::services::supervisor::SourceSupervisor;
//! use datalogger_relay::{LogicalSource, RelayConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> datalogger_relay::Result<()> {
//! let config = RelayConfig::new(vec![LogicalSource::new("/data/site1.dat", "site1")]);
//! let supervisor = SourceSupervisor::new(
//!     config,
//!     Arc::new(SiteMetrics::new()),
//!     Arc::new(Publisher::disabled()),
//! );
//!
//! let report = supervisor.run(CancellationToken::new()).await?;
//! println!("{} sources failed", report.failed_count());
//! # Ok(())
//! # }
//! ```

pub mod pipeline;

#[cfg(test)]
mod tests;

pub use pipeline::{LineOutcome, SourcePipeline};

use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Result;
use crate::app::models::LogicalSource;
use crate::app::services::line_source::FileTailer;
use crate::app::services::metrics::MetricsSink;
use crate::app::services::publisher::Publisher;
use crate::app::services::toa5_parser::SourceStats;
use crate::config::{PipelineSettings, RelayConfig};

/// How one source's pipeline ended
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub site: String,
    pub file_name: PathBuf,
    pub result: std::result::Result<SourceStats, String>,
}

impl SourceOutcome {
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

/// Outcomes of every pipeline, in configuration order
#[derive(Debug, Clone, Default)]
pub struct SupervisorReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl SupervisorReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// True when there was at least one source and none survived
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.failed_count() == self.outcomes.len()
    }

    /// Accepted rows across every pipeline that stopped cleanly
    pub fn rows_accepted(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|stats| stats.rows_accepted)
            .sum()
    }

    pub fn outcome(&self, site: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.site == site)
    }
}

/// Runs and watches every source pipeline
pub struct SourceSupervisor {
    config: RelayConfig,
    metrics: Arc<dyn MetricsSink>,
    publisher: Arc<Publisher>,
}

impl SourceSupervisor {
    pub fn new(
        config: RelayConfig,
        metrics: Arc<dyn MetricsSink>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            config,
            metrics,
            publisher,
        }
    }

    /// Start every pipeline and wait for all of them to stop
    ///
    /// Fails only if the configuration is invalid. Per-source failures are
    /// in the returned report.
    pub async fn run(self, cancel: CancellationToken) -> Result<SupervisorReport> {
        self.config.validate()?;

        info!("Starting {} source pipelines", self.config.sources.len());

        let handles: Vec<_> = self
            .config
            .sources
            .iter()
            .map(|source| {
                let task = run_source(
                    source.clone(),
                    self.config.settings.clone(),
                    Arc::clone(&self.metrics),
                    Arc::clone(&self.publisher),
                    cancel.child_token(),
                );
                (source.clone(), tokio::spawn(task))
            })
            .collect();

        let (sources, tasks): (Vec<LogicalSource>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(tasks).await;

        let outcomes = sources
            .into_iter()
            .zip(results)
            .map(|(source, joined)| {
                let result = match joined {
                    Ok(Ok(stats)) => Ok(stats),
                    Ok(Err(e)) => {
                        error!(site = %source.site, "Pipeline failed: {}", e);
                        Err(e.to_string())
                    }
                    Err(e) => {
                        error!(site = %source.site, "Pipeline task aborted: {}", e);
                        Err(format!("Pipeline task aborted: {}", e))
                    }
                };
                SourceOutcome {
                    site: source.site,
                    file_name: source.file_name,
                    result,
                }
            })
            .collect();

        let report = SupervisorReport { outcomes };
        info!(
            "All pipelines stopped: {} accepted rows, {} failed sources",
            report.rows_accepted(),
            report.failed_count()
        );
        Ok(report)
    }
}

async fn run_source(
    source: LogicalSource,
    settings: PipelineSettings,
    metrics: Arc<dyn MetricsSink>,
    publisher: Arc<Publisher>,
    cancel: CancellationToken,
) -> Result<SourceStats> {
    let tailer = FileTailer::open(&source.file_name, settings.poll_interval).await?;
    let pipeline = SourcePipeline::new(&source, tailer, &settings, metrics, publisher);
    pipeline.run(cancel).await
}
