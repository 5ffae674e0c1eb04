//! Single-source pipeline: line source to metrics and publisher

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::app::models::{LogicalSource, VoltageSample};
use crate::app::services::line_source::LineSource;
use crate::app::services::metrics::MetricsSink;
use crate::app::services::publisher::Publisher;
use crate::app::services::toa5_parser::{
    Extraction, HeaderStateMachine, LineEvent, ParseError, RecordExtractor, SourceStats,
};
use crate::config::PipelineSettings;

/// What happened to one line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Blank line
    Ignored,
    /// Marker or skipped header line
    HeaderProgress,
    /// New column names took effect
    ColumnsDefined { columns: usize },
    /// Row counted; `queued` is false when the publisher turned it away
    Accepted { voltage: Option<f64>, queued: bool },
    /// Row older than the freshness window
    Stale,
    /// Line dropped
    Dropped(ParseError),
}

/// Sequential processing of one logical source
pub struct SourcePipeline<S: LineSource> {
    site: String,
    lines: S,
    machine: HeaderStateMachine,
    extractor: RecordExtractor,
    metrics: Arc<dyn MetricsSink>,
    publisher: Arc<Publisher>,
    stats: SourceStats,
}

impl<S: LineSource> SourcePipeline<S> {
    pub fn new(
        source: &LogicalSource,
        lines: S,
        settings: &PipelineSettings,
        metrics: Arc<dyn MetricsSink>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            site: source.site.clone(),
            lines,
            machine: HeaderStateMachine::new(settings.layout.clone()),
            extractor: RecordExtractor::for_source(source, settings.freshness_window),
            metrics,
            publisher,
            stats: SourceStats::new(),
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    /// Process one line as if it were read at `now`
    ///
    /// Never waits on the publisher; delivery happens on its writer task.
    pub fn process_line(&mut self, line: &str, now: DateTime<Utc>) -> LineOutcome {
        self.stats.lines_read += 1;

        let event = match self.machine.feed(line) {
            Ok(event) => event,
            Err(error) => return self.drop_line(line, error),
        };

        match event {
            LineEvent::Blank => LineOutcome::Ignored,
            LineEvent::Marker => {
                self.stats.header_cycles += 1;
                debug!(site = %self.site, "Header block started");
                LineOutcome::HeaderProgress
            }
            LineEvent::HeaderSkipped => LineOutcome::HeaderProgress,
            LineEvent::ColumnsDefined(mapping) => {
                if let Some(column) = self.extractor.voltage_column() {
                    if !mapping.has_column(column) {
                        warn!(
                            site = %self.site,
                            "Battery column '{}' not in header; voltage will not be reported",
                            column
                        );
                    }
                }
                debug!(site = %self.site, "Header defines {} columns", mapping.len());
                LineOutcome::ColumnsDefined {
                    columns: mapping.len(),
                }
            }
            LineEvent::Data { fields, mapping } => {
                match self.extractor.extract(fields, &mapping, now) {
                    Ok(Extraction::Accepted(row)) => {
                        if let Some(volts) = row.voltage {
                            self.metrics.record_voltage(VoltageSample {
                                site: &self.site,
                                volts,
                            });
                        }
                        self.metrics.record_row(&self.site);
                        self.stats.rows_accepted += 1;

                        let queued = match self.publisher.publish(&row.record) {
                            Ok(()) => true,
                            Err(error) => {
                                warn!(site = %self.site, "Failed to queue row: {}", error);
                                self.stats.messages_dropped += 1;
                                false
                            }
                        };

                        LineOutcome::Accepted {
                            voltage: row.voltage,
                            queued,
                        }
                    }
                    Ok(Extraction::Stale { timestamp }) => {
                        self.stats.rows_stale += 1;
                        debug!(site = %self.site, %timestamp, "Skipping stale row");
                        LineOutcome::Stale
                    }
                    Err(error) => self.drop_line(line, error),
                }
            }
        }
    }

    fn drop_line(&mut self, line: &str, error: ParseError) -> LineOutcome {
        let reason = error.reason();
        if matches!(error, ParseError::NoMappingYet) {
            debug!(site = %self.site, line = %line, "Dropping line: {}", error);
        } else {
            warn!(site = %self.site, line = %line, "Dropping line: {}", error);
        }

        self.stats.record_drop(reason);
        self.metrics.record_drop(&self.site, reason);
        LineOutcome::Dropped(error)
    }

    /// Process lines until the source ends or `cancel` fires
    ///
    /// Only a line source failure is returned as an error.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SourceStats> {
        info!(site = %self.site, "Pipeline started");

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(site = %self.site, "Pipeline cancelled");
                    break;
                }
                line = self.lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => {
                    self.process_line(&line, Utc::now());
                }
                Ok(None) => break,
                Err(error) => {
                    warn!(site = %self.site, "Line source failed: {}", error);
                    return Err(error);
                }
            }
        }

        info!(
            site = %self.site,
            "Pipeline stopped: {} lines, {} accepted, {} stale, {} dropped ({:.1}% accepted)",
            self.stats.lines_read,
            self.stats.rows_accepted,
            self.stats.rows_stale,
            self.stats.rows_dropped(),
            self.stats.acceptance_rate()
        );
        Ok(self.stats)
    }
}
