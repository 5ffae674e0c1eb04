//! Command implementation for the datalogger relay CLI
//!
//! Wires the parsed arguments to the configuration, metrics endpoint,
//! publisher and source supervisor, and reports how the run ended.

use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::adapters::metrics_server;
use crate::app::services::metrics::SiteMetrics;
use crate::app::services::publisher::{PublishOptions, Publisher, Transport};
use crate::app::services::supervisor::{SourceSupervisor, SupervisorReport};
use crate::cli::args::Args;
use crate::config::RelayConfig;
use crate::{Error, Result};

/// How a relay run ended
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Per-source outcomes
    pub report: SupervisorReport,
    /// Messages delivered to the transport
    pub messages_published: u64,
    /// Messages given up on after retries
    pub messages_dropped: u64,
    /// Wall-clock run time
    pub run_time: std::time::Duration,
}

impl RunSummary {
    /// True when every configured source failed
    pub fn all_sources_failed(&self) -> bool {
        self.report.all_failed()
    }
}

/// Main command runner
///
/// 1. Set up logging and validate arguments
/// 2. Load the source list from the config file or stdin
/// 3. Run the relay until every pipeline stops or `cancel` fires
pub async fn run(args: Args, cancel: CancellationToken) -> Result<RunSummary> {
    setup_logging(&args);

    info!("Starting datalogger relay");
    debug!("Command line arguments: {:?}", args);

    args.validate()?;

    let config = load_configuration(&args)
        .await?
        .with_settings(args.pipeline_settings());
    config.validate()?;

    let transport = args.transport();
    if transport.is_none() {
        info!("No publish endpoint configured; rows are counted but not forwarded");
    }

    let listener = match args.metrics_listen_addr() {
        Some(addr) => Some(metrics_server::bind(addr).await?),
        None => None,
    };

    relay(config, listener, transport, cancel).await
}

/// Run every configured source with an optional metrics endpoint
///
/// Rows are published to `transport` when one is given. Queued messages
/// get a short grace period to be delivered once every pipeline stops.
pub async fn relay(
    config: RelayConfig,
    metrics_listener: Option<TcpListener>,
    transport: Option<Transport>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let start_time = Instant::now();
    let metrics = Arc::new(SiteMetrics::new());
    let publisher = Arc::new(match transport {
        Some(transport) => {
            info!("Publishing rows to {}", transport.describe());
            Publisher::spawn(transport, PublishOptions::default(), metrics.clone())
        }
        None => Publisher::disabled(),
    });

    let server_cancel = cancel.child_token();
    let server = metrics_listener.map(|listener| {
        tokio::spawn(metrics_server::serve_listener(
            listener,
            Arc::clone(&metrics),
            server_cancel.clone(),
        ))
    });

    let supervisor = SourceSupervisor::new(config, metrics.clone(), Arc::clone(&publisher));
    let report = supervisor.run(cancel.clone()).await;
    publisher.close().await;

    server_cancel.cancel();
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => debug!("Metrics server stopped"),
            Ok(Err(e)) => warn!("Metrics server failed: {}", e),
            Err(e) => warn!("Metrics server task aborted: {}", e),
        }
    }

    let summary = RunSummary {
        report: report?,
        messages_published: publisher.published_count(),
        messages_dropped: publisher.dropped_count(),
        run_time: start_time.elapsed(),
    };
    report_summary(&summary);
    Ok(summary)
}

/// Set up structured logging based on CLI arguments
///
/// Logs go to stderr so stdout stays free for published messages.
fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("datalogger_relay={}", log_level)));

    let initialized = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .try_init();

    if initialized.is_ok() {
        debug!("Logging initialized at level: {}", log_level);
    }
}

/// Read the source list from the config file, or stdin when none is given
async fn load_configuration(args: &Args) -> Result<RelayConfig> {
    match &args.config_file {
        Some(path) => {
            info!("Loading sources from {}", path.display());
            RelayConfig::from_path(path)
        }
        None => {
            info!("Reading sources from stdin");
            let input = tokio::task::spawn_blocking(|| {
                let mut buffer = String::new();
                std::io::stdin()
                    .lock()
                    .read_to_string(&mut buffer)
                    .map(|_| buffer)
            })
            .await
            .map_err(|e| Error::processing_interrupted(format!("stdin reader failed: {}", e)))?
            .map_err(|e| Error::io("Failed to read sources from stdin", e))?;

            RelayConfig::from_reader(input.as_bytes())
        }
    }
}

fn report_summary(summary: &RunSummary) {
    for outcome in &summary.report.outcomes {
        match &outcome.result {
            Ok(stats) => info!(
                site = %outcome.site,
                "{}: {} rows accepted, {} stale, {} dropped",
                outcome.file_name.display(),
                stats.rows_accepted,
                stats.rows_stale,
                stats.rows_dropped()
            ),
            Err(reason) => error!(
                site = %outcome.site,
                "{}: {}",
                outcome.file_name.display(),
                reason
            ),
        }
    }

    info!(
        "Relay stopped after {:.1?}: {} messages published, {} dropped",
        summary.run_time, summary.messages_published, summary.messages_dropped
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::LogicalSource;
    use clap::Parser;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_fails_when_every_source_is_missing() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sources.json");
        let sources = vec![LogicalSource::new(temp_dir.path().join("absent.dat"), "absent")];
        std::fs::write(&config_path, serde_json::to_vec(&sources).unwrap()).unwrap();

        let args = Args::try_parse_from([
            "datalogger-relay",
            "--no-metrics",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();

        let summary = run(args, CancellationToken::new()).await.unwrap();
        assert!(summary.all_sources_failed());
        assert_eq!(summary.messages_published, 0);
    }

    #[tokio::test]
    async fn test_run_rejects_empty_source_list() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sources.json");
        std::fs::write(&config_path, "[]").unwrap();

        let args = Args::try_parse_from([
            "datalogger-relay",
            "--no-metrics",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();

        let result = run(args, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_arguments() {
        let args = Args::try_parse_from(["datalogger-relay", "--poll-interval-ms", "0"]).unwrap();
        let result = run(args, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }
}
