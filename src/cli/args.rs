//! Command-line argument definitions for the datalogger relay
//!
//! The source list itself is JSON (see [`crate::config::RelayConfig`]);
//! these flags cover the process-wide settings around it.

use chrono::TimeDelta;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::app::services::publisher::Transport;
use crate::app::services::toa5_parser::HeaderLayout;
use crate::config::PipelineSettings;
use crate::constants::{
    DEFAULT_FRESHNESS_HOURS, DEFAULT_METRICS_ADDR, DEFAULT_POLL_INTERVAL_MS, TOA5_MARKER,
};
use crate::{Error, Result};

/// CLI arguments for the datalogger relay
///
/// Tails TOA5 datalogger files, exports per-site row counts and battery
/// voltage as metrics, and forwards fresh rows downstream as JSON.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "datalogger-relay",
    version,
    about = "Relay TOA5 datalogger files to metrics and a JSON message stream",
    long_about = "Follows a set of Campbell Scientific TOA5 datalogger files. Every data row \
                  increments a per-site counter, the configured battery column feeds a per-site \
                  voltage gauge, and rows newer than the freshness window are published as JSON. \
                  The source list is a JSON array read from --config or from stdin."
)]
pub struct Args {
    /// JSON file listing the sources to follow
    ///
    /// Each entry is `{"file-name": ..., "site": ..., "battery-variate-name": ...}`.
    /// Read from stdin when not given.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "JSON source list (default: stdin)"
    )]
    pub config_file: Option<PathBuf>,

    /// Address for the Prometheus metrics endpoint
    #[arg(
        long = "metrics-addr",
        value_name = "ADDR",
        env = "RELAY_METRICS_ADDR",
        default_value = DEFAULT_METRICS_ADDR,
        help = "Listen address for GET /metrics"
    )]
    pub metrics_addr: SocketAddr,

    /// Do not serve metrics over HTTP
    #[arg(long = "no-metrics", help = "Disable the metrics endpoint")]
    pub no_metrics: bool,

    /// Publish accepted rows as JSON lines to a TCP endpoint
    #[arg(
        long = "publish-addr",
        value_name = "HOST:PORT",
        env = "RELAY_PUBLISH_ADDR",
        help = "Publish rows as JSON lines over TCP"
    )]
    pub publish_addr: Option<String>,

    /// Publish accepted rows as JSON lines on stdout
    #[arg(long = "publish-stdout", help = "Publish rows as JSON lines on stdout")]
    pub publish_stdout: bool,

    /// Rows older than this many hours are skipped
    #[arg(
        long = "freshness-hours",
        value_name = "HOURS",
        default_value_t = DEFAULT_FRESHNESS_HOURS,
        help = "Skip rows older than this many hours"
    )]
    pub freshness_hours: u64,

    /// How often to check a file for new lines once at its end
    #[arg(
        long = "poll-interval-ms",
        value_name = "MS",
        default_value_t = DEFAULT_POLL_INTERVAL_MS,
        help = "File poll interval in milliseconds"
    )]
    pub poll_interval_ms: u64,

    /// Token identifying the first line of a header block
    #[arg(
        long = "marker",
        value_name = "TOKEN",
        default_value = TOA5_MARKER,
        help = "Header block marker token"
    )]
    pub marker: String,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: debug, -vv: trace)"
    )]
    pub verbose: u8,

    /// Only log errors
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress logging except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Args {
    /// Validate the arguments for consistency
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::configuration(
                "Poll interval must be greater than 0 ms",
            ));
        }

        if self.freshness_hours == 0 {
            return Err(Error::configuration(
                "Freshness window must be at least 1 hour",
            ));
        }

        if i64::try_from(self.freshness_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .is_none()
        {
            return Err(Error::configuration(format!(
                "Freshness window of {} hours is too large",
                self.freshness_hours
            )));
        }

        if self.marker.trim().is_empty() {
            return Err(Error::configuration("Header marker cannot be empty"));
        }

        if self.publish_stdout && self.publish_addr.is_some() {
            return Err(Error::configuration(
                "Choose one of --publish-stdout and --publish-addr",
            ));
        }

        if let Some(addr) = &self.publish_addr {
            if addr.trim().is_empty() {
                return Err(Error::configuration("Publish address cannot be empty"));
            }
        }

        if let Some(config_file) = &self.config_file {
            if !config_file.is_file() {
                return Err(Error::configuration(format!(
                    "Config file does not exist: {}",
                    config_file.display()
                )));
            }
        }

        Ok(())
    }

    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }

    /// Pipeline settings implied by the flags; call after [`Args::validate`]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let hours = i64::try_from(self.freshness_hours).unwrap_or(i64::MAX);
        PipelineSettings::default()
            .with_layout(HeaderLayout::default().with_marker(self.marker.trim()))
            .with_freshness_window(TimeDelta::try_hours(hours).unwrap_or(TimeDelta::MAX))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }

    /// Transport selected by the flags, if any
    pub fn transport(&self) -> Option<Transport> {
        if self.publish_stdout {
            Some(Transport::Stdout)
        } else {
            self.publish_addr
                .as_deref()
                .map(|addr| Transport::tcp(addr.trim()))
        }
    }

    /// Metrics listen address, unless metrics are disabled
    pub fn metrics_listen_addr(&self) -> Option<SocketAddr> {
        (!self.no_metrics).then_some(self.metrics_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["datalogger-relay"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);

        assert!(args.config_file.is_none());
        assert_eq!(args.freshness_hours, 24);
        assert_eq!(args.poll_interval_ms, 250);
        assert_eq!(args.marker, "TOA5");
        assert_eq!(args.get_log_level(), "info");
        assert!(args.validate().is_ok());
        assert!(args.transport().is_none());

        let settings = args.pipeline_settings();
        assert_eq!(settings, PipelineSettings::default());
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(parse(&["-v"]).get_log_level(), "debug");
        assert_eq!(parse(&["-vvv"]).get_log_level(), "trace");
        assert_eq!(parse(&["-q"]).get_log_level(), "error");
        assert!(Args::try_parse_from(["datalogger-relay", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_pipeline_settings_from_flags() {
        let args = parse(&[
            "--freshness-hours",
            "6",
            "--poll-interval-ms",
            "50",
            "--marker",
            "TOB1",
        ]);
        let settings = args.pipeline_settings();

        assert_eq!(settings.freshness_window, TimeDelta::hours(6));
        assert_eq!(settings.poll_interval, Duration::from_millis(50));
        assert_eq!(settings.layout.marker, "TOB1");
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(parse(&["--poll-interval-ms", "0"]).validate().is_err());
        assert!(parse(&["--freshness-hours", "0"]).validate().is_err());
        assert!(parse(&["--marker", " "]).validate().is_err());
    }

    #[test]
    fn test_transport_selection() {
        let args = parse(&["--publish-stdout"]);
        assert!(matches!(args.transport(), Some(Transport::Stdout)));

        let args = parse(&["--publish-addr", "127.0.0.1:7000"]);
        assert!(matches!(args.transport(), Some(Transport::Tcp(_))));

        let mut both = parse(&["--publish-stdout"]);
        both.publish_addr = Some("127.0.0.1:7000".to_string());
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_metrics_can_be_disabled() {
        let args = parse(&["--metrics-addr", "127.0.0.1:9999"]);
        assert_eq!(
            args.metrics_listen_addr(),
            Some("127.0.0.1:9999".parse().unwrap())
        );
        assert_eq!(parse(&["--no-metrics"]).metrics_listen_addr(), None);
        assert!(Args::try_parse_from(["datalogger-relay", "--metrics-addr", "nope"]).is_err());
    }

    #[test]
    fn test_config_file_must_exist() {
        let args = parse(&["--config", "/nonexistent/sources.json"]);
        assert!(args.validate().is_err());

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[]").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        assert!(parse(&["-c", path.as_str()]).validate().is_ok());
    }
}
