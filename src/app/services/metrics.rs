//! Per-site relay metrics
//!
//! Pipelines report through the [`MetricsSink`] trait so tests can observe
//! them without a server. [`SiteMetrics`] is the in-process implementation
//! and renders itself in the Prometheus text exposition format.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::app::models::VoltageSample;
use crate::app::services::toa5_parser::DropReason;
use crate::constants::{
    BATTERY_VOLTAGE_METRIC, MESSAGES_DROPPED_METRIC, ROWS_DROPPED_METRIC, ROWS_LOADED_METRIC,
};

/// Destination for per-site counters and gauges
///
/// Implementations must tolerate concurrent updates from many pipelines.
pub trait MetricsSink: Send + Sync {
    /// One accepted data row for `site`
    fn record_row(&self, site: &str);

    /// Latest battery voltage for a site
    fn record_voltage(&self, sample: VoltageSample<'_>);

    /// One line dropped for `reason`
    fn record_drop(&self, site: &str, reason: DropReason);

    /// One accepted row the publisher could not deliver
    fn record_message_dropped(&self, site: &str);
}

/// Point-in-time values for one site
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteSnapshot {
    pub rows_loaded: u64,
    pub battery_voltage: Option<f64>,
    pub rows_dropped: BTreeMap<DropReason, u64>,
    pub messages_dropped: u64,
}

impl SiteSnapshot {
    /// Dropped rows across every reason
    pub fn total_dropped(&self) -> u64 {
        self.rows_dropped.values().sum()
    }
}

#[derive(Clone, Copy)]
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_preamble(output: &mut String, name: &str, help: &str, metric_type: MetricType) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} {}", name, metric_type.as_str());
}

/// Shared metric registry keyed by site
#[derive(Debug, Default)]
pub struct SiteMetrics {
    sites: Mutex<HashMap<String, SiteSnapshot>>,
}

impl SiteMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking pipeline must not take metrics down with it
    fn lock(&self) -> MutexGuard<'_, HashMap<String, SiteSnapshot>> {
        self.sites.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, site: &str, apply: impl FnOnce(&mut SiteSnapshot)) {
        let mut sites = self.lock();
        match sites.get_mut(site) {
            Some(entry) => apply(entry),
            None => {
                let mut entry = SiteSnapshot::default();
                apply(&mut entry);
                sites.insert(site.to_string(), entry);
            }
        }
    }

    /// Values for a single site, if it has reported anything
    pub fn snapshot(&self, site: &str) -> Option<SiteSnapshot> {
        self.lock().get(site).cloned()
    }

    /// Values for every site, ordered by site
    pub fn snapshots(&self) -> BTreeMap<String, SiteSnapshot> {
        self.lock()
            .iter()
            .map(|(site, snapshot)| (site.clone(), snapshot.clone()))
            .collect()
    }

    /// Render every metric in Prometheus text format
    pub fn render_prometheus(&self) -> String {
        let snapshots = self.snapshots();
        let mut output = String::with_capacity(256 + snapshots.len() * 256);

        write_preamble(
            &mut output,
            ROWS_LOADED_METRIC,
            "Data rows accepted from datalogger files",
            MetricType::Counter,
        );
        for (site, snapshot) in &snapshots {
            let _ = writeln!(
                output,
                "{}{{site=\"{}\"}} {}",
                ROWS_LOADED_METRIC,
                escape_label(site),
                snapshot.rows_loaded
            );
        }

        write_preamble(
            &mut output,
            BATTERY_VOLTAGE_METRIC,
            "Most recent datalogger battery voltage",
            MetricType::Gauge,
        );
        for (site, snapshot) in &snapshots {
            if let Some(volts) = snapshot.battery_voltage {
                let _ = writeln!(
                    output,
                    "{}{{site=\"{}\"}} {}",
                    BATTERY_VOLTAGE_METRIC,
                    escape_label(site),
                    volts
                );
            }
        }

        write_preamble(
            &mut output,
            ROWS_DROPPED_METRIC,
            "Lines dropped by reason",
            MetricType::Counter,
        );
        for (site, snapshot) in &snapshots {
            for (reason, count) in &snapshot.rows_dropped {
                let _ = writeln!(
                    output,
                    "{}{{site=\"{}\",reason=\"{}\"}} {}",
                    ROWS_DROPPED_METRIC,
                    escape_label(site),
                    reason,
                    count
                );
            }
        }

        write_preamble(
            &mut output,
            MESSAGES_DROPPED_METRIC,
            "Accepted rows that could not be published",
            MetricType::Counter,
        );
        for (site, snapshot) in &snapshots {
            let _ = writeln!(
                output,
                "{}{{site=\"{}\"}} {}",
                MESSAGES_DROPPED_METRIC,
                escape_label(site),
                snapshot.messages_dropped
            );
        }

        output
    }
}

impl MetricsSink for SiteMetrics {
    fn record_row(&self, site: &str) {
        self.update(site, |entry| entry.rows_loaded += 1);
    }

    fn record_voltage(&self, sample: VoltageSample<'_>) {
        self.update(sample.site, |entry| entry.battery_voltage = Some(sample.volts));
    }

    fn record_drop(&self, site: &str, reason: DropReason) {
        self.update(site, |entry| *entry.rows_dropped.entry(reason).or_insert(0) += 1);
    }

    fn record_message_dropped(&self, site: &str) {
        self.update(site, |entry| entry.messages_dropped += 1);
    }
}

/// Escape a label value for the text exposition format
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unknown_site_has_no_snapshot() {
        let metrics = SiteMetrics::new();
        assert!(metrics.snapshot("nowhere").is_none());
    }

    #[test]
    fn test_counts_are_per_site() {
        let metrics = SiteMetrics::new();
        metrics.record_row("a");
        metrics.record_row("a");
        metrics.record_row("b");
        metrics.record_drop("b", DropReason::FieldCount);
        metrics.record_drop("b", DropReason::FieldCount);
        metrics.record_drop("b", DropReason::Malformed);

        let a = metrics.snapshot("a").unwrap();
        assert_eq!(a.rows_loaded, 2);
        assert_eq!(a.total_dropped(), 0);

        let b = metrics.snapshot("b").unwrap();
        assert_eq!(b.rows_loaded, 1);
        assert_eq!(b.rows_dropped.get(&DropReason::FieldCount), Some(&2));
        assert_eq!(b.total_dropped(), 3);
    }

    #[test]
    fn test_voltage_gauge_keeps_latest_value() {
        let metrics = SiteMetrics::new();
        metrics.record_voltage(VoltageSample {
            site: "a",
            volts: 12.9,
        });
        metrics.record_voltage(VoltageSample {
            site: "a",
            volts: 12.4,
        });

        assert_eq!(metrics.snapshot("a").unwrap().battery_voltage, Some(12.4));
    }

    #[test]
    fn test_render_prometheus() {
        let metrics = SiteMetrics::new();
        metrics.record_row("site1");
        metrics.record_voltage(VoltageSample {
            site: "site1",
            volts: 12.5,
        });
        metrics.record_drop("site2", DropReason::VoltageParse);
        metrics.record_message_dropped("site2");

        let text = metrics.render_prometheus();

        assert!(text.contains("# TYPE datalogger_rows_loaded counter"));
        assert!(text.contains("# TYPE datalogger_battery_voltage gauge"));
        assert!(text.contains("datalogger_rows_loaded{site=\"site1\"} 1\n"));
        assert!(text.contains("datalogger_rows_loaded{site=\"site2\"} 0\n"));
        assert!(text.contains("datalogger_battery_voltage{site=\"site1\"} 12.5\n"));
        assert!(!text.contains("datalogger_battery_voltage{site=\"site2\"}"));
        assert!(
            text.contains("datalogger_rows_dropped{site=\"site2\",reason=\"voltage_parse\"} 1\n")
        );
        assert!(text.contains("datalogger_messages_dropped{site=\"site2\"} 1\n"));
    }

    #[test]
    fn test_label_values_are_escaped() {
        assert_eq!(escape_label(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_label("x\ny"), "x\\ny");
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(SiteMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    let site = if i % 2 == 0 { "even" } else { "odd" };
                    for _ in 0..250 {
                        metrics.record_row(site);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot("even").unwrap().rows_loaded, 500);
        assert_eq!(metrics.snapshot("odd").unwrap().rows_loaded, 500);
    }
}
