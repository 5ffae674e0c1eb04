//! Datalogger Relay Library
//!
//! Follows Campbell Scientific TOA5 datalogger files as they grow and turns
//! each data row into per-site metrics and an outbound JSON message.
//!
//! This library provides tools for:
//! - Tailing files across truncation and recreation
//! - Decoding quoted CSV rows and tracking repeated TOA5 header blocks
//! - Extracting named records, battery voltage and freshness per row
//! - Exporting per-site counters and gauges in Prometheus text format
//! - Publishing fresh rows to stdout, TCP or an in-process channel
//! - Supervising one isolated pipeline per configured source

pub mod config;
pub mod constants;
pub mod error;

// Core application modules
pub mod app {
    pub mod models;
    pub mod services {
        pub mod line_source;
        pub mod metrics;
        pub mod publisher;
        pub mod supervisor;
        pub mod toa5_parser;
    }
    pub mod adapters {
        pub mod metrics_server;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use app::models::{LogicalSource, Record};
pub use config::RelayConfig;
pub use error::{Error, Result};
