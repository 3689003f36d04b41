//! # Network Speed Test Suite
//!
//! A two-peer network benchmark orchestrator: a line-framed control
//! protocol, a pluggable profile-execution engine, a suite/statistics
//! layer, and the client/server engines that drive them.

pub mod cli;
pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod options;
pub mod profiles;
pub mod proto;
pub mod server;
pub mod speedtest;
pub mod suite_file;
pub mod units;
pub mod utils;
pub mod value;

pub use client::Client;
pub use error::NstsError;
pub use speedtest::{SpeedTest, SpeedTestSuite};

/// The current version of the suite.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values shared across the CLI and the suite
/// engine.
pub mod defaults {
    /// Default port both `server` and `client` use when `--port` is not
    /// given.
    pub const PORT: u16 = crate::cli::DEFAULT_PORT;

    /// Default number of samples a [`crate::speedtest::SpeedTest`] takes
    /// when nothing overrides it.
    pub const SAMPLES: i64 = 1;

    /// Default interval, in seconds, between samples.
    pub const INTERVAL_SECS: f64 = 1.0;
}
