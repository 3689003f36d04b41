//! # Command-Line Interface Module
//!
//! Parses the two run modes this suite supports: `server`, which just
//! binds and serves, and `client`, which connects and drives a suite of
//! profile tests built either from a suite file (`--suite-file`) or the
//! short comma-separated form (`--profiles`). Grounded on the teacher's
//! derive-based `Args`, with the mechanism-per-flag shape replaced by a
//! subcommand per run mode since server and client take disjoint
//! arguments here.

use crate::error::NstsError;
use crate::speedtest::SpeedTestSuite;
use crate::{suite_file, units};
use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser, Subcommand,
};
use std::path::PathBuf;
use std::str::FromStr;

/// Default port used by both `server` and `client` when `--port` is not
/// given, matching the wire protocol's documented default.
pub const DEFAULT_PORT: u16 = 26532;

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Network Speed Test Suite — orchestrates pluggable benchmark profiles
/// between two peers over a line-framed TCP control protocol.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase diagnostic log verbosity on stderr.
    ///
    ///  -v: debug
    ///  -vv and more: trace
    /// By default, only INFO and above is shown.
    #[arg(short, long, action = clap::ArgAction::Count, global = true, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Silence user-facing informational output on stdout.
    #[arg(short, long, global = true, help_heading = "Output and Logging")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen for one client at a time and run whatever profile it asks
    /// for.
    Server(ServerArgs),
    /// Connect to a server and run a suite of profile tests against it.
    Client(ClientArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Bind and accept over IPv6 instead of IPv4.
    #[arg(long)]
    pub ipv6: bool,
}

#[derive(clap::Args, Debug)]
pub struct ClientArgs {
    /// Host or address of the server to connect to.
    pub host: String,

    /// Port to connect to.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Connect over IPv6 instead of IPv4.
    #[arg(long)]
    pub ipv6: bool,

    /// Path to an INI-like suite file describing the tests to run.
    ///
    /// Mutually exclusive with `--profiles`.
    #[arg(long, conflicts_with = "profiles")]
    pub suite_file: Option<PathBuf>,

    /// Comma-separated short form of the tests to run, e.g.
    /// `dummy,iperf_tcp-s,ping-r`.
    ///
    /// Mutually exclusive with `--suite-file`.
    #[arg(long, conflicts_with = "suite_file")]
    pub profiles: Option<String>,

    /// Override the number of samples taken per test.
    #[arg(long)]
    pub samples: Option<i64>,

    /// Override the interval between samples, e.g. "2s" or "500ms".
    #[arg(long)]
    pub interval: Option<String>,
}

impl ClientArgs {
    /// Build the suite this invocation should run, applying any
    /// `--samples`/`--interval` overrides on top of whatever the suite
    /// file or short form already set.
    pub fn build_suite(&self) -> Result<SpeedTestSuite, NstsError> {
        let mut suite = match (&self.suite_file, &self.profiles) {
            (Some(path), None) => {
                let content = std::fs::read_to_string(path)?;
                suite_file::load_file(&content)?
            }
            (None, Some(spec)) => suite_file::parse_command_line(spec)?,
            _ => {
                return Err(crate::error::SuiteParseError::Malformed {
                    context: "command line".to_string(),
                    detail: "exactly one of --suite-file or --profiles is required".to_string(),
                }
                .into())
            }
        };

        if let Some(samples) = self.samples {
            for test in &mut suite.tests {
                test.options.set_value("samples", crate::value::Value::Int(samples))?;
            }
        }
        if let Some(interval) = &self.interval {
            let time = units::Time::from_str(interval)?;
            for test in &mut suite.tests {
                test.options.set_value("interval", crate::value::Value::from(time))?;
            }
        }
        Ok(suite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn build_suite_rejects_when_neither_source_given() {
        let args = ClientArgs {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            ipv6: false,
            suite_file: None,
            profiles: None,
            samples: None,
            interval: None,
        };
        assert!(args.build_suite().is_err());
    }

    #[test]
    fn build_suite_applies_overrides() {
        let args = ClientArgs {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            ipv6: false,
            suite_file: None,
            profiles: Some("dummy-s".to_string()),
            samples: Some(7),
            interval: Some("2s".to_string()),
        };
        let suite = args.build_suite().unwrap();
        assert_eq!(suite.tests.len(), 1);
        assert_eq!(suite.tests[0].options.get("samples").unwrap().as_int(), Some(7));
    }
}
