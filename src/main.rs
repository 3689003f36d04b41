//! # Network Speed Test Suite - Main Entry Point
//!
//! Parses CLI arguments, sets up layered tracing the same way as the
//! teacher's benchmark binary (a detailed file/stderr layer plus a
//! colorized stdout layer gated by `--quiet`), then dispatches to either
//! the server accept loop or the client suite runner.

use anyhow::{Context, Result};
use clap::Parser;
use nsts::cli::{Args, Command};

use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

mod logging;
use logging::ColorizedFormatter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let detailed_log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(log_level)
        .boxed();

    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(detailed_log_layer)
        .with(stdout_log)
        .init();

    match args.command {
        Command::Server(server_args) => {
            nsts::server::serve(&server_args.host, server_args.port, server_args.ipv6).await
        }
        Command::Client(client_args) => run_client(client_args).await,
    }
}

async fn run_client(args: nsts::cli::ClientArgs) -> Result<()> {
    let mut suite = args
        .build_suite()
        .context("failed to build the test suite from CLI arguments")?;

    let client = nsts::Client::connect(&args.host, args.port, args.ipv6)
        .await
        .with_context(|| format!("failed to connect to {}:{}", args.host, args.port))?;

    client
        .run_suite(&mut suite)
        .await
        .context("suite execution failed")?;

    for test in &suite.tests {
        let stats = test.statistics().context("failed to reduce test statistics")?;
        tracing::info!("{}: {} sample(s)", test.name(), test.samples.len());
        for (result_id, s) in &stats {
            tracing::info!(
                "  {}: mean={:?} min={:?} max={:?} std={:?}",
                result_id,
                s.mean,
                s.min,
                s.max,
                s.std
            );
        }
    }

    Ok(())
}
