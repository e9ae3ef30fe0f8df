//! Modbus RTU monitor for the Mitsubishi FR-E700 inverter.
//!
//! Polls output frequency, current and voltage every five seconds and prints
//! them until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use fr_e700_common::{LogFormat, LoggingConfig};
use fr_e700_monitor::config::SerialLinkConfig;
use fr_e700_monitor::link::RtuLink;
use fr_e700_monitor::output::{ConsoleSink, OutputFormat};
use fr_e700_monitor::poller::{DrivePoller, Exit};
use fr_e700_monitor::signal::Interrupt;
use std::process::ExitCode;
use tracing::info;

/// Modbus RTU monitor for the Mitsubishi FR-E700 inverter.
#[derive(Parser, Debug)]
#[command(name = "fr-e700-monitor")]
#[command(about = "Polls an FR-E700 drive over Modbus RTU and prints its output values")]
#[command(version)]
struct Args {
    /// Serial port the drive is attached to
    #[arg(short, long, default_value = fr_e700_monitor::config::DEFAULT_PORT)]
    port: String,

    /// Measurement output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format (text, json).
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_config = LoggingConfig::with_overrides(args.log_level.clone(), args.log_format);
    fr_e700_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting fr-e700-monitor");

    let config = SerialLinkConfig::for_port(&args.port);
    config
        .validate()
        .with_context(|| format!("Invalid serial configuration for {:?}", args.port))?;

    // Armed before connecting so a Ctrl-C during the first cycle still tears down.
    let interrupt = Interrupt::install().context("Failed to install Ctrl-C handler")?;

    info!(port = %config.port, format = ?args.format, "Connecting to FR-E700");

    let sink = ConsoleSink::stdout(args.format);
    let poller = match DrivePoller::connect(|| RtuLink::open(&config), sink).await {
        Ok(poller) => poller,
        Err(_) => return Ok(ExitCode::FAILURE),
    };

    let exit = poller.serve(interrupt.recv()).await;

    info!("fr-e700-monitor stopped");

    match exit {
        Exit::Interrupted => Ok(ExitCode::SUCCESS),
        Exit::Failed(_) => Ok(ExitCode::FAILURE),
    }
}
