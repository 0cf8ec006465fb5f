// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Entry point for the ET112 cache gateway daemon.

mod build_info;
mod config;
mod daemon;
mod engine;
mod error;
mod registers;
mod server;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use config::Config;
use daemon::launch_daemon::Daemon;

/// Caching Modbus gateway for a Carlo-Gavazzi ET112 energy meter.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file (YAML format).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum inter-poll spacing, in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Use RTU (serial) for the upstream link instead of Modbus/TCP.
    #[arg(long)]
    client_is_rtu: Option<bool>,

    /// Upstream Modbus/TCP host.
    #[arg(long)]
    target_ip: Option<String>,

    /// Upstream Modbus/TCP port.
    #[arg(long)]
    tcp_port: Option<u16>,

    /// Downstream Modbus/TCP listener port.
    #[arg(long)]
    server_tcp_port: Option<u16>,

    /// Validate a configuration file and exit.
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Print a description of every configuration key and exit.
    #[arg(long)]
    show_config_schema: bool,

    /// Print the crate version and exit.
    #[arg(long)]
    show_version: bool,

    /// Print detailed build information and exit.
    #[arg(long)]
    build_info: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.show_version {
        build_info::print_version_info();
        return Ok(());
    }

    if args.build_info {
        build_info::print_build_info();
        return Ok(());
    }

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        config::print_config_schema();
        return Ok(());
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }
        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        info!(
            "no configuration file found at {}, using defaults",
            config_path.display()
        );
        Config::default()
    };

    config.apply_args(
        args.poll_interval_ms,
        args.client_is_rtu,
        args.target_ip,
        args.tcp_port,
        args.server_tcp_port,
    );

    info!("starting ET112 cache gateway");
    let mut daemon = Daemon::new();
    daemon.launch(config.gateway).await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, terminating gateway"),
        Err(err) => eprintln!("error waiting for shutdown signal: {err}"),
    }
    daemon.shutdown();
    daemon.join().await?;

    Ok(())
}
