//! `smartcar` – SmartCar Command Line Interface
//!
//! Two roles, one binary:
//!
//! 1. `smartcar serve` owns the GPIO wheels and exposes them on the control
//!    socket.  Ctrl-C turns every wheel off and removes the socket.
//! 2. `smartcar drive` connects to that socket (retrying until it appears),
//!    reads JSON commands from stdin and prints one JSON reply per command.
//!    Ctrl-C or end of input stops the loop, which turns the wheels off.

mod config;
mod drive;
mod serve;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "smartcar",
    about = "GPIO wheel control service and drive loop",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "SMARTCAR_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Own the wheels and serve them on the control socket
    Serve,

    /// Drive through the control service, reading JSON commands from stdin
    Drive,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let service_name = match cli.command {
        Commands::Serve => "smartcar-serve",
        Commands::Drive => "smartcar-drive",
    };
    let _guard = smartcar_runtime::init_tracing(service_name);

    let cfg = match config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(path = %cli.config.display(), ?cfg, "configuration loaded");

    let result = match cli.command {
        Commands::Serve => serve::run(&cfg),
        Commands::Drive => drive::run(&cfg),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "smartcar exiting");
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime, smartcar_types::CarError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| smartcar_types::CarError::Transport(format!("cannot start runtime: {e}")))
}
