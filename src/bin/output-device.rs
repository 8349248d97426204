//! atCloud365 output-device example client
//!
//! Simulates a bank of remotely controlled output pins: `output`,
//! `output-all`, and `blinkLed` commands from the platform change pin state,
//! and every change is reported back immediately.

use atcloud_device::config::DeviceConfig;
use atcloud_device::device::OutputBank;
use atcloud_device::observability::init_default_logging;
use atcloud_device::runtime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// atCloud365 output-device example client
#[derive(Parser)]
#[command(name = "output-device")]
#[command(about = "atCloud365 output device client with remote pin control")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device client
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting output-device v{}", env!("CARGO_PKG_VERSION"));

    let config = match runtime::load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    }
}

async fn run(config: DeviceConfig) -> ! {
    let cancel = CancellationToken::new();
    let model = OutputBank::new(&config.device.sensor_ids);

    let code = match runtime::run_device(config, model, None, cancel).await {
        Ok(exit) => runtime::exit_code(exit),
        Err(e) => {
            error!("Device failed: {}", e);
            1
        }
    };

    process::exit(code);
}

fn handle_config_command(config: DeviceConfig, show: bool) -> ! {
    if show {
        match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                println!("Current configuration:");
                println!("{rendered}");
            }
            Err(e) => {
                error!("Failed to render configuration: {}", e);
                process::exit(1);
            }
        }
    }

    info!("Configuration validation complete");
    process::exit(0);
}
