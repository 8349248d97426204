//! atCloud365 input-device example client
//!
//! Simulates a multi-channel sensor: values entered on the console are pushed
//! to the platform, a periodic snapshot keeps the dashboard fresh, and remote
//! `sync`/`reboot` commands are honored.

use atcloud_device::config::DeviceConfig;
use atcloud_device::device::SensorBank;
use atcloud_device::input::spawn_console_producer;
use atcloud_device::observability::init_default_logging;
use atcloud_device::runtime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// atCloud365 input-device example client
#[derive(Parser)]
#[command(name = "input-device")]
#[command(about = "atCloud365 sensor device client with console-fed values")]
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

    info!("Starting input-device v{}", env!("CARGO_PKG_VERSION"));

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

    let channel_count = config.device.sensor_ids.len();
    let model = SensorBank::new(channel_count);

    let (updates_tx, updates_rx) = mpsc::channel(32);
    let producer = spawn_console_producer(channel_count, updates_tx, cancel.clone());

    let code = match runtime::run_device(config, model, Some(updates_rx), cancel.clone()).await {
        Ok(exit) => runtime::exit_code(exit),
        Err(e) => {
            error!("Device failed: {}", e);
            1
        }
    };

    // Unblock the stdin thread if the loop ended first; it also exits on EOF,
    // so an orphaned join would hang only on an interactive terminal.
    cancel.cancel();
    drop(producer);

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
