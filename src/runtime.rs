//! Shared startup and shutdown plumbing for the device binaries
//!
//! Both variants boot the same way: load and validate the configuration,
//! authenticate, open the channel, arm signal handling, run the reporting
//! loop. The only differences are the device model and whether a console
//! producer is attached, so the binaries hand both in and map the returned
//! [`RunExit`] to an exit code.

use crate::auth::Authenticator;
use crate::channel::{ReconnectPolicy, WsChannel};
use crate::config::DeviceConfig;
use crate::device::{DeviceModel, Reporter, RunExit, SensorUpdate};
use crate::error::DeviceResult;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Default configuration locations, tried in order
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["device.toml", "config/device.toml"];

/// Load configuration from the given path or the default locations
pub fn load_configuration(config_path: &Option<PathBuf>) -> DeviceResult<DeviceConfig> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(DeviceConfig::load_from_file(path)?)
        }
        None => {
            for path_str in DEFAULT_CONFIG_PATHS {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(DeviceConfig::load_from_file(&path)?);
                }
            }
            Err(crate::config::ConfigError::InvalidConfig(
                "no configuration file found; provide one with -c/--config or create device.toml"
                    .to_string(),
            )
            .into())
        }
    }
}

/// Cancel the token on SIGINT or SIGTERM
pub fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt, shutting down gracefully...");
        }
        cancel.cancel();
    });
}

/// Authenticate, connect, and run the reporting loop to completion
pub async fn run_device<M: DeviceModel>(
    config: DeviceConfig,
    model: M,
    updates: Option<mpsc::Receiver<SensorUpdate>>,
    cancel: CancellationToken,
) -> DeviceResult<RunExit> {
    let identity = config.identity()?;
    info!(sn = %identity.sn, channels = identity.channel_count(), "Device starting");

    let token = Authenticator::new(config.server.auth_uri.clone())?
        .authenticate(&identity)
        .await?;
    info!("Device authenticated");

    let (channel, events) = WsChannel::connect(
        &identity,
        &config.server,
        &token,
        ReconnectPolicy::from_timing(&config.timing),
        cancel.clone(),
    )
    .await?;
    let channel = Arc::new(channel);

    spawn_signal_listener(cancel.clone());

    let mut reporter = Reporter::new(
        Arc::new(Mutex::new(model)),
        channel.clone(),
        events,
        config.timing,
        cancel.clone(),
    );
    if let Some(updates) = updates {
        reporter = reporter.with_updates(updates);
    }

    let exit = reporter.run().await;
    channel.shutdown();

    match exit {
        RunExit::Shutdown => info!("Device shut down"),
        RunExit::Reboot => info!("Device exiting for reboot"),
        RunExit::ChannelLost => error!("Channel permanently lost"),
    }
    Ok(exit)
}

/// Map a loop exit to the process exit code
pub fn exit_code(exit: RunExit) -> i32 {
    match exit {
        RunExit::Shutdown | RunExit::Reboot => 0,
        RunExit::ChannelLost => 1,
    }
}
