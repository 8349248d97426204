//! atCloud365 device clients
//!
//! Library backing the `input-device` and `output-device` example binaries
//! for the atCloud365 IoT platform. Both share the same skeleton:
//!
//! - authenticate against the platform with the device serial number and
//!   shared secret, receiving a session token
//! - open a persistent real-time channel and keep it alive with bounded
//!   reconnection
//! - run a cooperative reporting loop that pushes state snapshots
//!   (`dev-data`), liveness statuses (`dev-status`), and dispatches remote
//!   commands (`app-cmd`)
//!
//! The variants differ only in their device model: the input variant carries
//! a bank of sensor values fed from the console, the output variant a bank of
//! remotely switchable pins with blink support.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use atcloud_device::auth::Authenticator;
//! use atcloud_device::channel::{ReconnectPolicy, WsChannel};
//! use atcloud_device::config::DeviceConfig;
//! use atcloud_device::device::{Reporter, SensorBank};
//! use std::path::Path;
//! use std::sync::{Arc, Mutex};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::load_from_file(Path::new("device.toml"))?;
//! let identity = config.identity()?;
//!
//! let token = Authenticator::new(config.server.auth_uri.clone())?
//!     .authenticate(&identity)
//!     .await?;
//!
//! let cancel = CancellationToken::new();
//! let (channel, events) = WsChannel::connect(
//!     &identity,
//!     &config.server,
//!     &token,
//!     ReconnectPolicy::from_timing(&config.timing),
//!     cancel.clone(),
//! )
//! .await?;
//!
//! let model = Arc::new(Mutex::new(SensorBank::new(identity.channel_count())));
//! let _exit = Reporter::new(model, Arc::new(channel), events, config.timing, cancel)
//!     .run()
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod input;
pub mod observability;
pub mod protocol;
pub mod runtime;
pub mod testing;

pub use auth::{AccessToken, Authenticator};
pub use channel::{Channel, ChannelEvent, ReconnectPolicy, SessionState, WsChannel};
pub use config::{DeviceConfig, DeviceIdentity};
pub use device::{DeviceModel, OutputBank, Reporter, RunExit, SensorBank, SensorUpdate};
pub use error::{DeviceError, DeviceResult};
