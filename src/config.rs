//! Configuration for the atCloud365 device clients
//!
//! Loaded from a TOML file (`device.toml` by default). The shared secret can
//! be written inline for local testing or, preferably, resolved from an
//! environment variable named by `secret_key_env`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main device configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    pub device: DeviceSection,
    pub server: ServerSection,
    #[serde(default)]
    pub timing: TimingSection,
}

/// Device identity section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device serial number (opaque string assigned by the platform)
    pub sn: String,
    /// Shared secret written inline (testing only)
    pub secret_key: Option<String>,
    /// Environment variable containing the shared secret
    pub secret_key_env: Option<String>,
    /// Ordered channel identifiers; defines addressable indices 0..N-1
    pub sensor_ids: Vec<u32>,
}

/// Platform endpoints section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Platform base URL with scheme, e.g. `https://atcloud365.com`
    pub url: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Real-time channel path, e.g. `/api/dev/io/`
    pub api_path: String,
    /// Device authentication endpoint (full URL)
    pub auth_uri: String,
}

fn default_server_port() -> u16 {
    443
}

/// Timing section; all fields have sensible defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingSection {
    /// Periodic snapshot upload interval in seconds (input variant)
    pub upload_interval_secs: u64,
    /// Liveness status report interval in seconds
    pub status_interval_secs: u64,
    /// Blink half-cycle interval in milliseconds (output variant)
    pub blink_interval_ms: u64,
    /// Fixed delay between reconnection attempts in seconds
    pub reconnect_delay_secs: u64,
    /// Maximum reconnection attempts before the session gives up
    pub reconnect_max_attempts: u32,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            upload_interval_secs: 10,
            status_interval_secs: 60,
            blink_interval_ms: 500,
            reconnect_delay_secs: 5,
            reconnect_max_attempts: 50,
        }
    }
}

impl TimingSection {
    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_interval_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }
}

/// Immutable device identity, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    pub sn: String,
    pub secret_key: String,
    pub sensor_ids: Vec<u32>,
}

impl DeviceIdentity {
    /// Number of addressable channel indices
    pub fn channel_count(&self) -> usize {
        self.sensor_ids.len()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("No secret key configured: set secret_key or secret_key_env")]
    MissingSecret,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeviceConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DeviceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.sn.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.sn must not be empty".to_string(),
            ));
        }
        if self.device.sensor_ids.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.sensor_ids must contain at least one channel id".to_string(),
            ));
        }
        if self.timing.upload_interval_secs == 0
            || self.timing.status_interval_secs == 0
            || self.timing.blink_interval_ms == 0
        {
            return Err(ConfigError::InvalidConfig(
                "timing intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the shared secret: inline value first, then the named
    /// environment variable
    pub fn secret_key(&self) -> Result<String, ConfigError> {
        if let Some(secret) = &self.device.secret_key {
            return Ok(secret.clone());
        }
        match &self.device.secret_key_env {
            Some(env_name) => std::env::var(env_name)
                .map_err(|_| ConfigError::EnvVarNotFound(env_name.clone())),
            None => Err(ConfigError::MissingSecret),
        }
    }

    /// Build the immutable identity handed to the authenticator and channel
    pub fn identity(&self) -> Result<DeviceIdentity, ConfigError> {
        Ok(DeviceIdentity {
            sn: self.device.sn.clone(),
            secret_key: self.secret_key()?,
            sensor_ids: self.device.sensor_ids.clone(),
        })
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
sn = "03EB023C002601000000FE"
secret_key = "test-secret"
sensor_ids = [991284, 991285, 991286]

[server]
url = "https://atcloud365.com"
api_path = "/api/dev/io/"
auth_uri = "https://atcloud365.com/api/v3/devices/auth"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
