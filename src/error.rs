//! Error types for the atCloud365 device clients
//!
//! Startup errors (authentication, channel connect) are fatal and abort the
//! process. Everything that happens after the session is up is recovered
//! locally: malformed commands are logged and dropped, reporting-tick failures
//! back off and continue.

use thiserror::Error;

/// Main error type for device client operations
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Authentication exchange failed. Fatal at startup, exit code 1.
    #[error("authentication failed: {cause}")]
    Auth {
        /// HTTP status of the response, if one was received at all.
        status: Option<u16>,
        cause: String,
    },

    /// Real-time channel could not be established. Fatal at startup, exit code 1.
    #[error("channel connect failed: {0}")]
    Connect(String),

    /// Inbound remote command could not be decoded. Recovered and logged.
    #[error("malformed command payload: {0}")]
    CommandDecode(#[source] serde_json::Error),

    /// Unexpected failure inside one reporting tick. Recovered after backoff.
    #[error("reporting tick failed: {0}")]
    LoopTick(String),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl DeviceError {
    /// Create an authentication error from an HTTP status
    pub fn auth_status(status: u16, body: impl Into<String>) -> Self {
        Self::Auth {
            status: Some(status),
            cause: format!("HTTP {status}: {}", body.into()),
        }
    }

    /// Create an authentication error with no HTTP status (transport failure,
    /// timeout, missing token field)
    pub fn auth<S: Into<String>>(cause: S) -> Self {
        Self::Auth {
            status: None,
            cause: cause.into(),
        }
    }

    /// Create a channel connect error
    pub fn connect<S: Into<String>>(cause: S) -> Self {
        Self::Connect(cause.into())
    }

    /// Create a reporting tick error
    pub fn loop_tick<S: Into<String>>(cause: S) -> Self {
        Self::LoopTick(cause.into())
    }
}

/// Result type for device client operations
pub type DeviceResult<T> = Result<T, DeviceError>;
