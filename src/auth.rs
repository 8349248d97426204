//! Device authentication against the platform HTTP API
//!
//! One blocking exchange at startup: POST the device identity, get back a
//! short-lived access token. A failure here is fatal; there is no retry, the
//! caller prints the cause and exits with a non-zero status. The token is
//! held for the lifetime of one channel session and never refreshed.

use crate::config::DeviceIdentity;
use crate::error::{DeviceError, DeviceResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on the single authentication call
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Opaque access token returned by the platform
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep the token out of log output
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    sn: &'a str,
    client_secret_key: &'a str,
    #[serde(rename = "sensorIds")]
    sensor_ids: &'a [u32],
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: Option<String>,
}

/// Single-shot authenticator for the device auth endpoint
pub struct Authenticator {
    http: reqwest::Client,
    auth_uri: String,
}

impl Authenticator {
    pub fn new(auth_uri: impl Into<String>) -> DeviceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(AUTH_TIMEOUT)
            .build()
            .map_err(|e| DeviceError::auth(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            http,
            auth_uri: auth_uri.into(),
        })
    }

    /// Exchange the device identity for an access token
    ///
    /// Exactly one attempt. Any non-200 status, transport error, timeout or
    /// missing `token` field in the response body is an authentication error.
    pub async fn authenticate(&self, identity: &DeviceIdentity) -> DeviceResult<AccessToken> {
        debug!(sn = %identity.sn, uri = %self.auth_uri, "Authenticating device");

        let request = AuthRequest {
            sn: &identity.sn,
            client_secret_key: &identity.secret_key,
            sensor_ids: &identity.sensor_ids,
        };

        let response = self
            .http
            .post(&self.auth_uri)
            .json(&request)
            .send()
            .await
            .map_err(|e| DeviceError::auth(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceError::auth_status(status.as_u16(), body));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| DeviceError::auth(format!("invalid response body: {e}")))?;

        match body.token {
            Some(token) if !token.is_empty() => {
                info!(sn = %identity.sn, "Device authenticated");
                Ok(AccessToken::new(token))
            }
            _ => Err(DeviceError::auth("no token in response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_debug_redacted() {
        let token = AccessToken::new("abc123");
        assert_eq!(format!("{token:?}"), "AccessToken(***)");
        assert_eq!(token.as_str(), "abc123");
    }

    #[test]
    fn test_auth_request_wire_shape() {
        let request = AuthRequest {
            sn: "SN-1",
            client_secret_key: "secret",
            sensor_ids: &[991284, 991285],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sn"], "SN-1");
        assert_eq!(json["client_secret_key"], "secret");
        assert_eq!(json["sensorIds"], serde_json::json!([991284, 991285]));
    }

    #[test]
    fn test_auth_response_missing_token() {
        let body: AuthResponse = serde_json::from_str(r#"{"message":"ok"}"#).unwrap();
        assert!(body.token.is_none());
    }
}
