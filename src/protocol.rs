//! Wire-level names and payload types for the atCloud365 device protocol
//!
//! Three named events cross the real-time channel:
//! - `dev-data` (outbound): full state snapshot, `{ "content": [int, ...] }`
//! - `dev-status` (outbound): plain status string
//! - `app-cmd` (inbound): remote command, `{ "operation": { ... } }`
//!
//! Snapshot arrays are order-preserving: index i corresponds to the i-th
//! configured sensor id.

use serde::{Deserialize, Serialize};

/// Outbound state snapshot event name
pub const EVENT_DEV_DATA: &str = "dev-data";
/// Outbound liveness/status event name
pub const EVENT_DEV_STATUS: &str = "dev-status";
/// Inbound remote command event name
pub const EVENT_APP_CMD: &str = "app-cmd";

/// Canonical status strings published on `dev-status`
pub mod status {
    pub const BOOTUP: &str = "Bootup & Ready";
    pub const RECONNECTED: &str = "Reconnected";
    pub const OK: &str = "Status OK";
    pub const REBOOTING: &str = "Rebooting";
    pub const SHUTTING_DOWN: &str = "Shutting down";
}

/// Payload of a `dev-data` snapshot push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevData {
    /// One entry per configured channel, in sensor-id order
    pub content: Vec<i64>,
}

/// Payload of an inbound `app-cmd` event
///
/// A payload without an `operation` field is a no-op, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppCommand {
    #[serde(default)]
    pub operation: Option<Operation>,
}

/// The operation carried by a remote command
///
/// Every field is optional on the wire; absent fields take the sentinel
/// defaults the dispatch preconditions are written against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Operation {
    #[serde(rename = "customCmd")]
    pub custom_cmd: String,
    #[serde(rename = "fieldIndex")]
    pub field_index: i64,
    #[serde(rename = "fieldValue")]
    pub field_value: i64,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            custom_cmd: String::new(),
            field_index: -1,
            field_value: -1,
        }
    }
}
