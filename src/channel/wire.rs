//! Event framing and routing for the real-time channel
//!
//! Every frame on the wire is a JSON object `{ "event": <name>, "payload": <json> }`.
//! Pure encode/decode/route functions live here so they can be tested without
//! a socket.

use crate::protocol::{AppCommand, EVENT_APP_CMD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One named event crossing the channel, in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// The authentication payload sent as the first frame of every connection
    pub fn auth(token: &str) -> Self {
        Self::new("auth", serde_json::json!({ "token": token }))
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Routing decision for an inbound frame
#[derive(Debug)]
pub enum FrameRoute {
    /// Remote command for the dispatcher
    Command(AppCommand),
    /// Anything else the server sends (connection confirmations etc.)
    ServerEvent { event: String },
}

/// Route a decoded inbound frame (pure function)
///
/// Only `app-cmd` payloads are decoded further; a malformed command payload
/// is an error the caller logs and drops without touching state.
pub fn route_frame(frame: EventFrame) -> Result<FrameRoute, serde_json::Error> {
    if frame.event == EVENT_APP_CMD {
        let command: AppCommand = serde_json::from_value(frame.payload)?;
        Ok(FrameRoute::Command(command))
    } else {
        Ok(FrameRoute::ServerEvent { event: frame.event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let frame = EventFrame::new("dev-status", Value::String("Status OK".into()));
        let encoded = frame.encode().unwrap();
        let decoded = EventFrame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_auth_frame_shape() {
        let frame = EventFrame::auth("abc123");
        assert_eq!(frame.event, "auth");
        assert_eq!(frame.payload["token"], "abc123");
    }

    #[test]
    fn test_frame_without_payload_decodes() {
        let frame = EventFrame::decode(r#"{"event":"connected"}"#).unwrap();
        assert_eq!(frame.event, "connected");
        assert_eq!(frame.payload, Value::Null);
    }

    #[test]
    fn test_route_app_cmd() {
        let frame = EventFrame::new(
            "app-cmd",
            serde_json::json!({"operation": {"customCmd": "sync"}}),
        );
        match route_frame(frame).unwrap() {
            FrameRoute::Command(cmd) => {
                assert_eq!(cmd.operation.unwrap().custom_cmd, "sync");
            }
            other => panic!("expected Command route, got {other:?}"),
        }
    }

    #[test]
    fn test_route_server_event() {
        let frame = EventFrame::new("connected", Value::Null);
        match route_frame(frame).unwrap() {
            FrameRoute::ServerEvent { event } => assert_eq!(event, "connected"),
            other => panic!("expected ServerEvent route, got {other:?}"),
        }
    }

    #[test]
    fn test_route_malformed_command_errors() {
        let frame = EventFrame::new("app-cmd", serde_json::json!({"operation": "not-an-object"}));
        assert!(route_frame(frame).is_err());
    }
}
