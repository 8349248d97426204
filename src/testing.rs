//! Test support: an in-memory channel that records publishes
//!
//! Used by unit tests and the integration scenarios to observe what the
//! reporting loop sends without a socket. Mirrors the real channel's
//! fire-and-forget contract: publishes while disconnected are dropped.

use crate::channel::{Channel, SessionState};
use serde_json::Value;
use std::sync::Mutex;

/// Recording channel with a settable session state
pub struct MockChannel {
    state: Mutex<SessionState>,
    published: Mutex<Vec<(String, Value)>>,
}

impl MockChannel {
    /// A mock that reports `Connected`
    pub fn connected() -> Self {
        Self::with_state(SessionState::Connected)
    }

    /// A mock that reports `Disconnected`
    pub fn disconnected() -> Self {
        Self::with_state(SessionState::Disconnected)
    }

    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Everything published so far, in order
    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().unwrap().clone()
    }

    /// Payloads published under one event name, in order
    pub fn published_for(&self, event: &str) -> Vec<Value> {
        self.published()
            .into_iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

impl Channel for MockChannel {
    fn publish(&self, event: &str, payload: Value) {
        if *self.state.lock().unwrap() != SessionState::Connected {
            return;
        }
        self.published
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
    }

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_in_order() {
        let channel = MockChannel::connected();
        channel.publish("dev-status", Value::String("Bootup & Ready".into()));
        channel.publish("dev-data", serde_json::json!({"content": [0]}));

        let published = channel.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "dev-status");
        assert_eq!(published[1].0, "dev-data");
    }

    #[test]
    fn test_mock_drops_when_disconnected() {
        let channel = MockChannel::disconnected();
        channel.publish("dev-status", Value::String("Status OK".into()));
        assert_eq!(channel.publish_count(), 0);
        assert!(!channel.is_connected());
    }
}
