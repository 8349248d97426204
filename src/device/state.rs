//! In-memory device state for both client variants
//!
//! [`SensorBank`] holds the input variant's per-channel readings;
//! [`OutputBank`] holds the output variant's pins with their blink counters.
//! Both implement [`DeviceModel`], the seam the reporting loop and the
//! command dispatcher are written against.
//!
//! Dirty tracking is the freshness contract: every mutation sets the flag,
//! a successful snapshot push clears it, so any externally-caused change is
//! published within one tick of the loop.

use crate::protocol::Operation;
use tracing::{debug, info};

/// Variant seam between the reporting loop, the dispatcher and the state
pub trait DeviceModel: Send + 'static {
    /// Full state snapshot, one integer per channel in configured order
    fn snapshot(&self) -> Vec<i64>;

    /// Whether state changed since the last successful push
    fn dirty(&self) -> bool;

    /// Called after a successful snapshot push
    fn clear_dirty(&mut self);

    /// Whether this variant runs the blink-advance step each tick
    fn blink_capable(&self) -> bool {
        false
    }

    /// Advance all pending blink toggles by one half-cycle
    fn advance_blink(&mut self) {}

    /// Whether this variant pushes snapshots on the upload interval even
    /// when nothing changed
    fn periodic_upload(&self) -> bool {
        false
    }

    /// Apply a variant-specific operation. Returns `false` when the command
    /// verb is not recognized by this variant; preconditions failing on a
    /// recognized verb leave state unchanged but still count as handled.
    fn apply_operation(&mut self, op: &Operation) -> bool;

    /// Externally-produced value update (console producer, input variant)
    fn set_value(&mut self, _index: usize, _value: i64) -> bool {
        false
    }

    /// Optional human-readable state summary for periodic display
    fn status_display(&self) -> Option<String> {
        None
    }
}

// Input variant

/// Per-channel integer readings fed by a simulated sensor producer
#[derive(Debug)]
pub struct SensorBank {
    values: Vec<i64>,
    dirty: bool,
}

impl SensorBank {
    pub fn new(channel_count: usize) -> Self {
        Self {
            values: vec![0; channel_count],
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> Option<i64> {
        self.values.get(index).copied()
    }
}

impl DeviceModel for SensorBank {
    fn snapshot(&self) -> Vec<i64> {
        self.values.clone()
    }

    fn dirty(&self) -> bool {
        self.dirty
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn periodic_upload(&self) -> bool {
        true
    }

    fn apply_operation(&mut self, op: &Operation) -> bool {
        // The input variant has no variant-specific commands
        debug!(cmd = %op.custom_cmd, "No sensor operation for command");
        false
    }

    fn set_value(&mut self, index: usize, value: i64) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                self.dirty = true;
                info!(index, value, "Sensor value updated");
                true
            }
            None => {
                debug!(index, "Sensor index out of range");
                false
            }
        }
    }
}

// Output variant

/// Default blink count when the command does not specify one
const DEFAULT_BLINK_COUNT: u32 = 5;

/// One logical output pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPin {
    pub index: usize,
    pub name: String,
    pub state: bool,
    /// Remaining half-cycles; reaching zero forces `state = false`
    pub blink_remaining: u32,
}

/// All output pins of the output variant
#[derive(Debug)]
pub struct OutputBank {
    pins: Vec<OutputPin>,
    dirty: bool,
}

impl OutputBank {
    pub fn new(sensor_ids: &[u32]) -> Self {
        let pins = sensor_ids
            .iter()
            .enumerate()
            .map(|(index, id)| OutputPin {
                index,
                name: format!("Output-{id}"),
                state: false,
                blink_remaining: 0,
            })
            .collect();
        Self { pins, dirty: false }
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn pin(&self, index: usize) -> Option<&OutputPin> {
        self.pins.get(index)
    }

    /// Set one pin, cancelling any pending blink on it
    pub fn set_pin(&mut self, index: usize, state: bool) {
        if let Some(pin) = self.pins.get_mut(index) {
            pin.state = state;
            pin.blink_remaining = 0;
            self.dirty = true;
            info!(index, state, name = %pin.name, "Output pin set");
        }
    }

    /// Set every pin to the same state, cancelling pending blinks
    pub fn set_all(&mut self, state: bool) {
        for index in 0..self.pins.len() {
            self.set_pin(index, state);
        }
    }

    /// Start a blink of `count` full cycles (2×count half-toggles); the
    /// half-cycle counter saturates at `u32::MAX`
    pub fn start_blink(&mut self, index: usize, count: u32) {
        if let Some(pin) = self.pins.get_mut(index) {
            pin.blink_remaining = count.saturating_mul(2);
            info!(index, count, name = %pin.name, "Blink started");
        }
    }
}

impl DeviceModel for OutputBank {
    fn snapshot(&self) -> Vec<i64> {
        self.pins
            .iter()
            .map(|pin| if pin.state { 1 } else { 0 })
            .collect()
    }

    fn dirty(&self) -> bool {
        self.dirty
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn blink_capable(&self) -> bool {
        true
    }

    fn advance_blink(&mut self) {
        for pin in &mut self.pins {
            if pin.blink_remaining > 0 {
                pin.state = !pin.state;
                pin.blink_remaining -= 1;
                self.dirty = true;

                if pin.blink_remaining == 0 {
                    // A finished blink always ends with the pin off
                    pin.state = false;
                    info!(index = pin.index, "Blink completed");
                }
            }
        }
    }

    fn apply_operation(&mut self, op: &Operation) -> bool {
        let in_range = op.field_index >= 0 && (op.field_index as usize) < self.pins.len();

        match op.custom_cmd.as_str() {
            "output" => {
                if in_range && op.field_value >= 0 {
                    self.set_pin(op.field_index as usize, op.field_value > 0);
                }
                true
            }
            "output-all" => {
                if op.field_value >= 0 {
                    self.set_all(op.field_value > 0);
                }
                true
            }
            "blinkLed" => {
                if in_range {
                    // fieldValue can exceed u32::MAX; clamp, never truncate
                    let count = if op.field_value > 0 {
                        u32::try_from(op.field_value).unwrap_or(u32::MAX)
                    } else {
                        DEFAULT_BLINK_COUNT
                    };
                    self.start_blink(op.field_index as usize, count);
                }
                true
            }
            // Legacy simple form: bare index/value pair
            "" => {
                if in_range && op.field_value >= 0 {
                    self.set_pin(op.field_index as usize, op.field_value > 0);
                }
                true
            }
            _ => false,
        }
    }

    fn status_display(&self) -> Option<String> {
        let lines: Vec<String> = self
            .pins
            .iter()
            .map(|pin| {
                let state = if pin.state { "ON" } else { "OFF" };
                if pin.blink_remaining > 0 {
                    format!(
                        "pin {} ({}): {} (blinking, {} left)",
                        pin.index,
                        pin.name,
                        state,
                        pin.blink_remaining / 2
                    )
                } else {
                    format!("pin {} ({}): {}", pin.index, pin.name, state)
                }
            })
            .collect();
        Some(lines.join(", "))
    }
}
