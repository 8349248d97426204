//! Remote command dispatch
//!
//! Decodes the `operation` of an inbound `app-cmd` and routes it: `sync` and
//! `reboot` are common to both variants and resolved here; everything else is
//! offered to the device model, which knows its own verbs. Unknown commands
//! and missing operations are logged no-ops; dispatch never fails.

use super::state::DeviceModel;
use crate::protocol::AppCommand;
use tracing::{debug, info, warn};

/// What the reporting loop must do after a command was dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing to do; state changes (if any) flow out via the dirty flag
    Handled,
    /// Push a full snapshot immediately, bypassing interval and dirty checks
    SyncNow,
    /// Publish a rebooting status and raise the typed shutdown signal
    Reboot,
    /// Command was empty or unrecognized
    Ignored,
}

/// Dispatch one inbound command against the device model
pub fn dispatch<M: DeviceModel>(model: &mut M, command: &AppCommand) -> DispatchOutcome {
    let Some(op) = &command.operation else {
        debug!("Command without operation field, ignoring");
        return DispatchOutcome::Ignored;
    };

    debug!(
        cmd = %op.custom_cmd,
        index = op.field_index,
        value = op.field_value,
        "Dispatching command"
    );

    match op.custom_cmd.as_str() {
        "sync" => DispatchOutcome::SyncNow,
        "reboot" => {
            info!("Reboot command received");
            DispatchOutcome::Reboot
        }
        _ => {
            if model.apply_operation(op) {
                DispatchOutcome::Handled
            } else {
                warn!(cmd = %op.custom_cmd, "Unknown command, ignoring");
                DispatchOutcome::Ignored
            }
        }
    }
}
