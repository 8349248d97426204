//! Device state, command dispatch, and the reporting loop

pub mod command;
pub mod reporter;
pub mod state;

pub use command::{dispatch, DispatchOutcome};
pub use reporter::{Reporter, RunExit, SensorUpdate};
pub use state::{DeviceModel, OutputBank, OutputPin, SensorBank};
