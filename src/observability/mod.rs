//! Logging setup for the device binaries

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
