//! Console-input producer for the input variant
//!
//! Simulates a sensor by reading `index,value` lines from stdin on a
//! dedicated blocking thread and forwarding them to the reporting loop as
//! messages. The thread never touches device state directly. Typing `quit`
//! (or closing stdin) cancels the shared shutdown token, which takes the
//! whole client down gracefully.

use crate::device::SensorUpdate;
use std::io::BufRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Parse one console line into an update
///
/// Returns `Err` with a user-facing message for anything malformed or out of
/// range; the caller prints it and keeps reading.
pub fn parse_line(line: &str, channel_count: usize) -> Result<SensorUpdate, String> {
    let line = line.trim();
    let (index_part, value_part) = line
        .split_once(',')
        .ok_or_else(|| "invalid format, use: index,value".to_string())?;

    let index: usize = index_part
        .trim()
        .parse()
        .map_err(|_| "index must be a non-negative integer".to_string())?;
    let value: i64 = value_part
        .trim()
        .parse()
        .map_err(|_| "value must be an integer".to_string())?;

    if index >= channel_count {
        return Err(format!("index out of range, use 0-{}", channel_count - 1));
    }

    Ok(SensorUpdate { index, value })
}

fn is_quit(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "quit" | "exit" | "q")
}

/// Spawn the blocking stdin reader thread
pub fn spawn_console_producer(
    channel_count: usize,
    updates: mpsc::Sender<SensorUpdate>,
    cancel: CancellationToken,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        println!("Sensor input simulation. Enter values as: index,value");
        println!("Available indices: 0-{}", channel_count - 1);
        println!("Type 'quit' to exit.");

        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };

            if cancel.is_cancelled() {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            if is_quit(&line) {
                info!("Quit requested from console");
                break;
            }

            match parse_line(&line, channel_count) {
                Ok(update) => {
                    println!("Sensor {} set to {}", update.index, update.value);
                    if updates.blocking_send(update).is_err() {
                        // loop is gone, nothing left to feed
                        break;
                    }
                }
                Err(message) => println!("Input error: {message}"),
            }
        }

        debug!("Console producer stopping");
        cancel.cancel();
    })
}
