//! The periodic-reporting and remote-command-dispatch loop
//!
//! One cooperative loop owns the device model and drives everything that
//! happens after startup: blink advancement, dirty-triggered and periodic
//! snapshot pushes, liveness status reports, inbound command dispatch, and
//! graceful shutdown. Lifecycle signals and commands arrive on the channel
//! event stream; external value updates (input variant) arrive as messages
//! from the console producer.
//!
//! A failure inside one tick is logged and the loop backs off for one second
//! before resuming; the loop only ends on the shutdown signal, a reboot
//! command, or a permanently lost channel.

use super::command::{dispatch, DispatchOutcome};
use super::state::DeviceModel;
use crate::channel::{Channel, ChannelEvent, SessionState};
use crate::config::TimingSection;
use crate::error::{DeviceError, DeviceResult};
use crate::protocol::{status, DevData, EVENT_DEV_DATA, EVENT_DEV_STATUS};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Loop tick period
const TICK: Duration = Duration::from_millis(100);
/// Back-off after a failed tick
const TICK_BACKOFF: Duration = Duration::from_secs(1);
/// Pause between the "Rebooting" status and loop exit
const REBOOT_PAUSE: Duration = Duration::from_secs(1);
/// Delivery grace for the "Shutting down" status
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
/// Period of the terminal state display
const DISPLAY_INTERVAL: Duration = Duration::from_secs(10);

/// One externally-produced channel value (console producer, input variant)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorUpdate {
    pub index: usize,
    pub value: i64,
}

/// Why the reporting loop ended; the binary maps this to an exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// Interrupt-triggered graceful shutdown (exit code 0)
    Shutdown,
    /// Remote reboot command (exit code 0)
    Reboot,
    /// Channel permanently lost (exit code 1)
    ChannelLost,
}

/// Per-loop timestamps
struct Clock {
    last_upload: Instant,
    last_status: Instant,
    last_blink: Instant,
    last_display: Instant,
}

impl Clock {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            last_upload: now,
            last_status: now,
            last_blink: now,
            last_display: now,
        }
    }
}

/// The reporting loop, generic over the device model and the channel
pub struct Reporter<M: DeviceModel, C: Channel> {
    model: Arc<Mutex<M>>,
    channel: Arc<C>,
    events: mpsc::Receiver<ChannelEvent>,
    updates: Option<mpsc::Receiver<SensorUpdate>>,
    timing: TimingSection,
    cancel: CancellationToken,
}

impl<M: DeviceModel, C: Channel> Reporter<M, C> {
    pub fn new(
        model: Arc<Mutex<M>>,
        channel: Arc<C>,
        events: mpsc::Receiver<ChannelEvent>,
        timing: TimingSection,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            model,
            channel,
            events,
            updates: None,
            timing,
            cancel,
        }
    }

    /// Attach the external value producer (input variant)
    pub fn with_updates(mut self, updates: mpsc::Receiver<SensorUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Run until shutdown, reboot, or channel loss
    pub async fn run(self) -> RunExit {
        let Reporter {
            model,
            channel,
            mut events,
            mut updates,
            timing,
            cancel,
        } = self;

        let mut clock = Clock::new();
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Reporting loop started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    if channel.is_connected() {
                        channel.publish(EVENT_DEV_STATUS, Value::from(status::SHUTTING_DOWN));
                        tokio::time::sleep(SHUTDOWN_GRACE).await;
                    }
                    info!("Shutdown signal received, reporting loop stopping");
                    return RunExit::Shutdown;
                }

                event = events.recv() => {
                    match event {
                        Some(event) => {
                            if let Some(exit) =
                                handle_event(event, &model, &*channel, &mut clock).await
                            {
                                return exit;
                            }
                        }
                        None => {
                            error!("Channel event stream closed");
                            return RunExit::ChannelLost;
                        }
                    }
                }

                update = next_update(&mut updates) => {
                    match model.lock() {
                        Ok(mut guard) => {
                            guard.set_value(update.index, update.value);
                        }
                        Err(_) => warn!("State mutex poisoned, dropping update"),
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = tick(&model, &*channel, &timing, &mut clock) {
                        warn!(error = %e, "Reporting tick failed, backing off");
                        tokio::time::sleep(TICK_BACKOFF).await;
                    }
                }
            }
        }
    }
}

/// Wait for the next external update; pends forever when there is no producer
async fn next_update(slot: &mut Option<mpsc::Receiver<SensorUpdate>>) -> SensorUpdate {
    loop {
        match slot {
            Some(rx) => match rx.recv().await {
                Some(update) => return update,
                None => {
                    debug!("Input producer finished");
                    *slot = None;
                }
            },
            None => std::future::pending().await,
        }
    }
}

/// React to one channel event; `Some(exit)` ends the loop
async fn handle_event<M: DeviceModel>(
    event: ChannelEvent,
    model: &Mutex<M>,
    channel: &dyn Channel,
    clock: &mut Clock,
) -> Option<RunExit> {
    match event {
        ChannelEvent::Connected { first } => {
            let label = if first {
                status::BOOTUP
            } else {
                status::RECONNECTED
            };
            info!(first, "Channel connected");
            channel.publish(EVENT_DEV_STATUS, Value::from(label));
            if let Err(e) = push_snapshot(model, channel) {
                warn!(error = %e, "Initial snapshot push failed");
            }
            let now = Instant::now();
            clock.last_upload = now;
            clock.last_status = now;
            None
        }
        ChannelEvent::Disconnected { reason } => {
            warn!(%reason, "Channel disconnected");
            None
        }
        ChannelEvent::Error { message } => {
            error!(%message, "Channel error");
            if channel.state() == SessionState::PermanentlyDisconnected {
                Some(RunExit::ChannelLost)
            } else {
                None
            }
        }
        ChannelEvent::Command(command) => {
            let outcome = match model.lock() {
                Ok(mut guard) => dispatch(&mut *guard, &command),
                Err(_) => {
                    warn!("State mutex poisoned, dropping command");
                    return None;
                }
            };
            match outcome {
                DispatchOutcome::SyncNow => {
                    if let Err(e) = push_snapshot(model, channel) {
                        warn!(error = %e, "Sync push failed");
                    }
                    clock.last_upload = Instant::now();
                    None
                }
                DispatchOutcome::Reboot => {
                    channel.publish(EVENT_DEV_STATUS, Value::from(status::REBOOTING));
                    tokio::time::sleep(REBOOT_PAUSE).await;
                    Some(RunExit::Reboot)
                }
                DispatchOutcome::Handled | DispatchOutcome::Ignored => None,
            }
        }
    }
}

/// One reporting tick, in the order the contract prescribes
fn tick<M: DeviceModel>(
    model: &Mutex<M>,
    channel: &dyn Channel,
    timing: &TimingSection,
    clock: &mut Clock,
) -> DeviceResult<()> {
    let now = Instant::now();
    let mut guard = model
        .lock()
        .map_err(|_| DeviceError::loop_tick("state mutex poisoned"))?;

    // 1. blink advance (output variant)
    if guard.blink_capable() && now.duration_since(clock.last_blink) >= timing.blink_interval() {
        guard.advance_blink();
        clock.last_blink = now;
    }

    let connected = channel.is_connected();

    // 2. dirty-triggered push
    if guard.dirty() && connected {
        publish_snapshot(&mut *guard, channel)?;
        clock.last_upload = now;
    }

    // 3. periodic upload (input variant)
    if guard.periodic_upload()
        && connected
        && now.duration_since(clock.last_upload) >= timing.upload_interval()
    {
        publish_snapshot(&mut *guard, channel)?;
        clock.last_upload = now;
    }

    // 4. liveness status
    if connected && now.duration_since(clock.last_status) >= timing.status_interval() {
        channel.publish(EVENT_DEV_STATUS, Value::from(status::OK));
        clock.last_status = now;
    }

    if now.duration_since(clock.last_display) >= DISPLAY_INTERVAL {
        if let Some(text) = guard.status_display() {
            info!(state = %text, "Device state");
        }
        clock.last_display = now;
    }

    Ok(())
}

/// Push a full snapshot through the model mutex
fn push_snapshot<M: DeviceModel>(model: &Mutex<M>, channel: &dyn Channel) -> DeviceResult<()> {
    let mut guard = model
        .lock()
        .map_err(|_| DeviceError::loop_tick("state mutex poisoned"))?;
    publish_snapshot(&mut *guard, channel)
}

/// Push the current snapshot and clear the dirty flag
///
/// A disconnected channel defers instead: the dirty flag stays set so the
/// next connected tick delivers the change.
fn publish_snapshot<M: DeviceModel>(guard: &mut M, channel: &dyn Channel) -> DeviceResult<()> {
    if !channel.is_connected() {
        debug!("Not connected, snapshot deferred");
        return Ok(());
    }
    let payload = serde_json::to_value(DevData {
        content: guard.snapshot(),
    })
    .map_err(|e| DeviceError::loop_tick(format!("snapshot encoding failed: {e}")))?;
    channel.publish(EVENT_DEV_DATA, payload);
    guard.clear_dirty();
    Ok(())
}
