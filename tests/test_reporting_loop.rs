//! End-to-end reporting loop scenarios
//!
//! Drives [`Reporter::run`] with a recording channel, a scripted event
//! stream, and paused tokio time: connection lifecycle, console-fed values,
//! remote commands, and the three loop exits.

use atcloud_device::channel::{ChannelEvent, SessionState};
use atcloud_device::config::TimingSection;
use atcloud_device::device::{OutputBank, Reporter, RunExit, SensorBank, SensorUpdate};
use atcloud_device::protocol::{AppCommand, Operation};
use atcloud_device::testing::MockChannel;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn command(cmd: &str, index: i64, value: i64) -> ChannelEvent {
    ChannelEvent::Command(AppCommand {
        operation: Some(Operation {
            custom_cmd: cmd.to_string(),
            field_index: index,
            field_value: value,
        }),
    })
}

struct Harness {
    channel: Arc<MockChannel>,
    events_tx: mpsc::Sender<ChannelEvent>,
    updates_tx: mpsc::Sender<SensorUpdate>,
    cancel: CancellationToken,
    handle: JoinHandle<RunExit>,
}

fn start_input(channels: usize) -> Harness {
    let model = Arc::new(Mutex::new(SensorBank::new(channels)));
    start(model)
}

fn start_output(sensor_ids: &[u32]) -> Harness {
    let model = Arc::new(Mutex::new(OutputBank::new(sensor_ids)));
    start(model)
}

fn start<M: atcloud_device::device::DeviceModel>(model: Arc<Mutex<M>>) -> Harness {
    let channel = Arc::new(MockChannel::connected());
    let (events_tx, events_rx) = mpsc::channel(16);
    let (updates_tx, updates_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let reporter = Reporter::new(
        model,
        channel.clone(),
        events_rx,
        TimingSection::default(),
        cancel.clone(),
    )
    .with_updates(updates_rx);

    let handle = tokio::spawn(reporter.run());

    Harness {
        channel,
        events_tx,
        updates_tx,
        cancel,
        handle,
    }
}

/// Let the loop drain pending events and run a couple of ticks
async fn settle() {
    tokio::time::sleep(Duration::from_millis(250)).await;
}

#[tokio::test(start_paused = true)]
async fn test_startup_publishes_bootup_then_snapshot() {
    let h = start_input(3);

    h.events_tx
        .send(ChannelEvent::Connected { first: true })
        .await
        .unwrap();
    settle().await;

    let published = h.channel.published();
    assert!(published.len() >= 2);
    assert_eq!(published[0].0, "dev-status");
    assert_eq!(published[0].1, serde_json::json!("Bootup & Ready"));
    assert_eq!(published[1].0, "dev-data");
    assert_eq!(published[1].1["content"], serde_json::json!([0, 0, 0]));

    h.cancel.cancel();
    assert_eq!(h.handle.await.unwrap(), RunExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_publishes_final_status() {
    let h = start_input(1);

    h.events_tx
        .send(ChannelEvent::Connected { first: true })
        .await
        .unwrap();
    settle().await;

    h.cancel.cancel();
    assert_eq!(h.handle.await.unwrap(), RunExit::Shutdown);

    let statuses = h.channel.published_for("dev-status");
    assert_eq!(statuses.last(), Some(&serde_json::json!("Shutting down")));
}

#[tokio::test(start_paused = true)]
async fn test_console_value_reaches_platform() {
    let h = start_input(3);

    h.events_tx
        .send(ChannelEvent::Connected { first: true })
        .await
        .unwrap();
    settle().await;
    h.channel.clear();

    h.updates_tx
        .send(SensorUpdate { index: 1, value: 42 })
        .await
        .unwrap();
    settle().await;

    let data = h.channel.published_for("dev-data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["content"], serde_json::json!([0, 42, 0]));

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_periodic_upload_keeps_platform_fresh() {
    let h = start_input(2);

    h.events_tx
        .send(ChannelEvent::Connected { first: true })
        .await
        .unwrap();
    settle().await;
    h.channel.clear();

    // no mutations at all, only the interval passing
    tokio::time::sleep(TimingSection::default().upload_interval() + Duration::from_millis(200))
        .await;

    let data = h.channel.published_for("dev-data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["content"], serde_json::json!([0, 0]));

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sync_command_pushes_immediately() {
    let h = start_output(&[991284, 991285]);

    h.events_tx
        .send(ChannelEvent::Connected { first: true })
        .await
        .unwrap();
    settle().await;
    h.channel.clear();

    h.events_tx.send(command("sync", -1, -1)).await.unwrap();
    settle().await;

    assert_eq!(h.channel.published_for("dev-data").len(), 1);

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_output_command_changes_pin_and_reports() {
    let h = start_output(&[991284, 991285]);

    h.events_tx
        .send(ChannelEvent::Connected { first: true })
        .await
        .unwrap();
    settle().await;
    h.channel.clear();

    h.events_tx.send(command("output", 0, 1)).await.unwrap();
    settle().await;

    let data = h.channel.published_for("dev-data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["content"], serde_json::json!([1, 0]));

    h.events_tx.send(command("output-all", -1, 0)).await.unwrap();
    settle().await;

    let data = h.channel.published_for("dev-data");
    assert_eq!(data.last().unwrap()["content"], serde_json::json!([0, 0]));

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reboot_command_ends_loop() {
    let h = start_output(&[991284]);

    h.events_tx
        .send(ChannelEvent::Connected { first: true })
        .await
        .unwrap();
    settle().await;

    h.events_tx.send(command("reboot", -1, -1)).await.unwrap();

    assert_eq!(h.handle.await.unwrap(), RunExit::Reboot);
    let statuses = h.channel.published_for("dev-status");
    assert_eq!(statuses.last(), Some(&serde_json::json!("Rebooting")));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_announces_and_resyncs() {
    let h = start_input(2);

    h.events_tx
        .send(ChannelEvent::Connected { first: true })
        .await
        .unwrap();
    settle().await;
    h.channel.clear();

    h.events_tx
        .send(ChannelEvent::Disconnected {
            reason: "stream ended".to_string(),
        })
        .await
        .unwrap();
    h.events_tx
        .send(ChannelEvent::Connected { first: false })
        .await
        .unwrap();
    settle().await;

    let published = h.channel.published();
    assert_eq!(published[0].0, "dev-status");
    assert_eq!(published[0].1, serde_json::json!("Reconnected"));
    assert_eq!(published[1].0, "dev-data");

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_changes_while_disconnected_deferred_until_reconnect() {
    let h = start_output(&[991284]);
    h.channel.set_state(SessionState::Disconnected);

    h.events_tx.send(command("output", 0, 1)).await.unwrap();
    settle().await;
    assert_eq!(h.channel.publish_count(), 0);

    h.channel.set_state(SessionState::Connected);
    settle().await;

    let data = h.channel.published_for("dev-data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["content"], serde_json::json!([1]));

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_channel_ends_loop() {
    let h = start_input(1);

    h.channel.set_state(SessionState::PermanentlyDisconnected);
    h.events_tx
        .send(ChannelEvent::Error {
            message: "reconnection attempts exhausted after 50 tries".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(h.handle.await.unwrap(), RunExit::ChannelLost);
}

#[tokio::test(start_paused = true)]
async fn test_closed_event_stream_ends_loop() {
    let h = start_input(1);

    drop(h.events_tx);

    assert_eq!(h.handle.await.unwrap(), RunExit::ChannelLost);
}

#[tokio::test(start_paused = true)]
async fn test_blink_runs_to_completion_and_ends_off() {
    let h = start_output(&[991284]);

    h.events_tx
        .send(ChannelEvent::Connected { first: true })
        .await
        .unwrap();
    settle().await;
    h.channel.clear();

    h.events_tx.send(command("blinkLed", 0, 2)).await.unwrap();

    // 2 blinks = 4 half-cycles at 500ms each
    tokio::time::sleep(Duration::from_secs(3)).await;

    let data = h.channel.published_for("dev-data");
    assert_eq!(data.len(), 4);
    assert_eq!(data.last().unwrap()["content"], serde_json::json!([0]));

    h.cancel.cancel();
    h.handle.await.unwrap();
}
