//! WebSocket channel session with bounded reconnection
//!
//! Owns the lifecycle of one real-time connection: connect, authenticated
//! handshake, reconnect with a fixed inter-attempt delay up to a bounded
//! attempt count, disconnect. A background supervisor task drives the socket;
//! the rest of the client sees only [`SessionState`] transitions and
//! [`ChannelEvent`]s.
//!
//! The first outbound frame of every connection is the auth payload
//! `{ "token": ... }`. Inbound `app-cmd` frames are decoded and forwarded;
//! everything else the server sends is logged and ignored.

use super::wire::{self, EventFrame, FrameRoute};
use super::{Channel, ChannelEvent, SessionState};
use crate::auth::AccessToken;
use crate::config::{DeviceIdentity, ServerSection, TimingSection};
use crate::error::{DeviceError, DeviceResult};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on a single connection attempt
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the outbound frame buffer; overflow is dropped, not queued
const OUTBOUND_CAPACITY: usize = 64;

/// Capacity of the event channel toward the reporting loop
const EVENT_CAPACITY: usize = 64;

/// Fixed-delay, bounded-attempt reconnection policy
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay between consecutive attempts
    pub delay: Duration,
    /// Attempts before the session gives up for good
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: 50,
        }
    }
}

impl ReconnectPolicy {
    pub fn from_timing(timing: &TimingSection) -> Self {
        Self {
            delay: Duration::from_secs(timing.reconnect_delay_secs),
            max_attempts: timing.reconnect_max_attempts,
        }
    }
}

/// Build the channel URL with the device connection metadata
///
/// `https` maps to `wss`, `http` to `ws`. Query parameters follow the
/// platform contract: serial number, client type, JSON-encoded sensor id
/// list, client version.
pub fn build_channel_url(
    identity: &DeviceIdentity,
    server: &ServerSection,
) -> DeviceResult<Url> {
    let mut url = Url::parse(&server.url)
        .map_err(|e| DeviceError::connect(format!("invalid server url: {e}")))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(DeviceError::connect(format!(
                "unsupported server url scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| DeviceError::connect("failed to set channel scheme"))?;
    url.set_port(Some(server.port))
        .map_err(|_| DeviceError::connect("failed to set channel port"))?;
    url.set_path(&server.api_path);

    let sensor_ids = serde_json::to_string(&identity.sensor_ids)
        .map_err(|e| DeviceError::connect(format!("sensor id encoding failed: {e}")))?;
    url.query_pairs_mut()
        .append_pair("sn", &identity.sn)
        .append_pair("clientType", "device")
        .append_pair("sensorIds", &sensor_ids)
        .append_pair("clientVersion", "V4");

    Ok(url)
}

/// Handle to a running channel session
///
/// Publishing is fire-and-forget: frames are handed to the supervisor task
/// through a bounded buffer and silently dropped when the session is not
/// connected or the buffer is full.
///
/// The session is WebSocket only. There is no HTTP long-polling fallback;
/// a failed upgrade counts as a failed connection attempt and goes through
/// the normal reconnect policy.
pub struct WsChannel {
    state_rx: watch::Receiver<SessionState>,
    outbound_tx: mpsc::Sender<EventFrame>,
    cancel: CancellationToken,
}

impl WsChannel {
    /// Establish the session and spawn its supervisor
    ///
    /// The initial connection is made inline so a dead server fails startup
    /// (fatal, exit code 1). Reconnection after that is the supervisor's
    /// business, bounded by the policy.
    pub async fn connect(
        identity: &DeviceIdentity,
        server: &ServerSection,
        token: &AccessToken,
        policy: ReconnectPolicy,
        cancel: CancellationToken,
    ) -> DeviceResult<(Self, mpsc::Receiver<ChannelEvent>)> {
        let url = build_channel_url(identity, server)?;

        info!(url = %url, "Connecting to real-time channel");
        let ws = establish(&url, token.as_str())
            .await
            .map_err(DeviceError::Connect)?;

        let (state_tx, state_rx) = watch::channel(SessionState::Connected);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let token = token.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            supervise(url, token, ws, policy, state_tx, events_tx, outbound_rx, task_cancel).await;
        });

        Ok((
            Self {
                state_rx,
                outbound_tx,
                cancel,
            },
            events_rx,
        ))
    }

    /// Signal the supervisor to close the connection and stop
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Test-only constructor wiring a channel handle to raw endpoints
    #[cfg(test)]
    fn from_parts(
        state_rx: watch::Receiver<SessionState>,
        outbound_tx: mpsc::Sender<EventFrame>,
    ) -> Self {
        Self {
            state_rx,
            outbound_tx,
            cancel: CancellationToken::new(),
        }
    }
}

impl Channel for WsChannel {
    fn publish(&self, event: &str, payload: serde_json::Value) {
        if *self.state_rx.borrow() != SessionState::Connected {
            debug!(event, "Not connected, skipping publish");
            return;
        }
        if self
            .outbound_tx
            .try_send(EventFrame::new(event, payload))
            .is_err()
        {
            debug!(event, "Outbound buffer unavailable, dropping frame");
        }
    }

    fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }
}

/// Why one connection's read/write loop ended
enum ConnectionEnd {
    /// Shutdown was requested; do not reconnect
    Cancelled,
    /// The socket dropped; the supervisor decides whether to reconnect
    Dropped(String),
}

/// Supervisor: announce connection, drive the socket, reconnect on drop
#[allow(clippy::too_many_arguments)]
async fn supervise(
    url: Url,
    token: AccessToken,
    mut ws: WsStream,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<SessionState>,
    events_tx: mpsc::Sender<ChannelEvent>,
    mut outbound_rx: mpsc::Receiver<EventFrame>,
    cancel: CancellationToken,
) {
    let mut first = true;

    loop {
        let _ = state_tx.send(SessionState::Connected);
        if events_tx
            .send(ChannelEvent::Connected { first })
            .await
            .is_err()
        {
            break; // consumer gone, nothing left to do
        }
        first = false;

        match run_connection(ws, &mut outbound_rx, &events_tx, &cancel).await {
            ConnectionEnd::Cancelled => {
                let _ = state_tx.send(SessionState::Disconnected);
                break;
            }
            ConnectionEnd::Dropped(reason) => {
                warn!(%reason, "Channel disconnected");
                let _ = state_tx.send(SessionState::Disconnected);
                let _ = events_tx.send(ChannelEvent::Disconnected { reason }).await;

                match reconnect(&url, token.as_str(), &policy, &state_tx, &cancel).await {
                    Some(new_ws) => ws = new_ws,
                    None => {
                        if !cancel.is_cancelled() {
                            let message = format!(
                                "reconnection attempts exhausted after {} tries",
                                policy.max_attempts
                            );
                            error!(%message, "Giving up on channel");
                            let _ = state_tx.send(SessionState::PermanentlyDisconnected);
                            let _ = events_tx.send(ChannelEvent::Error { message }).await;
                        }
                        break;
                    }
                }
            }
        }
    }

    debug!("Channel supervisor exiting");
}

/// Drive one established connection until it drops or shutdown is requested
async fn run_connection(
    ws: WsStream,
    outbound_rx: &mut mpsc::Receiver<EventFrame>,
    events_tx: &mpsc::Sender<ChannelEvent>,
    cancel: &CancellationToken,
) -> ConnectionEnd {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return ConnectionEnd::Cancelled;
            }
            frame = outbound_rx.recv() => match frame {
                Some(frame) => match frame.encode() {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            return ConnectionEnd::Dropped(format!("write failed: {e}"));
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping unencodable outbound frame"),
                },
                // All publish handles dropped; treat like a shutdown.
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return ConnectionEnd::Cancelled;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_inbound(text.as_str(), events_tx).await,
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite answers pings automatically
                }
                Some(Ok(Message::Close(_))) => {
                    return ConnectionEnd::Dropped("server closed connection".to_string());
                }
                Some(Ok(_)) => {
                    // Binary, Pong, raw frames: nothing on this protocol uses them
                }
                Some(Err(e)) => return ConnectionEnd::Dropped(format!("read failed: {e}")),
                None => return ConnectionEnd::Dropped("stream ended".to_string()),
            },
        }
    }
}

/// Decode and route one inbound text frame
///
/// Malformed frames and malformed command payloads are logged and dropped;
/// they never reach the dispatcher and never tear down the connection.
async fn handle_inbound(text: &str, events_tx: &mpsc::Sender<ChannelEvent>) {
    let frame = match EventFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "Ignoring undecodable frame");
            return;
        }
    };

    match wire::route_frame(frame) {
        Ok(FrameRoute::Command(command)) => {
            let _ = events_tx.send(ChannelEvent::Command(command)).await;
        }
        Ok(FrameRoute::ServerEvent { event }) => {
            debug!(event, "Server event");
        }
        Err(e) => {
            warn!(error = %e, "Malformed command payload, ignoring");
        }
    }
}

/// Retry the connection with a fixed delay, up to the policy bound
///
/// Returns `None` when shutdown was requested or the attempts ran out.
async fn reconnect(
    url: &Url,
    token: &str,
    policy: &ReconnectPolicy,
    state_tx: &watch::Sender<SessionState>,
    cancel: &CancellationToken,
) -> Option<WsStream> {
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(policy.delay) => {}
        }

        let _ = state_tx.send(SessionState::Connecting);
        info!(attempt, max = policy.max_attempts, "Reconnecting to channel");

        match establish(url, token).await {
            Ok(ws) => return Some(ws),
            Err(e) => {
                let _ = state_tx.send(SessionState::Disconnected);
                warn!(attempt, error = %e, "Reconnect attempt failed");
            }
        }
    }
    None
}

/// Open one WebSocket connection and send the auth payload
async fn establish(url: &Url, token: &str) -> Result<WsStream, String> {
    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| e.to_string())?;
    let request = ClientRequestBuilder::new(uri);

    let connect = tokio_tungstenite::connect_async(request);
    let (mut ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
        .await
        .map_err(|_| "connection attempt timed out".to_string())?
        .map_err(|e| e.to_string())?;

    let auth = EventFrame::auth(token)
        .encode()
        .map_err(|e| e.to_string())?;
    ws.send(Message::Text(auth.into()))
        .await
        .map_err(|e| format!("auth handshake failed: {e}"))?;

    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    fn test_identity() -> DeviceIdentity {
        DeviceConfig::test_config().identity().unwrap()
    }

    fn test_server() -> ServerSection {
        DeviceConfig::test_config().server
    }

    #[test]
    fn test_channel_url_scheme_and_path() {
        let url = build_channel_url(&test_identity(), &test_server()).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/api/dev/io/");
        assert_eq!(url.port(), Some(443));
    }

    #[test]
    fn test_channel_url_query_params() {
        let url = build_channel_url(&test_identity(), &test_server()).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(pairs["sn"], "03EB023C002601000000FE");
        assert_eq!(pairs["clientType"], "device");
        assert_eq!(pairs["clientVersion"], "V4");
        assert_eq!(pairs["sensorIds"], "[991284,991285,991286]");
    }

    #[test]
    fn test_channel_url_plain_http_maps_to_ws() {
        let mut server = test_server();
        server.url = "http://localhost".to_string();
        server.port = 8080;
        let url = build_channel_url(&test_identity(), &server).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn test_channel_url_rejects_unknown_scheme() {
        let mut server = test_server();
        server.url = "ftp://example.com".to_string();
        assert!(build_channel_url(&test_identity(), &server).is_err());
    }

    #[test]
    fn test_reconnect_policy_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 50);
    }

    #[test]
    fn test_reconnect_policy_from_timing() {
        let timing = TimingSection::default();
        let policy = ReconnectPolicy::from_timing(&timing);
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 50);
    }

    #[tokio::test]
    async fn test_publish_skipped_when_disconnected() {
        let (_state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        let channel = WsChannel::from_parts(state_rx, outbound_tx);

        channel.publish("dev-status", serde_json::json!("Status OK"));

        assert!(outbound_rx.try_recv().is_err());
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_publish_forwards_when_connected() {
        let (_state_tx, state_rx) = watch::channel(SessionState::Connected);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        let channel = WsChannel::from_parts(state_rx, outbound_tx);

        channel.publish("dev-data", serde_json::json!({"content": [1, 0]}));

        let frame = outbound_rx.try_recv().unwrap();
        assert_eq!(frame.event, "dev-data");
        assert_eq!(frame.payload["content"][0], 1);
    }
}
