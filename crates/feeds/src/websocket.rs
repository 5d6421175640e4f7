//! WebSocket transport for the quote server.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tickfeed_core::AuthToken;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::transport::{SubscriptionHandle, Transport};
use crate::{FeedConfig, FeedError, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reconnect counter resets after this much stable uptime.
const STABLE_CONNECTION: Duration = Duration::from_secs(300);
/// Backoff cap.
const MAX_BACKOFF_MS: u64 = 300_000;
/// Force a reconnect when nothing arrives for this long.
const STALE_TIMEOUT: Duration = Duration::from_secs(120);

/// Control frames from the transport API to the socket task.
enum ControlFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Close,
}

/// WebSocket transport over tokio-tungstenite.
///
/// `connect` performs the first handshake inline so an auth rejection
/// surfaces to the caller; after that a background task owns the socket,
/// reconnecting on transport-level drops with exponential backoff. One
/// `WsTransport` drives one connection lifecycle; construct a new one
/// after `disconnect`.
pub struct WsTransport {
    config: FeedConfig,
    events: mpsc::Sender<TransportEvent>,
    control_tx: mpsc::Sender<ControlFrame>,
    control_rx: Mutex<Option<mpsc::Receiver<ControlFrame>>>,
    running: Arc<AtomicBool>,
    next_handle: AtomicU64,
    handles: DashMap<SubscriptionHandle, String>,
}

impl WsTransport {
    /// Create a transport and the receiver its events arrive on.
    pub fn new(config: FeedConfig) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.channel_buffer);
        let (control_tx, control_rx) = mpsc::channel(64);
        let transport = Self {
            config,
            events: event_tx,
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            running: Arc::new(AtomicBool::new(false)),
            next_handle: AtomicU64::new(0),
            handles: DashMap::new(),
        };
        (transport, event_rx)
    }

    async fn handshake(config: &FeedConfig, token: &AuthToken) -> Result<WsStream, FeedError> {
        // Validate the URL up front for a clearer error than the handshake gives.
        Url::parse(&config.ws_url)?;

        let mut request = config.ws_url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose())).map_err(|_| {
            FeedError::AuthenticationRequired("token is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let (stream, response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| FeedError::Timeout("connect handshake".to_string()))??;

        debug!(status = ?response.status(), "connected to {}", config.ws_url);
        Ok(stream)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, token: &AuthToken) -> Result<(), FeedError> {
        if token.is_empty() {
            return Err(FeedError::AuthenticationRequired(
                "no token supplied".to_string(),
            ));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let control_rx = match self.control_rx.lock().unwrap().take() {
            Some(rx) => rx,
            None => {
                // This transport already went through a full lifecycle.
                self.running.store(false, Ordering::SeqCst);
                return Err(FeedError::ChannelClosed);
            }
        };

        // First handshake inline: an invalid token must fail the call, not
        // disappear into the reconnect loop.
        let stream = match Self::handshake(&self.config, token).await {
            Ok(stream) => stream,
            Err(e) => {
                *self.control_rx.lock().unwrap() = Some(control_rx);
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let config = self.config.clone();
        let events = self.events.clone();
        let token = token.clone();
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            run_loop(config, events, control_rx, token, stream).await;
            running.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<SubscriptionHandle, FeedError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(FeedError::Disconnected("transport not connected".to_string()));
        }
        self.control_tx
            .send(ControlFrame::Subscribe {
                topic: topic.to_string(),
            })
            .await
            .map_err(|_| FeedError::ChannelClosed)?;

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.handles.insert(handle, topic.to_string());
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), FeedError> {
        let Some((_, topic)) = self.handles.remove(&handle) else {
            return Ok(());
        };
        self.control_tx
            .send(ControlFrame::Unsubscribe { topic })
            .await
            .map_err(|_| FeedError::ChannelClosed)
    }

    async fn disconnect(&self) -> Result<(), FeedError> {
        self.handles.clear();
        // The socket task may already be gone; that is still a clean close.
        let _ = self.control_tx.send(ControlFrame::Close).await;
        Ok(())
    }
}

/// Socket task: pump one connection, reconnect on transient failure.
async fn run_loop(
    config: FeedConfig,
    events: mpsc::Sender<TransportEvent>,
    mut control_rx: mpsc::Receiver<ControlFrame>,
    token: AuthToken,
    first_stream: WsStream,
) {
    let mut attempts = 0u32;
    let mut first = true;
    let mut pending = Some(first_stream);

    loop {
        let stream = match pending.take() {
            Some(stream) => stream,
            None => match WsTransport::handshake(&config, &token).await {
                Ok(stream) => stream,
                Err(e) if e.is_permanent() => {
                    error!(error = %e, "fatal handshake error, giving up");
                    let _ = events.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
                Err(e) => {
                    attempts = attempts.saturating_add(1);
                    if attempts > config.max_reconnect_attempts {
                        error!(attempts, "max reconnect attempts exceeded, giving up");
                        let _ = events.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                    let delay = reconnect_delay(&config, attempts);
                    warn!(
                        error = %e,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "handshake failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            },
        };

        let announce = if first {
            TransportEvent::Connected
        } else {
            TransportEvent::Reconnected
        };
        first = false;
        if events.send(announce).await.is_err() {
            break;
        }

        let started = Instant::now();
        match drive(stream, &config, &events, &mut control_rx).await {
            Ok(()) => {
                info!("connection closed on request");
                break;
            }
            Err(e) if e.is_permanent() => {
                error!(error = %e, "fatal socket error");
                break;
            }
            Err(e) => {
                if started.elapsed() > STABLE_CONNECTION {
                    attempts = 0;
                }
                warn!(error = %e, uptime = ?started.elapsed(), "socket dropped, reconnecting");
            }
        }
    }

    let _ = events.send(TransportEvent::Disconnected).await;
}

/// Pump a single established connection until close or error.
async fn drive(
    stream: WsStream,
    config: &FeedConfig,
    events: &mpsc::Sender<TransportEvent>,
    control_rx: &mut mpsc::Receiver<ControlFrame>,
) -> Result<(), FeedError> {
    let (mut write, mut read) = stream.split();
    let mut ping_timer = tokio::time::interval(Duration::from_millis(config.ping_interval_ms));
    let mut last_message = Instant::now();

    loop {
        // Silent-disconnect detection: a live server pongs our pings.
        if last_message.elapsed() > STALE_TIMEOUT {
            return Err(FeedError::Disconnected(
                "stale connection, no traffic received".to_string(),
            ));
        }

        tokio::select! {
            frame = control_rx.recv() => match frame {
                Some(ControlFrame::Subscribe { topic }) => {
                    debug!(%topic, "sending subscribe frame");
                    write
                        .send(Message::Text(subscribe_frame(&topic)))
                        .await
                        .map_err(|e| FeedError::SubscriptionFailed(e.to_string()))?;
                }
                Some(ControlFrame::Unsubscribe { topic }) => {
                    debug!(%topic, "sending unsubscribe frame");
                    write
                        .send(Message::Text(unsubscribe_frame(&topic)))
                        .await
                        .map_err(|e| FeedError::SubscriptionFailed(e.to_string()))?;
                }
                Some(ControlFrame::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            },
            msg = read.next() => {
                last_message = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(&text, events)?,
                    Some(Ok(Message::Ping(data))) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        return Err(FeedError::Disconnected(format!(
                            "server closed connection: {frame:?}"
                        )));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(FeedError::ConnectionFailed(e.to_string())),
                    None => return Err(FeedError::Disconnected("stream ended".to_string())),
                }
            },
            _ = ping_timer.tick() => {
                write
                    .send(Message::Ping(Vec::new()))
                    .await
                    .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
            }
        }
    }
}

/// Decode one text frame and forward it as a transport event.
fn handle_text(text: &str, events: &mpsc::Sender<TransportEvent>) -> Result<(), FeedError> {
    let Some(outcome) = parse_wire_frame(text) else {
        debug!("ignoring non-quote frame");
        return Ok(());
    };

    let event = match outcome {
        WireOutcome::Subscribed(topic) => TransportEvent::Subscribed { topic },
        WireOutcome::Update { topic, payload } => TransportEvent::Message { topic, payload },
    };

    match events.try_send(event) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(_)) => {
            // Quote updates are snapshots; the next one repairs the gap.
            warn!("transport event channel full, dropping frame");
            Ok(())
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(FeedError::ChannelClosed),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum WireOutcome {
    Subscribed(String),
    Update { topic: String, payload: String },
}

/// Server frame envelope: either a subscription ack
/// `{"type":"subscribed","topic":...}` or a topic message
/// `{"topic":...,"payload":{...}}`.
#[derive(serde::Deserialize)]
struct WireFrame<'a> {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default, borrow)]
    payload: Option<&'a serde_json::value::RawValue>,
}

fn parse_wire_frame(text: &str) -> Option<WireOutcome> {
    let frame: WireFrame<'_> = serde_json::from_str(text).ok()?;
    match (frame.kind.as_deref(), frame.topic, frame.payload) {
        (Some("subscribed"), Some(topic), _) => Some(WireOutcome::Subscribed(topic)),
        (None, Some(topic), Some(payload)) => Some(WireOutcome::Update {
            topic,
            payload: payload.get().to_string(),
        }),
        _ => None,
    }
}

fn subscribe_frame(topic: &str) -> String {
    serde_json::json!({ "type": "subscribe", "topic": topic }).to_string()
}

fn unsubscribe_frame(topic: &str) -> String {
    serde_json::json!({ "type": "unsubscribe", "topic": topic }).to_string()
}

/// Exponential backoff with 0-25% jitter, capped at five minutes.
fn reconnect_delay(config: &FeedConfig, attempt: u32) -> Duration {
    let backoff_power = attempt.saturating_sub(1).min(8);
    let base = config
        .reconnect_delay_ms
        .saturating_mul(1 << backoff_power)
        .min(MAX_BACKOFF_MS);
    let jitter = (base as f64 * rand::thread_rng().gen::<f64>() * 0.25) as u64;
    Duration::from_millis(base + jitter)
}
