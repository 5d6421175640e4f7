//! Transport seam over the publish-subscribe connection.
//!
//! The adapter only ever talks to a [`Transport`]; the production
//! implementation is [`crate::WsTransport`], and [`ChannelTransport`] is an
//! in-memory implementation for tests and offline runs.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tickfeed_core::AuthToken;
use tokio::sync::mpsc;

use crate::{FeedError, TransportEvent};

/// Opaque reference to an active subscription on a transport.
pub type SubscriptionHandle = u64;

/// An authenticated publish-subscribe transport.
///
/// Subscribe and unsubscribe are fire-and-forget requests; completion and
/// message delivery arrive later on the transport's event channel, handed
/// out when the transport is constructed.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection, authenticating with `token`. Idempotent when a
    /// connection is already up. Fails with
    /// [`FeedError::AuthenticationRequired`] when the token is absent or
    /// rejected; callers must not retry without a fresh token.
    async fn connect(&self, token: &AuthToken) -> Result<(), FeedError>;

    /// Subscribe to a topic. Returns the handle representing the
    /// subscription.
    async fn subscribe(&self, topic: &str) -> Result<SubscriptionHandle, FeedError>;

    /// Release a subscription handle. Unknown handles are a no-op.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), FeedError>;

    /// Close the connection and invalidate all handles.
    async fn disconnect(&self) -> Result<(), FeedError>;
}

/// In-memory transport backed by a channel.
///
/// Accepts any non-empty token, records subscribe/unsubscribe traffic and
/// lets callers inject [`TransportEvent`]s, so adapter behavior can be
/// exercised without a socket.
pub struct ChannelTransport {
    events: mpsc::Sender<TransportEvent>,
    connected: AtomicBool,
    next_handle: AtomicU64,
    active: DashMap<SubscriptionHandle, String>,
    subscribe_log: Mutex<Vec<String>>,
    unsubscribe_log: Mutex<Vec<String>>,
}

impl ChannelTransport {
    /// Default event channel capacity.
    const BUFFER: usize = 64;

    /// Create a transport and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(Self::BUFFER);
        let transport = Self {
            events: tx,
            connected: AtomicBool::new(false),
            next_handle: AtomicU64::new(0),
            active: DashMap::new(),
            subscribe_log: Mutex::new(Vec::new()),
            unsubscribe_log: Mutex::new(Vec::new()),
        };
        (transport, rx)
    }

    /// A sender for injecting events, as a fake server would.
    pub fn event_sender(&self) -> mpsc::Sender<TransportEvent> {
        self.events.clone()
    }

    /// Topics with a live subscription, in no particular order.
    pub fn active_topics(&self) -> Vec<String> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }

    /// Every topic ever passed to `subscribe`, in call order.
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.subscribe_log.lock().unwrap().clone()
    }

    /// Every topic ever released through `unsubscribe`, in call order.
    pub fn unsubscribe_calls(&self) -> Vec<String> {
        self.unsubscribe_log.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self, token: &AuthToken) -> Result<(), FeedError> {
        if token.is_empty() {
            return Err(FeedError::AuthenticationRequired(
                "no token supplied".to_string(),
            ));
        }
        // Idempotent: a second connect on a live connection has no effect.
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.events.send(TransportEvent::Connected).await;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<SubscriptionHandle, FeedError> {
        if !self.is_connected() {
            return Err(FeedError::Disconnected("transport not connected".to_string()));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.insert(handle, topic.to_string());
        self.subscribe_log.lock().unwrap().push(topic.to_string());
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), FeedError> {
        if let Some((_, topic)) = self.active.remove(&handle) {
            self.unsubscribe_log.lock().unwrap().push(topic);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), FeedError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.active.clear();
            let _ = self.events.send(TransportEvent::Disconnected).await;
        }
        Ok(())
    }
}
