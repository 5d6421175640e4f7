//! The live quote feed adapter.
//!
//! One explicitly constructed instance owns the shared connection, the
//! subscription table and the router; presentation code consumes the typed
//! event channel it hands back. Nothing else touches transport
//! subscriptions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tickfeed_core::{AuthToken, Symbol};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::ConnectionState;
use crate::router::QuoteRouter;
use crate::subscription::{ReconcileOutcome, SubscriptionTable};
use crate::topic::parse_stock_topic;
use crate::transport::Transport;
use crate::{FeedError, FeedEvent, TransportEvent};

/// Buffer for the outbound feed event channel.
const FEED_EVENT_BUFFER: usize = 256;

/// Live quote feed over a shared publish-subscribe transport.
pub struct QuoteFeed<T: Transport + 'static> {
    transport: Arc<T>,
    table: Arc<SubscriptionTable>,
    state: Arc<Mutex<ConnectionState>>,
}

impl<T: Transport + 'static> QuoteFeed<T> {
    /// Wire the adapter to a transport and its event stream.
    ///
    /// Spawns the driver task that serializes all transport events, and
    /// returns the channel quote updates and connection events arrive on.
    pub fn new(
        transport: T,
        transport_events: mpsc::Receiver<TransportEvent>,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (event_tx, event_rx) = mpsc::channel(FEED_EVENT_BUFFER);
        let transport = Arc::new(transport);
        let table = Arc::new(SubscriptionTable::new());
        let state = Arc::new(Mutex::new(ConnectionState::Disconnected));
        let router = QuoteRouter::new(Arc::clone(&table), event_tx.clone());

        tokio::spawn(drive_events(
            Arc::clone(&transport),
            Arc::clone(&table),
            Arc::clone(&state),
            router,
            transport_events,
            event_tx,
        ));

        (
            Self {
                transport,
                table,
                state,
            },
            event_rx,
        )
    }

    /// Open the shared connection.
    ///
    /// Idempotent: a second call while connecting or connected returns
    /// without side effects. An empty or rejected token fails with
    /// [`FeedError::AuthenticationRequired`] and leaves the state
    /// untouched; callers must not retry without a fresh token.
    pub async fn connect(&self, token: &AuthToken) -> Result<(), FeedError> {
        if token.is_empty() {
            return Err(FeedError::AuthenticationRequired(
                "no token supplied".to_string(),
            ));
        }
        {
            let mut state = self.state.lock().unwrap();
            if !state.is_disconnected() {
                return Ok(());
            }
            *state = state.connect();
        }

        match self.transport.connect(token).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Connecting -> Disconnected on handshake failure.
                let mut state = self.state.lock().unwrap();
                *state = state.disconnect();
                Err(e)
            }
        }
    }

    /// Close the connection and invalidate every subscription.
    ///
    /// After this returns, no further quote events are emitted for
    /// previously subscribed symbols.
    pub async fn disconnect(&self) -> Result<(), FeedError> {
        // Clear first: the router checks membership, so in-flight messages
        // are dropped even before the socket finishes closing.
        self.table.clear();
        {
            let mut state = self.state.lock().unwrap();
            *state = state.disconnect();
        }
        self.transport.disconnect().await
    }

    /// Subscribe a symbol if it is not subscribed yet. Returns true when a
    /// new subscription was created.
    pub async fn ensure_subscribed(&self, symbol: &Symbol) -> Result<bool, FeedError> {
        self.table
            .ensure_subscribed(self.transport.as_ref(), symbol)
            .await
    }

    /// Release a symbol's subscription; a no-op if absent.
    pub async fn unsubscribe(&self, symbol: &Symbol) -> Result<bool, FeedError> {
        self.table.unsubscribe(self.transport.as_ref(), symbol).await
    }

    /// Align subscriptions with the full current watchlist.
    pub async fn reconcile(
        &self,
        watchlist: &HashSet<Symbol>,
    ) -> Result<ReconcileOutcome, FeedError> {
        self.table.reconcile(self.transport.as_ref(), watchlist).await
    }

    pub fn is_subscribed(&self, symbol: &Symbol) -> bool {
        self.table.contains(symbol)
    }

    pub fn subscription_count(&self) -> usize {
        self.table.len()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// Driver task: the single consumer of transport events.
async fn drive_events<T: Transport>(
    transport: Arc<T>,
    table: Arc<SubscriptionTable>,
    state: Arc<Mutex<ConnectionState>>,
    router: QuoteRouter,
    mut transport_events: mpsc::Receiver<TransportEvent>,
    events: mpsc::Sender<FeedEvent>,
) {
    while let Some(event) = transport_events.recv().await {
        match event {
            TransportEvent::Connected => {
                {
                    let mut state = state.lock().unwrap();
                    *state = state.connected();
                }
                info!("feed connected");
                let _ = events.send(FeedEvent::Connected).await;
            }
            TransportEvent::Reconnected => {
                {
                    let mut state = state.lock().unwrap();
                    *state = state.connected();
                }
                // Server-side subscriptions are gone; re-issue them for
                // the current watchlist.
                match table.resubscribe_all(transport.as_ref()).await {
                    Ok(count) => info!(count, "feed reconnected"),
                    Err(e) => warn!(error = %e, "resubscription after reconnect failed"),
                }
                let _ = events.send(FeedEvent::Reconnected).await;
            }
            TransportEvent::Disconnected => {
                // Subscriptions never outlive the connection, whether it
                // was closed explicitly or lost by the transport.
                table.clear();
                {
                    let mut state = state.lock().unwrap();
                    *state = state.disconnect();
                }
                let _ = events.send(FeedEvent::Disconnected).await;
            }
            TransportEvent::Subscribed { topic } => match parse_stock_topic(&topic) {
                Some(symbol) => {
                    if !table.confirm(&symbol) {
                        debug!(%symbol, "ignoring confirmation for released subscription");
                    }
                }
                None => debug!(%topic, "ignoring confirmation for foreign topic"),
            },
            TransportEvent::Message { topic, payload } => router.on_message(&topic, &payload),
            TransportEvent::Error(e) => warn!(error = %e, "transport error"),
        }
    }
    debug!("transport event stream closed, feed driver exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use crate::SubscriptionStatus;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tickfeed_core::ChangeSign;

    fn sym(code: &str) -> Symbol {
        Symbol::new(code).unwrap()
    }

    fn topic(code: &str) -> String {
        format!("/topic/stocks/{code}")
    }

    async fn connected_feed() -> (
        QuoteFeed<ChannelTransport>,
        mpsc::Receiver<FeedEvent>,
        mpsc::Sender<TransportEvent>,
    ) {
        let (transport, transport_rx) = ChannelTransport::new();
        let injector = transport.event_sender();
        let (feed, events) = QuoteFeed::new(transport, transport_rx);
        feed.connect(&AuthToken::new("token")).await.unwrap();
        (feed, events, injector)
    }

    /// Receive the next quote event, skipping connection events.
    async fn next_quote(events: &mut mpsc::Receiver<FeedEvent>) -> Option<FeedEvent> {
        loop {
            let event = tokio::time::timeout(Duration::from_millis(200), events.recv())
                .await
                .ok()??;
            if matches!(event, FeedEvent::Quote { .. }) {
                return Some(event);
            }
        }
    }

    async fn assert_no_quote(events: &mut mpsc::Receiver<FeedEvent>) {
        let got = next_quote(events).await;
        assert!(got.is_none(), "unexpected quote event: {got:?}");
    }

    #[tokio::test]
    async fn test_connect_requires_token() {
        let (transport, transport_rx) = ChannelTransport::new();
        let (feed, _events) = QuoteFeed::new(transport, transport_rx);

        let err = feed.connect(&AuthToken::new("")).await.unwrap_err();
        assert!(matches!(err, FeedError::AuthenticationRequired(_)));
        assert!(feed.state().is_disconnected());
        assert!(!feed.transport().is_connected());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (feed, mut events, _injector) = connected_feed().await;

        assert_eq!(
            tokio::time::timeout(Duration::from_millis(200), events.recv())
                .await
                .unwrap(),
            Some(FeedEvent::Connected)
        );
        assert!(feed.state().is_connected());

        // Second connect: no side effect, no second Connected event.
        feed.connect(&AuthToken::new("token")).await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ensure_subscribed_twice_single_handle() {
        let (feed, _events, _injector) = connected_feed().await;
        let samsung = sym("005930");

        assert!(feed.ensure_subscribed(&samsung).await.unwrap());
        assert!(!feed.ensure_subscribed(&samsung).await.unwrap());

        assert_eq!(feed.subscription_count(), 1);
        assert_eq!(feed.transport().subscribe_calls(), vec![topic("005930")]);
    }

    #[tokio::test]
    async fn test_late_confirmation_after_unsubscribe_is_dropped() {
        let (feed, mut events, injector) = connected_feed().await;
        let samsung = sym("005930");

        feed.ensure_subscribed(&samsung).await.unwrap();
        feed.unsubscribe(&samsung).await.unwrap();

        // Confirmation for the original subscribe arrives after the
        // unsubscribe: it must not re-add a handle.
        injector
            .send(TransportEvent::Subscribed {
                topic: topic("005930"),
            })
            .await
            .unwrap();
        // Follow with a quote; it must be dropped too.
        injector
            .send(TransportEvent::Message {
                topic: topic("005930"),
                payload: r#"{"price": 70000, "change": 500}"#.to_string(),
            })
            .await
            .unwrap();

        assert_no_quote(&mut events).await;
        assert!(!feed.is_subscribed(&samsung));
    }

    #[tokio::test]
    async fn test_reconcile_transitions_watchlist() {
        let (feed, _events, _injector) = connected_feed().await;
        let (a, b, c) = (sym("000001"), sym("000002"), sym("000003"));

        feed.reconcile(&[a.clone(), b.clone()].into()).await.unwrap();
        let outcome = feed.reconcile(&[b.clone(), c.clone()].into()).await.unwrap();

        assert_eq!(outcome.subscribed, 1);
        assert_eq!(outcome.unsubscribed, 1);
        assert_eq!(outcome.unchanged, 1);

        assert!(!feed.is_subscribed(&a));
        assert!(feed.is_subscribed(&b));
        assert!(feed.is_subscribed(&c));
        assert_eq!(feed.transport().unsubscribe_calls(), vec![topic("000001")]);
    }

    #[tokio::test]
    async fn test_message_routed_to_correct_symbol_only() {
        let (feed, mut events, injector) = connected_feed().await;
        feed.ensure_subscribed(&sym("005930")).await.unwrap();
        feed.ensure_subscribed(&sym("000660")).await.unwrap();

        injector
            .send(TransportEvent::Message {
                topic: topic("005930"),
                payload: r#"{"price": 70000, "change": 500}"#.to_string(),
            })
            .await
            .unwrap();

        match next_quote(&mut events).await.unwrap() {
            FeedEvent::Quote { symbol, quote } => {
                assert_eq!(symbol, sym("005930"));
                assert_eq!(quote.price.to_f64(), 70000.0);
                assert_eq!(quote.change_amount.to_f64(), 500.0);
                assert_eq!(quote.change_sign, ChangeSign::Up);
            }
            other => panic!("expected quote, got {other:?}"),
        }
        // No event for the other symbol.
        assert_no_quote(&mut events).await;
    }

    #[tokio::test]
    async fn test_unsubscribed_topic_dropped_silently() {
        let (feed, mut events, injector) = connected_feed().await;
        feed.ensure_subscribed(&sym("005930")).await.unwrap();

        injector
            .send(TransportEvent::Message {
                topic: topic("035720"),
                payload: r#"{"price": 50000, "change": -100}"#.to_string(),
            })
            .await
            .unwrap();

        assert_no_quote(&mut events).await;
    }

    #[tokio::test]
    async fn test_confirmation_marks_subscription_active() {
        let (feed, _events, injector) = connected_feed().await;
        let samsung = sym("005930");
        feed.ensure_subscribed(&samsung).await.unwrap();

        injector
            .send(TransportEvent::Subscribed {
                topic: topic("005930"),
            })
            .await
            .unwrap();

        // Wait for the driver to apply the confirmation.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        loop {
            if feed.table.status(&samsung) == Some(SubscriptionStatus::Active) {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "never confirmed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes_watchlist() {
        let (feed, mut events, injector) = connected_feed().await;
        feed.ensure_subscribed(&sym("005930")).await.unwrap();
        feed.ensure_subscribed(&sym("000660")).await.unwrap();
        assert_eq!(feed.transport().subscribe_calls().len(), 2);

        injector.send(TransportEvent::Reconnected).await.unwrap();

        // Reconnected is forwarded after resubscription completes.
        loop {
            let event = tokio::time::timeout(Duration::from_millis(500), events.recv())
                .await
                .unwrap()
                .unwrap();
            if event == FeedEvent::Reconnected {
                break;
            }
        }
        assert_eq!(feed.transport().subscribe_calls().len(), 4);
        assert_eq!(feed.subscription_count(), 2);

        // The transport holds exactly one live handle per symbol.
        let mut active = feed.transport().active_topics();
        active.sort();
        assert_eq!(active, vec![topic("000660"), topic("005930")]);
    }

    #[tokio::test]
    async fn test_transport_loss_invalidates_subscriptions() {
        let (feed, mut events, injector) = connected_feed().await;
        let samsung = sym("005930");
        feed.ensure_subscribed(&samsung).await.unwrap();

        // The transport gives up on its own, without an explicit
        // disconnect call.
        injector.send(TransportEvent::Disconnected).await.unwrap();
        loop {
            let event = tokio::time::timeout(Duration::from_millis(500), events.recv())
                .await
                .unwrap()
                .unwrap();
            if event == FeedEvent::Disconnected {
                break;
            }
        }

        assert!(feed.state().is_disconnected());
        assert!(!feed.is_subscribed(&samsung));

        // A straggler message for the dead connection must not surface.
        injector
            .send(TransportEvent::Message {
                topic: topic("005930"),
                payload: r#"{"price": 70000, "change": 500}"#.to_string(),
            })
            .await
            .unwrap();
        assert_no_quote(&mut events).await;
    }

    #[tokio::test]
    async fn test_no_quotes_after_disconnect() {
        let (feed, mut events, injector) = connected_feed().await;
        let samsung = sym("005930");
        feed.ensure_subscribed(&samsung).await.unwrap();

        feed.disconnect().await.unwrap();
        assert!(feed.state().is_disconnected());
        assert_eq!(feed.subscription_count(), 0);

        // A straggler message for the old subscription.
        injector
            .send(TransportEvent::Message {
                topic: topic("005930"),
                payload: r#"{"price": 70000, "change": 500}"#.to_string(),
            })
            .await
            .unwrap();

        assert_no_quote(&mut events).await;
    }
}
