//! Routes inbound topic messages to typed quote events.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::subscription::SubscriptionTable;
use crate::topic::parse_stock_topic;
use crate::{FeedEvent, QuotePayload};

/// Decodes inbound messages and emits [`FeedEvent::Quote`]s for symbols
/// currently subscribed.
///
/// Every failure is local: unknown topics are dropped silently (expected in
/// the window between unsubscribe and server-side cessation of delivery),
/// malformed payloads are dropped and logged, and nothing here ever
/// panics or returns an error to the event loop.
pub struct QuoteRouter {
    table: Arc<SubscriptionTable>,
    events: mpsc::Sender<FeedEvent>,
}

impl QuoteRouter {
    pub fn new(table: Arc<SubscriptionTable>, events: mpsc::Sender<FeedEvent>) -> Self {
        Self { table, events }
    }

    /// Handle one inbound message.
    pub fn on_message(&self, topic: &str, payload: &str) {
        let Some(symbol) = parse_stock_topic(topic) else {
            trace!(%topic, "dropping message outside the stock namespace");
            return;
        };

        if !self.table.contains(&symbol) {
            trace!(%symbol, "dropping update for unsubscribed symbol");
            return;
        }

        let quote = match QuotePayload::parse(payload) {
            Ok(parsed) => parsed.into_quote(),
            Err(e) => {
                warn!(%topic, error = %e, "dropping malformed quote payload");
                return;
            }
        };

        // Quotes are wholesale snapshots; when the consumer lags, dropping
        // one is repaired by the next update for the same symbol.
        match self.events.try_send(FeedEvent::Quote { symbol, quote }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%topic, "event channel full, dropping quote update");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, quote dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, Transport};
    use pretty_assertions::assert_eq;
    use tickfeed_core::{AuthToken, ChangeSign, Symbol};

    async fn router_with_subscription(code: &str) -> (QuoteRouter, mpsc::Receiver<FeedEvent>) {
        let (transport, _rx) = ChannelTransport::new();
        transport.connect(&AuthToken::new("t")).await.unwrap();

        let table = Arc::new(SubscriptionTable::new());
        table
            .ensure_subscribed(&transport, &Symbol::new(code).unwrap())
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(16);
        (QuoteRouter::new(table, tx), rx)
    }

    #[tokio::test]
    async fn test_router_dispatches_to_subscribed_symbol() {
        let (router, mut rx) = router_with_subscription("005930").await;

        router.on_message("/topic/stocks/005930", r#"{"price": 70000, "change": 500}"#);

        let event = rx.recv().await.unwrap();
        match event {
            FeedEvent::Quote { symbol, quote } => {
                assert_eq!(symbol.as_str(), "005930");
                assert_eq!(quote.price.to_f64(), 70000.0);
                assert_eq!(quote.change_amount.to_f64(), 500.0);
                assert_eq!(quote.change_sign, ChangeSign::Up);
            }
            other => panic!("expected quote event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_router_drops_unsubscribed_topic() {
        let (router, mut rx) = router_with_subscription("005930").await;

        router.on_message("/topic/stocks/000660", r#"{"price": 100, "change": 1}"#);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_router_drops_foreign_topic() {
        let (router, mut rx) = router_with_subscription("005930").await;

        router.on_message("/topic/posts/42", r#"{"price": 100, "change": 1}"#);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_router_drops_malformed_payload() {
        let (router, mut rx) = router_with_subscription("005930").await;

        router.on_message("/topic/stocks/005930", "not json at all");
        assert!(rx.try_recv().is_err());

        // A malformed message does not poison later good ones.
        router.on_message("/topic/stocks/005930", r#"{"price": 69500, "change": -500}"#);
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            FeedEvent::Quote { quote, .. } if quote.change_sign == ChangeSign::Down
        ));
    }
}
