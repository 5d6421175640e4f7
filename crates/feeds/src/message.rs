//! Event and wire-payload types for the quote feed.
//!
//! The transport delivers [`TransportEvent`]s; the adapter turns them into
//! typed [`FeedEvent`]s consumed by presentation code. Delivery is
//! channel-based so handlers can be composed and tested without a live
//! socket.

use serde::Deserialize;
use tickfeed_core::{ChangeSign, FixedPoint, Quote, Symbol};

use crate::FeedError;

/// Event delivered by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established (first time).
    Connected,
    /// Reconnected after a transport-level drop. The adapter re-issues
    /// subscriptions for the current watchlist on receipt.
    Reconnected,
    /// Connection closed.
    Disconnected,
    /// Server confirmed a subscription for a topic.
    Subscribed { topic: String },
    /// Inbound message on a topic; payload is the raw JSON body.
    Message { topic: String, payload: String },
    /// Non-fatal transport error.
    Error(String),
}

/// Typed event emitted by the adapter to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A fresh quote for a subscribed symbol. Replaces the previous one
    /// wholesale.
    Quote { symbol: Symbol, quote: Quote },
    Connected,
    Reconnected,
    Disconnected,
}

/// Wire shape of a quote update payload.
///
/// `sign` is optional; when absent the direction is derived from the sign
/// of `change`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotePayload {
    pub price: f64,
    pub change: f64,
    #[serde(default)]
    pub sign: Option<ChangeSign>,
}

impl QuotePayload {
    /// Parse and validate a raw JSON payload.
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        let payload: QuotePayload = serde_json::from_str(raw)?;
        if !payload.price.is_finite() || payload.price < 0.0 {
            return Err(FeedError::MalformedMessage(format!(
                "invalid price: {}",
                payload.price
            )));
        }
        if !payload.change.is_finite() {
            return Err(FeedError::MalformedMessage(format!(
                "invalid change: {}",
                payload.change
            )));
        }
        Ok(payload)
    }

    /// Convert into the domain quote.
    pub fn into_quote(self) -> Quote {
        Quote {
            price: FixedPoint::from_f64(self.price),
            change_amount: FixedPoint::from_f64(self.change.abs()),
            change_sign: self
                .sign
                .unwrap_or_else(|| ChangeSign::from_change(self.change)),
        }
    }
}
