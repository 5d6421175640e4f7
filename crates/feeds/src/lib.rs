//! Live quote feed adapter.
//!
//! One shared publish-subscribe connection to the quote server, per-symbol
//! topic subscriptions for the symbols on a watchlist, and typed quote
//! events out the other side.
//!
//! ## Architecture
//!
//! - `transport` - The pub/sub transport seam ([`Transport`], in-memory
//!   [`ChannelTransport`])
//! - `websocket` - Production transport over tokio-tungstenite
//! - `subscription` - Symbol -> handle registry ([`SubscriptionTable`])
//! - `router` - Topic decoding and quote dispatch ([`QuoteRouter`])
//! - `feed` - The assembled adapter ([`QuoteFeed`])

pub mod config;
pub mod connection;
pub mod error;
pub mod feed;
pub mod message;
pub mod router;
pub mod subscription;
pub mod topic;
pub mod transport;
pub mod websocket;

pub use config::FeedConfig;
pub use connection::ConnectionState;
pub use error::FeedError;
pub use feed::QuoteFeed;
pub use message::{FeedEvent, QuotePayload, TransportEvent};
pub use router::QuoteRouter;
pub use subscription::{ReconcileOutcome, SubscriptionStatus, SubscriptionTable};
pub use topic::{parse_stock_topic, stock_topic, STOCK_TOPIC_PREFIX};
pub use transport::{ChannelTransport, SubscriptionHandle, Transport};
pub use websocket::WsTransport;
