//! Topic naming for per-symbol quote channels.
//!
//! The server publishes one topic per symbol: `/topic/stocks/{symbolCode}`.

use tickfeed_core::Symbol;

/// Prefix of every per-symbol quote topic.
pub const STOCK_TOPIC_PREFIX: &str = "/topic/stocks/";

/// Format the topic carrying updates for a symbol.
pub fn stock_topic(symbol: &Symbol) -> String {
    format!("{STOCK_TOPIC_PREFIX}{symbol}")
}

/// Decode a topic back to its symbol.
///
/// Returns None for topics outside the stock namespace or with a code
/// that does not validate as a symbol.
pub fn parse_stock_topic(topic: &str) -> Option<Symbol> {
    let code = topic.strip_prefix(STOCK_TOPIC_PREFIX)?;
    Symbol::new(code).ok()
}
