//! Feed connection configuration.

/// Configuration for the quote feed connection.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket URL of the quote server
    pub ws_url: String,
    /// Delay before reconnecting (ms)
    pub reconnect_delay_ms: u64,
    /// Maximum reconnection attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Ping interval to keep connection alive (ms)
    pub ping_interval_ms: u64,
    /// Connection timeout (ms)
    pub connect_timeout_ms: u64,
    /// Buffer size for the transport event channel
    pub channel_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 10,
            ping_interval_ms: 30000,
            connect_timeout_ms: 10000,
            channel_buffer: 1024,
        }
    }
}

impl FeedConfig {
    /// Create config for a quote server URL.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Default::default()
        }
    }
}
