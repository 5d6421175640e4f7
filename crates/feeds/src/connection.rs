//! Connection lifecycle state.

/// Connection state for the shared quote feed connection.
///
/// Transitions: Connecting -> Connected on handshake success,
/// Connecting -> Disconnected on handshake failure,
/// Connected -> Disconnected on explicit close or fatal transport error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Transition to connecting state. A no-op when already connected.
    pub fn connect(self) -> Self {
        match self {
            ConnectionState::Connected => ConnectionState::Connected,
            _ => ConnectionState::Connecting,
        }
    }

    /// Transition to connected state.
    pub fn connected(self) -> Self {
        ConnectionState::Connected
    }

    /// Transition to disconnected state.
    pub fn disconnect(self) -> Self {
        ConnectionState::Disconnected
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if fully torn down.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }
}
