//! Core types for touchlink sessions

use std::time::Instant;

/// Lifecycle of the link to the input-consuming peer
///
/// ```text
/// Disconnected ──connect──▶ Connecting ──ready──▶ Connected ◀──pong── SoftTimeout
///       ▲                        │                    │ ──no pong 3s──▶   │
///       └──── failure / disconnect (from any state) ──┴───────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No channel open
    #[default]
    Disconnected,
    /// Channel being set up
    Connecting,
    /// Channel open and the peer answers probes
    Connected,
    /// Channel open but the peer has been silent past the liveness timeout
    SoftTimeout,
}

impl LinkState {
    /// Whether a datagram channel is open (including the soft-timeout state)
    pub fn is_open(self) -> bool {
        matches!(self, Self::Connected | Self::SoftTimeout)
    }
}

/// Connection state published to the UI collaborator
///
/// Only the session controller and the heartbeat monitor write it; readers
/// take a snapshot via [`crate::link::SessionController::state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    /// Lifecycle state
    pub link: LinkState,
    /// True while connected and the peer is answering
    pub connected: bool,
    /// Last measured round-trip time
    pub latency_ms: u64,
    /// When the peer last proved it was alive (connect time counts)
    pub last_liveness: Option<Instant>,
    /// Human-readable status line
    pub status: String,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            link: LinkState::Disconnected,
            connected: false,
            latency_ms: 0,
            last_liveness: None,
            status: "Disconnected".to_string(),
        }
    }
}

impl ConnectionState {
    /// Reset to the disconnected state with the given status line
    pub(crate) fn reset(&mut self, status: impl Into<String>) {
        *self = Self {
            status: status.into(),
            ..Self::default()
        };
    }
}
