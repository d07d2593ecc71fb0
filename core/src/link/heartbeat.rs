//! Liveness probing and round-trip measurement
//!
//! The heartbeat task sends a `Ping` carrying epoch milliseconds every
//! [`HEARTBEAT_INTERVAL`]. The peer echoes the timestamp in a `Pong`, and the
//! difference to the local clock on arrival is the round-trip latency.
//!
//! A peer that stays silent for longer than [`HEARTBEAT_TIMEOUT`] puts the
//! link into [`LinkState::SoftTimeout`]. This is advisory only: the channel
//! stays open, probing continues and the next `Pong` restores
//! [`LinkState::Connected`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use touchlink_shared::{Encoding, Message};

use super::socket::DatagramSink;
use super::types::{ConnectionState, LinkState};

/// Period of the heartbeat task
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// Silence after which the link is flagged as timed out
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Status line shown while the peer is silent
pub const STATUS_TIMEOUT: &str = "Connection timeout";

/// Status line shown while the peer answers
pub const STATUS_CONNECTED: &str = "Connected";

/// Writes heartbeat results into the shared connection state
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    state: Arc<Mutex<ConnectionState>>,
}

impl HeartbeatMonitor {
    pub fn new(state: Arc<Mutex<ConnectionState>>) -> Self {
        Self { state }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Begin a liveness window at `now`
    ///
    /// Connect time counts as proof of life, so a peer that never answers is
    /// flagged [`HEARTBEAT_TIMEOUT`] after this call.
    pub fn start(&self, now: Instant) {
        self.lock().last_liveness = Some(now);
    }

    /// Send one probe stamped with `now_ms`
    pub fn probe(&self, now_ms: u64, encoding: Encoding, sink: &dyn DatagramSink) {
        sink.send(&Message::Ping { timestamp: now_ms }.encode(encoding));
    }

    /// Flag the link as timed out if the peer has been silent too long
    ///
    /// Only a [`LinkState::Connected`] link can time out. Returns whether the
    /// state changed.
    pub fn check_timeout(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if state.link != LinkState::Connected {
            return false;
        }

        let silent = match state.last_liveness {
            Some(at) => now.saturating_duration_since(at),
            None => return false,
        };
        if silent <= HEARTBEAT_TIMEOUT {
            return false;
        }

        state.link = LinkState::SoftTimeout;
        state.connected = false;
        state.status = STATUS_TIMEOUT.to_string();
        tracing::debug!(silent_ms = silent.as_millis() as u64, "Heartbeat timeout");
        true
    }

    /// One heartbeat period: timeout check, then a fresh probe
    pub fn tick(&self, now: Instant, now_ms: u64, encoding: Encoding, sink: &dyn DatagramSink) {
        self.check_timeout(now);
        self.probe(now_ms, encoding, sink);
    }

    /// Record a `Pong` echoing `timestamp` that arrived at `now_ms`
    ///
    /// Returns the measured latency, or `None` if the link is not open (a
    /// late answer to a probe from a previous connection).
    pub fn on_pong(&self, timestamp: u64, now_ms: u64, now: Instant) -> Option<u64> {
        let mut state = self.lock();
        if !state.link.is_open() {
            return None;
        }

        let latency = now_ms.saturating_sub(timestamp);
        if state.link == LinkState::SoftTimeout {
            tracing::debug!(latency_ms = latency, "Peer answered again");
        }

        state.link = LinkState::Connected;
        state.connected = true;
        state.latency_ms = latency;
        state.last_liveness = Some(now);
        state.status = STATUS_CONNECTED.to_string();
        Some(latency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingSink;

    fn connected_monitor(at: Instant) -> (HeartbeatMonitor, Arc<Mutex<ConnectionState>>) {
        let state = Arc::new(Mutex::new(ConnectionState {
            link: LinkState::Connected,
            connected: true,
            status: STATUS_CONNECTED.to_string(),
            ..ConnectionState::default()
        }));
        let monitor = HeartbeatMonitor::new(state.clone());
        monitor.start(at);
        (monitor, state)
    }

    #[test]
    fn test_pong_sets_latency() {
        let t0 = Instant::now();
        let (monitor, state) = connected_monitor(t0);

        let latency = monitor.on_pong(1_000, 1_042, t0);

        assert_eq!(latency, Some(42));
        let state = state.lock().unwrap();
        assert_eq!(state.latency_ms, 42);
        assert!(state.connected);
        assert_eq!(state.last_liveness, Some(t0));
    }

    #[test]
    fn test_pong_from_future_saturates() {
        let t0 = Instant::now();
        let (monitor, _) = connected_monitor(t0);

        assert_eq!(monitor.on_pong(2_000, 1_500, t0), Some(0));
    }

    #[test]
    fn test_probe_carries_timestamp() {
        let t0 = Instant::now();
        let (monitor, _) = connected_monitor(t0);
        let sink = RecordingSink::new();

        monitor.probe(123_456, Encoding::Binary, &sink);
        monitor.probe(123_457, Encoding::Text, &sink);

        assert_eq!(
            sink.messages(),
            vec![
                Message::Ping { timestamp: 123_456 },
                Message::Ping { timestamp: 123_457 }
            ]
        );
    }

    #[test]
    fn test_timeout_after_three_seconds_of_silence() {
        let t0 = Instant::now();
        let (monitor, state) = connected_monitor(t0);

        assert!(!monitor.check_timeout(t0 + Duration::from_millis(3000)));
        assert!(monitor.check_timeout(t0 + Duration::from_millis(3001)));

        let state = state.lock().unwrap();
        assert_eq!(state.link, LinkState::SoftTimeout);
        assert!(!state.connected);
        assert_eq!(state.status, STATUS_TIMEOUT);
    }

    #[test]
    fn test_probing_continues_during_soft_timeout() {
        let t0 = Instant::now();
        let (monitor, state) = connected_monitor(t0);
        let sink = RecordingSink::new();

        for second in 1..=5u64 {
            monitor.tick(t0 + Duration::from_secs(second), second * 1000, Encoding::Text, &sink);
        }

        assert_eq!(sink.len(), 5);
        assert_eq!(state.lock().unwrap().link, LinkState::SoftTimeout);
        assert!(state.lock().unwrap().link.is_open());
    }

    #[test]
    fn test_pong_recovers_from_soft_timeout() {
        let t0 = Instant::now();
        let (monitor, state) = connected_monitor(t0);
        let later = t0 + Duration::from_secs(4);
        monitor.check_timeout(later);

        monitor.on_pong(10_000, 10_015, later);

        let state = state.lock().unwrap();
        assert_eq!(state.link, LinkState::Connected);
        assert!(state.connected);
        assert_eq!(state.latency_ms, 15);
        assert_eq!(state.status, STATUS_CONNECTED);
    }

    #[test]
    fn test_pong_refreshes_liveness_window() {
        let t0 = Instant::now();
        let (monitor, _) = connected_monitor(t0);

        monitor.on_pong(0, 5, t0 + Duration::from_secs(2));

        assert!(!monitor.check_timeout(t0 + Duration::from_secs(4)));
        assert!(monitor.check_timeout(t0 + Duration::from_millis(5001)));
    }

    #[test]
    fn test_disconnected_link_ignores_pong_and_timeout() {
        let state = Arc::new(Mutex::new(ConnectionState::default()));
        let monitor = HeartbeatMonitor::new(state.clone());
        let t0 = Instant::now();
        monitor.start(t0);

        assert_eq!(monitor.on_pong(0, 10, t0), None);
        assert!(!monitor.check_timeout(t0 + Duration::from_secs(10)));
        assert_eq!(state.lock().unwrap().link, LinkState::Disconnected);
    }
}
