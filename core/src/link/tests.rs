//! Loopback integration tests for client sessions

use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use touchlink_shared::wire::MAGIC;
use touchlink_shared::{Encoding, Message, Modifiers};

use super::*;
use crate::test_utils::wait_until;

/// A peer that never answers, for observing what the session sends
fn silent_peer() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
    socket
}

/// Everything the peer receives within `window`
fn drain(peer: &UdpSocket, window: Duration) -> Vec<(Vec<u8>, SocketAddr)> {
    let deadline = Instant::now() + window;
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    while Instant::now() < deadline {
        if let Ok((len, from)) = peer.recv_from(&mut buf) {
            out.push((buf[..len].to_vec(), from));
        }
    }
    out
}

fn messages(datagrams: &[(Vec<u8>, SocketAddr)]) -> Vec<Message> {
    datagrams
        .iter()
        .filter_map(|(bytes, _)| Message::from_bytes(bytes))
        .collect()
}

fn responder() -> (Responder, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel();
    let responder = Responder::bind("127.0.0.1:0".parse().unwrap(), move |_, msg| {
        let _ = tx.send(msg);
    })
    .unwrap();
    (responder, rx)
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_empty_address_makes_no_attempt() {
    let session = SessionController::new();

    assert!(!session.connect("   ", 9527));

    let state = session.state();
    assert_eq!(state.link, LinkState::Disconnected);
    assert_eq!(state.status, session::STATUS_NO_ADDRESS);
}

#[test]
fn test_unresolvable_host_reports_failure() {
    let session = SessionController::new();

    assert!(!session.connect("no-such-host.invalid", 9527));

    let state = session.state();
    assert_eq!(state.link, LinkState::Disconnected);
    assert!(state.status.starts_with("Connection failed"));
}

#[test]
fn test_connect_and_disconnect() {
    let (responder, _rx) = responder();
    let session = SessionController::new();

    assert!(session.connect("127.0.0.1", responder.local_addr().port()));
    let state = session.state();
    assert_eq!(state.link, LinkState::Connected);
    assert!(state.connected);
    assert_eq!(session.peer_addr(), Some(responder.local_addr()));

    session.disconnect();
    let state = session.state();
    assert_eq!(state.link, LinkState::Disconnected);
    assert!(!state.connected);
    assert_eq!(state.latency_ms, 0);
    assert_eq!(session.peer_addr(), None);

    // Idempotent
    session.disconnect();
    assert_eq!(session.state().link, LinkState::Disconnected);
}

#[test]
fn test_send_without_link_is_dropped() {
    let session = SessionController::new();
    assert!(!session.send_button("a", true, Modifiers::NONE));
    assert_eq!(session.reliability_stats().pending, 0);
}

// ============================================================================
// Delivery
// ============================================================================

#[test]
fn test_reliable_events_acked_by_responder() {
    let (responder, rx) = responder();
    let session = SessionController::new();
    session.connect("127.0.0.1", responder.local_addr().port());

    assert!(session.send_button("space", true, Modifiers::NONE));
    assert!(session.send_skill_release("q", 0.5, -0.5));
    assert!(session.send_skill_cancel("e"));

    assert!(wait_until(Duration::from_secs(2), || {
        session.reliability_stats().acknowledged == 3
    }));
    assert_eq!(session.reliability_stats().pending, 0);

    let delivered: Vec<Message> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
        .collect();
    assert_eq!(
        delivered[0],
        Message::ReliableButton {
            seq: 1,
            key: "space".to_string(),
            pressed: true,
            modifiers: Modifiers::NONE,
        }
    );
    assert_eq!(delivered[1].sequence(), Some(2));
    assert_eq!(delivered[2].sequence(), Some(3));

    session.disconnect();
}

#[test]
fn test_ping_produces_latency_reading() {
    let (responder, _rx) = responder();
    let session = SessionController::new();
    session.connect("127.0.0.1", responder.local_addr().port());
    let connected_at = session.state().last_liveness.unwrap();

    // Either the immediate probe or the first periodic one gets answered
    assert!(wait_until(Duration::from_millis(1500), || {
        session.state().last_liveness.is_some_and(|at| at > connected_at)
    }));
    let state = session.state();
    assert!(state.connected);
    assert!(state.latency_ms < 1000);

    session.disconnect();
}

#[test]
fn test_values_are_clamped() {
    let (responder, rx) = responder();
    let session = SessionController::new();
    session.connect("127.0.0.1", responder.local_addr().port());

    session.send_joystick(3.0, -7.0);
    session.send_skill_drag("q", 2.0, -2.0, 5.0, true);

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        Message::Joystick { x: 1.0, y: -1.0 }
    );
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        Message::SkillDrag {
            key: "q".to_string(),
            dx: 1.0,
            dy: -1.0,
            distance: 1.0,
            smooth: true,
        }
    );

    session.disconnect();
}

// ============================================================================
// Encoding and throttling
// ============================================================================

#[test]
fn test_extreme_mode_switches_encoding_and_throttles() {
    let peer = silent_peer();
    let session = SessionController::new();
    session.connect("127.0.0.1", peer.local_addr().unwrap().port());

    // Normal mode: text, no throttle
    session.send_joystick(0.10, 0.0);
    session.send_joystick(0.11, 0.0);

    session.set_extreme_mode(true);
    assert_eq!(session.encoding(), Encoding::Binary);
    session.send_joystick(0.10, 0.0);
    session.send_joystick(0.11, 0.0);
    session.send_joystick(0.13, 0.0);
    session.send_joystick(0.0, 0.0);

    let received = drain(&peer, Duration::from_millis(300));
    let joysticks: Vec<&Vec<u8>> = received
        .iter()
        .map(|(bytes, _)| bytes)
        .filter(|bytes| matches!(Message::from_bytes(bytes), Some(Message::Joystick { .. })))
        .collect();

    assert_eq!(joysticks.len(), 5);
    assert!(joysticks[..2].iter().all(|bytes| bytes[0] == b'{'));
    assert!(joysticks[2..].iter().all(|bytes| bytes[0] == MAGIC));

    session.disconnect();
}

#[test]
fn test_from_config_applies_input_settings() {
    let mut config = crate::config::ClientConfig::default();
    config.input.extreme_mode = true;
    config.input.smoothing = 0.75;

    let session = SessionController::from_config(&config);

    assert!(session.extreme_mode());
    assert_eq!(session.encoding(), Encoding::Binary);
    assert_eq!(session.smoothing(), 0.75);
}

// ============================================================================
// Retransmission
// ============================================================================

#[test]
fn test_unacked_message_retransmitted_until_acked() {
    let peer = silent_peer();
    let session = SessionController::new();
    session.connect("127.0.0.1", peer.local_addr().unwrap().port());

    session.send_skill_release("q", 0.5, -0.5);
    assert!(session.is_pending(1));

    let received = drain(&peer, Duration::from_millis(400));
    let copies = messages(&received)
        .iter()
        .filter(|msg| msg.sequence() == Some(1))
        .count();
    assert!(copies >= 3, "expected retransmissions, got {} copies", copies);

    // Ack from the peer retires the entry
    let client = received[0].1;
    peer.send_to(&Message::Ack { seq: 1 }.encode(Encoding::Text), client)
        .unwrap();
    assert!(wait_until(Duration::from_secs(1), || !session.is_pending(1)));

    session.disconnect();
}

#[test]
fn test_disconnect_clears_pending_and_stops_tasks() {
    let peer = silent_peer();
    let session = SessionController::new();
    session.connect("127.0.0.1", peer.local_addr().unwrap().port());

    session.send_button("a", true, Modifiers::NONE);
    session.send_button("a", false, Modifiers::NONE);
    session.disconnect();

    assert_eq!(session.reliability_stats().pending, 0);
    drain(&peer, Duration::from_millis(100));
    assert!(drain(&peer, Duration::from_millis(300)).is_empty());
}

#[test]
fn test_reconnect_restarts_sequence_numbers() {
    let peer = silent_peer();
    let port = peer.local_addr().unwrap().port();
    let session = SessionController::new();

    session.connect("127.0.0.1", port);
    session.send_skill_cancel("q");
    session.send_skill_cancel("q");
    assert!(session.is_pending(2));

    session.connect("127.0.0.1", port);
    assert!(!session.is_pending(2));
    session.send_skill_cancel("q");
    assert!(session.is_pending(1));
    assert_eq!(session.reliability_stats().pending, 1);

    session.disconnect();
}

// ============================================================================
// Liveness
// ============================================================================

#[test]
fn test_session_answers_peer_ping() {
    let peer = silent_peer();
    let session = SessionController::new();
    session.connect("127.0.0.1", peer.local_addr().unwrap().port());

    // Learn the client address from the first probe
    let client = drain(&peer, Duration::from_millis(100))[0].1;
    peer.send_to(&Message::Ping { timestamp: 99 }.encode(Encoding::Binary), client)
        .unwrap();

    let received = drain(&peer, Duration::from_millis(200));
    assert!(received
        .iter()
        .any(|(bytes, _)| bytes[0] == MAGIC && Message::from_bytes(bytes) == Some(Message::Pong { timestamp: 99 })));

    session.disconnect();
}

#[test]
#[ignore = "waits out the 3s liveness timeout"]
fn test_silent_peer_soft_timeout_keeps_link_open() {
    let peer = silent_peer();
    let session = SessionController::new();
    session.connect("127.0.0.1", peer.local_addr().unwrap().port());

    assert!(wait_until(Duration::from_secs(5), || {
        session.state().link == LinkState::SoftTimeout
    }));
    assert!(session.is_open());
    assert!(!session.state().connected);

    // Probing continues during the soft timeout
    let probes = messages(&drain(&peer, Duration::from_millis(1500)))
        .into_iter()
        .filter(|msg| matches!(msg, Message::Ping { .. }))
        .count();
    assert!(probes >= 1);

    session.disconnect();
}
