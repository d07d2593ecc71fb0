//! Input-consuming side of the protocol
//!
//! [`Responder`] listens on a UDP port and answers the way a desktop input
//! server does: every `Ping` is echoed as a `Pong` in the encoding the probe
//! used, every reliable message is acknowledged in the encoding it arrived
//! in, and retransmitted reliable messages are acknowledged again but
//! delivered only once. It backs the loopback tests and `touchlink serve`.

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use touchlink_shared::{decode, Encoding, Message, MAX_DATAGRAM_SIZE};

use super::heartbeat::HEARTBEAT_TIMEOUT;
use super::socket::TransportError;

/// Reliable sequences remembered for duplicate suppression
pub const DEDUP_WINDOW: usize = 100;

const RECV_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of handling one inbound datagram
#[derive(Debug, Default, PartialEq)]
pub struct Handled {
    /// Datagrams to send back to the sender
    pub replies: Vec<Vec<u8>>,
    /// Input to hand to the application, if any
    pub delivered: Option<Message>,
}

/// Per-client protocol state, independent of the socket
#[derive(Debug, Default)]
pub struct ResponderState {
    client: Option<SocketAddr>,
    encoding: Option<Encoding>,
    last_seen: Option<Instant>,
    recent: VecDeque<u32>,
}

impl ResponderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the client currently talking to us
    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    /// Encoding of the last datagram from the client
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Handle one datagram from `from` received at `now`
    pub fn handle(&mut self, bytes: &[u8], from: SocketAddr, now: Instant) -> Handled {
        if self.client != Some(from) {
            tracing::info!(client = %from, "Client attached");
            self.client = Some(from);
            self.encoding = None;
            self.recent.clear();
        }
        self.last_seen = Some(now);

        let Some((msg, encoding)) = decode(bytes) else {
            tracing::trace!(len = bytes.len(), "Discarding undecodable datagram");
            return Handled::default();
        };

        if self.encoding != Some(encoding) {
            tracing::debug!(?encoding, "Client encoding changed");
            self.encoding = Some(encoding);
        }

        let mut handled = Handled::default();
        match msg {
            Message::Ping { timestamp } => {
                handled.replies.push(Message::Pong { timestamp }.encode(encoding));
            }
            // Replies from another responder are not input
            Message::Pong { .. } | Message::Ack { .. } => {}
            msg => {
                if let Some(ack) = msg.ack_for() {
                    handled.replies.push(ack.encode(encoding));
                    if let Some(seq) = msg.sequence() {
                        if self.recent.contains(&seq) {
                            tracing::trace!(seq, "Duplicate reliable message");
                            return handled;
                        }
                        self.recent.push_back(seq);
                        if self.recent.len() > DEDUP_WINDOW {
                            self.recent.pop_front();
                        }
                    }
                }
                handled.delivered = Some(msg);
            }
        }
        handled
    }

    /// Forget a client that has been silent past the heartbeat timeout
    ///
    /// Returns the address that was dropped.
    pub fn expire(&mut self, now: Instant) -> Option<SocketAddr> {
        let last_seen = self.last_seen?;
        if now.saturating_duration_since(last_seen) <= HEARTBEAT_TIMEOUT {
            return None;
        }

        let client = self.client.take();
        self.last_seen = None;
        self.encoding = None;
        self.recent.clear();
        if let Some(addr) = client {
            tracing::info!(client = %addr, "Client timed out");
        }
        client
    }
}

/// Hook invoked for delivered input and client detachment
pub trait InputHandler: Send + 'static {
    /// A new, non-duplicate input message arrived
    fn on_input(&mut self, from: SocketAddr, msg: Message);

    /// The client went silent; any held input should be released
    fn on_client_lost(&mut self, _client: SocketAddr) {}
}

impl<F> InputHandler for F
where
    F: FnMut(SocketAddr, Message) + Send + 'static,
{
    fn on_input(&mut self, from: SocketAddr, msg: Message) {
        self(from, msg)
    }
}

/// UDP server answering probes and acknowledging reliable input
pub struct Responder {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Responder {
    /// Bind to `addr` and start serving on a background thread
    pub fn bind<H: InputHandler>(addr: SocketAddr, handler: H) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).map_err(TransportError::Bind)?;
        socket
            .set_read_timeout(Some(RECV_POLL_INTERVAL))
            .map_err(TransportError::SocketOption)?;
        let local_addr = socket.local_addr().map_err(TransportError::Bind)?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("touchlink-responder".into())
            .spawn(move || serve(socket, handler, &stop_flag))
            .map_err(|source| TransportError::Spawn {
                task: "responder",
                source,
            })?;

        tracing::info!(%local_addr, "Responder listening");

        Ok(Self {
            local_addr,
            stop,
            handle: Some(handle),
        })
    }

    /// Address the responder is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the serving thread is alive
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop serving and wait for the thread to exit
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            tracing::info!(local_addr = %self.local_addr, "Responder stopped");
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

fn serve<H: InputHandler>(socket: UdpSocket, mut handler: H, stop: &AtomicBool) {
    let mut state = ResponderState::new();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    while !stop.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                let handled = state.handle(&buf[..len], from, Instant::now());
                for reply in &handled.replies {
                    if let Err(e) = socket.send_to(reply, from) {
                        tracing::trace!(error = %e, "Reply send failed");
                    }
                }
                if let Some(msg) = handled.delivered {
                    handler.on_input(from, msg);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                if let Some(client) = state.expire(Instant::now()) {
                    handler.on_client_lost(client);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                // Windows reports ICMP unreachable for a departed client here
                tracing::trace!("Client port unreachable");
            }
            Err(e) => {
                tracing::error!(error = %e, "Responder receive failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn reliable_button(seq: u32) -> Message {
        Message::ReliableButton {
            seq,
            key: "space".to_string(),
            pressed: true,
            modifiers: Default::default(),
        }
    }

    #[test]
    fn test_ping_answered_in_same_encoding() {
        let mut state = ResponderState::new();
        let now = Instant::now();

        for encoding in [Encoding::Text, Encoding::Binary] {
            let ping = Message::Ping { timestamp: 77 }.encode(encoding);
            let handled = state.handle(&ping, client(), now);

            assert_eq!(handled.replies.len(), 1);
            assert_eq!(decode(&handled.replies[0]), Some((Message::Pong { timestamp: 77 }, encoding)));
            assert!(handled.delivered.is_none());
        }
    }

    #[test]
    fn test_reliable_message_acked_and_delivered() {
        let mut state = ResponderState::new();
        let bytes = reliable_button(4).encode(Encoding::Binary);

        let handled = state.handle(&bytes, client(), Instant::now());

        assert_eq!(handled.replies, vec![Message::Ack { seq: 4 }.encode(Encoding::Binary)]);
        assert_eq!(handled.delivered, Some(reliable_button(4)));
    }

    #[test]
    fn test_retransmission_acked_but_not_redelivered() {
        let mut state = ResponderState::new();
        let bytes = reliable_button(9).encode(Encoding::Text);
        let now = Instant::now();

        state.handle(&bytes, client(), now);
        let again = state.handle(&bytes, client(), now);

        assert_eq!(again.replies, vec![Message::Ack { seq: 9 }.encode(Encoding::Text)]);
        assert!(again.delivered.is_none());
    }

    #[test]
    fn test_dedup_window_is_bounded() {
        let mut state = ResponderState::new();
        let now = Instant::now();

        for seq in 1..=(DEDUP_WINDOW as u32 + 1) {
            state.handle(&reliable_button(seq).encode(Encoding::Binary), client(), now);
        }

        // Sequence 1 fell out of the window
        let handled = state.handle(&reliable_button(1).encode(Encoding::Binary), client(), now);
        assert!(handled.delivered.is_some());
    }

    #[test]
    fn test_new_client_resets_dedup() {
        let mut state = ResponderState::new();
        let other: SocketAddr = "127.0.0.1:40001".parse().unwrap();
        let bytes = reliable_button(1).encode(Encoding::Binary);
        let now = Instant::now();

        state.handle(&bytes, client(), now);
        let handled = state.handle(&bytes, other, now);

        assert!(handled.delivered.is_some());
        assert_eq!(state.client(), Some(other));
    }

    #[test]
    fn test_unreliable_input_delivered_without_reply() {
        let mut state = ResponderState::new();
        let joystick = Message::Joystick { x: 0.5, y: 0.0 };

        let handled = state.handle(&joystick.encode(Encoding::Text), client(), Instant::now());

        assert!(handled.replies.is_empty());
        assert_eq!(handled.delivered, Some(joystick));
        assert_eq!(state.encoding(), Some(Encoding::Text));
    }

    #[test]
    fn test_noise_ignored() {
        let mut state = ResponderState::new();
        let handled = state.handle(b"\xAB\x7F", client(), Instant::now());
        assert_eq!(handled, Handled::default());
    }

    #[test]
    fn test_silent_client_expires() {
        let mut state = ResponderState::new();
        let now = Instant::now();
        state.handle(&Message::Ping { timestamp: 0 }.encode(Encoding::Text), client(), now);

        assert_eq!(state.expire(now + Duration::from_secs(2)), None);
        assert_eq!(state.expire(now + Duration::from_secs(4)), Some(client()));
        assert_eq!(state.client(), None);
    }

    #[test]
    fn test_responder_serves_over_udp() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut responder = Responder::bind("127.0.0.1:0".parse().unwrap(), move |_, msg| {
            let _ = tx.send(msg);
        })
        .unwrap();

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        socket
            .send_to(&reliable_button(3).encode(Encoding::Binary), responder.local_addr())
            .unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        assert_eq!(Message::from_bytes(&buf[..len]), Some(Message::Ack { seq: 3 }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), reliable_button(3));

        responder.stop();
        assert!(!responder.is_running());
    }
}
