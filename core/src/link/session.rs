//! Session controller: the connection lifecycle and the event API
//!
//! One [`SessionController`] owns at most one live link. `connect` opens the
//! datagram channel and starts three tasks: the receive loop, the heartbeat
//! ticker and the retry ticker. `disconnect` (or a transport failure) stops
//! all of them synchronously and clears the pending table.
//!
//! The controller is cheap to clone; clones share the same link.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use touchlink_shared::clock::epoch_millis;
use touchlink_shared::{decode, Encoding, Message, Modifiers};

use super::heartbeat::{HeartbeatMonitor, HEARTBEAT_INTERVAL, STATUS_CONNECTED};
use super::reliability::{ReliabilityManager, ReliabilityStats, RETRY_TICK};
use super::socket::{DatagramSink, LinkSocket, TransportError};
use super::throttle::JoystickThrottle;
use super::ticker::Ticker;
use super::types::{ConnectionState, LinkState};
use crate::config::ClientConfig;

/// Status line when `connect` is called without a target
pub const STATUS_NO_ADDRESS: &str = "Please enter a server address";

/// Status line after an explicit disconnect
pub const STATUS_DISCONNECTED: &str = "Disconnected";

/// Resources of one live connection
struct Link {
    generation: u64,
    socket: Arc<LinkSocket>,
    heartbeat_task: Ticker,
    retry_task: Ticker,
}

impl Link {
    /// Stop every task, then the receive loop
    fn shutdown(mut self) {
        self.retry_task.stop();
        self.heartbeat_task.stop();
        self.socket.stop_receive();
    }
}

struct Inner {
    state: Arc<Mutex<ConnectionState>>,
    heartbeat: HeartbeatMonitor,
    reliability: ReliabilityManager,
    throttle: Mutex<JoystickThrottle>,
    extreme_mode: AtomicBool,
    smoothing: Mutex<f32>,
    generation: AtomicU64,
    /// Serializes connect and disconnect (never taken by task threads)
    lifecycle: Mutex<()>,
    link: Mutex<Option<Link>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clamp to [min, max]; NaN and infinities become 0
fn finite_clamp(value: f32, min: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        0.0
    }
}

impl Inner {
    fn encoding(&self) -> Encoding {
        Encoding::for_extreme_mode(self.extreme_mode.load(Ordering::Relaxed))
    }

    fn socket(&self) -> Option<Arc<LinkSocket>> {
        lock(&self.link).as_ref().map(|link| link.socket.clone())
    }

    fn set_status(&self, link: LinkState, status: &str) {
        let mut state = lock(&self.state);
        state.link = link;
        state.connected = link == LinkState::Connected;
        state.status = status.to_string();
    }

    /// Tear the link down if it is still the one identified by `generation`
    ///
    /// `None` tears down whatever link is live.
    fn teardown(&self, generation: Option<u64>, status: &str) {
        let link = {
            let mut slot = lock(&self.link);
            match (generation, slot.as_ref()) {
                (Some(expected), Some(live)) if live.generation != expected => return,
                (Some(_), None) => return,
                _ => slot.take(),
            }
        };

        if let Some(link) = link {
            log::debug!("Stopping link tasks (generation {})", link.generation);
            link.shutdown();
        }

        self.reliability.clear();
        lock(&self.throttle).reset();
        lock(&self.state).reset(status);
    }

    fn on_transport_failure(&self, generation: u64, error: io::Error) {
        log::warn!("Transport failed: {}", error);
        self.teardown(Some(generation), &format!("Connection lost: {}", error));
    }

    fn on_datagram(&self, bytes: &[u8]) {
        let Some((msg, encoding)) = decode(bytes) else {
            log::trace!("Discarding undecodable datagram ({} bytes)", bytes.len());
            return;
        };

        match msg {
            Message::Ack { seq } => {
                self.reliability.acknowledge(seq);
            }
            Message::Pong { timestamp } => {
                if let Some(latency) = self.heartbeat.on_pong(timestamp, epoch_millis(), Instant::now()) {
                    log::trace!("Pong: {} ms", latency);
                }
            }
            Message::Ping { timestamp } => {
                if let Some(socket) = self.socket() {
                    socket.send(&Message::Pong { timestamp }.encode(encoding));
                }
            }
            other => log::trace!("Ignoring inbound {:?}", other.kind()),
        }
    }
}

/// Top-level orchestrator used by the UI layer
///
/// # Example
///
/// ```rust,ignore
/// use touchlink_core::link::SessionController;
///
/// let session = SessionController::new();
/// session.connect("192.168.1.20", 9527);
/// session.send_button("space", true, Modifiers::NONE);
/// println!("{} ms", session.state().latency_ms);
/// session.disconnect();
/// ```
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(ConnectionState::default()));
        Self {
            inner: Arc::new(Inner {
                heartbeat: HeartbeatMonitor::new(state.clone()),
                state,
                reliability: ReliabilityManager::new(),
                throttle: Mutex::new(JoystickThrottle::new()),
                extreme_mode: AtomicBool::new(false),
                smoothing: Mutex::new(ClientConfig::default().input.smoothing()),
                generation: AtomicU64::new(0),
                lifecycle: Mutex::new(()),
                link: Mutex::new(None),
            }),
        }
    }

    /// Build a controller with the persisted input settings applied
    pub fn from_config(config: &ClientConfig) -> Self {
        let session = Self::new();
        session.set_extreme_mode(config.input.extreme_mode);
        *lock(&session.inner.smoothing) = config.input.smoothing();
        session
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open a link to `host:port`
    ///
    /// Any previous link is closed first and sequence numbering restarts.
    /// Returns whether the link is ready; failures are reported through the
    /// status line of [`state`](Self::state).
    pub fn connect(&self, host: &str, port: u16) -> bool {
        let host = host.trim();
        if host.is_empty() {
            lock(&self.inner.state).status = STATUS_NO_ADDRESS.to_string();
            return false;
        }

        let _lifecycle = lock(&self.inner.lifecycle);
        self.inner.teardown(None, STATUS_DISCONNECTED);
        self.inner.reliability.reset();

        let target = format!("{}:{}", host, port);
        log::info!("Connecting to {}", target);
        self.inner
            .set_status(LinkState::Connecting, &format!("Connecting to {}...", target));

        match self.open_link(host, port) {
            Ok(link) => {
                let socket = link.socket.clone();
                *lock(&self.inner.link) = Some(link);
                self.inner.heartbeat.start(Instant::now());
                self.inner.set_status(LinkState::Connected, STATUS_CONNECTED);
                // First probe right away so latency shows up without waiting a period
                self.inner
                    .heartbeat
                    .probe(epoch_millis(), self.inner.encoding(), &*socket);
                log::info!("Connected to {}", target);
                true
            }
            Err(e) => {
                log::warn!("Connection to {} failed: {}", target, e);
                lock(&self.inner.state).reset(format!("Connection failed: {}", e));
                false
            }
        }
    }

    fn open_link(&self, host: &str, port: u16) -> Result<Link, TransportError> {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let socket = Arc::new(LinkSocket::connect(host, port)?);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let on_datagram = {
            let weak = weak.clone();
            move |bytes: &[u8]| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_datagram(bytes);
                }
            }
        };
        let on_error = {
            let weak = weak.clone();
            move |error: io::Error| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_transport_failure(generation, error);
                }
            }
        };
        socket.start_receive(on_datagram, on_error)?;

        let heartbeat_task = {
            let weak = weak.clone();
            let socket = socket.clone();
            Ticker::spawn("touchlink-heartbeat", HEARTBEAT_INTERVAL, move || {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .heartbeat
                        .tick(Instant::now(), epoch_millis(), inner.encoding(), &*socket);
                }
            })
        };
        let heartbeat_task = match heartbeat_task {
            Ok(task) => task,
            Err(source) => {
                socket.stop_receive();
                return Err(TransportError::Spawn {
                    task: "heartbeat",
                    source,
                });
            }
        };

        let retry_task = {
            let socket = socket.clone();
            Ticker::spawn("touchlink-retry", RETRY_TICK, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.reliability.tick(Instant::now(), &*socket);
                }
            })
        };
        let retry_task = match retry_task {
            Ok(task) => task,
            Err(source) => {
                drop(heartbeat_task);
                socket.stop_receive();
                return Err(TransportError::Spawn {
                    task: "retry",
                    source,
                });
            }
        };

        Ok(Link {
            generation,
            socket,
            heartbeat_task,
            retry_task,
        })
    }

    /// Close the link and stop every task; safe from any state
    ///
    /// When this returns no task will fire again and the pending table is
    /// empty.
    pub fn disconnect(&self) {
        let _lifecycle = lock(&self.inner.lifecycle);
        let was_open = self.state().link != LinkState::Disconnected;
        self.inner.teardown(None, STATUS_DISCONNECTED);
        if was_open {
            log::info!("Disconnected");
        }
    }

    // ========================================================================
    // Event API
    // ========================================================================

    /// Send a message in the current encoding
    ///
    /// Reliable kinds are registered for acknowledgment. Returns whether a
    /// datagram went out (false without a live link).
    pub fn send(&self, msg: Message) -> bool {
        // Held across the insert so teardown cannot clear the table in between
        let link = lock(&self.inner.link);
        let Some(link) = link.as_ref() else {
            log::trace!("Dropping {:?}: not connected", msg.kind());
            return false;
        };
        self.inner
            .reliability
            .send(msg, self.inner.encoding(), &*link.socket as &dyn DatagramSink);
        true
    }

    /// Analog stick vector; both axes are clamped to [-1, 1]
///
/// Non-finite axes are sent as 0.
    ///
    /// In extreme mode updates that barely moved are suppressed.
    pub fn send_joystick(&self, x: f32, y: f32) -> bool {
        let (x, y) = (finite_clamp(x, -1.0, 1.0), finite_clamp(y, -1.0, 1.0));
        if self.extreme_mode() && !lock(&self.inner.throttle).should_send(x, y) {
            return false;
        }
        self.send(Message::Joystick { x, y })
    }

    /// Key press or release, delivered reliably
    pub fn send_button(&self, key: &str, pressed: bool, modifiers: Modifiers) -> bool {
        self.send(Message::ReliableButton {
            seq: 0,
            key: key.to_string(),
            pressed,
            modifiers,
        })
    }

    pub fn send_skill_start(&self, key: &str, modifiers: Modifiers) -> bool {
        self.send(Message::SkillStart {
            key: key.to_string(),
            modifiers,
        })
    }

    pub fn send_skill_drag(&self, key: &str, dx: f32, dy: f32, distance: f32, smooth: bool) -> bool {
        self.send(Message::SkillDrag {
            key: key.to_string(),
            dx: finite_clamp(dx, -1.0, 1.0),
            dy: finite_clamp(dy, -1.0, 1.0),
            distance: finite_clamp(distance, 0.0, 1.0),
            smooth,
        })
    }

    /// Skill release, delivered reliably
    pub fn send_skill_release(&self, key: &str, dx: f32, dy: f32) -> bool {
        self.send(Message::ReliableSkillRelease {
            seq: 0,
            key: key.to_string(),
            dx: finite_clamp(dx, -1.0, 1.0),
            dy: finite_clamp(dy, -1.0, 1.0),
        })
    }

    /// Skill cancel, delivered reliably
    pub fn send_skill_cancel(&self, key: &str) -> bool {
        self.send(Message::ReliableSkillCancel {
            seq: 0,
            key: key.to_string(),
        })
    }

    // ========================================================================
    // Settings and observation
    // ========================================================================

    /// Switch between text (normal) and binary (extreme) encoding
    pub fn set_extreme_mode(&self, extreme: bool) {
        let previous = self.inner.extreme_mode.swap(extreme, Ordering::Relaxed);
        if previous != extreme {
            lock(&self.inner.throttle).reset();
            log::debug!("Encoding switched to {:?}", Encoding::for_extreme_mode(extreme));
        }
    }

    pub fn extreme_mode(&self) -> bool {
        self.inner.extreme_mode.load(Ordering::Relaxed)
    }

    /// Encoding used for outgoing messages
    pub fn encoding(&self) -> Encoding {
        self.inner.encoding()
    }

    /// Smoothing factor handed through to the UI layer, in [0, 1]
    pub fn smoothing(&self) -> f32 {
        *lock(&self.inner.smoothing)
    }

    /// Snapshot of the connection state
    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.state).clone()
    }

    /// Whether a link is open (connected or soft-timed-out)
    pub fn is_open(&self) -> bool {
        self.state().link.is_open()
    }

    pub fn reliability_stats(&self) -> ReliabilityStats {
        self.inner.reliability.stats()
    }

    /// Whether a reliable message is still awaiting its ack
    pub fn is_pending(&self, sequence: u32) -> bool {
        self.inner.reliability.is_pending(sequence)
    }

    /// Address of the connected peer
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.socket().map(|socket| socket.peer_addr())
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SessionController")
            .field("link", &state.link)
            .field("status", &state.status)
            .field("extreme_mode", &self.extreme_mode())
            .finish()
    }
}
