//! Link socket layer
//!
//! Owns one UDP socket associated with the input-consuming peer. Sends are
//! fire-and-forget; inbound datagrams are delivered by a receive loop running
//! on its own thread. The socket knows nothing about message semantics.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use touchlink_shared::MAX_DATAGRAM_SIZE;

/// How long a blocked receive waits before re-checking the stop flag
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Destination for outgoing datagrams
///
/// The reliability and heartbeat layers send through this seam so they can
/// be exercised without a network.
pub trait DatagramSink: Send + Sync {
    /// Send one datagram, ignoring delivery failures
    fn send(&self, bytes: &[u8]);
}

/// Link socket error types
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Host name or address did not resolve
    #[error("cannot resolve '{target}': {reason}")]
    Resolve { target: String, reason: String },
    /// Failed to bind a local socket
    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),
    /// Failed to associate the socket with the peer
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// Failed to set socket options
    #[error("socket option error: {0}")]
    SocketOption(#[source] io::Error),
    /// Failed to start a background thread
    #[error("failed to spawn {task}: {source}")]
    Spawn {
        task: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Resolve `host:port` to the first usable socket address
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    let target = format!("{}:{}", host, port);
    let mut addrs = (host, port).to_socket_addrs().map_err(|e| TransportError::Resolve {
        target: target.clone(),
        reason: e.to_string(),
    })?;

    addrs.next().ok_or_else(|| TransportError::Resolve {
        target,
        reason: "no addresses found".to_string(),
    })
}

/// UDP socket bound to a single peer
///
/// # Example
///
/// ```rust,ignore
/// use touchlink_core::link::LinkSocket;
///
/// let socket = LinkSocket::connect("192.168.1.20", 9527)?;
/// socket.start_receive(|bytes| println!("{} bytes", bytes.len()), |e| eprintln!("{e}"))?;
/// socket.send(b"{\"type\":\"ping\",\"timestamp\":0}");
/// socket.close();
/// ```
pub struct LinkSocket {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    receiver: Mutex<Option<ReceiveLoop>>,
}

impl LinkSocket {
    /// Open a datagram channel to `host:port`
    ///
    /// There is no handshake: the channel is ready as soon as this returns.
    pub fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let peer_addr = resolve(host, port)?;
        Self::connect_addr(peer_addr)
    }

    /// Open a datagram channel to an already-resolved address
    pub fn connect_addr(peer_addr: SocketAddr) -> Result<Self, TransportError> {
        let bind_addr = match peer_addr.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = UdpSocket::bind(bind_addr).map_err(TransportError::Bind)?;
        socket.connect(peer_addr).map_err(|source| TransportError::Connect {
            addr: peer_addr,
            source,
        })?;
        socket
            .set_read_timeout(Some(RECV_POLL_INTERVAL))
            .map_err(TransportError::SocketOption)?;

        let local_addr = socket.local_addr().map_err(TransportError::Bind)?;

        tracing::debug!(%peer_addr, port = local_addr.port(), "LinkSocket ready");

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            peer_addr,
            receiver: Mutex::new(None),
        })
    }

    /// Local address this socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address of the peer
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Send one datagram to the peer
    ///
    /// Failures are not surfaced: a datagram send never guarantees delivery.
    pub fn send(&self, bytes: &[u8]) {
        if let Err(e) = self.socket.send(bytes) {
            tracing::trace!(error = %e, len = bytes.len(), "Datagram send failed");
        }
    }

    /// Start the receive loop
    ///
    /// `on_datagram` is called for every inbound datagram, in arrival order,
    /// on the receive thread. `on_error` is called once if the socket fails;
    /// the loop has terminated when it returns. Restarting replaces a
    /// previous loop.
    pub fn start_receive<D, E>(&self, on_datagram: D, on_error: E) -> Result<(), TransportError>
    where
        D: FnMut(&[u8]) + Send + 'static,
        E: FnOnce(io::Error) + Send + 'static,
    {
        self.stop_receive();
        let receiver = ReceiveLoop::spawn(self.socket.clone(), on_datagram, on_error)
            .map_err(|source| TransportError::Spawn {
                task: "receive loop",
                source,
            })?;
        *self.receiver_slot() = Some(receiver);
        Ok(())
    }

    fn receiver_slot(&self) -> std::sync::MutexGuard<'_, Option<ReceiveLoop>> {
        self.receiver.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop the receive loop and wait for it to exit
    ///
    /// Callable from the receive thread itself (for example from the error
    /// callback), in which case it only signals the loop.
    pub fn stop_receive(&self) {
        // Take the loop out first so the join happens without the lock held
        let receiver = self.receiver_slot().take();
        if let Some(mut receiver) = receiver {
            receiver.stop();
        }
    }

    /// Whether the receive loop is still running
    pub fn is_receiving(&self) -> bool {
        self.receiver_slot().as_ref().is_some_and(ReceiveLoop::is_running)
    }

    /// Stop receiving and release the socket
    pub fn close(self) {
        self.stop_receive();
        tracing::debug!(peer_addr = %self.peer_addr, "LinkSocket closed");
    }
}

impl DatagramSink for LinkSocket {
    fn send(&self, bytes: &[u8]) {
        LinkSocket::send(self, bytes);
    }
}

impl Drop for LinkSocket {
    fn drop(&mut self) {
        self.stop_receive();
    }
}

impl std::fmt::Debug for LinkSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSocket")
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("receiving", &self.is_receiving())
            .finish()
    }
}

// ============================================================================
// Receive loop
// ============================================================================

/// Thread draining the socket
struct ReceiveLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveLoop {
    fn spawn<D, E>(socket: Arc<UdpSocket>, mut on_datagram: D, on_error: E) -> io::Result<Self>
    where
        D: FnMut(&[u8]) + Send + 'static,
        E: FnOnce(io::Error) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("touchlink-recv".into())
            .spawn(move || {
                let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
                while !stop_flag.load(Ordering::Acquire) {
                    match socket.recv(&mut buf) {
                        Ok(len) => on_datagram(&buf[..len]),
                        Err(e)
                            if e.kind() == io::ErrorKind::WouldBlock
                                || e.kind() == io::ErrorKind::TimedOut =>
                        {
                            // Poll interval elapsed, re-check the stop flag
                        }
                        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                            // ICMP port unreachable: the peer is not listening (yet)
                            tracing::trace!("Peer port unreachable");
                        }
                        Err(e) => {
                            if !stop_flag.load(Ordering::Acquire) {
                                tracing::warn!(error = %e, "Receive loop terminated");
                                on_error(e);
                            }
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            // The error callback may tear the session down from this thread
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
