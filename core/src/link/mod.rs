//! Client link to an input-consuming peer
//!
//! Discrete UI events become datagrams sent over a single UDP channel. The
//! layers, leaves first:
//!
//! - [`socket`] - the UDP channel and its receive loop
//! - [`reliability`] - sequence numbers, acks and retransmission
//! - [`heartbeat`] - liveness probes and round-trip latency
//! - [`throttle`] - joystick change suppression in extreme mode
//! - [`session`] - the lifecycle state machine tying the above together
//! - [`responder`] - the peer side of the protocol, for tests and tooling
//!
//! # Timing
//!
//! | Task | Period | Notes |
//! |------|--------|-------|
//! | retry | 50 ms | retransmit after 50 ms × (retries + 1), give up after 5 |
//! | heartbeat | 1000 ms | soft timeout after 3000 ms of silence |
//! | receive | continuous | 20 ms poll to observe stop requests |

pub mod heartbeat;
pub mod reliability;
pub mod responder;
pub mod session;
pub mod socket;
pub mod throttle;
mod ticker;
mod types;

#[cfg(test)]
mod tests;

pub use heartbeat::{HeartbeatMonitor, HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT};
pub use reliability::{PendingMessage, ReliabilityManager, ReliabilityStats, MAX_RETRIES, RETRY_TICK};
pub use responder::{InputHandler, Responder, ResponderState, DEDUP_WINDOW};
pub use session::SessionController;
pub use socket::{DatagramSink, LinkSocket, TransportError};
pub use throttle::{JoystickThrottle, JOYSTICK_THRESHOLD};
pub use ticker::Ticker;
pub use types::{ConnectionState, LinkState};
