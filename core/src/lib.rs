//! touchlink Core - client transport for remote touch input
//!
//! This crate turns UI input events into datagrams for a remote
//! input-consuming peer, tracks link quality and discovers peers on the LAN.
//!
//! # Architecture
//!
//! - [`SessionController`] - Connection lifecycle and the event API used by the UI
//! - [`ReliabilityManager`] - Acknowledged, retransmitted delivery of discrete events
//! - [`HeartbeatMonitor`] - Round-trip latency and soft liveness detection
//! - [`DiscoveryService`] - mDNS browsing for advertised peers
//! - [`Responder`] - The peer side of the protocol, for tests and tooling

pub mod config;
pub mod discovery;
pub mod link;
#[cfg(test)]
pub mod test_utils;

pub use config::{ClientConfig, ConfigError};
pub use discovery::{Advertisement, DiscoveredPeer, DiscoveryError, DiscoveryService};
pub use link::{
    ConnectionState, DatagramSink, HeartbeatMonitor, LinkSocket, LinkState, ReliabilityManager,
    ReliabilityStats, Responder, SessionController, TransportError,
};

// Re-export wire types so embedders need only this crate
pub use touchlink_shared::{Encoding, Message, MessageKind, Modifiers};
