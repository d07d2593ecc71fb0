//! Centralized constants for the touchlink protocol.
//!
//! This module provides single-source-of-truth constants used by both the
//! sending client and the input-consuming peer.

/// Default UDP port the input-consuming peer listens on.
pub const DEFAULT_PORT: u16 = 9527;

/// DNS-SD service category the input-consuming peer advertises under.
///
/// Used when browsing for peers on the local network:
/// ```ignore
/// let receiver = daemon.browse(SERVICE_TYPE)?;
/// ```
pub const SERVICE_TYPE: &str = "_touchserver._udp.local.";

/// Largest datagram either side expects to receive.
///
/// Every message in the catalogue fits comfortably; the biggest is a text
/// record for a button with a long key name.
pub const MAX_DATAGRAM_SIZE: usize = 1024;
