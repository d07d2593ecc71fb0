//! Shared types for the touchlink remote-input protocol.
//!
//! - [`wire`] - the message catalogue and its text/binary encodings
//! - [`constants`] - port, service category and datagram limits
//! - [`clock`] - epoch timestamps carried by liveness probes

pub mod clock;
pub mod constants;
pub mod wire;

pub use constants::{DEFAULT_PORT, MAX_DATAGRAM_SIZE, SERVICE_TYPE};
pub use wire::{decode, Encoding, Message, MessageKind, Modifiers};
