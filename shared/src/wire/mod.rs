//! touchlink wire messages
//!
//! Every datagram exchanged between the client and the input-consuming peer
//! carries exactly one [`Message`]. Two encodings share the catalogue:
//!
//! - [`Encoding::Text`] - a self-describing JSON record with a `type` tag
//! - [`Encoding::Binary`] - a compact fixed-layout frame used in extreme mode
//!
//! # Wire Format (binary)
//!
//! ```text
//! [0xAB][type:u8][seq:u32 if reliable][kind-specific fields...]
//! ```
//!
//! All multi-byte numerics are little-endian. Receivers accept both forms at
//! any time: a datagram whose first byte is [`MAGIC`] is a binary frame,
//! anything else is tried as a text record. Decoding never fails loudly;
//! malformed input simply yields no message.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

mod binary;
mod text;

#[cfg(test)]
mod tests;

pub use binary::{FrameReader, FrameWriter};

/// Magic byte that starts every binary frame
pub const MAGIC: u8 = 0xAB;

/// Longest key name a length-prefixed binary field can carry
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

// ============================================================================
// Encoding
// ============================================================================

/// Wire representation used by a sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Self-describing JSON records (normal mode)
    #[default]
    Text,
    /// Compact binary frames (extreme mode)
    Binary,
}

impl Encoding {
    /// Pick the encoding for the "extreme mode" switch
    pub fn for_extreme_mode(extreme: bool) -> Self {
        if extreme {
            Self::Binary
        } else {
            Self::Text
        }
    }

    /// Sniff the encoding of an incoming datagram
    ///
    /// Returns `None` for an empty datagram.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match bytes.first() {
            None => None,
            Some(&MAGIC) => Some(Self::Binary),
            Some(_) => Some(Self::Text),
        }
    }
}

// ============================================================================
// Modifiers
// ============================================================================

/// Keyboard modifiers held while a key or skill fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub control: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub command: bool,
}

bitflags! {
    /// Packed form of [`Modifiers`] used in binary frames
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModifierBits: u8 {
        const SHIFT = 0x01;
        const CONTROL = 0x02;
        const ALT = 0x04;
        const COMMAND = 0x08;
    }
}

impl Modifiers {
    /// No modifiers held
    pub const NONE: Self = Self {
        shift: false,
        control: false,
        alt: false,
        command: false,
    };

    /// True when no modifier is held
    pub fn is_empty(&self) -> bool {
        !self.shift && !self.control && !self.alt && !self.command
    }

    /// Pack into the single-byte binary representation
    pub fn to_byte(self) -> u8 {
        let mut bits = ModifierBits::empty();
        bits.set(ModifierBits::SHIFT, self.shift);
        bits.set(ModifierBits::CONTROL, self.control);
        bits.set(ModifierBits::ALT, self.alt);
        bits.set(ModifierBits::COMMAND, self.command);
        bits.bits()
    }

    /// Unpack from the binary representation, ignoring unknown bits
    pub fn from_byte(byte: u8) -> Self {
        let bits = ModifierBits::from_bits_truncate(byte);
        Self {
            shift: bits.contains(ModifierBits::SHIFT),
            control: bits.contains(ModifierBits::CONTROL),
            alt: bits.contains(ModifierBits::ALT),
            command: bits.contains(ModifierBits::COMMAND),
        }
    }
}

impl std::fmt::Display for Modifiers {
    /// Renders as `Ctrl+Alt+Shift+Cmd` (only the held ones)
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [
            (self.control, "Ctrl"),
            (self.alt, "Alt"),
            (self.shift, "Shift"),
            (self.command, "Cmd"),
        ]
        .into_iter()
        .filter_map(|(held, name)| held.then_some(name))
        .collect();
        f.write_str(&parts.join("+"))
    }
}

// ============================================================================
// Message catalogue
// ============================================================================

/// Kind of a [`Message`], with its binary type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Joystick = 0x01,
    Button = 0x02,
    SkillStart = 0x03,
    SkillDrag = 0x04,
    SkillRelease = 0x05,
    SkillCancel = 0x06,
    Ping = 0x07,
    Pong = 0x08,
    Ack = 0x09,
    ReliableButton = 0x12,
    ReliableSkillRelease = 0x15,
    ReliableSkillCancel = 0x16,
}

impl MessageKind {
    /// Binary type code
    pub fn type_code(self) -> u8 {
        self as u8
    }

    /// Look up a kind by its binary type code
    pub fn from_type_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::Joystick,
            0x02 => Self::Button,
            0x03 => Self::SkillStart,
            0x04 => Self::SkillDrag,
            0x05 => Self::SkillRelease,
            0x06 => Self::SkillCancel,
            0x07 => Self::Ping,
            0x08 => Self::Pong,
            0x09 => Self::Ack,
            0x12 => Self::ReliableButton,
            0x15 => Self::ReliableSkillRelease,
            0x16 => Self::ReliableSkillCancel,
            _ => return None,
        })
    }

    /// Whether messages of this kind carry a sequence number and expect an ack
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Self::ReliableButton | Self::ReliableSkillRelease | Self::ReliableSkillCancel
        )
    }
}

/// A single logical message
///
/// Reliable variants carry `seq`; the client stamps it via
/// [`Message::with_sequence`] when the reliability layer registers the send.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Analog stick vector, both axes in [-1, 1]
    Joystick { x: f32, y: f32 },
    /// Fire-and-forget key press or release
    Button { key: String, pressed: bool },
    /// Acknowledged key press or release
    ReliableButton {
        seq: u32,
        key: String,
        pressed: bool,
        modifiers: Modifiers,
    },
    /// A directional skill was touched
    SkillStart { key: String, modifiers: Modifiers },
    /// The skill is being aimed
    SkillDrag {
        key: String,
        dx: f32,
        dy: f32,
        distance: f32,
        smooth: bool,
    },
    /// Fire-and-forget skill release
    SkillRelease { key: String, dx: f32, dy: f32 },
    /// Fire-and-forget skill cancel
    SkillCancel { key: String },
    /// Acknowledged skill release
    ReliableSkillRelease {
        seq: u32,
        key: String,
        dx: f32,
        dy: f32,
    },
    /// Acknowledged skill cancel
    ReliableSkillCancel { seq: u32, key: String },
    /// Liveness probe carrying the sender's clock (ms since epoch)
    Ping { timestamp: u64 },
    /// Probe reply echoing the ping timestamp
    Pong { timestamp: u64 },
    /// Acknowledgment of a reliable message
    Ack { seq: u32 },
}

impl Message {
    /// The kind of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Joystick { .. } => MessageKind::Joystick,
            Self::Button { .. } => MessageKind::Button,
            Self::ReliableButton { .. } => MessageKind::ReliableButton,
            Self::SkillStart { .. } => MessageKind::SkillStart,
            Self::SkillDrag { .. } => MessageKind::SkillDrag,
            Self::SkillRelease { .. } => MessageKind::SkillRelease,
            Self::SkillCancel { .. } => MessageKind::SkillCancel,
            Self::ReliableSkillRelease { .. } => MessageKind::ReliableSkillRelease,
            Self::ReliableSkillCancel { .. } => MessageKind::ReliableSkillCancel,
            Self::Ping { .. } => MessageKind::Ping,
            Self::Pong { .. } => MessageKind::Pong,
            Self::Ack { .. } => MessageKind::Ack,
        }
    }

    /// Whether this message expects an acknowledgment
    pub fn is_reliable(&self) -> bool {
        self.kind().is_reliable()
    }

    /// Sequence number of a reliable message
    pub fn sequence(&self) -> Option<u32> {
        match self {
            Self::ReliableButton { seq, .. }
            | Self::ReliableSkillRelease { seq, .. }
            | Self::ReliableSkillCancel { seq, .. } => Some(*seq),
            _ => None,
        }
    }

    /// Stamp a sequence number onto a reliable message
    ///
    /// Unreliable messages are returned unchanged.
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        match &mut self {
            Self::ReliableButton { seq, .. }
            | Self::ReliableSkillRelease { seq, .. }
            | Self::ReliableSkillCancel { seq, .. } => *seq = sequence,
            _ => {}
        }
        self
    }

    /// The acknowledgment a receiver sends back for this message
    pub fn ack_for(&self) -> Option<Self> {
        self.sequence().map(|seq| Self::Ack { seq })
    }

    /// Encode in the given wire representation
    pub fn encode(&self, encoding: Encoding) -> Vec<u8> {
        match encoding {
            Encoding::Text => text::encode(self),
            Encoding::Binary => binary::encode(self),
        }
    }

    /// Decode a datagram of either representation
    ///
    /// Returns `None` for anything that is not a well-formed message.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        decode(bytes).map(|(msg, _)| msg)
    }
}

/// Decode a datagram, reporting which representation it used
///
/// The encoding lets a receiver answer in kind (pong and ack replies follow
/// the encoding of the message they answer).
pub fn decode(bytes: &[u8]) -> Option<(Message, Encoding)> {
    match Encoding::detect(bytes)? {
        Encoding::Binary => binary::decode(bytes).map(|msg| (msg, Encoding::Binary)),
        Encoding::Text => text::decode(bytes).map(|msg| (msg, Encoding::Text)),
    }
}

/// Truncate a key name to fit a length-prefixed field, keeping valid UTF-8
pub(crate) fn truncate_key(key: &str) -> &str {
    if key.len() <= MAX_KEY_LEN {
        return key;
    }
    let mut end = MAX_KEY_LEN;
    while !key.is_char_boundary(end) {
        end -= 1;
    }
    &key[..end]
}
