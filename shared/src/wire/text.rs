//! Text records (normal mode)
//!
//! One JSON object per datagram, tagged by `type`. Reliable messages reuse the
//! tag of their unreliable counterpart and add a `seq` field, which is what
//! the receiving peer keys its acknowledgments on.

use serde::{Deserialize, Serialize};

use super::{Message, Modifiers};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record {
    Joystick {
        x: f32,
        y: f32,
    },
    Button {
        key: String,
        pressed: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modifiers: Option<Modifiers>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u32>,
    },
    SkillStart {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modifiers: Option<Modifiers>,
    },
    SkillDrag {
        key: String,
        dx: f32,
        dy: f32,
        distance: f32,
        #[serde(default)]
        smooth: bool,
    },
    SkillRelease {
        key: String,
        dx: f32,
        dy: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u32>,
    },
    SkillCancel {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u32>,
    },
    Ping {
        timestamp: u64,
    },
    Pong {
        timestamp: u64,
    },
    Ack {
        seq: u32,
    },
}

fn non_empty(modifiers: Modifiers) -> Option<Modifiers> {
    (!modifiers.is_empty()).then_some(modifiers)
}

impl From<&Message> for Record {
    fn from(msg: &Message) -> Self {
        match msg.clone() {
            Message::Joystick { x, y } => Self::Joystick { x, y },
            Message::Button { key, pressed } => Self::Button {
                key,
                pressed,
                modifiers: None,
                seq: None,
            },
            Message::ReliableButton {
                seq,
                key,
                pressed,
                modifiers,
            } => Self::Button {
                key,
                pressed,
                modifiers: Some(modifiers),
                seq: Some(seq),
            },
            Message::SkillStart { key, modifiers } => Self::SkillStart {
                key,
                modifiers: non_empty(modifiers),
            },
            Message::SkillDrag {
                key,
                dx,
                dy,
                distance,
                smooth,
            } => Self::SkillDrag {
                key,
                dx,
                dy,
                distance,
                smooth,
            },
            Message::SkillRelease { key, dx, dy } => Self::SkillRelease {
                key,
                dx,
                dy,
                seq: None,
            },
            Message::SkillCancel { key } => Self::SkillCancel { key, seq: None },
            Message::ReliableSkillRelease { seq, key, dx, dy } => Self::SkillRelease {
                key,
                dx,
                dy,
                seq: Some(seq),
            },
            Message::ReliableSkillCancel { seq, key } => Self::SkillCancel {
                key,
                seq: Some(seq),
            },
            Message::Ping { timestamp } => Self::Ping { timestamp },
            Message::Pong { timestamp } => Self::Pong { timestamp },
            Message::Ack { seq } => Self::Ack { seq },
        }
    }
}

impl From<Record> for Message {
    fn from(record: Record) -> Self {
        match record {
            Record::Joystick { x, y } => Self::Joystick { x, y },
            Record::Button {
                key,
                pressed,
                modifiers,
                seq: Some(seq),
            } => Self::ReliableButton {
                seq,
                key,
                pressed,
                modifiers: modifiers.unwrap_or_default(),
            },
            Record::Button { key, pressed, .. } => Self::Button { key, pressed },
            Record::SkillStart { key, modifiers } => Self::SkillStart {
                key,
                modifiers: modifiers.unwrap_or_default(),
            },
            Record::SkillDrag {
                key,
                dx,
                dy,
                distance,
                smooth,
            } => Self::SkillDrag {
                key,
                dx,
                dy,
                distance,
                smooth,
            },
            Record::SkillRelease {
                key,
                dx,
                dy,
                seq: Some(seq),
            } => Self::ReliableSkillRelease { seq, key, dx, dy },
            Record::SkillRelease { key, dx, dy, .. } => Self::SkillRelease { key, dx, dy },
            Record::SkillCancel { key, seq: Some(seq) } => Self::ReliableSkillCancel { seq, key },
            Record::SkillCancel { key, .. } => Self::SkillCancel { key },
            Record::Ping { timestamp } => Self::Ping { timestamp },
            Record::Pong { timestamp } => Self::Pong { timestamp },
            Record::Ack { seq } => Self::Ack { seq },
        }
    }
}

/// Encode a message as a JSON record
pub(super) fn encode(msg: &Message) -> Vec<u8> {
    // Plain records with string/number/bool fields always serialize
    serde_json::to_vec(&Record::from(msg)).unwrap_or_default()
}

/// Decode a JSON record, treating any failure as noise
pub(super) fn decode(bytes: &[u8]) -> Option<Message> {
    serde_json::from_slice::<Record>(bytes).ok().map(Message::from)
}
