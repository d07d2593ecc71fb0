//! Tests for wire message encoding

use super::{decode, Encoding, Message, MessageKind, Modifiers, MAGIC};

fn ctrl_shift() -> Modifiers {
    Modifiers {
        shift: true,
        control: true,
        ..Modifiers::NONE
    }
}

/// One message of every kind, with single-character keys where the binary
/// layout only carries one byte.
fn catalogue() -> Vec<Message> {
    vec![
        Message::Joystick { x: 0.25, y: -1.0 },
        Message::Button {
            key: "space".to_string(),
            pressed: true,
        },
        Message::ReliableButton {
            seq: 7,
            key: "mouse_left".to_string(),
            pressed: false,
            modifiers: ctrl_shift(),
        },
        Message::SkillStart {
            key: "e".to_string(),
            modifiers: Modifiers {
                alt: true,
                ..Modifiers::NONE
            },
        },
        Message::SkillDrag {
            key: "q".to_string(),
            dx: 0.5,
            dy: -0.5,
            distance: 0.70710677,
            smooth: false,
        },
        Message::SkillRelease {
            key: "r".to_string(),
            dx: 1.0,
            dy: 0.0,
        },
        Message::SkillCancel {
            key: "r".to_string(),
        },
        Message::ReliableSkillRelease {
            seq: u32::MAX,
            key: "q".to_string(),
            dx: 0.5,
            dy: -0.5,
        },
        Message::ReliableSkillCancel {
            seq: 0,
            key: "w".to_string(),
        },
        Message::Ping {
            timestamp: 1_700_000_000_123,
        },
        Message::Pong {
            timestamp: 1_700_000_000_123,
        },
        Message::Ack { seq: 42 },
    ]
}

// ============================================================================
// Cross-encoding equivalence
// ============================================================================

#[test]
fn test_both_encodings_decode_to_same_message() {
    for msg in catalogue() {
        let (from_text, text_enc) = decode(&msg.encode(Encoding::Text)).unwrap();
        let (from_binary, bin_enc) = decode(&msg.encode(Encoding::Binary)).unwrap();

        assert_eq!(text_enc, Encoding::Text);
        assert_eq!(bin_enc, Encoding::Binary);
        assert_eq!(from_text, msg, "text form of {:?}", msg.kind());
        assert_eq!(from_binary, msg, "binary form of {:?}", msg.kind());
    }
}

// ============================================================================
// Binary layouts
// ============================================================================

#[test]
fn test_joystick_frame_layout() {
    let bytes = Message::Joystick { x: 1.0, y: -0.5 }.encode(Encoding::Binary);

    assert_eq!(bytes.len(), 10);
    assert_eq!(bytes[0], MAGIC);
    assert_eq!(bytes[1], 0x01);
    assert_eq!(&bytes[2..6], &1.0f32.to_le_bytes());
    assert_eq!(&bytes[6..10], &(-0.5f32).to_le_bytes());
}

#[test]
fn test_reliable_button_frame_layout() {
    let msg = Message::ReliableButton {
        seq: 0x0102_0304,
        key: "tab".to_string(),
        pressed: true,
        modifiers: Modifiers {
            command: true,
            shift: true,
            ..Modifiers::NONE
        },
    };
    let bytes = msg.encode(Encoding::Binary);

    assert_eq!(
        bytes,
        vec![MAGIC, 0x12, 0x04, 0x03, 0x02, 0x01, 3, b't', b'a', b'b', 1, 0x09]
    );
}

#[test]
fn test_reliable_skill_release_frame_layout() {
    let msg = Message::ReliableSkillRelease {
        seq: 1,
        key: "q".to_string(),
        dx: 0.5,
        dy: -0.5,
    };
    let bytes = msg.encode(Encoding::Binary);

    assert_eq!(bytes.len(), 15);
    assert_eq!(&bytes[..7], &[MAGIC, 0x15, 1, 0, 0, 0, b'q']);
    assert_eq!(&bytes[7..11], &0.5f32.to_le_bytes());
    assert_eq!(&bytes[11..15], &(-0.5f32).to_le_bytes());
}

#[test]
fn test_ping_pong_ack_frame_sizes() {
    assert_eq!(Message::Ping { timestamp: 1 }.encode(Encoding::Binary).len(), 10);
    assert_eq!(Message::Pong { timestamp: 1 }.encode(Encoding::Binary).len(), 10);
    assert_eq!(Message::Ack { seq: 1 }.encode(Encoding::Binary), vec![MAGIC, 0x09, 1, 0, 0, 0]);
}

#[test]
fn test_skill_drag_without_smooth_byte_defaults_to_smooth() {
    let mut bytes = Message::SkillDrag {
        key: "q".to_string(),
        dx: 0.1,
        dy: 0.2,
        distance: 0.3,
        smooth: false,
    }
    .encode(Encoding::Binary);
    bytes.pop();

    match Message::from_bytes(&bytes) {
        Some(Message::SkillDrag { smooth, .. }) => assert!(smooth),
        other => panic!("unexpected decode: {:?}", other),
    }
}

#[test]
fn test_long_key_truncated_on_char_boundary() {
    // 'é' is two bytes, so 200 of them straddle the 255-byte limit
    let key: String = std::iter::repeat('é').take(200).collect();
    let bytes = Message::Button {
        key,
        pressed: true,
    }
    .encode(Encoding::Binary);

    assert_eq!(bytes[2], 254);
    match Message::from_bytes(&bytes) {
        Some(Message::Button { key, .. }) => assert_eq!(key.chars().count(), 127),
        other => panic!("unexpected decode: {:?}", other),
    }
}

// ============================================================================
// Text records
// ============================================================================

#[test]
fn test_text_record_field_names() {
    let json: serde_json::Value = serde_json::from_slice(
        &Message::ReliableSkillRelease {
            seq: 3,
            key: "q".to_string(),
            dx: 0.5,
            dy: -0.5,
        }
        .encode(Encoding::Text),
    )
    .unwrap();

    assert_eq!(json["type"], "skill_release");
    assert_eq!(json["seq"], 3);
    assert_eq!(json["key"], "q");
    assert_eq!(json["dx"], 0.5);
}

#[test]
fn test_unreliable_text_record_has_no_seq() {
    let json: serde_json::Value = serde_json::from_slice(
        &Message::SkillCancel {
            key: "q".to_string(),
        }
        .encode(Encoding::Text),
    )
    .unwrap();

    assert_eq!(json["type"], "skill_cancel");
    assert!(json.get("seq").is_none());
}

#[test]
fn test_text_button_with_seq_is_reliable() {
    let msg = Message::from_bytes(br#"{"type":"button","key":"a","pressed":true,"seq":9}"#);
    assert_eq!(
        msg,
        Some(Message::ReliableButton {
            seq: 9,
            key: "a".to_string(),
            pressed: true,
            modifiers: Modifiers::NONE,
        })
    );
}

#[test]
fn test_text_modifiers_default_missing_flags() {
    let msg = Message::from_bytes(
        br#"{"type":"skill_start","key":"e","modifiers":{"control":true}}"#,
    );
    assert_eq!(
        msg,
        Some(Message::SkillStart {
            key: "e".to_string(),
            modifiers: Modifiers {
                control: true,
                ..Modifiers::NONE
            },
        })
    );
}

#[test]
fn test_pong_and_ack_text_records() {
    assert_eq!(
        Message::from_bytes(br#"{"type":"pong","timestamp":1234}"#),
        Some(Message::Pong { timestamp: 1234 })
    );
    assert_eq!(
        Message::from_bytes(br#"{"type":"ack","seq":5}"#),
        Some(Message::Ack { seq: 5 })
    );
}

// ============================================================================
// Noise
// ============================================================================

#[test]
fn test_malformed_input_yields_no_message() {
    let noise: [&[u8]; 8] = [
        b"",
        &[MAGIC],
        &[MAGIC, 0x7F, 0, 0],
        &[MAGIC, 0x01, 0, 0, 0],
        &[MAGIC, 0x12, 1, 0, 0, 0, 10, b'a'],
        b"not json",
        br#"{"type":"teleport","x":1}"#,
        br#"{"type":"ack"}"#,
    ];
    for bytes in noise {
        assert!(decode(bytes).is_none(), "decoded noise {:?}", bytes);
    }
}

// ============================================================================
// Catalogue helpers
// ============================================================================

#[test]
fn test_type_codes_roundtrip() {
    for msg in catalogue() {
        let kind = msg.kind();
        assert_eq!(MessageKind::from_type_code(kind.type_code()), Some(kind));
    }
    assert_eq!(MessageKind::from_type_code(0x00), None);
    assert_eq!(MessageKind::from_type_code(0x13), None);
}

#[test]
fn test_reliable_kinds() {
    let reliable: Vec<MessageKind> = catalogue()
        .iter()
        .filter(|m| m.is_reliable())
        .map(Message::kind)
        .collect();
    assert_eq!(
        reliable,
        vec![
            MessageKind::ReliableButton,
            MessageKind::ReliableSkillRelease,
            MessageKind::ReliableSkillCancel
        ]
    );
}

#[test]
fn test_with_sequence_and_ack_for() {
    let msg = Message::ReliableSkillCancel {
        seq: 0,
        key: "q".to_string(),
    }
    .with_sequence(77);
    assert_eq!(msg.sequence(), Some(77));
    assert_eq!(msg.ack_for(), Some(Message::Ack { seq: 77 }));

    let joystick = Message::Joystick { x: 0.0, y: 0.0 }.with_sequence(5);
    assert_eq!(joystick.sequence(), None);
    assert_eq!(joystick.ack_for(), None);
}

#[test]
fn test_modifier_byte_packing() {
    assert_eq!(Modifiers::NONE.to_byte(), 0);
    assert_eq!(ctrl_shift().to_byte(), 0x03);
    assert!(Modifiers::from_byte(0x0C).alt);
    assert!(Modifiers::from_byte(0x0C).command);
    // Unknown high bits are ignored
    assert_eq!(Modifiers::from_byte(0xF0), Modifiers::NONE);
    assert_eq!(ctrl_shift().to_string(), "Ctrl+Shift");
}

#[test]
fn test_encoding_for_extreme_mode() {
    assert_eq!(Encoding::for_extreme_mode(true), Encoding::Binary);
    assert_eq!(Encoding::for_extreme_mode(false), Encoding::Text);
    assert_eq!(Encoding::detect(&[MAGIC]), Some(Encoding::Binary));
    assert_eq!(Encoding::detect(b"{"), Some(Encoding::Text));
    assert_eq!(Encoding::detect(b""), None);
}
