//! Binary frame reader/writer (extreme mode)
//!
//! Layouts after `[MAGIC][type]`:
//!
//! ```text
//! Joystick              x:f32 y:f32
//! Button                key_len:u8 key pressed:u8
//! ReliableButton        seq:u32 key_len:u8 key pressed:u8 modifiers:u8
//! SkillStart            key_len:u8 key modifiers:u8
//! SkillDrag             key:u8 dx:f32 dy:f32 distance:f32 smooth:u8
//! SkillRelease          key:u8 dx:f32 dy:f32
//! SkillCancel           key:u8
//! ReliableSkillRelease  seq:u32 key:u8 dx:f32 dy:f32
//! ReliableSkillCancel   seq:u32 key:u8
//! Ping / Pong           timestamp:u64
//! Ack                   seq:u32
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use super::{truncate_key, Message, MessageKind, Modifiers, MAGIC};

/// Writer for binary frames
pub struct FrameWriter<W: Write> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Create a new frame writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consume the writer, returning the underlying sink
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write one complete frame
    pub fn write_message(&mut self, msg: &Message) -> io::Result<()> {
        self.writer.write_u8(MAGIC)?;
        self.writer.write_u8(msg.kind().type_code())?;

        match msg {
            Message::Joystick { x, y } => {
                self.writer.write_f32::<LittleEndian>(*x)?;
                self.writer.write_f32::<LittleEndian>(*y)?;
            }
            Message::Button { key, pressed } => {
                self.write_key(key)?;
                self.writer.write_u8(u8::from(*pressed))?;
            }
            Message::ReliableButton {
                seq,
                key,
                pressed,
                modifiers,
            } => {
                self.writer.write_u32::<LittleEndian>(*seq)?;
                self.write_key(key)?;
                self.writer.write_u8(u8::from(*pressed))?;
                self.writer.write_u8(modifiers.to_byte())?;
            }
            Message::SkillStart { key, modifiers } => {
                self.write_key(key)?;
                self.writer.write_u8(modifiers.to_byte())?;
            }
            Message::SkillDrag {
                key,
                dx,
                dy,
                distance,
                smooth,
            } => {
                self.write_key_byte(key)?;
                self.writer.write_f32::<LittleEndian>(*dx)?;
                self.writer.write_f32::<LittleEndian>(*dy)?;
                self.writer.write_f32::<LittleEndian>(*distance)?;
                self.writer.write_u8(u8::from(*smooth))?;
            }
            Message::SkillRelease { key, dx, dy } => {
                self.write_key_byte(key)?;
                self.writer.write_f32::<LittleEndian>(*dx)?;
                self.writer.write_f32::<LittleEndian>(*dy)?;
            }
            Message::SkillCancel { key } => {
                self.write_key_byte(key)?;
            }
            Message::ReliableSkillRelease { seq, key, dx, dy } => {
                self.writer.write_u32::<LittleEndian>(*seq)?;
                self.write_key_byte(key)?;
                self.writer.write_f32::<LittleEndian>(*dx)?;
                self.writer.write_f32::<LittleEndian>(*dy)?;
            }
            Message::ReliableSkillCancel { seq, key } => {
                self.writer.write_u32::<LittleEndian>(*seq)?;
                self.write_key_byte(key)?;
            }
            Message::Ping { timestamp } | Message::Pong { timestamp } => {
                self.writer.write_u64::<LittleEndian>(*timestamp)?;
            }
            Message::Ack { seq } => {
                self.writer.write_u32::<LittleEndian>(*seq)?;
            }
        }

        Ok(())
    }

    /// Length-prefixed key name
    fn write_key(&mut self, key: &str) -> io::Result<()> {
        let key = truncate_key(key);
        self.writer.write_u8(key.len() as u8)?;
        self.writer.write_all(key.as_bytes())
    }

    /// Single-byte key (first byte of the name)
    fn write_key_byte(&mut self, key: &str) -> io::Result<()> {
        self.writer.write_u8(key.as_bytes().first().copied().unwrap_or(0))
    }
}

/// Reader for binary frames
pub struct FrameReader<R: Read> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    /// Create a new frame reader
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read one complete frame
    ///
    /// Fails with `InvalidData` on a bad magic byte or unknown type code and
    /// with `UnexpectedEof` when the frame is shorter than its layout.
    pub fn read_message(&mut self) -> io::Result<Message> {
        if self.reader.read_u8()? != MAGIC {
            return Err(invalid("bad magic byte"));
        }
        let code = self.reader.read_u8()?;
        let kind = MessageKind::from_type_code(code).ok_or_else(|| invalid("unknown type code"))?;

        let msg = match kind {
            MessageKind::Joystick => Message::Joystick {
                x: self.reader.read_f32::<LittleEndian>()?,
                y: self.reader.read_f32::<LittleEndian>()?,
            },
            MessageKind::Button => Message::Button {
                key: self.read_key()?,
                pressed: self.reader.read_u8()? != 0,
            },
            MessageKind::ReliableButton => Message::ReliableButton {
                seq: self.reader.read_u32::<LittleEndian>()?,
                key: self.read_key()?,
                pressed: self.reader.read_u8()? != 0,
                modifiers: Modifiers::from_byte(self.reader.read_u8()?),
            },
            MessageKind::SkillStart => Message::SkillStart {
                key: self.read_key()?,
                modifiers: Modifiers::from_byte(self.reader.read_u8()?),
            },
            MessageKind::SkillDrag => Message::SkillDrag {
                key: self.read_key_byte()?,
                dx: self.reader.read_f32::<LittleEndian>()?,
                dy: self.reader.read_f32::<LittleEndian>()?,
                distance: self.reader.read_f32::<LittleEndian>()?,
                // Older senders omit the trailing flag; they always smoothed
                smooth: self.reader.read_u8().map(|b| b != 0).unwrap_or(true),
            },
            MessageKind::SkillRelease => Message::SkillRelease {
                key: self.read_key_byte()?,
                dx: self.reader.read_f32::<LittleEndian>()?,
                dy: self.reader.read_f32::<LittleEndian>()?,
            },
            MessageKind::SkillCancel => Message::SkillCancel {
                key: self.read_key_byte()?,
            },
            MessageKind::ReliableSkillRelease => Message::ReliableSkillRelease {
                seq: self.reader.read_u32::<LittleEndian>()?,
                key: self.read_key_byte()?,
                dx: self.reader.read_f32::<LittleEndian>()?,
                dy: self.reader.read_f32::<LittleEndian>()?,
            },
            MessageKind::ReliableSkillCancel => Message::ReliableSkillCancel {
                seq: self.reader.read_u32::<LittleEndian>()?,
                key: self.read_key_byte()?,
            },
            MessageKind::Ping => Message::Ping {
                timestamp: self.reader.read_u64::<LittleEndian>()?,
            },
            MessageKind::Pong => Message::Pong {
                timestamp: self.reader.read_u64::<LittleEndian>()?,
            },
            MessageKind::Ack => Message::Ack {
                seq: self.reader.read_u32::<LittleEndian>()?,
            },
        };

        Ok(msg)
    }

    fn read_key(&mut self) -> io::Result<String> {
        let len = self.reader.read_u8()? as usize;
        let mut raw = vec![0u8; len];
        self.reader.read_exact(&mut raw)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    fn read_key_byte(&mut self) -> io::Result<String> {
        Ok(match self.reader.read_u8()? {
            0 => String::new(),
            b => char::from(b).to_string(),
        })
    }
}

fn invalid(reason: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason)
}

/// Encode a message as a binary frame
pub(super) fn encode(msg: &Message) -> Vec<u8> {
    let mut writer = FrameWriter::new(Vec::with_capacity(32));
    // Writing into a Vec cannot fail
    match writer.write_message(msg) {
        Ok(()) => writer.into_inner(),
        Err(_) => Vec::new(),
    }
}

/// Decode a binary frame, treating any failure as noise
pub(super) fn decode(bytes: &[u8]) -> Option<Message> {
    if bytes.len() < 2 {
        return None;
    }
    FrameReader::new(bytes).read_message().ok()
}
