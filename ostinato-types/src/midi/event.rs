use serde::{Deserialize, Serialize};

use super::{MidiMsg, NOTE_OFF, NOTE_ON};

/// Channel voice message or system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MidiEventKind {
    Channel,
    System,
}

/// A normalized short MIDI message packed as `status<<24 | data1<<16 | data2<<8`.
///
/// `len` counts the bytes the event was built from. An event with no bytes
/// is the "empty" event used to clear a learned binding; it never compares
/// equal to a real message even though its raw value is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MidiEvent {
    raw: u32,
    len: u8,
}

impl MidiEvent {
    pub fn from_bytes(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            raw: (status as u32) << 24 | (data1 as u32) << 16 | (data2 as u32) << 8,
            len: 3,
        }
    }

    /// Build from a packed value. The low byte is ignored.
    pub fn from_raw(raw: u32) -> Self {
        Self {
            raw: raw & 0xFFFF_FF00,
            len: 3,
        }
    }

    /// Build from up to three leading bytes of a message. Returns `None` for
    /// an empty slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let first = *bytes.first()?;
        let get = |i: usize| bytes.get(i).copied().unwrap_or(0);
        let mut ev = Self::from_bytes(first, get(1), get(2));
        ev.len = bytes.len().min(3) as u8;
        Some(ev)
    }

    pub fn from_msg(msg: &MidiMsg) -> Option<Self> {
        Self::from_slice(msg.bytes())
    }

    /// The event with no bytes.
    pub fn empty() -> Self {
        Self { raw: 0, len: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn raw_no_velocity(&self) -> u32 {
        self.raw & 0xFFFF_0000
    }

    /// Value used to match learned bindings. With `no_note_off` the velocity
    /// byte is kept, otherwise it is stripped.
    pub fn pure(&self, no_note_off: bool) -> u32 {
        if no_note_off {
            self.raw & 0xFFFF_FF00
        } else {
            self.raw_no_velocity()
        }
    }

    pub fn status_byte(&self) -> u8 {
        (self.raw >> 24) as u8
    }

    /// Message type: high nibble for channel messages, the whole byte for
    /// system messages.
    pub fn status(&self) -> u8 {
        let b = self.status_byte();
        if b >= 0xF0 {
            b
        } else {
            b & 0xF0
        }
    }

    /// MIDI channel 0-15; 0 for system messages.
    pub fn channel(&self) -> u8 {
        match self.kind() {
            MidiEventKind::Channel => self.status_byte() & 0x0F,
            MidiEventKind::System => 0,
        }
    }

    pub fn note(&self) -> u8 {
        (self.raw >> 16) as u8
    }

    pub fn velocity(&self) -> u8 {
        (self.raw >> 8) as u8
    }

    /// Velocity (or CC value) mapped to [0, 1].
    pub fn velocity_unit(&self) -> f32 {
        self.velocity() as f32 / 127.0
    }

    pub fn kind(&self) -> MidiEventKind {
        if self.status_byte() >= 0xF0 {
            MidiEventKind::System
        } else {
            MidiEventKind::Channel
        }
    }

    pub fn is_note_on_off(&self) -> bool {
        matches!(self.status(), NOTE_ON | NOTE_OFF) && self.kind() == MidiEventKind::Channel
    }

    /// Note-on with velocity 0 becomes a note-off on the same channel and note.
    pub fn normalized(self) -> Self {
        if self.len == 3 && self.status() == NOTE_ON && self.velocity() == 0 {
            Self {
                raw: self.raw & !(0x10 << 24),
                len: self.len,
            }
        } else {
            self
        }
    }

    /// Same message on another MIDI channel.
    pub fn with_channel(self, channel: u8) -> Self {
        if self.kind() == MidiEventKind::System {
            return self;
        }
        Self {
            raw: (self.raw & 0xF0FF_FFFF) | super::channel_bits(channel),
            len: self.len,
        }
    }

    /// Wire bytes; only the first `len()` are meaningful.
    pub fn bytes(&self) -> [u8; 3] {
        [
            (self.raw >> 24) as u8,
            (self.raw >> 16) as u8,
            (self.raw >> 8) as u8,
        ]
    }
}

impl std::fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "<empty>")
        } else {
            write!(f, "0x{:08X} (chan {})", self.raw, self.channel())
        }
    }
}
