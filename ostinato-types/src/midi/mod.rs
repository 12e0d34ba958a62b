//! MIDI value types: packed events, byte messages and message filters.

mod event;
mod filter;
mod msg;

pub use event::{MidiEvent, MidiEventKind};
pub use filter::{MidiMsgFilter, MsgPattern};
pub use msg::MidiMsg;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PITCH_WHEEL: u8 = 0xE0;

pub const SYSEX: u8 = 0xF0;
pub const MTC_QUARTER_FRAME: u8 = 0xF1;
pub const SONG_POSITION: u8 = 0xF2;
pub const END_OF_SYSEX: u8 = 0xF7;
pub const TIMING_CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;

/// Controller 0x7B on channel 0, as a packed raw value.
pub const ALL_NOTES_OFF: u32 = (0xB0 << 24) | (0x7B << 16);

/// Packed channel nibble for MIDI channel `ch` (0-15), OR-able into a raw value.
pub fn channel_bits(ch: u8) -> u32 {
    ((ch & 0x0F) as u32) << 24
}
