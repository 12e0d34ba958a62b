//! MIDI lightning: feedback messages that light up controller pads.
//!
//! A [`MidiMap`] describes one controller. Each message is a packed value
//! with a hole (the `nn` nibbles in `0xB0nn7F00`) where the pad's learned
//! note or controller number is inserted.

use serde::{Deserialize, Serialize};

use ostinato_types::midi::channel_bits;
use ostinato_types::ChannelStatus;

use crate::midi_out::MidiOut;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiMapMessage {
    pub channel: u8,
    pub value: u32,
    /// Bit offset of the learned byte; `None` sends `value` unchanged.
    pub offset: Option<u32>,
}

impl MidiMapMessage {
    /// Parse a hex template such as `0xB0nn3F00`. Every `n` nibble reads as 0;
    /// the first one marks where the learned byte goes.
    pub fn parse(channel: u8, text: &str) -> Result<Self, String> {
        let hex = text
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        if hex.is_empty() || hex.len() > 8 {
            return Err(format!("Failed to parse midimap message '{}': bad length", text));
        }
        let offset = hex
            .find(['n', 'N'])
            .map(|i| 24u32.saturating_sub(4 * i as u32));
        let digits: String = hex
            .chars()
            .map(|c| if c == 'n' || c == 'N' { '0' } else { c })
            .collect();
        let value = u32::from_str_radix(&digits, 16)
            .map_err(|e| format!("Failed to parse midimap message '{}': {}", text, e))?;
        Ok(Self {
            channel: channel & 0x0F,
            value,
            offset,
        })
    }

    pub fn is_set(&self) -> bool {
        self.value != 0
    }

    /// Compose the outgoing raw value for a pad learned as `learned`.
    pub fn compose(&self, learned: u32) -> u32 {
        let byte = (learned & 0x00FF_0000) >> 16;
        let inserted = match self.offset {
            Some(off) => byte << off,
            None => 0,
        };
        inserted | self.value | channel_bits(self.channel)
    }
}

/// A controller description loaded from a midimap file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MidiMap {
    pub brand: String,
    pub device: String,
    pub init_commands: Vec<MidiMapMessage>,
    pub mute_on: MidiMapMessage,
    pub mute_off: MidiMapMessage,
    pub solo_on: MidiMapMessage,
    pub solo_off: MidiMapMessage,
    pub waiting: MidiMapMessage,
    pub playing: MidiMapMessage,
    pub stopping: MidiMapMessage,
    pub stopped: MidiMapMessage,
}

impl MidiMap {
    pub fn send_init(&self, out: &MidiOut) {
        for cmd in &self.init_commands {
            out.send_raw(cmd.value | channel_bits(cmd.channel));
        }
    }
}

/// Per-channel lightning output mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningMapping {
    pub enabled: bool,
    pub playing: u32,
    pub mute: u32,
    pub solo: u32,
}

impl LightningMapping {
    fn send(&self, out: &MidiOut, learned: u32, msg: &MidiMapMessage) {
        if self.enabled && learned != 0 && msg.is_set() {
            out.send_raw(msg.compose(learned));
        }
    }

    pub fn send_status(&self, out: &MidiOut, map: &MidiMap, status: ChannelStatus) {
        let msg = match status {
            ChannelStatus::Off => &map.stopped,
            ChannelStatus::Play => &map.playing,
            ChannelStatus::Wait => &map.waiting,
            ChannelStatus::Ending => &map.stopping,
            _ => return,
        };
        self.send(out, self.playing, msg);
    }

    pub fn send_mute(&self, out: &MidiOut, map: &MidiMap, muted: bool) {
        let msg = if muted { &map.mute_on } else { &map.mute_off };
        self.send(out, self.mute, msg);
    }

    pub fn send_solo(&self, out: &MidiOut, map: &MidiMap, solo: bool) {
        let msg = if solo { &map.solo_on } else { &map.solo_off };
        self.send(out, self.solo, msg);
    }
}
