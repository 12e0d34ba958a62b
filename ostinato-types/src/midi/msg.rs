use serde::{Deserialize, Serialize};

use super::MidiMsgFilter;

/// A complete MIDI message of any length, with the name of the port it came from.
///
/// Construction normalizes note messages: a note-on with velocity 0 becomes
/// a note-off, and a note-off always carries velocity 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MidiMsg {
    sender: String,
    #[serde(rename = "msg")]
    data: Vec<u8>,
}

impl MidiMsg {
    pub fn new(sender: impl Into<String>, bytes: &[u8]) -> Self {
        let mut msg = Self {
            sender: sender.into(),
            data: bytes.to_vec(),
        };
        msg.fix_velocity_zero();
        msg.fix_note_off_value();
        msg
    }

    /// Byte `n`, or 0 when out of range.
    pub fn byte(&self, n: usize) -> u8 {
        self.data.get(n).copied().unwrap_or(0)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Byte-wise comparison under `mask`. Messages of different length never
    /// compare equal; a short mask is padded with 0xFF.
    pub fn compare(&self, other: &MidiMsg, mask: &[u8]) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut mask = mask.to_vec();
        mask.resize(self.len(), 0xFF);
        MidiMsgFilter::from_mask_template(&mask, other.bytes(), false).check(self)
    }

    /// Whether two messages address the same control: notes match on channel
    /// and note number regardless of on/off, controllers on channel and
    /// number, anything else must be identical.
    pub fn same_control(&self, other: &MidiMsg) -> bool {
        let notes = MidiMsgFilter::note_on_off();
        if notes.check(self) && notes.check(other) {
            return self.compare(other, &[0x0F, 0xFF, 0x00]);
        }
        let cc = MidiMsgFilter::cc();
        if cc.check(self) && cc.check(other) {
            return self.compare(other, &[0xFF, 0xFF, 0x00]);
        }
        self.compare(other, &[])
    }

    fn fix_velocity_zero(&mut self) {
        if MidiMsgFilter::note_on().check(self) && self.byte(2) == 0 {
            self.data[0] &= 0b1110_1111;
        }
    }

    fn fix_note_off_value(&mut self) {
        if MidiMsgFilter::note_off().check(self) && self.data.len() > 2 {
            self.data[2] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_normalizes_notes() {
        let m = MidiMsg::new("kbd", &[0x91, 0x3C, 0x00]);
        assert_eq!(m.bytes(), &[0x81, 0x3C, 0x00]);
        let off = MidiMsg::new("kbd", &[0x81, 0x3C, 0x40]);
        assert_eq!(off.byte(2), 0);
        assert_eq!(off.byte(9), 0);
        assert_eq!(off.sender(), "kbd");
    }

    #[test]
    fn same_control_ignores_note_direction_and_value() {
        let on = MidiMsg::new("a", &[0x90, 60, 100]);
        let off = MidiMsg::new("a", &[0x80, 60, 0]);
        let other_note = MidiMsg::new("a", &[0x90, 61, 100]);
        assert!(on.same_control(&off));
        assert!(!on.same_control(&other_note));

        let cc1 = MidiMsg::new("a", &[0xB0, 7, 10]);
        let cc2 = MidiMsg::new("a", &[0xB0, 7, 90]);
        let cc_other_chan = MidiMsg::new("a", &[0xB1, 7, 90]);
        assert!(cc1.same_control(&cc2));
        assert!(!cc1.same_control(&cc_other_chan));

        let clock = MidiMsg::new("a", &[0xF8]);
        assert!(clock.same_control(&MidiMsg::new("b", &[0xF8])));
        assert!(!clock.same_control(&MidiMsg::new("b", &[0xFA])));
    }
}
