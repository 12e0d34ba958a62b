//! Recorded performance actions.
//!
//! An [`Action`] is one time-stamped event in the action log: a key press,
//! a mute toggle, a volume point or a raw MIDI message, keyed by the frame
//! at which the transport replays it.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::ChannelId;

/// Kind of a recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActionKind {
    KeyPress = 0x01,
    KeyRelease = 0x02,
    Kill = 0x04,
    MuteOn = 0x08,
    MuteOff = 0x10,
    /// Volume envelope point, value in `f_value`.
    Volume = 0x20,
    /// Raw MIDI message, value in `i_value`.
    Midi = 0x40,
}

impl ActionKind {
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::KeyPress => "key_press",
            Self::KeyRelease => "key_release",
            Self::Kill => "kill",
            Self::MuteOn => "mute_on",
            Self::MuteOff => "mute_off",
            Self::Volume => "volume",
            Self::Midi => "midi",
        }
    }
}

/// A set of action kinds, used to clear or search the log by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionMask(u8);

impl ActionMask {
    pub const NONE: ActionMask = ActionMask(0);
    pub const KEYS: ActionMask = ActionMask(0x01 | 0x02);
    pub const MUTES: ActionMask = ActionMask(0x08 | 0x10);
    pub const ALL: ActionMask = ActionMask(0x7F);

    pub fn of(kind: ActionKind) -> Self {
        Self(kind.bits())
    }

    pub fn contains(self, kind: ActionKind) -> bool {
        self.0 & kind.bits() != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl From<ActionKind> for ActionMask {
    fn from(kind: ActionKind) -> Self {
        Self::of(kind)
    }
}

impl BitOr for ActionKind {
    type Output = ActionMask;
    fn bitor(self, rhs: ActionKind) -> ActionMask {
        ActionMask(self.bits() | rhs.bits())
    }
}

impl BitOr<ActionKind> for ActionMask {
    type Output = ActionMask;
    fn bitor(self, rhs: ActionKind) -> ActionMask {
        ActionMask(self.0 | rhs.bits())
    }
}

impl BitOr for ActionMask {
    type Output = ActionMask;
    fn bitor(self, rhs: ActionMask) -> ActionMask {
        ActionMask(self.0 | rhs.0)
    }
}

/// One recorded performance event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub channel: ChannelId,
    pub frame: u32,
    pub kind: ActionKind,
    #[serde(default)]
    pub i_value: u32,
    #[serde(default)]
    pub f_value: f32,
}

impl Action {
    pub fn new(channel: ChannelId, frame: u32, kind: ActionKind) -> Self {
        Self {
            channel,
            frame,
            kind,
            i_value: 0,
            f_value: 0.0,
        }
    }

    pub fn with_values(mut self, i_value: u32, f_value: f32) -> Self {
        self.i_value = i_value;
        self.f_value = f_value;
        self
    }

    /// Same channel, frame, kind and payload.
    pub fn same_event(&self, other: &Action) -> bool {
        self.channel == other.channel
            && self.frame == other.frame
            && self.kind == other.kind
            && self.i_value == other.i_value
            && self.f_value == other.f_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_combine_kinds() {
        let m = ActionKind::KeyPress | ActionKind::KeyRelease;
        assert_eq!(m, ActionMask::KEYS);
        assert!(m.contains(ActionKind::KeyRelease));
        assert!(!m.contains(ActionKind::Kill));
        let all = ActionMask::KEYS | ActionMask::MUTES | ActionKind::Kill;
        assert!(all.contains(ActionKind::MuteOff));
        assert!(!all.contains(ActionKind::Volume));
        assert!(ActionMask::ALL.contains(ActionKind::Midi));
    }

    #[test]
    fn same_event_compares_payload() {
        let ch = ChannelId::new(1);
        let a = Action::new(ch, 10, ActionKind::Volume).with_values(0, 0.5);
        let b = Action::new(ch, 10, ActionKind::Volume).with_values(0, 0.25);
        assert!(a.same_event(&a));
        assert!(!a.same_event(&b));
    }
}
