//! Channel enums: play status, sample playback mode, action-reading status.

use serde::{Deserialize, Serialize};

/// Play status of a channel.
///
/// Stored in an atomic byte by the engine, so every variant has a fixed
/// discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelStatus {
    /// Playing, will stop on the next first beat.
    Ending = 0x01,
    /// Armed to start on the next first beat (or quanto, for one-shots).
    Wait = 0x02,
    Play = 0x04,
    Off = 0x08,
    /// Sample channel without a wave.
    Empty = 0x10,
    /// Wave file referenced by a patch could not be found.
    Missing = 0x20,
    /// Wave file could not be decoded.
    Wrong = 0x40,
}

impl ChannelStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Ending),
            0x02 => Some(Self::Wait),
            0x04 => Some(Self::Play),
            0x08 => Some(Self::Off),
            0x10 => Some(Self::Empty),
            0x20 => Some(Self::Missing),
            0x40 => Some(Self::Wrong),
            _ => None,
        }
    }

    /// Audible states: PLAY and ENDING.
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Play | Self::Ending)
    }

    /// The channel has no usable wave.
    pub fn is_unplayable(self) -> bool {
        matches!(self, Self::Empty | Self::Missing | Self::Wrong)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ending => "ending",
            Self::Wait => "wait",
            Self::Play => "play",
            Self::Off => "off",
            Self::Empty => "empty",
            Self::Missing => "missing",
            Self::Wrong => "wrong",
        }
    }
}

/// Playback mode of a sample channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Loop forever, start/stop on first beat.
    LoopBasic,
    /// Play once per loop while enabled.
    LoopOnce,
    /// Like `LoopOnce`, but restart on bars instead of the first beat.
    LoopOnceBar,
    /// Loop, restarting from the beginning on every bar.
    LoopRepeat,
    /// One-shot; a second press fades the sample out.
    #[default]
    SingleBasic,
    /// One-shot that plays only while the key is held.
    SinglePress,
    /// One-shot; a second press restarts it.
    SingleRetrig,
    /// One-shot that loops until pressed again.
    SingleEndless,
}

impl ChannelMode {
    pub const ALL: [ChannelMode; 8] = [
        Self::LoopBasic,
        Self::LoopOnce,
        Self::LoopOnceBar,
        Self::LoopRepeat,
        Self::SingleBasic,
        Self::SinglePress,
        Self::SingleRetrig,
        Self::SingleEndless,
    ];

    pub fn is_loop(self) -> bool {
        matches!(
            self,
            Self::LoopBasic | Self::LoopOnce | Self::LoopOnceBar | Self::LoopRepeat
        )
    }

    pub fn is_single(self) -> bool {
        !self.is_loop()
    }

    /// Modes that play a single pass and then wait for the next cycle.
    pub fn is_once(self) -> bool {
        matches!(self, Self::LoopOnce | Self::LoopOnceBar)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::LoopBasic => "loop_basic",
            Self::LoopOnce => "loop_once",
            Self::LoopOnceBar => "loop_once_bar",
            Self::LoopRepeat => "loop_repeat",
            Self::SingleBasic => "single_basic",
            Self::SinglePress => "single_press",
            Self::SingleRetrig => "single_retrig",
            Self::SingleEndless => "single_endless",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|m| m.name() == s)
    }
}

/// Whether a channel is replaying its recorded actions, and whether that
/// is about to change on the next first beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecStatus {
    /// Reading starts on the next first beat.
    Waiting,
    /// Reading stops on the next first beat.
    Ending,
    Reading,
    #[default]
    Stopped,
}

/// Which payload a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Sample,
    Midi,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_survives_byte_round_trip() {
        for s in [
            ChannelStatus::Ending,
            ChannelStatus::Wait,
            ChannelStatus::Play,
            ChannelStatus::Off,
            ChannelStatus::Empty,
            ChannelStatus::Missing,
            ChannelStatus::Wrong,
        ] {
            assert_eq!(ChannelStatus::from_u8(s.as_u8()), Some(s));
        }
        assert_eq!(ChannelStatus::from_u8(0x03), None);
    }

    #[test]
    fn loop_and_single_partition_modes() {
        for m in ChannelMode::ALL {
            assert_ne!(m.is_loop(), m.is_single());
            assert_eq!(ChannelMode::parse(m.name()), Some(m));
        }
        assert!(ChannelMode::LoopOnceBar.is_once());
        assert!(!ChannelMode::SingleEndless.is_once());
    }
}
