//! Learnable parameter identifiers and learn targets.

use serde::{Deserialize, Serialize};

use crate::{ChannelId, PluginId};

/// Per-channel learnable MIDI input controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelParam {
    KeyPress,
    KeyRelease,
    Kill,
    Arm,
    Mute,
    Solo,
    Volume,
    Pitch,
    ReadActions,
}

impl ChannelParam {
    pub const ALL: [ChannelParam; 9] = [
        Self::KeyPress,
        Self::KeyRelease,
        Self::Kill,
        Self::Arm,
        Self::Mute,
        Self::Solo,
        Self::Volume,
        Self::Pitch,
        Self::ReadActions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::KeyPress => "key_press",
            Self::KeyRelease => "key_release",
            Self::Kill => "kill",
            Self::Arm => "arm",
            Self::Mute => "mute",
            Self::Solo => "solo",
            Self::Volume => "volume",
            Self::Pitch => "pitch",
            Self::ReadActions => "read_actions",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.name() == s)
    }
}

/// Master learnable MIDI input controls, in the order dispatch checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterParam {
    Rewind,
    StartStop,
    ActionRec,
    InputRec,
    Metronome,
    VolumeIn,
    VolumeOut,
    BeatDouble,
    BeatHalf,
}

impl MasterParam {
    pub const ALL: [MasterParam; 9] = [
        Self::Rewind,
        Self::StartStop,
        Self::ActionRec,
        Self::InputRec,
        Self::Metronome,
        Self::VolumeIn,
        Self::VolumeOut,
        Self::BeatDouble,
        Self::BeatHalf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Rewind => "rewind",
            Self::StartStop => "start_stop",
            Self::ActionRec => "action_rec",
            Self::InputRec => "input_rec",
            Self::Metronome => "metronome",
            Self::VolumeIn => "volume_in",
            Self::VolumeOut => "volume_out",
            Self::BeatDouble => "beat_double",
            Self::BeatHalf => "beat_half",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.name() == s)
    }
}

/// MIDI lightning (controller feedback) outputs of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightningParam {
    Playing,
    Mute,
    Solo,
}

impl LightningParam {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l_playing" | "playing" => Some(Self::Playing),
            "l_mute" | "mute" => Some(Self::Mute),
            "l_solo" | "solo" => Some(Self::Solo),
            _ => None,
        }
    }
}

/// What a MIDI learn session writes into once it captures an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LearnTarget {
    Master(MasterParam),
    Channel {
        channel: ChannelId,
        param: ChannelParam,
    },
    Lightning {
        channel: ChannelId,
        param: LightningParam,
    },
    Plugin {
        plugin: PluginId,
        param: usize,
    },
}

impl LearnTarget {
    /// Channel whose MIDI-in filter gates this target, if any.
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            Self::Channel { channel, .. } | Self::Lightning { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        for p in ChannelParam::ALL {
            assert_eq!(ChannelParam::parse(p.name()), Some(p));
        }
        for p in MasterParam::ALL {
            assert_eq!(MasterParam::parse(p.name()), Some(p));
        }
        assert_eq!(LightningParam::parse("L_MUTE"), Some(LightningParam::Mute));
        assert_eq!(ChannelParam::parse("bogus"), None);
    }
}
