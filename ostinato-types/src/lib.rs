//! # ostinato-types
//!
//! Shared type definitions for the ostinato looper engine.
//! This crate holds the plain data used by ostinato-audio, ostinato-core and the CLI:
//! identifiers, MIDI value types, channel enums, recorded actions and the
//! command enums routed by the dispatch layer.

pub mod action;
pub mod channel;
pub mod command;
pub mod learn;
pub mod midi;
pub mod transport;

pub use action::*;
pub use channel::{ChannelKind, ChannelMode, ChannelStatus, RecStatus};
pub use command::*;
pub use learn::{ChannelParam, LearnTarget, LightningParam, MasterParam};
pub use midi::{MidiEvent, MidiEventKind, MidiMsg, MidiMsgFilter};
pub use transport::MidiSyncMode;

/// Unique identifier for a channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(u32);

impl ChannelId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a plugin instance, stable for the whole session.
///
/// Ids survive reordering inside a stack, so MIDI-learned parameters keep
/// pointing at the same plugin after a swap.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct PluginId(u32);

impl PluginId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_serde_as_plain_numbers() {
        let id = ChannelId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let back: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert_eq!(PluginId::new(3).to_string(), "3");
    }
}
