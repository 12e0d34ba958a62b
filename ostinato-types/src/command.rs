//! Command types for the dispatch system.
//!
//! Commands represent user intents (keyboard, CLI, MIDI-mapped controls)
//! that flow through `ostinato-core`'s dispatch functions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ActionMask, ChannelId, ChannelKind, ChannelMode, PluginId};

/// Which plugin stack an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackType {
    MasterOut,
    MasterIn,
    Channel(ChannelId),
}

/// Modifier keys held during a key press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyMods {
    pub ctrl: bool,
    pub shift: bool,
}

impl KeyMods {
    pub const NONE: KeyMods = KeyMods {
        ctrl: false,
        shift: false,
    };
}

/// Transport and master-bus commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransportCommand {
    StartStop,
    Rewind,
    SetBpm(f32),
    SetBeats { beats: u32, bars: u32, expand: bool },
    BeatsMultiply,
    BeatsDivide,
    SetQuantize(u32),
    ToggleMetronome,
    SetInVolume(f32),
    SetOutVolume(f32),
    ToggleInToOut,
}

/// Channel management and per-channel parameter commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelCommand {
    Add(ChannelKind),
    Delete(ChannelId),
    Clone(ChannelId),
    LoadWave { channel: ChannelId, path: PathBuf },
    SaveWave { channel: ChannelId, path: PathBuf },
    /// Drop the wave and go back to the empty state.
    FreeWave(ChannelId),
    Rename { channel: ChannelId, name: String },
    ToggleArm(ChannelId),
    ToggleMute(ChannelId),
    ToggleSolo(ChannelId),
    SetVolume { channel: ChannelId, value: f32 },
    SetPan { channel: ChannelId, value: f32 },
    SetPitch { channel: ChannelId, value: f32 },
    /// Boost in dB.
    SetBoost { channel: ChannelId, db: f32 },
    SetMode { channel: ChannelId, mode: ChannelMode },
    SetBeginEnd { channel: ChannelId, begin: u32, end: u32 },
    ToggleInputMonitor(ChannelId),
    ToggleReadActions(ChannelId),
    SetMidiOut { channel: ChannelId, enabled: bool, out_chan: u8 },
    ClearActions { channel: ChannelId, mask: ActionMask },
}

/// Performance input: key presses and the two recording modes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IoCommand {
    KeyPress {
        channel: ChannelId,
        mods: KeyMods,
        velocity: u8,
    },
    KeyRelease {
        channel: ChannelId,
        mods: KeyMods,
    },
    Kill(ChannelId),
    ToggleActionRec,
    ToggleInputRec,
}

/// Plugin stack commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PluginCommand {
    Add { stack: StackType, uid: String },
    Free { stack: StackType, plugin: PluginId },
    Swap { stack: StackType, a: usize, b: usize },
    Clone { stack: StackType, plugin: PluginId },
    SetParam { plugin: PluginId, param: usize, value: f32 },
    ToggleBypass { plugin: PluginId },
}

/// Top-level command routed by `dispatch_command()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Transport(TransportCommand),
    Channel(ChannelCommand),
    Io(IoCommand),
    Plugin(PluginCommand),
}

impl From<TransportCommand> for Command {
    fn from(c: TransportCommand) -> Self {
        Command::Transport(c)
    }
}

impl From<ChannelCommand> for Command {
    fn from(c: ChannelCommand) -> Self {
        Command::Channel(c)
    }
}

impl From<IoCommand> for Command {
    fn from(c: IoCommand) -> Self {
        Command::Io(c)
    }
}

impl From<PluginCommand> for Command {
    fn from(c: PluginCommand) -> Self {
        Command::Plugin(c)
    }
}
