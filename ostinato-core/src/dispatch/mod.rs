//! Command dispatch.
//!
//! Every user intent, whether typed, bound to a MIDI control or replayed by
//! a script, is a [`Command`] routed through [`dispatch_command`]. The
//! functions here run on control threads and never on the audio thread.

mod channel;
mod io;
mod plugin;
mod transport;

pub(crate) use channel::toggle_mute;

use ostinato_audio::Engine;
use ostinato_types::{ChannelId, Command, PluginId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub level: StatusLevel,
    pub message: String,
}

/// What a dispatched command produced, for the caller to report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResult {
    pub status: Vec<StatusEvent>,
    /// Channel created by the command.
    pub channel: Option<ChannelId>,
    /// Plugin created by the command.
    pub plugin: Option<PluginId>,
}

impl DispatchResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_status(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            status: vec![StatusEvent {
                level,
                message: message.into(),
            }],
            ..Self::default()
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_status(StatusLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(StatusLevel::Error, message)
    }

    pub fn with_channel(id: ChannelId) -> Self {
        Self {
            channel: Some(id),
            ..Self::default()
        }
    }

    pub fn with_plugin(id: PluginId) -> Self {
        Self {
            plugin: Some(id),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.status.iter().any(|s| s.level == StatusLevel::Error)
    }
}

/// Dispatch a command against the engine. Failures come back as an error
/// status; the engine is left as it was.
pub fn dispatch_command(command: &Command, engine: &Engine) -> DispatchResult {
    let result = match command {
        Command::Transport(c) => transport::dispatch_transport(c, engine),
        Command::Channel(c) => channel::dispatch_channel(c, engine),
        Command::Io(c) => io::dispatch_io(c, engine),
        Command::Plugin(c) => plugin::dispatch_plugin(c, engine),
    };

    match result {
        Ok(r) => r,
        Err(e) => {
            log::warn!(target: "dispatch", "{:?}: {}", command, e);
            DispatchResult::error(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ostinato_audio::{BuiltinLoader, Engine, EngineSettings, MidiMap};

    pub fn engine() -> Engine {
        engine_with(EngineSettings::default())
    }

    pub fn engine_with(settings: EngineSettings) -> Engine {
        Engine::new(settings, MidiMap::default(), Box::new(BuiltinLoader))
    }
}
