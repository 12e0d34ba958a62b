//! # ostinato-core
//!
//! The control side of the looper: configuration, command dispatch, MIDI
//! input routing with learn, and the midir port managers. Front ends build
//! an [`EngineContext`](context::EngineContext) and talk to the engine
//! through it.
//!
//! - [`config`]: embedded TOML defaults merged with the user file
//! - [`context`]: `EngineContext`, owner of the engine and the MIDI dispatcher
//! - [`dispatch`]: `dispatch_command()`, the single entry point for commands
//! - [`midi`]: `MidiDispatcher`, learn sessions, MIDI input and output ports
//! - [`midimap`]: controller description files for lightning feedback

pub mod config;
pub mod context;
pub mod dispatch;
pub mod midi;
pub mod midimap;

pub use config::Config;
pub use context::EngineContext;
pub use dispatch::{dispatch_command, DispatchResult};
