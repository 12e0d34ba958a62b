//! # ostinato-audio
//!
//! The real-time half of the looper: clock, channels, action recorder,
//! plugin stacks and the mixer callback, plus the cpal stream that drives it.

pub mod builtin;
pub mod channel;
pub mod clock;
pub mod engine;
pub mod lightning;
pub mod metronome;
pub mod midi_out;
pub mod midi_sync;
pub mod mixer;
pub mod plugin_host;
pub mod recorder;
pub mod rt_lock;
pub mod stream;
pub mod telemetry;
pub mod wave;

pub use builtin::BuiltinLoader;
pub use channel::{Channel, ChannelCtx};
pub use clock::Clock;
pub use engine::{Behavior, ChannelInfo, Engine, EngineSettings};
pub use lightning::MidiMap;
pub use midi_out::{MidiOut, MidiOutMsg};
pub use mixer::Mixer;
pub use plugin_host::{Plugin, PluginLoader, PluginSlot};
pub use recorder::{ActionRecorder, RecQueue};
pub use stream::{AudioStream, StreamOptions};
pub use telemetry::TelemetrySummary;
pub use wave::Wave;
