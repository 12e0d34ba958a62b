//! The one object a front end holds.
//!
//! [`EngineContext`] owns the shared [`Engine`] and the [`MidiDispatcher`].
//! There is no global state; everything a thread needs is reached through a
//! context (or an `Arc` of one).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;

use ostinato_audio::{BuiltinLoader, Engine, EngineSettings, MidiMap, Mixer};
use ostinato_types::{Command, MidiEvent};

use crate::config::Config;
use crate::dispatch::{dispatch_command, DispatchResult};
use crate::midi::{MasterBindings, MidiDispatcher, Routed};
use crate::midimap::load_midimap;

/// How long the recorder thread waits before rechecking its stop flag.
const RECORDER_SYNC_WAIT: Duration = Duration::from_millis(100);

pub struct EngineContext {
    engine: Arc<Engine>,
    dispatcher: MidiDispatcher,
}

impl EngineContext {
    /// Build from configuration. A midimap that fails to load is logged and
    /// replaced by an empty one.
    pub fn new(config: &Config) -> Self {
        let midimap = match config.midimap_path() {
            Some(path) => load_midimap(path).unwrap_or_else(|e| {
                log::warn!(target: "config", "{}", e);
                MidiMap::default()
            }),
            None => MidiMap::default(),
        };
        let engine = Engine::new(config.engine_settings(), midimap, Box::new(BuiltinLoader));
        Self::from_parts(engine, config.master_bindings(), config.no_note_off())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let engine = Engine::new(settings, MidiMap::default(), Box::new(BuiltinLoader));
        Self::from_parts(engine, MasterBindings::default(), false)
    }

    pub fn from_parts(engine: Engine, master: MasterBindings, no_note_off: bool) -> Self {
        Self {
            engine: Arc::new(engine),
            dispatcher: MidiDispatcher::new(master, no_note_off),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn dispatcher(&self) -> &MidiDispatcher {
        &self.dispatcher
    }

    /// A mixer for an audio callback, or for driving the engine by hand.
    pub fn mixer(&self) -> Mixer {
        Mixer::new(Arc::clone(&self.engine))
    }

    pub fn dispatch(&self, command: impl Into<Command>) -> DispatchResult {
        dispatch_command(&command.into(), &self.engine)
    }

    pub fn dispatch_midi(&self, event: MidiEvent) -> Routed {
        self.dispatcher.dispatch(&self.engine, event)
    }

    /// Dispatch every event from `rx` until its senders are gone.
    pub fn spawn_midi_dispatch(
        self: &Arc<Self>,
        rx: Receiver<MidiEvent>,
    ) -> Result<JoinHandle<()>, String> {
        let ctx = Arc::clone(self);
        std::thread::Builder::new()
            .name("ostinato-midi-in".into())
            .spawn(move || {
                for event in rx.iter() {
                    ctx.dispatch_midi(event);
                }
                log::debug!(target: "midi", "input dispatch thread exiting");
            })
            .map_err(|e| format!("Failed to spawn MIDI dispatch thread: {}", e))
    }

    /// Apply recorder writes queued by the audio callback as they arrive,
    /// until `stop` is set.
    pub fn spawn_recorder_sync(
        self: &Arc<Self>,
        stop: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>, String> {
        let ctx = Arc::clone(self);
        std::thread::Builder::new()
            .name("ostinato-recorder".into())
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let n = ctx.engine.sync_recorder(RECORDER_SYNC_WAIT);
                    if n > 0 {
                        log::trace!(target: "recorder", "applied {} queued write(s)", n);
                    }
                }
                log::debug!(target: "recorder", "recorder sync thread exiting");
            })
            .map_err(|e| format!("Failed to spawn recorder thread: {}", e))
    }
}
