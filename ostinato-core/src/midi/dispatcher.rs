//! Routing of inbound MIDI.
//!
//! Every message from the input thread goes through
//! [`MidiDispatcher::dispatch`]. A pending learn session takes the message
//! and nothing else sees it. Otherwise master bindings are checked first; a
//! master match consumes the message. Then each channel listening on the
//! message's MIDI channel gets its learned controls, its plugins' learned
//! parameters and finally the raw message.
//!
//! Matching compares the "pure" value of the message against learned
//! values: the packed message with the velocity byte stripped, or kept when
//! `no_note_off` is set. A learned value of 0 means unset and never matches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crossbeam_channel::{unbounded, Receiver, Sender};

use ostinato_audio::{Channel, Engine};
use ostinato_types::{
    ChannelCommand, ChannelId, ChannelKind, ChannelParam, Command, IoCommand, KeyMods,
    LearnTarget, LightningParam, MasterParam, MidiEvent, MidiEventKind, TransportCommand,
};

use super::learn::{LearnDone, LearnSession};
use crate::dispatch::dispatch_command;

/// Learned master controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterBindings {
    pub enabled: bool,
    /// MIDI channel 0-15 to listen to; `None` listens to all.
    pub filter: Option<u8>,
    pub rewind: u32,
    pub start_stop: u32,
    pub action_rec: u32,
    pub input_rec: u32,
    pub metronome: u32,
    pub volume_in: u32,
    pub volume_out: u32,
    pub beat_double: u32,
    pub beat_half: u32,
}

impl Default for MasterBindings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            rewind: 0,
            start_stop: 0,
            action_rec: 0,
            input_rec: 0,
            metronome: 0,
            volume_in: 0,
            volume_out: 0,
            beat_double: 0,
            beat_half: 0,
        }
    }
}

impl MasterBindings {
    pub fn get(&self, param: MasterParam) -> u32 {
        match param {
            MasterParam::Rewind => self.rewind,
            MasterParam::StartStop => self.start_stop,
            MasterParam::ActionRec => self.action_rec,
            MasterParam::InputRec => self.input_rec,
            MasterParam::Metronome => self.metronome,
            MasterParam::VolumeIn => self.volume_in,
            MasterParam::VolumeOut => self.volume_out,
            MasterParam::BeatDouble => self.beat_double,
            MasterParam::BeatHalf => self.beat_half,
        }
    }

    pub fn set(&mut self, param: MasterParam, value: u32) {
        let slot = match param {
            MasterParam::Rewind => &mut self.rewind,
            MasterParam::StartStop => &mut self.start_stop,
            MasterParam::ActionRec => &mut self.action_rec,
            MasterParam::InputRec => &mut self.input_rec,
            MasterParam::Metronome => &mut self.metronome,
            MasterParam::VolumeIn => &mut self.volume_in,
            MasterParam::VolumeOut => &mut self.volume_out,
            MasterParam::BeatDouble => &mut self.beat_double,
            MasterParam::BeatHalf => &mut self.beat_half,
        };
        *slot = value;
    }

    pub fn allows_channel(&self, midi_channel: u8) -> bool {
        self.filter.map_or(true, |f| f == midi_channel)
    }
}

/// Channel controls in the order they are checked; the first match wins.
const CONTROL_ORDER: [ChannelParam; 9] = [
    ChannelParam::KeyPress,
    ChannelParam::KeyRelease,
    ChannelParam::Mute,
    ChannelParam::Kill,
    ChannelParam::Arm,
    ChannelParam::Solo,
    ChannelParam::Volume,
    ChannelParam::Pitch,
    ChannelParam::ReadActions,
];

/// What happened to a dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// System message or empty event; not routed.
    Ignored,
    /// Captured by the learn session, which is now closed.
    Learned(LearnDone),
    /// A learn session is pending but the message was filtered out.
    LearnPending,
    /// The learn session closed but its target could not store the binding.
    LearnFailed(LearnTarget),
    /// Fired a master control.
    Master(MasterParam),
    /// Offered to this many listening channels.
    Channels(usize),
}

struct DispatcherState {
    master: MasterBindings,
    session: LearnSession,
}

pub struct MidiDispatcher {
    state: Mutex<DispatcherState>,
    no_note_off: bool,
    next_token: AtomicU64,
    done_tx: Sender<LearnDone>,
    done_rx: Receiver<LearnDone>,
}

impl MidiDispatcher {
    pub fn new(master: MasterBindings, no_note_off: bool) -> Self {
        let (done_tx, done_rx) = unbounded();
        Self {
            state: Mutex::new(DispatcherState {
                master,
                session: LearnSession::Idle,
            }),
            no_note_off,
            next_token: AtomicU64::new(1),
            done_tx,
            done_rx,
        }
    }

    fn state(&self) -> MutexGuard<'_, DispatcherState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn master(&self) -> MasterBindings {
        self.state().master
    }

    pub fn set_master(&self, param: MasterParam, value: u32) {
        self.state().master.set(param, value);
    }

    pub fn no_note_off(&self) -> bool {
        self.no_note_off
    }

    /// Wait for the next message to bind to `target`, replacing any pending
    /// session. Returns the session token reported in [`LearnDone`].
    pub fn start_learn(&self, target: LearnTarget) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let replaced = self.state().session.begin(target, token);
        if let Some(old) = replaced {
            log::debug!(target: "learn", "learn session for {:?} replaced", old);
        }
        log::info!(target: "learn", "learning {:?}", target);
        token
    }

    /// Cancel the pending session without writing anything.
    pub fn stop_learn(&self) {
        if let Some(target) = self.state().session.cancel() {
            log::info!(target: "learn", "learn for {:?} cancelled", target);
        }
    }

    /// Commit the pending session with an empty message, unsetting the
    /// binding.
    pub fn clear_learn(&self, engine: &Engine) -> Option<LearnDone> {
        let LearnSession::Waiting { target, token } = self.state().session else {
            return None;
        };
        match self.learn(engine, MidiEvent::empty(), target, token) {
            Routed::Learned(done) => Some(done),
            _ => None,
        }
    }

    pub fn learn_target(&self) -> Option<LearnTarget> {
        self.state().session.target()
    }

    /// Completed sessions, one message per commit.
    pub fn learn_done(&self) -> Receiver<LearnDone> {
        self.done_rx.clone()
    }

    pub fn dispatch(&self, engine: &Engine, event: MidiEvent) -> Routed {
        let event = event.normalized();
        // Clock ticks and other system messages never reach a learn session.
        if event.is_empty() || event.kind() != MidiEventKind::Channel {
            return Routed::Ignored;
        }
        log::debug!(target: "midi", "received {} (chan {})", event, event.channel());

        let session = self.state().session;
        if let LearnSession::Waiting { target, token } = session {
            return self.learn(engine, event, target, token);
        }

        let pure = event.pure(self.no_note_off);
        if let Some(param) = self.process_master(engine, event, pure) {
            return Routed::Master(param);
        }
        Routed::Channels(self.process_channels(engine, event, pure))
    }

    fn learn(&self, engine: &Engine, event: MidiEvent, target: LearnTarget, token: u64) -> Routed {
        if !event.is_empty() && !self.learn_allowed(engine, &target, event.channel()) {
            log::debug!(target: "learn", "{} filtered out for {:?}", event, target);
            return Routed::LearnPending;
        }
        let value = event.pure(self.no_note_off);
        if self.state().session.finish(token).is_none() {
            // superseded while we were checking the filter
            return Routed::LearnPending;
        }
        if let Err(e) = self.commit(engine, target, value) {
            log::warn!(target: "learn", "could not store binding for {:?}: {}", target, e);
            return Routed::LearnFailed(target);
        }
        log::info!(target: "learn", "{:?} = 0x{:08X}", target, value);
        let done = LearnDone {
            token,
            target,
            value,
        };
        let _ = self.done_tx.send(done);
        Routed::Learned(done)
    }

    fn learn_allowed(&self, engine: &Engine, target: &LearnTarget, midi_channel: u8) -> bool {
        match target {
            LearnTarget::Master(_) => {
                let master = self.master();
                master.enabled && master.allows_channel(midi_channel)
            }
            LearnTarget::Channel { channel, .. } | LearnTarget::Lightning { channel, .. } => engine
                .with_channel(*channel, |ch, _| ch.core.midi_in.allows_channel(midi_channel))
                .unwrap_or(true),
            LearnTarget::Plugin { .. } => true,
        }
    }

    fn commit(&self, engine: &Engine, target: LearnTarget, value: u32) -> Result<(), String> {
        match target {
            LearnTarget::Master(param) => {
                self.set_master(param, value);
                Ok(())
            }
            LearnTarget::Channel { channel, param } => {
                engine.with_channel(channel, |ch, _| ch.core.midi_in.set(param, value))
            }
            LearnTarget::Lightning { channel, param } => engine.with_channel(channel, |ch, _| {
                let l = &mut ch.core.lightning;
                match param {
                    LightningParam::Playing => l.playing = value,
                    LightningParam::Mute => l.mute = value,
                    LightningParam::Solo => l.solo = value,
                }
            }),
            LearnTarget::Plugin { plugin, param } => engine.with_plugin(plugin, |slot| {
                debug_assert!(
                    param < slot.midi_in_params.len(),
                    "plugin param {} out of range",
                    param
                );
                if let Some(v) = slot.midi_in_params.get_mut(param) {
                    *v = value;
                }
            }),
        }
    }

    fn process_master(&self, engine: &Engine, event: MidiEvent, pure: u32) -> Option<MasterParam> {
        let master = self.master();
        if !master.enabled || !master.allows_channel(event.channel()) {
            return None;
        }
        let param = MasterParam::ALL
            .into_iter()
            .find(|p| matches(master.get(*p), pure))?;
        log::debug!(target: "midi", "master {} (pure=0x{:08X})", param.name(), pure);

        let value = event.velocity_unit();
        let command: Command = match param {
            MasterParam::Rewind => TransportCommand::Rewind.into(),
            MasterParam::StartStop => TransportCommand::StartStop.into(),
            MasterParam::ActionRec => IoCommand::ToggleActionRec.into(),
            MasterParam::InputRec => IoCommand::ToggleInputRec.into(),
            MasterParam::Metronome => TransportCommand::ToggleMetronome.into(),
            MasterParam::VolumeIn => TransportCommand::SetInVolume(value).into(),
            MasterParam::VolumeOut => TransportCommand::SetOutVolume(value).into(),
            MasterParam::BeatDouble => TransportCommand::BeatsMultiply.into(),
            MasterParam::BeatHalf => TransportCommand::BeatsDivide.into(),
        };
        dispatch_command(&command, engine);
        Some(param)
    }

    fn process_channels(&self, engine: &Engine, event: MidiEvent, pure: u32) -> usize {
        let midi_channel = event.channel();
        let listeners: Vec<(ChannelId, Option<ChannelParam>)> = engine.with_rack(|rack, _| {
            rack.channels
                .iter()
                .filter(|c| c.core.midi_in.enabled && c.core.midi_in.allows_channel(midi_channel))
                .map(|c| (c.id(), matching_control(c, pure)))
                .collect()
        });

        for &(id, param) in &listeners {
            if let Some(param) = param {
                log::debug!(target: "midi", "ch {} {} (pure=0x{:08X})", id, param.name(), pure);
                dispatch_command(&channel_command(id, param, event), engine);
            }
            let routed = engine.with_channel(id, |ch, ctx| {
                let value = event.velocity_unit();
                for slot in ch.plugins.iter_mut() {
                    let hits: Vec<usize> = slot
                        .midi_in_params
                        .iter()
                        .enumerate()
                        .filter(|(_, learned)| matches(**learned, pure))
                        .map(|(k, _)| k)
                        .collect();
                    for k in hits {
                        slot.set_param(k, value);
                    }
                }
                ch.receive_midi(event, ctx);
            });
            if let Err(e) = routed {
                log::debug!(target: "midi", "channel gone during dispatch: {}", e);
            }
        }
        listeners.len()
    }
}

fn matches(learned: u32, pure: u32) -> bool {
    learned != 0 && learned == pure
}

fn matching_control(ch: &Channel, pure: u32) -> Option<ChannelParam> {
    CONTROL_ORDER.into_iter().find(|p| {
        if *p == ChannelParam::Pitch && ch.kind() != ChannelKind::Sample {
            return false;
        }
        matches(ch.core.midi_in.get(*p), pure)
    })
}

fn channel_command(channel: ChannelId, param: ChannelParam, event: MidiEvent) -> Command {
    match param {
        ChannelParam::KeyPress => IoCommand::KeyPress {
            channel,
            mods: KeyMods::NONE,
            velocity: event.velocity(),
        }
        .into(),
        ChannelParam::KeyRelease => IoCommand::KeyRelease {
            channel,
            mods: KeyMods::NONE,
        }
        .into(),
        ChannelParam::Mute => ChannelCommand::ToggleMute(channel).into(),
        ChannelParam::Kill => IoCommand::Kill(channel).into(),
        ChannelParam::Arm => ChannelCommand::ToggleArm(channel).into(),
        ChannelParam::Solo => ChannelCommand::ToggleSolo(channel).into(),
        ChannelParam::Volume => ChannelCommand::SetVolume {
            channel,
            value: event.velocity_unit(),
        }
        .into(),
        ChannelParam::Pitch => ChannelCommand::SetPitch {
            channel,
            value: event.velocity() as f32 / (127.0 / 4.0),
        }
        .into(),
        ChannelParam::ReadActions => ChannelCommand::ToggleReadActions(channel).into(),
    }
}
