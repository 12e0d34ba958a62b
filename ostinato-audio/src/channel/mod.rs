//! Channels: one mixable source each.
//!
//! A [`Channel`] is a [`ChannelCore`] (status, volume, pan, flags, MIDI
//! mappings) plus a payload selected by kind: [`SampleData`] for sample
//! players, [`MidiData`] for MIDI generators. Operations dispatch on the
//! payload tag. Everything that needs the rest of the engine (transport,
//! MIDI out, recorder) reaches it through a [`ChannelCtx`], so channel code
//! never takes a lock itself.

mod midi;
mod sample;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ostinato_types::{
    Action, ChannelId, ChannelKind, ChannelMode, ChannelParam, ChannelStatus, MidiEvent, RecStatus,
};

use crate::clock::Clock;
use crate::engine::Behavior;
use crate::lightning::{LightningMapping, MidiMap};
use crate::midi_out::MidiOut;
use crate::plugin_host::PluginStack;
use crate::recorder::{RecOp, RecQueue};
use crate::wave::Wave;

pub use midi::MidiData;
pub use sample::SampleData;

/// Channel play status readable without the channel lock.
#[derive(Debug)]
pub struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub fn new(status: ChannelStatus) -> Self {
        Self(AtomicU8::new(status.as_u8()))
    }

    pub fn load(&self) -> ChannelStatus {
        ChannelStatus::from_u8(self.0.load(Ordering::Acquire)).unwrap_or(ChannelStatus::Off)
    }

    fn store(&self, status: ChannelStatus) -> ChannelStatus {
        ChannelStatus::from_u8(self.0.swap(status.as_u8(), Ordering::AcqRel))
            .unwrap_or(ChannelStatus::Off)
    }
}

/// Learned MIDI input controls of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiInputMapping {
    pub enabled: bool,
    /// MIDI channel 0-15 to listen to; `None` listens to all.
    pub filter: Option<u8>,
    pub key_press: u32,
    pub key_release: u32,
    pub kill: u32,
    pub arm: u32,
    pub mute: u32,
    pub solo: u32,
    pub volume: u32,
    pub pitch: u32,
    pub read_actions: u32,
}

impl Default for MidiInputMapping {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            key_press: 0,
            key_release: 0,
            kill: 0,
            arm: 0,
            mute: 0,
            solo: 0,
            volume: 0,
            pitch: 0,
            read_actions: 0,
        }
    }
}

impl MidiInputMapping {
    pub fn get(&self, param: ChannelParam) -> u32 {
        match param {
            ChannelParam::KeyPress => self.key_press,
            ChannelParam::KeyRelease => self.key_release,
            ChannelParam::Kill => self.kill,
            ChannelParam::Arm => self.arm,
            ChannelParam::Mute => self.mute,
            ChannelParam::Solo => self.solo,
            ChannelParam::Volume => self.volume,
            ChannelParam::Pitch => self.pitch,
            ChannelParam::ReadActions => self.read_actions,
        }
    }

    pub fn set(&mut self, param: ChannelParam, value: u32) {
        let slot = match param {
            ChannelParam::KeyPress => &mut self.key_press,
            ChannelParam::KeyRelease => &mut self.key_release,
            ChannelParam::Kill => &mut self.kill,
            ChannelParam::Arm => &mut self.arm,
            ChannelParam::Mute => &mut self.mute,
            ChannelParam::Solo => &mut self.solo,
            ChannelParam::Volume => &mut self.volume,
            ChannelParam::Pitch => &mut self.pitch,
            ChannelParam::ReadActions => &mut self.read_actions,
        };
        *slot = value;
    }

    pub fn allows_channel(&self, midi_channel: u8) -> bool {
        self.filter.map_or(true, |f| f == midi_channel)
    }
}

/// Engine services available to channel operations.
pub struct ChannelCtx<'a> {
    pub clock: &'a Clock,
    pub midi_out: &'a MidiOut,
    pub midimap: &'a MidiMap,
    pub behavior: &'a Behavior,
    /// Action recording is on, the transport runs and no input take is
    /// being recorded.
    pub rec_armed: bool,
    /// Recorder writes, applied once the channel lock is released.
    pub rec_ops: RecSink<'a>,
}

/// Where recorder writes go until the recorder can be taken.
pub enum RecSink<'a> {
    /// Collected by a control-thread caller and applied after the rack lock.
    Buffer(&'a mut Vec<RecOp>),
    /// Queued by the audio thread and applied by the control side.
    Queue(&'a RecQueue),
}

impl ChannelCtx<'_> {
    pub fn rec(&mut self, action: Action) {
        self.push_rec(RecOp::Rec(action));
    }

    pub fn push_rec(&mut self, op: RecOp) {
        match &mut self.rec_ops {
            RecSink::Buffer(ops) => ops.push(op),
            RecSink::Queue(queue) => queue.push(op),
        }
    }
}

/// One recorded action scheduled for the current buffer.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledAction {
    pub action: Action,
    /// For volume points: frames until the next point and its value.
    pub next_volume: Option<(u32, f32)>,
}

/// State shared by every channel kind.
#[derive(Debug)]
pub struct ChannelCore {
    pub id: ChannelId,
    pub name: String,
    status: Arc<AtomicStatus>,
    pub volume: f32,
    /// Envelope volume driven by recorded volume actions.
    pub(crate) volume_i: f32,
    pub(crate) volume_d: f32,
    pan: f32,
    pub mute: bool,
    /// Mute driven by recorded mute actions.
    pub(crate) mute_i: bool,
    /// Mute state saved when a solo session starts.
    pub(crate) mute_s: bool,
    pub solo: bool,
    pub armed: bool,
    pub has_actions: bool,
    pub read_actions: bool,
    pub rec_status: RecStatus,
    pub midi_in: MidiInputMapping,
    pub lightning: LightningMapping,
}

impl ChannelCore {
    fn new(id: ChannelId, name: String, status: ChannelStatus) -> Self {
        Self {
            id,
            name,
            status: Arc::new(AtomicStatus::new(status)),
            volume: 1.0,
            volume_i: 1.0,
            volume_d: 0.0,
            pan: 0.5,
            mute: false,
            mute_i: false,
            mute_s: false,
            solo: false,
            armed: false,
            has_actions: false,
            read_actions: false,
            rec_status: RecStatus::Stopped,
            midi_in: MidiInputMapping::default(),
            lightning: LightningMapping::default(),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.load()
    }

    /// Change status, lighting the controller pad when it actually changes.
    pub(crate) fn set_status(&self, status: ChannelStatus, ctx: &ChannelCtx) {
        let old = self.status.store(status);
        if old != status {
            self.lightning.send_status(ctx.midi_out, ctx.midimap, status);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status().is_playing()
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Gain for output side 0 (left) or 1 (right). Centre is unity on both.
    pub fn pan_gain(&self, side: usize) -> f32 {
        if self.pan == 0.5 {
            1.0
        } else if side == 0 {
            1.0 - self.pan
        } else {
            self.pan
        }
    }

    pub fn is_muted(&self) -> bool {
        self.mute || self.mute_i
    }
}

#[derive(Debug)]
pub enum Payload {
    Sample(SampleData),
    Midi(MidiData),
}

#[derive(Debug)]
pub struct Channel {
    pub core: ChannelCore,
    pub payload: Payload,
    pub plugins: PluginStack,
    /// Interleaved stereo scratch the channel renders into each buffer.
    buffer: Vec<f32>,
}

impl Channel {
    pub fn new_sample(id: ChannelId, buffer_frames: usize) -> Self {
        Self {
            core: ChannelCore::new(id, format!("sample {}", id), ChannelStatus::Empty),
            payload: Payload::Sample(SampleData::new()),
            plugins: PluginStack::new(buffer_frames),
            buffer: vec![0.0; buffer_frames * 2],
        }
    }

    pub fn new_midi(id: ChannelId, buffer_frames: usize) -> Self {
        Self {
            core: ChannelCore::new(id, format!("midi {}", id), ChannelStatus::Off),
            payload: Payload::Midi(MidiData::new()),
            plugins: PluginStack::new(buffer_frames),
            buffer: vec![0.0; buffer_frames * 2],
        }
    }

    pub fn new(kind: ChannelKind, id: ChannelId, buffer_frames: usize) -> Self {
        match kind {
            ChannelKind::Sample => Self::new_sample(id, buffer_frames),
            ChannelKind::Midi => Self::new_midi(id, buffer_frames),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.core.id
    }

    pub fn kind(&self) -> ChannelKind {
        match self.payload {
            Payload::Sample(_) => ChannelKind::Sample,
            Payload::Midi(_) => ChannelKind::Midi,
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.core.status()
    }

    /// Shared handle for lock-free status polling (meters, pad lights).
    pub fn status_handle(&self) -> Arc<AtomicStatus> {
        Arc::clone(&self.core.status)
    }

    pub fn sample(&self) -> Option<&SampleData> {
        match &self.payload {
            Payload::Sample(s) => Some(s),
            Payload::Midi(_) => None,
        }
    }

    pub fn sample_mut(&mut self) -> Option<&mut SampleData> {
        match &mut self.payload {
            Payload::Sample(s) => Some(s),
            Payload::Midi(_) => None,
        }
    }

    pub fn midi(&self) -> Option<&MidiData> {
        match &self.payload {
            Payload::Midi(m) => Some(m),
            Payload::Sample(_) => None,
        }
    }

    pub fn midi_mut(&mut self) -> Option<&mut MidiData> {
        match &mut self.payload {
            Payload::Midi(m) => Some(m),
            Payload::Sample(_) => None,
        }
    }

    pub fn is_loop(&self) -> bool {
        self.sample().is_some_and(|s| s.mode.is_loop())
    }

    pub fn mode(&self) -> Option<ChannelMode> {
        self.sample().map(|s| s.mode)
    }

    /// Whether a live action on this channel should be recorded now.
    pub fn can_rec(&self, ctx: &ChannelCtx) -> bool {
        if !ctx.rec_armed {
            return false;
        }
        match &self.payload {
            Payload::Sample(s) => s.has_wave(),
            Payload::Midi(_) => true,
        }
    }

    /// Armed sample channel without a wave: a target for input recording.
    pub fn can_input_rec(&self) -> bool {
        self.core.armed && self.sample().is_some_and(|s| !s.has_wave())
    }

    /// Start (or toggle) playback. `do_quantize` lets one-shots defer to the
    /// next quanto; `force` starts loops immediately instead of waiting for
    /// the first beat.
    pub fn start(&mut self, ctx: &mut ChannelCtx, do_quantize: bool, force: bool) {
        match &mut self.payload {
            Payload::Sample(s) => s.start(&mut self.core, ctx, do_quantize, force),
            Payload::Midi(m) => m.start(&mut self.core, ctx),
        }
    }

    /// Key release.
    pub fn stop(&mut self, ctx: &mut ChannelCtx) {
        if let Payload::Sample(s) = &mut self.payload {
            s.stop(&mut self.core, ctx);
        }
    }

    pub fn kill(&mut self, ctx: &mut ChannelCtx) {
        match &mut self.payload {
            Payload::Sample(s) => s.kill(&mut self.core, ctx),
            Payload::Midi(m) => m.kill(&mut self.core, ctx),
        }
    }

    pub fn quantize(&mut self, ctx: &mut ChannelCtx) {
        if let Payload::Sample(s) = &mut self.payload {
            s.quantize(&mut self.core, ctx);
        }
    }

    pub fn on_bar(&mut self, ctx: &mut ChannelCtx) {
        if let Payload::Sample(s) = &mut self.payload {
            s.on_bar(&mut self.core, ctx);
        }
    }

    /// First beat of the loop: WAIT and ENDING resolve here.
    pub fn on_zero(&mut self, ctx: &mut ChannelCtx) {
        match &mut self.payload {
            Payload::Sample(s) => s.on_zero(&mut self.core, ctx),
            Payload::Midi(m) => m.on_zero(&mut self.core, ctx),
        }
        self.resolve_rec_status(ctx);
    }

    fn resolve_rec_status(&mut self, ctx: &mut ChannelCtx) {
        match self.core.rec_status {
            RecStatus::Ending => {
                self.core.rec_status = RecStatus::Stopped;
                self.set_read_actions(false, ctx);
            }
            RecStatus::Waiting => {
                self.core.rec_status = RecStatus::Reading;
                self.set_read_actions(true, ctx);
            }
            RecStatus::Reading | RecStatus::Stopped => {}
        }
    }

    /// Replay a recorded action exactly as the live gesture would apply.
    pub fn parse_action(&mut self, scheduled: &ScheduledAction, ctx: &mut ChannelCtx) {
        if !self.core.read_actions {
            return;
        }
        match &mut self.payload {
            Payload::Sample(s) => s.parse_action(&mut self.core, scheduled, ctx),
            Payload::Midi(m) => m.parse_action(&mut self.core, &scheduled.action, ctx),
        }
    }

    /// Transport rewind.
    pub fn rewind(&mut self, ctx: &mut ChannelCtx) {
        match &mut self.payload {
            Payload::Sample(s) => s.rewind(&mut self.core),
            Payload::Midi(m) => m.all_notes_off(ctx),
        }
    }

    /// Transport stopped.
    pub fn stop_by_seq(&mut self, ctx: &mut ChannelCtx) {
        match &mut self.payload {
            Payload::Sample(s) => s.stop_by_seq(&mut self.core, ctx),
            Payload::Midi(m) => m.kill(&mut self.core, ctx),
        }
    }

    pub fn set_read_actions(&mut self, value: bool, ctx: &mut ChannelCtx) {
        self.core.read_actions = value;
        if !value && ctx.behavior.recs_stop_on_chan_halt {
            self.kill(ctx);
        }
    }

    /// Start replaying actions, now or on the next first beat.
    pub fn start_reading_actions(&mut self, ctx: &mut ChannelCtx) {
        if ctx.behavior.treat_recs_as_loops {
            self.core.rec_status = RecStatus::Waiting;
        } else {
            self.set_read_actions(true, ctx);
        }
    }

    /// Stop replaying actions, now or on the next first beat.
    pub fn stop_reading_actions(&mut self, ctx: &mut ChannelCtx) {
        if !ctx.clock.is_running() {
            self.core.rec_status = RecStatus::Stopped;
            self.core.read_actions = false;
        } else if ctx.behavior.treat_recs_as_loops {
            self.core.rec_status = RecStatus::Ending;
        } else {
            self.set_read_actions(false, ctx);
        }
    }

    pub fn toggle_read_actions(&mut self, ctx: &mut ChannelCtx) {
        if !self.core.has_actions {
            return;
        }
        if self.core.read_actions || self.core.rec_status == RecStatus::Waiting {
            self.stop_reading_actions(ctx);
        } else {
            self.start_reading_actions(ctx);
        }
    }

    /// User mute (or recorded mute with `internal`).
    pub fn set_mute(&mut self, internal: bool, ctx: &mut ChannelCtx) {
        match &mut self.payload {
            Payload::Sample(s) => s.set_mute(&mut self.core, internal),
            Payload::Midi(m) => m.set_mute(&mut self.core, internal, ctx),
        }
        self.core
            .lightning
            .send_mute(ctx.midi_out, ctx.midimap, self.core.mute);
    }

    pub fn unset_mute(&mut self, internal: bool, ctx: &mut ChannelCtx) {
        match &mut self.payload {
            Payload::Sample(s) => s.unset_mute(&mut self.core, internal),
            Payload::Midi(_) => {
                if internal {
                    self.core.mute_i = false;
                } else {
                    self.core.mute = false;
                }
            }
        }
        self.core
            .lightning
            .send_mute(ctx.midi_out, ctx.midimap, self.core.mute);
    }

    pub fn set_solo(&mut self, solo: bool, ctx: &ChannelCtx) {
        self.core.solo = solo;
        self.core.lightning.send_solo(ctx.midi_out, ctx.midimap, solo);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.core.volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.core.pan = pan.clamp(0.0, 1.0);
    }

    /// Forward an incoming message to an armed MIDI channel.
    pub fn receive_midi(&mut self, event: MidiEvent, ctx: &mut ChannelCtx) {
        let can_rec = self.can_rec(ctx);
        if let Payload::Midi(m) = &mut self.payload {
            m.receive_midi(&mut self.core, event, can_rec, ctx);
        }
    }

    /// Replace the wave. Status goes to OFF, or EMPTY without a wave.
    pub fn set_wave(&mut self, wave: Option<Wave>, ctx: &ChannelCtx) {
        if let Payload::Sample(s) = &mut self.payload {
            let status = if wave.is_some() {
                ChannelStatus::Off
            } else {
                ChannelStatus::Empty
            };
            if let Some(w) = &wave {
                self.core.name = w.name().to_string();
            }
            s.set_wave(wave);
            self.core.set_status(status, ctx);
        }
    }

    /// Mark the wave as unreadable, keeping the channel in place.
    pub fn set_wave_error(&mut self, status: ChannelStatus, ctx: &ChannelCtx) {
        if let Payload::Sample(s) = &mut self.payload {
            s.set_wave(None);
            self.core.set_status(status, ctx);
        }
    }

    pub(crate) fn ensure_buffer(&mut self, frames: usize) {
        if self.buffer.len() < frames * 2 {
            self.buffer.resize(frames * 2, 0.0);
        }
    }

    /// Zero the render buffer for a new audio block.
    pub fn clear_buffer(&mut self, frames: usize) {
        self.ensure_buffer(frames);
        self.buffer[..frames * 2].fill(0.0);
    }

    /// Render frame `frame` of the current block into the channel buffer.
    pub fn sum(&mut self, frame: usize, running: bool, ctx: &mut ChannelCtx) {
        if let Payload::Sample(s) = &mut self.payload {
            s.sum(&mut self.core, &mut self.buffer, frame, running, ctx);
        }
    }

    /// Input monitor, plugin stack, then mix into `out` with volume and pan.
    pub fn process(&mut self, out: &mut [f32], input: Option<&[f32]>, frames: usize) {
        let n = frames * 2;
        let buf = &mut self.buffer[..n];
        match &mut self.payload {
            Payload::Sample(s) => {
                if let Some(input) = input {
                    if self.core.armed && s.input_monitor {
                        for (b, i) in buf.iter_mut().zip(input) {
                            *b += i;
                        }
                    }
                }
                self.plugins.process(buf, &[]);
                let boost = s.boost();
                let gain_l = self.core.volume * self.core.pan_gain(0) * boost;
                let gain_r = self.core.volume * self.core.pan_gain(1) * boost;
                for (o, b) in out[..n].chunks_exact_mut(2).zip(buf.chunks_exact(2)) {
                    o[0] += b[0] * gain_l;
                    o[1] += b[1] * gain_r;
                }
            }
            Payload::Midi(m) => {
                self.plugins.process(buf, m.pending_events());
                m.clear_events();
                let gain = self.core.volume;
                for (o, b) in out[..n].iter_mut().zip(buf.iter()) {
                    *o += b * gain;
                }
            }
        }
    }

    /// Copy of this channel under a new id. Plugins are cloned by the caller.
    pub fn duplicate(&self, id: ChannelId, buffer_frames: usize) -> Channel {
        let payload = match &self.payload {
            Payload::Sample(s) => Payload::Sample(s.duplicate()),
            Payload::Midi(m) => Payload::Midi(m.duplicate()),
        };
        let mut core = ChannelCore::new(id, self.core.name.clone(), self.status_at_rest());
        core.volume = self.core.volume;
        core.pan = self.core.pan;
        core.mute = self.core.mute;
        core.armed = false;
        core.has_actions = self.core.has_actions;
        core.read_actions = self.core.read_actions;
        core.midi_in = self.core.midi_in;
        core.lightning = self.core.lightning;
        Channel {
            core,
            payload,
            plugins: PluginStack::new(buffer_frames),
            buffer: vec![0.0; buffer_frames * 2],
        }
    }

    fn status_at_rest(&self) -> ChannelStatus {
        match self.status() {
            s if s.is_unplayable() => s,
            _ => ChannelStatus::Off,
        }
    }
}
