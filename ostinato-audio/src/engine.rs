//! Shared engine state and the control-side operations on it.
//!
//! [`Engine`] is built once and shared (`Arc`) between the audio callback,
//! the MIDI input thread and the control thread. Hot transport values and
//! mixer switches are atomics. The channel rack, the action log and each
//! master plugin stack sit behind their own [`RtMutex`]; no code path holds
//! two of them at once. Recorder writes produced while the rack is locked
//! are queued as [`RecOp`]s and applied after the rack is released. The
//! audio thread never takes the recorder for writing: its ops go through
//! [`RecQueue`] and are applied by [`Engine::lock_recorder`] or
//! [`Engine::sync_recorder`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::MutexGuard;
use std::time::Duration;

use ostinato_types::transport::MAX_BEATS;
use ostinato_types::{
    ActionMask, ChannelId, ChannelKind, ChannelMode, ChannelStatus, MidiSyncMode, PluginId,
    StackType,
};

use crate::channel::{Channel, ChannelCtx, RecSink};
use crate::clock::{clamp_bpm, Clock};
use crate::lightning::MidiMap;
use crate::midi_out::MidiOut;
use crate::midi_sync::MidiSync;
use crate::plugin_host::{MasterStack, PluginHost, PluginLoader, PluginSnapshot, PluginStack};
use crate::recorder::{ActionRecorder, RecOp, RecQueue};
use crate::rt_lock::RtMutex;
use crate::telemetry::TelemetrySummary;
use crate::wave::Wave;

/// Behaviour switches read by channel operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Behavior {
    pub chans_stop_on_seq_halt: bool,
    pub treat_recs_as_loops: bool,
    pub recs_stop_on_chan_halt: bool,
    pub input_monitor_default: bool,
}

/// Engine parameters fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub sample_rate: u32,
    pub buffer_frames: usize,
    pub delay_compensation: u32,
    pub limit_output: bool,
    pub behavior: Behavior,
    pub sync: MidiSyncMode,
    pub mtc_fps: u32,
    pub bpm: f32,
    pub beats: u32,
    pub bars: u32,
    pub quantize: u32,
    pub metronome: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_frames: 1024,
            delay_compensation: 0,
            limit_output: false,
            behavior: Behavior::default(),
            sync: MidiSyncMode::None,
            mtc_fps: 25,
            bpm: 120.0,
            beats: 4,
            bars: 1,
            quantize: 0,
            metronome: false,
        }
    }
}

#[derive(Debug, Default)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// Mixer switches and meters, all lock-free.
#[derive(Debug)]
pub struct MixerControls {
    ready: AtomicBool,
    metronome: AtomicBool,
    rewind_wait: AtomicBool,
    in_to_out: AtomicBool,
    input_recording: AtomicBool,
    action_rec: AtomicBool,
    out_vol: AtomicF32,
    in_vol: AtomicF32,
    peak_out: AtomicF32,
    peak_in: AtomicF32,
    dropped_actions: AtomicU64,
    telemetry: TelemetryCell,
}

impl Default for MixerControls {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(true),
            metronome: AtomicBool::new(false),
            rewind_wait: AtomicBool::new(false),
            in_to_out: AtomicBool::new(false),
            input_recording: AtomicBool::new(false),
            action_rec: AtomicBool::new(false),
            out_vol: AtomicF32::new(1.0),
            in_vol: AtomicF32::new(1.0),
            peak_out: AtomicF32::new(0.0),
            peak_in: AtomicF32::new(0.0),
            dropped_actions: AtomicU64::new(0),
            telemetry: TelemetryCell::default(),
        }
    }
}

impl MixerControls {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Unready mixers render silence; used while the rack is rebuilt.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn metronome(&self) -> bool {
        self.metronome.load(Ordering::Relaxed)
    }

    pub fn set_metronome(&self, on: bool) {
        self.metronome.store(on, Ordering::Relaxed);
    }

    pub fn rewind_pending(&self) -> bool {
        self.rewind_wait.load(Ordering::Acquire)
    }

    pub(crate) fn set_rewind_wait(&self) {
        self.rewind_wait.store(true, Ordering::Release);
    }

    /// Consume a pending quantized rewind.
    pub(crate) fn take_rewind_wait(&self) -> bool {
        self.rewind_wait.swap(false, Ordering::AcqRel)
    }

    pub fn in_to_out(&self) -> bool {
        self.in_to_out.load(Ordering::Relaxed)
    }

    pub fn set_in_to_out(&self, on: bool) {
        self.in_to_out.store(on, Ordering::Relaxed);
    }

    pub fn input_recording(&self) -> bool {
        self.input_recording.load(Ordering::Acquire)
    }

    pub fn action_rec(&self) -> bool {
        self.action_rec.load(Ordering::Acquire)
    }

    pub fn out_volume(&self) -> f32 {
        self.out_vol.load()
    }

    pub fn set_out_volume(&self, v: f32) {
        self.out_vol.store(v.clamp(0.0, 1.0));
    }

    pub fn in_volume(&self) -> f32 {
        self.in_vol.load()
    }

    pub fn set_in_volume(&self, v: f32) {
        self.in_vol.store(v.clamp(0.0, 1.0));
    }

    pub fn peak_out(&self) -> f32 {
        self.peak_out.load()
    }

    pub fn peak_in(&self) -> f32 {
        self.peak_in.load()
    }

    pub(crate) fn set_peaks(&self, out: f32, input: f32) {
        self.peak_out.store(out);
        self.peak_in.store(input);
    }

    /// Recorded actions that did not fit a buffer's schedule.
    pub fn dropped_actions(&self) -> u64 {
        self.dropped_actions.load(Ordering::Relaxed)
    }

    pub(crate) fn record_dropped_actions(&self, n: usize) {
        if n > 0 {
            self.dropped_actions.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub fn telemetry(&self) -> TelemetrySummary {
        self.telemetry.load()
    }

    pub(crate) fn publish_telemetry(&self, summary: &TelemetrySummary) {
        self.telemetry.store(summary);
    }
}

/// Last published audio telemetry.
#[derive(Debug, Default)]
struct TelemetryCell {
    avg_us: AtomicU32,
    max_us: AtomicU32,
    p95_us: AtomicU32,
    overruns: AtomicU64,
    lock_misses: AtomicU64,
}

impl TelemetryCell {
    fn store(&self, s: &TelemetrySummary) {
        self.avg_us.store(s.avg_us, Ordering::Relaxed);
        self.max_us.store(s.max_us, Ordering::Relaxed);
        self.p95_us.store(s.p95_us, Ordering::Relaxed);
        self.overruns.store(s.overruns, Ordering::Relaxed);
        self.lock_misses.store(s.lock_misses, Ordering::Relaxed);
    }

    fn load(&self) -> TelemetrySummary {
        TelemetrySummary {
            avg_us: self.avg_us.load(Ordering::Relaxed),
            max_us: self.max_us.load(Ordering::Relaxed),
            p95_us: self.p95_us.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            lock_misses: self.lock_misses.load(Ordering::Relaxed),
        }
    }
}

/// Input being recorded into a loop-length buffer.
#[derive(Debug)]
pub struct InputTake {
    buffer: Vec<f32>,
    frames: usize,
    tracker: usize,
    /// Frames skipped so far for delay compensation.
    waited: u32,
}

impl InputTake {
    fn new(frames: usize, start: usize) -> Self {
        Self {
            buffer: vec![0.0; frames * 2],
            frames,
            tracker: start.min(frames.saturating_sub(1)),
            waited: 0,
        }
    }

    /// Add one input frame, after `delay` frames have been skipped.
    #[inline]
    pub(crate) fn write(&mut self, l: f32, r: f32, delay: u32) {
        if self.waited < delay {
            self.waited += 1;
            return;
        }
        if self.frames == 0 {
            return;
        }
        let i = self.tracker * 2;
        self.buffer[i] += l;
        self.buffer[i + 1] += r;
        self.tracker += 1;
        if self.tracker >= self.frames {
            self.tracker = 0;
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

/// Everything behind the channel lock.
#[derive(Debug, Default)]
pub struct ChannelRack {
    pub channels: Vec<Channel>,
    pub(crate) take: Option<InputTake>,
    take_count: u32,
}

impl ChannelRack {
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id() == id)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id() == id)
    }

    pub fn is_recording_input(&self) -> bool {
        self.take.is_some()
    }
}

/// A read-only view of one channel for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub status: ChannelStatus,
    pub mode: Option<ChannelMode>,
    pub volume: f32,
    pub mute: bool,
    pub solo: bool,
    pub armed: bool,
    pub has_actions: bool,
    pub read_actions: bool,
    pub wave_frames: Option<usize>,
    pub plugins: usize,
}

pub struct Engine {
    pub settings: EngineSettings,
    pub clock: Clock,
    pub controls: MixerControls,
    pub rack: RtMutex<ChannelRack>,
    pub recorder: RtMutex<ActionRecorder>,
    /// Recorder writes made by the audio thread.
    pub rec_queue: RecQueue,
    pub plugins: PluginHost,
    pub midi_out: MidiOut,
    pub sync: MidiSync,
    pub midimap: MidiMap,
    next_channel: AtomicU32,
}

impl Engine {
    pub fn new(settings: EngineSettings, midimap: MidiMap, loader: Box<dyn PluginLoader>) -> Self {
        let clock = Clock::new(
            settings.sample_rate,
            settings.bpm,
            settings.beats,
            settings.bars,
            settings.quantize,
        );
        let controls = MixerControls::default();
        controls.set_metronome(settings.metronome);
        let plugins = PluginHost::new(loader, settings.sample_rate, settings.buffer_frames);
        let sync = MidiSync::new(settings.sync, settings.mtc_fps);
        Self {
            clock,
            controls,
            rack: RtMutex::new(ChannelRack::default()),
            recorder: RtMutex::new(ActionRecorder::new()),
            rec_queue: RecQueue::default(),
            plugins,
            midi_out: MidiOut::default(),
            sync,
            midimap,
            next_channel: AtomicU32::new(1),
            settings,
        }
    }

    /// Live gestures are recorded: action rec is on, the transport runs and
    /// no input take is in progress.
    pub fn rec_armed(&self) -> bool {
        self.controls.action_rec() && self.clock.is_running() && !self.controls.input_recording()
    }

    pub fn channel_ctx<'a>(&'a self, rec_ops: &'a mut Vec<RecOp>) -> ChannelCtx<'a> {
        self.ctx_with(RecSink::Buffer(rec_ops))
    }

    /// Context for the audio callback: recorder writes go to [`RecQueue`].
    pub fn audio_ctx(&self) -> ChannelCtx<'_> {
        self.ctx_with(RecSink::Queue(&self.rec_queue))
    }

    fn ctx_with<'a>(&'a self, rec_ops: RecSink<'a>) -> ChannelCtx<'a> {
        ChannelCtx {
            clock: &self.clock,
            midi_out: &self.midi_out,
            midimap: &self.midimap,
            behavior: &self.settings.behavior,
            rec_armed: self.rec_armed(),
            rec_ops,
        }
    }

    /// Take the recorder with every write the audio thread queued so far
    /// applied. Control-side reads and writes go through here.
    pub fn lock_recorder(&self) -> MutexGuard<'_, ActionRecorder> {
        let mut recorder = self.recorder.lock();
        self.rec_queue.drain_into(
            &mut recorder,
            self.clock.total_frames(),
            self.settings.buffer_frames as u32,
        );
        recorder
    }

    /// Wait up to `timeout` for audio-thread recorder writes and apply them.
    /// Returns how many were applied.
    pub fn sync_recorder(&self, timeout: Duration) -> usize {
        let Some(first) = self.rec_queue.recv_timeout(timeout) else {
            return 0;
        };
        let total = self.clock.total_frames();
        let buffer = self.settings.buffer_frames as u32;
        let mut recorder = self.recorder.lock();
        recorder.apply(first, total, buffer);
        1 + self.rec_queue.drain_into(&mut recorder, total, buffer)
    }

    /// Apply queued recorder writes. Never call with the rack locked.
    pub fn apply_rec_ops<I: IntoIterator<Item = RecOp>>(&self, ops: I) {
        let mut ops = ops.into_iter().peekable();
        if ops.peek().is_none() {
            return;
        }
        let total = self.clock.total_frames();
        let buffer = self.settings.buffer_frames as u32;
        let mut recorder = self.lock_recorder();
        for op in ops {
            recorder.apply(op, total, buffer);
        }
    }

    /// Run `f` with the rack locked, then flush its recorder writes.
    pub fn with_rack<R>(&self, f: impl FnOnce(&mut ChannelRack, &mut ChannelCtx) -> R) -> R {
        let mut ops = Vec::new();
        let result = {
            let mut rack = self.rack.lock();
            let mut ctx = self.channel_ctx(&mut ops);
            f(&mut rack, &mut ctx)
        };
        self.apply_rec_ops(ops);
        result
    }

    pub fn with_channel<R>(
        &self,
        id: ChannelId,
        f: impl FnOnce(&mut Channel, &mut ChannelCtx) -> R,
    ) -> Result<R, String> {
        self.with_rack(|rack, ctx| match rack.get_mut(id) {
            Some(ch) => Ok(f(ch, ctx)),
            None => Err(format!("No channel {}", id)),
        })
    }

    // Channels

    pub fn add_channel(&self, kind: ChannelKind) -> ChannelId {
        let id = ChannelId::new(self.next_channel.fetch_add(1, Ordering::Relaxed));
        let mut channel = Channel::new(kind, id, self.settings.buffer_frames);
        if let Some(s) = channel.sample_mut() {
            s.input_monitor = self.settings.behavior.input_monitor_default;
        }
        self.rack.lock().channels.push(channel);
        log::info!(target: "engine", "added {:?} channel {}", kind, id);
        id
    }

    pub fn delete_channel(&self, id: ChannelId) -> Result<(), String> {
        let removed = {
            let mut rack = self.rack.lock();
            let index = rack
                .channels
                .iter()
                .position(|c| c.id() == id)
                .ok_or_else(|| format!("No channel {}", id))?;
            rack.channels.remove(index)
        };
        drop(removed);
        self.lock_recorder().clear_channel(id);
        Ok(())
    }

    /// Copy a channel with its wave, plugins and recorded actions.
    pub fn clone_channel(&self, id: ChannelId) -> Result<ChannelId, String> {
        let new_id = ChannelId::new(self.next_channel.fetch_add(1, Ordering::Relaxed));
        let (mut copy, snapshots) = {
            let rack = self.rack.lock();
            let src = rack.get(id).ok_or_else(|| format!("No channel {}", id))?;
            let snapshots: Vec<PluginSnapshot> = src.plugins.iter().map(|p| p.snapshot()).collect();
            (src.duplicate(new_id, self.settings.buffer_frames), snapshots)
        };
        for snapshot in &snapshots {
            copy.plugins.push(self.plugins.instantiate(snapshot));
        }
        self.rack.lock().channels.push(copy);

        let mut recorder = self.lock_recorder();
        let actions: Vec<_> = recorder
            .actions()
            .iter()
            .filter(|a| a.channel == id)
            .map(|a| ostinato_types::Action {
                channel: new_id,
                ..*a
            })
            .collect();
        for a in actions {
            recorder.rec(a);
        }
        Ok(new_id)
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.rack.lock().channels.iter().map(Channel::id).collect()
    }

    pub fn channel_infos(&self) -> Vec<ChannelInfo> {
        let rack = self.rack.lock();
        rack.channels
            .iter()
            .map(|c| ChannelInfo {
                id: c.id(),
                name: c.core.name.clone(),
                kind: c.kind(),
                status: c.status(),
                mode: c.mode(),
                volume: c.core.volume,
                mute: c.core.mute,
                solo: c.core.solo,
                armed: c.core.armed,
                has_actions: c.core.has_actions,
                read_actions: c.core.read_actions,
                wave_frames: c.sample().and_then(|s| s.wave()).map(Wave::frames),
                plugins: c.plugins.len(),
            })
            .collect()
    }

    /// No channel is playing.
    pub fn is_silent(&self) -> bool {
        !self.rack.lock().channels.iter().any(|c| c.status() == ChannelStatus::Play)
    }

    pub fn load_wave(&self, id: ChannelId, path: &Path) -> Result<(), String> {
        let wave = match Wave::load(path) {
            Ok(w) => w,
            Err(e) => {
                self.with_channel(id, |ch, ctx| ch.set_wave_error(ChannelStatus::Wrong, ctx))?;
                return Err(e);
            }
        };
        self.with_channel(id, |ch, ctx| {
            if ch.kind() != ChannelKind::Sample {
                return Err(format!("Channel {} is not a sample channel", id));
            }
            ch.set_wave(Some(wave), ctx);
            Ok(())
        })?
    }

    pub fn free_wave(&self, id: ChannelId) -> Result<(), String> {
        let old = self.with_channel(id, |ch, ctx| {
            ch.kill(ctx);
            let old = ch.sample_mut().and_then(|s| s.take_wave());
            ch.set_wave(None, ctx);
            old
        })?;
        drop(old);
        Ok(())
    }

    pub fn save_wave(&self, id: ChannelId, path: &Path) -> Result<(), String> {
        let wave = self
            .with_channel(id, |ch, _| ch.sample().and_then(|s| s.wave()).cloned())?
            .ok_or_else(|| format!("Channel {} has no wave", id))?;
        wave.save(path)
    }

    /// Solo on/off. The first solo saves every mute state and mutes the
    /// others; clearing the last solo restores them.
    pub fn toggle_solo(&self, id: ChannelId) -> Result<bool, String> {
        self.with_rack(|rack, ctx| {
            let target = rack
                .get(id)
                .map(|c| !c.core.solo)
                .ok_or_else(|| format!("No channel {}", id))?;
            let session_open = rack.channels.iter().any(|c| c.core.solo);

            if target && !session_open {
                for ch in &mut rack.channels {
                    ch.core.mute_s = ch.core.mute;
                }
            }
            if let Some(ch) = rack.get_mut(id) {
                ch.set_solo(target, ctx);
            }

            if rack.channels.iter().any(|c| c.core.solo) {
                for ch in &mut rack.channels {
                    if ch.core.solo {
                        if ch.core.mute {
                            ch.unset_mute(false, ctx);
                        }
                    } else if !ch.core.mute {
                        ch.set_mute(false, ctx);
                    }
                }
            } else {
                for ch in &mut rack.channels {
                    let saved = ch.core.mute_s;
                    if saved && !ch.core.mute {
                        ch.set_mute(false, ctx);
                    } else if !saved && ch.core.mute {
                        ch.unset_mute(false, ctx);
                    }
                }
            }
            Ok(target)
        })
    }

    // Plugins

    pub fn add_plugin(&self, stack: StackType, uid: &str) -> Result<PluginId, String> {
        let slot = self.plugins.create(uid);
        let id = slot.id;
        match stack {
            StackType::MasterOut => self.plugins.master(MasterStack::Out).lock().push(slot),
            StackType::MasterIn => self.plugins.master(MasterStack::In).lock().push(slot),
            StackType::Channel(ch) => self.with_channel(ch, |c, _| c.plugins.push(slot))?,
        }
        Ok(id)
    }

    fn with_stack<R>(
        &self,
        stack: StackType,
        f: impl FnOnce(&mut PluginStack) -> R,
    ) -> Result<R, String> {
        match stack {
            StackType::MasterOut => Ok(f(&mut self.plugins.master(MasterStack::Out).lock())),
            StackType::MasterIn => Ok(f(&mut self.plugins.master(MasterStack::In).lock())),
            StackType::Channel(ch) => self.with_channel(ch, |c, _| f(&mut c.plugins)),
        }
    }

    pub fn free_plugin(&self, stack: StackType, plugin: PluginId) -> Result<(), String> {
        let slot = self
            .with_stack(stack, |s| s.remove(plugin))?
            .ok_or_else(|| format!("Plugin {} not in stack", plugin))?;
        drop(slot);
        Ok(())
    }

    pub fn swap_plugins(&self, stack: StackType, a: PluginId, b: PluginId) -> Result<(), String> {
        self.with_stack(stack, |s| s.swap(a, b))?
    }

    pub fn clone_plugin(&self, stack: StackType, plugin: PluginId) -> Result<PluginId, String> {
        let snapshot = self
            .with_stack(stack, |s| s.by_id(plugin).map(|p| p.snapshot()))?
            .ok_or_else(|| format!("Plugin {} not in stack", plugin))?;
        let slot = self.plugins.instantiate(&snapshot);
        let id = slot.id;
        self.with_stack(stack, |s| s.push(slot))?;
        Ok(id)
    }

    pub fn count_plugins(&self, stack: StackType) -> Result<usize, String> {
        self.with_stack(stack, |s| s.len())
    }

    /// (id, name) for each slot in order.
    pub fn stack_contents(&self, stack: StackType) -> Result<Vec<(PluginId, String)>, String> {
        self.with_stack(stack, |s| s.iter().map(|p| (p.id, p.name().to_string())).collect())
    }

    /// Find a plugin in any stack and run `f` on its slot.
    pub fn with_plugin<R>(
        &self,
        plugin: PluginId,
        f: impl FnOnce(&mut crate::plugin_host::PluginSlot) -> R,
    ) -> Result<R, String> {
        let mut f = Some(f);
        for master in [MasterStack::Out, MasterStack::In] {
            let mut stack = self.plugins.master(master).lock();
            if let Some(slot) = stack.by_id_mut(plugin) {
                if let Some(f) = f.take() {
                    return Ok(f(slot));
                }
            }
        }
        self.with_rack(|rack, _| {
            for ch in &mut rack.channels {
                if let Some(slot) = ch.plugins.by_id_mut(plugin) {
                    if let Some(f) = f.take() {
                        return Ok(f(slot));
                    }
                }
            }
            Err(format!("No plugin {}", plugin))
        })
    }

    pub fn set_plugin_param(&self, plugin: PluginId, index: usize, value: f32) -> Result<(), String> {
        self.with_plugin(plugin, |slot| slot.set_param(index, value))
    }

    pub fn free_all_stacks(&self) {
        self.plugins.free_masters();
        let slots: Vec<_> = self.with_rack(|rack, _| {
            rack.channels
                .iter_mut()
                .flat_map(|c| c.plugins.take_all())
                .collect()
        });
        drop(slots);
    }

    // Transport

    pub fn start_transport(&self) {
        self.clock.start();
        self.sync.on_start(&self.midi_out);
        log::debug!(target: "engine", "transport started");
    }

    /// Halt the clock, let channels react, and end any recording.
    pub fn stop_transport(&self) {
        self.clock.stop();
        self.sync.on_stop(&self.midi_out);
        if self.controls.action_rec() {
            self.stop_action_rec();
        }
        if self.controls.input_recording() {
            self.stop_input_rec();
        }
        self.with_rack(|rack, ctx| {
            for ch in &mut rack.channels {
                ch.stop_by_seq(ctx);
            }
        });
        log::debug!(target: "engine", "transport stopped");
    }

    pub fn toggle_transport(&self) {
        if self.clock.is_running() {
            self.stop_transport();
        } else {
            self.start_transport();
        }
    }

    /// Rewind now, or on the next quanto when quantizing while running.
    pub fn rewind(&self) {
        if self.clock.quantize() > 0 && self.clock.is_running() {
            self.controls.set_rewind_wait();
        } else {
            self.with_rack(|rack, ctx| self.rewind_now(rack, ctx));
        }
    }

    /// Rewind clock, sync and channels. Caller holds the rack.
    pub(crate) fn rewind_now(&self, rack: &mut ChannelRack, ctx: &mut ChannelCtx) {
        self.clock.rewind();
        self.sync.on_rewind(&self.midi_out);
        if self.clock.is_running() {
            for ch in &mut rack.channels {
                ch.rewind(ctx);
            }
        }
    }

    pub fn set_bpm(&self, bpm: f32) -> Result<f32, String> {
        if self.controls.input_recording() {
            return Err("Failed to set bpm: input recording in progress".to_string());
        }
        let old = self.clock.bpm();
        let new = clamp_bpm(bpm);
        self.clock.set_bpm(new);
        let quanto = self.clock.quanto();
        self.lock_recorder().update_bpm(old, new, quanto);
        log::info!(target: "engine", "bpm {} -> {}", old, new);
        Ok(new)
    }

    /// Change the meter. Bars are fitted so they divide beats. With
    /// `expand`, recorded actions are repeated into a longer loop or
    /// dropped from a shorter one.
    pub fn set_beats(&self, beats: u32, bars: u32, expand: bool) -> Result<(u32, u32), String> {
        if self.controls.input_recording() {
            return Err("Failed to set beats: input recording in progress".to_string());
        }
        let beats = beats.clamp(1, MAX_BEATS);
        let bars = fit_bars(beats, bars);
        let old_total = self.clock.total_frames();
        self.clock.set_meter(beats, bars);
        let new_total = self.clock.total_frames();
        if expand {
            let mut recorder = self.lock_recorder();
            if new_total > old_total {
                recorder.expand(old_total, new_total);
            } else if new_total < old_total {
                recorder.shrink(new_total);
            }
        }
        Ok((beats, bars))
    }

    pub fn beats_multiply(&self) -> Result<(u32, u32), String> {
        self.set_beats(self.clock.beats() * 2, self.clock.bars(), false)
    }

    pub fn beats_divide(&self) -> Result<(u32, u32), String> {
        self.set_beats((self.clock.beats() / 2).max(1), self.clock.bars(), false)
    }

    pub fn set_quantize(&self, quantize: u32) {
        self.clock.set_quantize(quantize);
    }

    pub fn toggle_metronome(&self) -> bool {
        let on = !self.controls.metronome();
        self.controls.set_metronome(on);
        on
    }

    // Recording

    pub fn toggle_action_rec(&self) -> bool {
        if self.controls.action_rec() {
            self.stop_action_rec();
            false
        } else {
            self.start_action_rec();
            true
        }
    }

    pub fn start_action_rec(&self) {
        self.controls.action_rec.store(true, Ordering::Release);
        if !self.clock.is_running() {
            self.start_transport();
        }
    }

    /// Stop recording and let channels with fresh actions replay them.
    pub fn stop_action_rec(&self) {
        self.controls.action_rec.store(false, Ordering::Release);
        let frame = self.clock.current_frame();
        let with_actions: Vec<ChannelId> = {
            let mut recorder = self.lock_recorder();
            if recorder.overdub().is_some() {
                recorder.stop_overdub(frame, self.clock.total_frames());
            }
            let mut ids: Vec<ChannelId> = recorder.actions().iter().map(|a| a.channel).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        self.with_rack(|rack, _| {
            for ch in &mut rack.channels {
                ch.core.has_actions = with_actions.contains(&ch.id());
                if ch.core.has_actions && !ch.core.read_actions {
                    ch.core.read_actions = true;
                }
            }
        });
    }

    /// Start recording line-in into every armed, empty sample channel.
    /// Returns false if there is no such channel.
    pub fn start_input_rec(&self) -> Result<bool, String> {
        if self.controls.input_recording() {
            return Ok(true);
        }
        let has_target = self.rack.lock().channels.iter().any(Channel::can_input_rec);
        if !has_target {
            return Ok(false);
        }
        let take = InputTake::new(
            self.clock.total_frames() as usize,
            self.clock.current_frame() as usize,
        );
        self.rack.lock().take = Some(take);
        self.controls.input_recording.store(true, Ordering::Release);
        if !self.clock.is_running() {
            self.start_transport();
        }
        log::info!(target: "engine", "input recording started");
        Ok(true)
    }

    /// Move the take into the target channels and start armed loops.
    /// Returns how many channels received it.
    pub fn stop_input_rec(&self) -> usize {
        self.controls.input_recording.store(false, Ordering::Release);
        let rate = self.clock.sample_rate();
        let filled = self.with_rack(|rack, ctx| {
            let Some(take) = rack.take.take() else {
                return 0;
            };
            rack.take_count += 1;
            let name = format!("TAKE-{}", rack.take_count);
            let targets: Vec<usize> = rack
                .channels
                .iter()
                .enumerate()
                .filter(|(_, c)| c.can_input_rec())
                .map(|(i, _)| i)
                .collect();
            let mut samples = Some(take.buffer);
            for (n, &i) in targets.iter().enumerate() {
                let data = if n + 1 == targets.len() {
                    samples.take().unwrap_or_default()
                } else {
                    samples.clone().unwrap_or_default()
                };
                rack.channels[i].set_wave(Some(Wave::from_stereo(data, rate, &name)), ctx);
            }
            for ch in &mut rack.channels {
                let startable = ch.core.armed
                    && ch.is_loop()
                    && ch.status() == ChannelStatus::Off;
                if startable {
                    ch.start(ctx, false, true);
                }
            }
            targets.len()
        });
        log::info!(target: "engine", "input recording stopped, {} channel(s) filled", filled);
        filled
    }

    /// Drop every recorded action of a channel, or only those in `mask`.
    pub fn clear_actions(&self, id: ChannelId, mask: ActionMask) -> Result<(), String> {
        if self.rack.lock().get(id).is_none() {
            return Err(format!("Failed to clear actions: no channel {}", id));
        }
        let still_has = {
            let mut recorder = self.lock_recorder();
            if mask == ActionMask::ALL {
                recorder.clear_channel(id);
            } else {
                recorder.clear_kind(id, mask);
            }
            recorder.has_actions(id)
        };
        self.with_channel(id, |ch, _| {
            ch.core.has_actions = still_has;
            if !still_has {
                ch.core.read_actions = false;
            }
        })
    }
}

/// Bars must divide beats: too many collapse to beats, non-divisors drop
/// to the next lower divisor.
fn fit_bars(beats: u32, bars: u32) -> u32 {
    let bars = bars.clamp(1, beats);
    (1..=bars).rev().find(|b| beats % b == 0).unwrap_or(1)
}
