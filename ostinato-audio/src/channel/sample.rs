//! Sample player payload and its play state machine.

use ostinato_types::transport::{db_to_linear, MAX_BOOST_DB, MAX_PITCH, MIN_PITCH};
use ostinato_types::{Action, ActionKind, ActionMask, ChannelMode, ChannelStatus, RecStatus};

use super::{ChannelCore, ChannelCtx, ScheduledAction};
use crate::recorder::RecOp;
use crate::wave::Wave;

/// Per-frame gain change of a regular fade.
const FADE_STEP: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadeEnd {
    /// Rewind to `begin` once silent. Status has already gone OFF.
    Stop,
    /// The mute flag is already set; the fade just softens it.
    Mute,
}

#[derive(Debug, Clone, Copy)]
struct FadeOut {
    gain: f32,
    step: f32,
    end: FadeEnd,
}

#[derive(Debug)]
pub struct SampleData {
    wave: Option<Wave>,
    pub mode: ChannelMode,
    /// Read position in wave frames; fractional under pitch.
    tracker: f64,
    begin: usize,
    end: usize,
    pitch: f32,
    boost: f32,
    /// A quantized start is pending for the next quanto.
    q_wait: bool,
    fade_in: Option<f32>,
    fade_out: Option<FadeOut>,
    pub input_monitor: bool,
}

impl Default for SampleData {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleData {
    pub fn new() -> Self {
        Self {
            wave: None,
            mode: ChannelMode::default(),
            tracker: 0.0,
            begin: 0,
            end: 0,
            pitch: 1.0,
            boost: 1.0,
            q_wait: false,
            fade_in: None,
            fade_out: None,
            input_monitor: false,
        }
    }

    pub fn has_wave(&self) -> bool {
        self.wave.is_some()
    }

    pub fn wave(&self) -> Option<&Wave> {
        self.wave.as_ref()
    }

    pub fn wave_mut(&mut self) -> Option<&mut Wave> {
        self.wave.as_mut()
    }

    pub(super) fn set_wave(&mut self, wave: Option<Wave>) {
        self.end = wave.as_ref().map_or(0, Wave::frames);
        self.begin = 0;
        self.tracker = 0.0;
        self.q_wait = false;
        self.fade_in = None;
        self.fade_out = None;
        self.wave = wave;
    }

    pub fn take_wave(&mut self) -> Option<Wave> {
        let wave = self.wave.take();
        self.set_wave(None);
        wave
    }

    pub fn tracker(&self) -> usize {
        self.tracker as usize
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub fn is_waiting_quantize(&self) -> bool {
        self.q_wait
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(MIN_PITCH, MAX_PITCH);
    }

    pub fn set_boost_db(&mut self, db: f32) {
        self.boost = db_to_linear(db.min(MAX_BOOST_DB));
    }

    pub fn set_boost(&mut self, linear: f32) {
        self.boost = linear.clamp(0.0, db_to_linear(MAX_BOOST_DB));
    }

    /// Set the played range, in wave frames. `end` is exclusive.
    pub fn set_begin_end(&mut self, begin: usize, end: usize) -> Result<(), String> {
        let frames = self.wave.as_ref().map_or(0, Wave::frames);
        let end = end.min(frames);
        if begin >= end {
            return Err(format!(
                "Invalid range {}..{} for a {} frame wave",
                begin, end, frames
            ));
        }
        self.begin = begin;
        self.end = end;
        if self.tracker < begin as f64 || self.tracker >= end as f64 {
            self.tracker = begin as f64;
        }
        Ok(())
    }

    pub(super) fn duplicate(&self) -> Self {
        Self {
            wave: self.wave.clone(),
            mode: self.mode,
            tracker: self.begin as f64,
            begin: self.begin,
            end: self.end,
            pitch: self.pitch,
            boost: self.boost,
            q_wait: false,
            fade_in: None,
            fade_out: None,
            input_monitor: self.input_monitor,
        }
    }

    fn reset(&mut self, core: &mut ChannelCore) {
        self.tracker = self.begin as f64;
        self.fade_out = None;
        core.mute_i = false;
    }

    fn hard_stop(&mut self, core: &mut ChannelCore, ctx: &ChannelCtx) {
        core.set_status(ChannelStatus::Off, ctx);
        self.q_wait = false;
        self.fade_in = None;
        self.reset(core);
    }

    /// Go OFF now, letting the sound fade out over the next frames.
    fn stop_with_fade(&mut self, core: &mut ChannelCore, ctx: &ChannelCtx) {
        if core.is_muted() {
            self.hard_stop(core, ctx);
            return;
        }
        core.set_status(ChannelStatus::Off, ctx);
        self.q_wait = false;
        self.fade_out = Some(FadeOut {
            gain: 1.0,
            step: self.fade_step(),
            end: FadeEnd::Stop,
        });
    }

    /// Finish the fade before the sample does.
    fn fade_step(&self) -> f32 {
        let left = (self.end as f64 - self.tracker).max(0.0) as f32 / self.pitch;
        if left < 1.0 / FADE_STEP {
            1.0 / left.max(1.0)
        } else {
            FADE_STEP
        }
    }

    pub(super) fn start(
        &mut self,
        core: &mut ChannelCore,
        ctx: &mut ChannelCtx,
        do_quantize: bool,
        force: bool,
    ) {
        let quantized = do_quantize && ctx.clock.quantize() > 0 && ctx.clock.is_running();
        match core.status() {
            ChannelStatus::Off => {
                if self.mode.is_loop() {
                    if force {
                        self.reset(core);
                        core.set_status(ChannelStatus::Play, ctx);
                    } else {
                        core.set_status(ChannelStatus::Wait, ctx);
                    }
                } else if quantized {
                    self.q_wait = true;
                    core.set_status(ChannelStatus::Wait, ctx);
                } else {
                    self.reset(core);
                    core.set_status(ChannelStatus::Play, ctx);
                }
            }
            ChannelStatus::Play => match self.mode {
                ChannelMode::SingleBasic => self.stop_with_fade(core, ctx),
                ChannelMode::SingleRetrig => {
                    if quantized {
                        self.q_wait = true;
                    } else {
                        self.reset(core);
                    }
                }
                ChannelMode::SinglePress => {}
                _ => core.set_status(ChannelStatus::Ending, ctx),
            },
            ChannelStatus::Wait => {
                self.q_wait = false;
                core.set_status(ChannelStatus::Off, ctx);
            }
            ChannelStatus::Ending => core.set_status(ChannelStatus::Play, ctx),
            ChannelStatus::Empty | ChannelStatus::Missing | ChannelStatus::Wrong => {}
        }
    }

    /// Key release: only SINGLE_PRESS reacts.
    pub(super) fn stop(&mut self, core: &mut ChannelCore, ctx: &mut ChannelCtx) {
        if self.mode != ChannelMode::SinglePress {
            return;
        }
        match core.status() {
            ChannelStatus::Play if !self.q_wait => self.stop_with_fade(core, ctx),
            ChannelStatus::Wait | ChannelStatus::Play if self.q_wait => {
                self.q_wait = false;
                if core.status() == ChannelStatus::Wait {
                    core.set_status(ChannelStatus::Off, ctx);
                }
            }
            _ => {}
        }
    }

    pub(super) fn kill(&mut self, core: &mut ChannelCore, ctx: &mut ChannelCtx) {
        match core.status() {
            ChannelStatus::Play | ChannelStatus::Ending => self.stop_with_fade(core, ctx),
            ChannelStatus::Wait => self.hard_stop(core, ctx),
            _ => {}
        }
    }

    /// A quanto boundary passed: resolve a pending quantized start.
    pub(super) fn quantize(&mut self, core: &mut ChannelCore, ctx: &mut ChannelCtx) {
        if self.mode.is_loop() || !self.q_wait {
            return;
        }
        self.q_wait = false;
        self.reset(core);
        if core.status() != ChannelStatus::Play {
            core.set_status(ChannelStatus::Play, ctx);
        }

        if ctx.rec_armed && self.wave.is_some() {
            let frame = ctx.clock.current_frame();
            if self.mode == ChannelMode::SinglePress {
                ctx.push_rec(RecOp::StartOverdub {
                    channel: core.id,
                    mask: ActionMask::KEYS,
                    frame,
                });
                core.read_actions = false;
            } else {
                ctx.rec(Action::new(core.id, frame, ActionKind::KeyPress));
            }
            core.has_actions = true;
        }
    }

    pub(super) fn on_bar(&mut self, core: &mut ChannelCore, ctx: &mut ChannelCtx) {
        match (self.mode, core.status()) {
            (ChannelMode::LoopRepeat, ChannelStatus::Play) => self.reset(core),
            (ChannelMode::LoopOnceBar, ChannelStatus::Wait) => {
                self.reset(core);
                core.set_status(ChannelStatus::Play, ctx);
            }
            _ => {}
        }
    }

    pub(super) fn on_zero(&mut self, core: &mut ChannelCore, ctx: &mut ChannelCtx) {
        if self.wave.is_none() {
            return;
        }
        if self.mode.is_loop() {
            match core.status() {
                ChannelStatus::Play => self.reset(core),
                ChannelStatus::Ending => self.hard_stop(core, ctx),
                _ => {}
            }
        }
        if core.status() == ChannelStatus::Wait && !self.q_wait {
            self.reset(core);
            core.set_status(ChannelStatus::Play, ctx);
        }
    }

    pub(super) fn parse_action(
        &mut self,
        core: &mut ChannelCore,
        scheduled: &ScheduledAction,
        ctx: &mut ChannelCtx,
    ) {
        let action = &scheduled.action;
        match action.kind {
            ActionKind::KeyPress if self.mode.is_single() => self.start(core, ctx, false, false),
            ActionKind::KeyRelease if self.mode.is_single() => self.stop(core, ctx),
            ActionKind::Kill if self.mode.is_single() => self.kill(core, ctx),
            ActionKind::MuteOn => self.set_mute(core, true),
            ActionKind::MuteOff => self.unset_mute(core, true),
            ActionKind::Volume => {
                core.volume_i = action.f_value.clamp(0.0, 1.0);
                core.volume_d = match scheduled.next_volume {
                    Some((distance, next)) if distance > 0 => {
                        (next - core.volume_i) / distance as f32
                    }
                    _ => 0.0,
                };
            }
            _ => {}
        }
    }

    pub(super) fn rewind(&mut self, core: &mut ChannelCore) {
        if self.wave.is_none() {
            return;
        }
        let replaying = core.rec_status == RecStatus::Reading && self.mode.is_single();
        if self.mode.is_loop() || replaying {
            self.reset(core);
        }
    }

    pub(super) fn stop_by_seq(&mut self, core: &mut ChannelCore, ctx: &mut ChannelCtx) {
        if self.mode.is_loop() && core.status() == ChannelStatus::Wait {
            core.set_status(ChannelStatus::Off, ctx);
            return;
        }
        let replaying =
            core.has_actions && core.read_actions && core.status() == ChannelStatus::Play;
        if ctx.behavior.chans_stop_on_seq_halt && (self.mode.is_loop() || replaying) {
            self.kill(core, ctx);
        }
    }

    pub(super) fn set_mute(&mut self, core: &mut ChannelCore, internal: bool) {
        let already = core.is_muted();
        if internal {
            core.mute_i = true;
        } else {
            core.mute = true;
        }
        if !already && core.is_playing() && self.fade_out.is_none() {
            self.fade_out = Some(FadeOut {
                gain: 1.0,
                step: FADE_STEP,
                end: FadeEnd::Mute,
            });
        }
    }

    pub(super) fn unset_mute(&mut self, core: &mut ChannelCore, internal: bool) {
        if internal {
            core.mute_i = false;
        } else {
            core.mute = false;
        }
        if !core.is_muted() {
            if matches!(self.fade_out, Some(f) if f.end == FadeEnd::Mute) {
                self.fade_out = None;
            }
            if core.is_playing() {
                self.fade_in = Some(0.0);
            }
        }
    }

    /// The tracker ran past `end`.
    fn on_sample_end(&mut self, core: &mut ChannelCore, running: bool, ctx: &ChannelCtx) {
        let status = core.status();
        let stops = matches!(
            self.mode,
            ChannelMode::SingleBasic | ChannelMode::SinglePress | ChannelMode::SingleRetrig
        ) || (self.mode == ChannelMode::SingleEndless && status == ChannelStatus::Ending)
            || (self.mode.is_loop() && !running);

        if stops {
            if status != ChannelStatus::Off {
                core.set_status(ChannelStatus::Off, ctx);
            }
        } else if self.mode.is_once() {
            if status == ChannelStatus::Ending {
                core.set_status(ChannelStatus::Off, ctx);
            } else if status != ChannelStatus::Off {
                core.set_status(ChannelStatus::Wait, ctx);
            }
        }
        self.reset(core);
    }

    /// Linearly interpolated frame at the tracker, then advance it.
    fn read(&mut self, step: f64) -> (f32, f32) {
        let Some(wave) = &self.wave else {
            return (0.0, 0.0);
        };
        let pos = self.tracker;
        let i = pos as usize;
        let frac = (pos - i as f64) as f32;
        let (l0, r0) = wave.frame(i);
        let (l, r) = if frac > 0.0 && i + 1 < self.end {
            let (l1, r1) = wave.frame(i + 1);
            (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
        } else {
            (l0, r0)
        };
        self.tracker += step;
        (l, r)
    }

    pub(super) fn sum(
        &mut self,
        core: &mut ChannelCore,
        buffer: &mut [f32],
        frame: usize,
        running: bool,
        ctx: &ChannelCtx,
    ) {
        let Some(wave) = &self.wave else {
            return;
        };
        let step = self.pitch as f64 * wave.rate() as f64 / ctx.clock.sample_rate().max(1) as f64;

        if !(core.is_playing() || self.fade_out.is_some()) {
            return;
        }
        if self.tracker >= self.end as f64 {
            self.on_sample_end(core, running, ctx);
            if !core.is_playing() {
                return;
            }
        }

        let (l, r) = self.read(step);

        if running {
            core.volume_i = (core.volume_i + core.volume_d).clamp(0.0, 1.0);
        }
        let mut gain = core.volume_i;
        if let Some(fade) = &mut self.fade_out {
            gain *= fade.gain;
            fade.gain -= fade.step;
            if fade.gain <= 0.0 {
                let end = fade.end;
                self.fade_out = None;
                if end == FadeEnd::Stop {
                    self.tracker = self.begin as f64;
                }
            }
        } else if core.is_muted() {
            gain = 0.0;
        } else if let Some(fade) = &mut self.fade_in {
            gain *= *fade;
            *fade += FADE_STEP;
            if *fade >= 1.0 {
                self.fade_in = None;
            }
        }

        buffer[frame * 2] = l * gain;
        buffer[frame * 2 + 1] = r * gain;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Channel;
    use super::*;

    fn render(ch: &mut Channel, h: &mut Harness, frames: usize, running: bool) -> Vec<f32> {
        ch.clear_buffer(frames);
        for j in 0..frames {
            ch.sum(j, running, &mut h.ctx());
        }
        let mut out = vec![0.0; frames * 2];
        ch.process(&mut out, None, frames);
        out
    }

    #[test]
    fn single_basic_plays_once_then_off() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SingleBasic, 10, &mut h);
        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Play);
        let out = render(&mut ch, &mut h, 16, false);
        assert_eq!(out[2 * 9], 0.5);
        assert_eq!(out[2 * 10], 0.0);
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn single_basic_second_press_stops() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SingleBasic, 1000, &mut h);
        ch.start(&mut h.ctx(), true, false);
        render(&mut ch, &mut h, 8, false);
        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Off);
        // The tail fades out instead of clicking.
        let out = render(&mut ch, &mut h, 200, false);
        assert!(out[0] > 0.0);
        assert_eq!(out[2 * 150], 0.0);
    }

    #[test]
    fn loop_waits_for_first_beat() {
        let mut h = Harness::new(0);
        h.clock.start();
        let mut ch = loaded_sample(ChannelMode::LoopBasic, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Wait);
        ch.on_zero(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Play);

        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Ending);
        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Play);
        ch.start(&mut h.ctx(), true, false);
        ch.on_zero(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn wait_start_cancels() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::LoopBasic, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn forced_loop_start_plays_now() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::LoopBasic, 100, &mut h);
        ch.start(&mut h.ctx(), false, true);
        assert_eq!(ch.status(), ChannelStatus::Play);
    }

    #[test]
    fn quantized_single_start_resolves_once() {
        let mut h = Harness::new(4);
        h.clock.start();
        let mut ch = loaded_sample(ChannelMode::SingleBasic, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Wait);
        assert!(ch.sample().is_some_and(|s| s.is_waiting_quantize()));

        ch.quantize(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Play);
        ch.quantize(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Play);
        assert!(ch.sample().is_some_and(|s| !s.is_waiting_quantize()));
    }

    #[test]
    fn quantized_start_records_key_press() {
        let mut h = Harness::new(4);
        h.clock.start();
        h.rec_armed = true;
        let mut ch = loaded_sample(ChannelMode::SingleBasic, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        ch.quantize(&mut h.ctx());
        assert_eq!(h.rec_ops.len(), 1);
        assert!(matches!(h.rec_ops[0], RecOp::Rec(a) if a.kind == ActionKind::KeyPress));
        assert!(ch.core.has_actions);
    }

    #[test]
    fn single_press_release_stops() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SinglePress, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Play);
        ch.stop(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn single_press_release_cancels_pending_quantize() {
        let mut h = Harness::new(4);
        h.clock.start();
        let mut ch = loaded_sample(ChannelMode::SinglePress, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        ch.stop(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Off);
        ch.quantize(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn loop_once_waits_after_each_pass() {
        let mut h = Harness::new(0);
        h.clock.start();
        let mut ch = loaded_sample(ChannelMode::LoopOnce, 10, &mut h);
        ch.start(&mut h.ctx(), false, true);
        render(&mut ch, &mut h, 12, true);
        assert_eq!(ch.status(), ChannelStatus::Wait);
        ch.on_zero(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Play);
    }

    #[test]
    fn loop_once_bar_restarts_on_bar() {
        let mut h = Harness::new(0);
        h.clock.start();
        let mut ch = loaded_sample(ChannelMode::LoopOnceBar, 10, &mut h);
        ch.start(&mut h.ctx(), true, false);
        ch.on_bar(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Play);
    }

    #[test]
    fn loop_stops_at_sample_end_when_transport_halted() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::LoopBasic, 10, &mut h);
        ch.start(&mut h.ctx(), false, true);
        render(&mut ch, &mut h, 12, false);
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn loop_basic_wraps_while_running() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::LoopBasic, 10, &mut h);
        ch.start(&mut h.ctx(), false, true);
        let out = render(&mut ch, &mut h, 25, true);
        assert_eq!(ch.status(), ChannelStatus::Play);
        assert_eq!(out[2 * 20], 0.5);
    }

    #[test]
    fn kill_waiting_channel_is_immediate() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::LoopBasic, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        ch.kill(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn mute_silences_after_fade() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SingleEndless, 1000, &mut h);
        ch.start(&mut h.ctx(), false, false);
        ch.set_mute(false, &mut h.ctx());
        assert!(ch.core.mute);
        let out = render(&mut ch, &mut h, 150, false);
        assert!(out[0] > 0.0);
        assert_eq!(out[2 * 120], 0.0);

        ch.unset_mute(false, &mut h.ctx());
        let out = render(&mut ch, &mut h, 150, false);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[2 * 120], 0.5);
    }

    #[test]
    fn internal_mute_resets_on_loop_restart() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SingleEndless, 10, &mut h);
        ch.start(&mut h.ctx(), false, false);
        ch.set_mute(true, &mut h.ctx());
        render(&mut ch, &mut h, 12, false);
        assert!(!ch.core.mute_i);
    }

    #[test]
    fn half_pitch_interpolates() {
        let mut h = Harness::new(0);
        let mut ch = Channel::new_sample(ostinato_types::ChannelId::new(1), 8);
        let wave = Wave::from_interleaved(&[0.0, 0.0, 1.0, 1.0, 0.0, 0.0], 2, 44100, "ramp");
        ch.set_wave(Some(wave), &h.ctx());
        if let Some(s) = ch.sample_mut() {
            s.set_pitch(0.5);
        }
        ch.start(&mut h.ctx(), false, false);
        let out = render(&mut ch, &mut h, 3, false);
        assert_eq!(out[0], 0.0);
        assert!((out[2] - 0.5).abs() < 1e-6);
        assert!((out[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn begin_end_bounds_playback() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SingleBasic, 100, &mut h);
        let s = ch.sample_mut().unwrap();
        assert!(s.set_begin_end(50, 40).is_err());
        s.set_begin_end(10, 20).unwrap();
        ch.start(&mut h.ctx(), false, false);
        let out = render(&mut ch, &mut h, 12, false);
        assert_eq!(out[2 * 9], 0.5);
        assert_eq!(out[2 * 10], 0.0);
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn volume_envelope_ramps_to_next_point() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SingleEndless, 100, &mut h);
        ch.core.read_actions = true;
        ch.start(&mut h.ctx(), false, false);
        let action = Action::new(ch.id(), 0, ActionKind::Volume).with_values(0, 0.0);
        let scheduled = ScheduledAction {
            action,
            next_volume: Some((10, 1.0)),
        };
        ch.parse_action(&scheduled, &mut h.ctx());
        let out = render(&mut ch, &mut h, 10, true);
        assert!((out[0] - 0.05).abs() < 1e-5);
        assert!((out[2 * 9] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn recorded_key_press_ignored_by_loops() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::LoopBasic, 100, &mut h);
        ch.core.read_actions = true;
        let scheduled = ScheduledAction {
            action: Action::new(ch.id(), 0, ActionKind::KeyPress),
            next_volume: None,
        };
        ch.parse_action(&scheduled, &mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn stop_by_seq_cancels_waiting_loop() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::LoopBasic, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        ch.stop_by_seq(&mut h.ctx());
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn boost_is_capped() {
        let mut s = SampleData::new();
        s.set_boost_db(60.0);
        assert!((s.boost() - 10.0).abs() < 1e-3);
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Gesture {
        Press,
        Release,
        Kill,
        Quantize,
        OnBar,
        OnZero,
    }

    const LOOPS: &[ChannelMode] = &[
        ChannelMode::LoopBasic,
        ChannelMode::LoopOnce,
        ChannelMode::LoopOnceBar,
        ChannelMode::LoopRepeat,
    ];
    const SINGLES: &[ChannelMode] = &[
        ChannelMode::SingleBasic,
        ChannelMode::SinglePress,
        ChannelMode::SingleRetrig,
        ChannelMode::SingleEndless,
    ];
    const ONCE_BAR: &[ChannelMode] = &[ChannelMode::LoopOnceBar];
    const LOOPS_NOT_ONCE_BAR: &[ChannelMode] = &[
        ChannelMode::LoopBasic,
        ChannelMode::LoopOnce,
        ChannelMode::LoopRepeat,
    ];
    const BASIC: &[ChannelMode] = &[ChannelMode::SingleBasic];
    const PRESS: &[ChannelMode] = &[ChannelMode::SinglePress];
    const RETRIG: &[ChannelMode] = &[ChannelMode::SingleRetrig];
    const ENDLESS: &[ChannelMode] = &[ChannelMode::SingleEndless];
    const SINGLES_NOT_PRESS: &[ChannelMode] = &[
        ChannelMode::SingleBasic,
        ChannelMode::SingleRetrig,
        ChannelMode::SingleEndless,
    ];

    fn apply(ch: &mut Channel, h: &mut Harness, gesture: Gesture) {
        let mut ctx = h.ctx();
        match gesture {
            Gesture::Press => ch.start(&mut ctx, true, false),
            Gesture::Release => ch.stop(&mut ctx),
            Gesture::Kill => ch.kill(&mut ctx),
            Gesture::Quantize => ch.quantize(&mut ctx),
            Gesture::OnBar => ch.on_bar(&mut ctx),
            Gesture::OnZero => ch.on_zero(&mut ctx),
        }
    }

    /// A running, quantized channel brought to `status` by live gestures.
    fn prepared(mode: ChannelMode, status: ChannelStatus) -> (Channel, Harness) {
        let mut h = Harness::new(4);
        h.clock.start();
        let mut ch = loaded_sample(mode, 100, &mut h);
        match status {
            ChannelStatus::Off => {}
            ChannelStatus::Wait => apply(&mut ch, &mut h, Gesture::Press),
            ChannelStatus::Play => ch.start(&mut h.ctx(), false, mode.is_loop()),
            ChannelStatus::Ending => {
                ch.start(&mut h.ctx(), false, mode.is_loop());
                apply(&mut ch, &mut h, Gesture::Press);
            }
            other => panic!("cannot prepare {:?}", other),
        }
        assert_eq!(ch.status(), status, "{:?} did not reach {:?}", mode, status);
        (ch, h)
    }

    #[test]
    fn status_transition_table() {
        use self::Gesture::*;
        use ostinato_types::ChannelStatus::{Ending, Off, Play, Wait};

        let rows: &[(&[ChannelMode], ChannelStatus, Gesture, ChannelStatus)] = &[
            (LOOPS, Off, Press, Wait),
            (LOOPS, Off, Release, Off),
            (LOOPS, Off, Kill, Off),
            (LOOPS, Off, Quantize, Off),
            (LOOPS, Off, OnBar, Off),
            (LOOPS, Off, OnZero, Off),
            (LOOPS, Wait, Press, Off),
            (LOOPS, Wait, Release, Wait),
            (LOOPS, Wait, Kill, Off),
            (LOOPS, Wait, Quantize, Wait),
            (LOOPS, Wait, OnZero, Play),
            (ONCE_BAR, Wait, OnBar, Play),
            (LOOPS_NOT_ONCE_BAR, Wait, OnBar, Wait),
            (LOOPS, Play, Press, Ending),
            (LOOPS, Play, Release, Play),
            (LOOPS, Play, Kill, Off),
            (LOOPS, Play, Quantize, Play),
            (LOOPS, Play, OnBar, Play),
            (LOOPS, Play, OnZero, Play),
            (LOOPS, Ending, Press, Play),
            (LOOPS, Ending, Release, Ending),
            (LOOPS, Ending, Kill, Off),
            (LOOPS, Ending, Quantize, Ending),
            (LOOPS, Ending, OnBar, Ending),
            (LOOPS, Ending, OnZero, Off),
            (SINGLES, Off, Press, Wait),
            (SINGLES, Off, Release, Off),
            (SINGLES, Off, Kill, Off),
            (SINGLES, Off, Quantize, Off),
            (SINGLES, Off, OnBar, Off),
            (SINGLES, Off, OnZero, Off),
            (SINGLES, Wait, Press, Off),
            (SINGLES, Wait, Kill, Off),
            (SINGLES, Wait, Quantize, Play),
            (SINGLES, Wait, OnBar, Wait),
            (SINGLES, Wait, OnZero, Wait),
            (PRESS, Wait, Release, Off),
            (SINGLES_NOT_PRESS, Wait, Release, Wait),
            (SINGLES, Play, Kill, Off),
            (SINGLES, Play, Quantize, Play),
            (SINGLES, Play, OnBar, Play),
            (SINGLES, Play, OnZero, Play),
            (BASIC, Play, Press, Off),
            (RETRIG, Play, Press, Play),
            (PRESS, Play, Press, Play),
            (ENDLESS, Play, Press, Ending),
            (PRESS, Play, Release, Off),
            (SINGLES_NOT_PRESS, Play, Release, Play),
            (ENDLESS, Ending, Press, Play),
            (ENDLESS, Ending, Release, Ending),
            (ENDLESS, Ending, Kill, Off),
            (ENDLESS, Ending, Quantize, Ending),
            (ENDLESS, Ending, OnBar, Ending),
            (ENDLESS, Ending, OnZero, Ending),
        ];

        for &(modes, from, gesture, to) in rows {
            for &mode in modes {
                let (mut ch, mut h) = prepared(mode, from);
                apply(&mut ch, &mut h, gesture);
                assert_eq!(
                    ch.status(),
                    to,
                    "{:?}: {:?} + {:?} should be {:?}",
                    mode,
                    from,
                    gesture,
                    to
                );
            }
        }

        // every mode has a row for every gesture from every status it can reach
        for mode in ChannelMode::ALL {
            let reachable: &[ChannelStatus] = if mode.is_loop() || mode == ChannelMode::SingleEndless {
                &[Off, Wait, Play, Ending][..]
            } else {
                &[Off, Wait, Play][..]
            };
            for &from in reachable {
                for gesture in [Press, Release, Kill, Quantize, OnBar, OnZero] {
                    assert!(
                        rows.iter()
                            .any(|(m, f, g, _)| m.contains(&mode) && *f == from && *g == gesture),
                        "no row for {:?} {:?} {:?}",
                        mode,
                        from,
                        gesture
                    );
                }
            }
        }
    }

    #[test]
    fn retrig_press_restarts_immediately_without_quantize() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SingleRetrig, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        render(&mut ch, &mut h, 50, false);
        assert_eq!(ch.sample().unwrap().tracker(), 50);

        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Play);
        let s = ch.sample().unwrap();
        assert_eq!(s.tracker(), s.begin());
    }

    #[test]
    fn retrig_press_waits_for_quanto_when_quantized() {
        let mut h = Harness::new(4);
        h.clock.start();
        let mut ch = loaded_sample(ChannelMode::SingleRetrig, 100, &mut h);
        ch.start(&mut h.ctx(), false, false);
        render(&mut ch, &mut h, 50, true);

        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Play);
        assert!(ch.sample().unwrap().is_waiting_quantize());
        assert_eq!(ch.sample().unwrap().tracker(), 50);

        ch.quantize(&mut h.ctx());
        let s = ch.sample().unwrap();
        assert!(!s.is_waiting_quantize());
        assert_eq!(s.tracker(), s.begin());
        assert_eq!(ch.status(), ChannelStatus::Play);
    }

    #[test]
    fn endless_loops_until_pressed_then_finishes() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SingleEndless, 10, &mut h);
        ch.start(&mut h.ctx(), true, false);
        let out = render(&mut ch, &mut h, 25, false);
        assert_eq!(ch.status(), ChannelStatus::Play);
        assert!(out[2 * 24] > 0.0);

        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Ending);
        render(&mut ch, &mut h, 15, false);
        assert_eq!(ch.status(), ChannelStatus::Off);
    }

    #[test]
    fn single_press_ignores_repeated_press() {
        let mut h = Harness::new(0);
        let mut ch = loaded_sample(ChannelMode::SinglePress, 100, &mut h);
        ch.start(&mut h.ctx(), true, false);
        render(&mut ch, &mut h, 20, false);
        ch.start(&mut h.ctx(), true, false);
        assert_eq!(ch.status(), ChannelStatus::Play);
        assert_eq!(ch.sample().unwrap().tracker(), 20);
    }
}
