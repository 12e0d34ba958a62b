//! The audio callback.
//!
//! [`Mixer::process`] renders one interleaved stereo block. It only ever
//! try-locks: a missed lock renders silence for that block and is counted
//! in the telemetry. Buffers are sized on the first block and reused.
//! Recorder writes made while rendering go to the engine's
//! [`RecQueue`](crate::recorder::RecQueue); the callback never writes the
//! action log itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ostinato_types::{ActionKind, ActionMask};

use crate::channel::ScheduledAction;
use crate::engine::Engine;
use crate::metronome::Metronome;
use crate::plugin_host::MasterStack;
use crate::recorder::ActionRecorder;
use crate::telemetry::AudioTelemetry;

/// Scheduled actions considered per block.
const SCHEDULE_CAPACITY: usize = 1024;
/// Publish telemetry every this many callbacks.
const TELEMETRY_INTERVAL: u32 = 256;

pub struct Mixer {
    engine: Arc<Engine>,
    input: Vec<f32>,
    in_to_out: Vec<f32>,
    scheduled: Vec<ScheduledAction>,
    metronome: Metronome,
    telemetry: AudioTelemetry,
    callbacks: u32,
}

impl Mixer {
    pub fn new(engine: Arc<Engine>) -> Self {
        let n = engine.settings.buffer_frames * 2;
        Self {
            engine,
            input: vec![0.0; n],
            in_to_out: vec![0.0; n],
            scheduled: Vec::with_capacity(SCHEDULE_CAPACITY),
            metronome: Metronome::default(),
            telemetry: AudioTelemetry::new(),
            callbacks: 0,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Render one block into `out`. `input` is interleaved stereo line-in
    /// of the same length, if there is an input device.
    pub fn process(&mut self, out: &mut [f32], input: Option<&[f32]>) {
        let started = Instant::now();
        out.fill(0.0);

        let Self {
            engine,
            input: input_buf,
            in_to_out,
            scheduled,
            metronome,
            telemetry,
            callbacks,
        } = self;
        let engine: &Engine = engine;
        let controls = &engine.controls;
        if !controls.is_ready() {
            return;
        }

        let frames = out.len() / 2;
        let n = frames * 2;
        if input_buf.len() < n {
            input_buf.resize(n, 0.0);
            in_to_out.resize(n, 0.0);
        }
        let input_buf = &mut input_buf[..n];
        let in_to_out = &mut in_to_out[..n];

        // Input, scaled, with its peak taken from the left channel.
        let in_vol = controls.in_volume();
        let mut peak_in = 0.0_f32;
        input_buf.fill(0.0);
        if let Some(input) = input {
            for (d, s) in input_buf.iter_mut().zip(input) {
                *d = s * in_vol;
            }
            for frame in input_buf.chunks_exact(2) {
                peak_in = peak_in.max(frame[0].abs());
            }
        }
        let monitor = controls.in_to_out();
        if monitor {
            in_to_out.copy_from_slice(input_buf);
        } else {
            in_to_out.fill(0.0);
        }

        let clock = &engine.clock;
        let running = clock.is_running();

        scheduled.clear();
        if running {
            match engine.recorder.try_lock_rt() {
                Some(recorder) => {
                    let dropped = schedule(
                        &recorder,
                        clock.current_frame(),
                        frames as u32,
                        clock.total_frames(),
                        scheduled,
                    );
                    controls.record_dropped_actions(dropped);
                }
                None => telemetry.record_lock_miss(),
            }
        }

        let rendered = match engine.rack.try_lock_rt() {
            Some(mut guard) => {
                let rack = &mut *guard;
                let mut ctx = engine.audio_ctx();
                let delay = engine.settings.delay_compensation;
                for ch in &mut rack.channels {
                    ch.clear_buffer(frames);
                }

                for j in 0..frames {
                    if running {
                        if let Some(take) = rack.take.as_mut() {
                            take.write(input_buf[j * 2], input_buf[j * 2 + 1], delay);
                        }

                        let quantize = clock.quantize();
                        let q_boundary = quantize > 0 && clock.quanto_has_passed();
                        if (q_boundary || quantize == 0) && controls.take_rewind_wait() {
                            engine.rewind_now(rack, &mut ctx);
                        }
                        if q_boundary {
                            for ch in &mut rack.channels {
                                ch.quantize(&mut ctx);
                            }
                        }
                        if clock.is_on_bar() {
                            if controls.metronome() {
                                metronome.trigger_tick();
                            }
                            for ch in &mut rack.channels {
                                ch.on_bar(&mut ctx);
                            }
                        }
                        if clock.is_on_first_beat() {
                            if controls.metronome() {
                                metronome.trigger_tick();
                            }
                            for ch in &mut rack.channels {
                                ch.on_zero(&mut ctx);
                            }
                        }

                        let current = clock.current_frame();
                        for s in scheduled.iter().filter(|s| s.action.frame == current) {
                            if let Some(ch) = rack.get_mut(s.action.channel) {
                                ch.parse_action(s, &mut ctx);
                            }
                        }

                        clock.incr_current_frame();
                        if controls.metronome() && clock.is_on_beat() && !clock.is_on_bar() {
                            metronome.trigger_tock();
                        }
                        engine.sync.on_frame(clock, &engine.midi_out);
                    }

                    for ch in &mut rack.channels {
                        ch.sum(j, running, &mut ctx);
                    }
                }

                for ch in &mut rack.channels {
                    ch.process(out, Some(&*input_buf), frames);
                }
                true
            }
            None => false,
        };

        if rendered {
            match engine.plugins.master(MasterStack::Out).try_lock_rt() {
                Some(mut stack) => stack.process(&mut out[..n], &[]),
                None => telemetry.record_lock_miss(),
            }
            if monitor {
                match engine.plugins.master(MasterStack::In).try_lock_rt() {
                    Some(mut stack) => stack.process(in_to_out, &[]),
                    None => telemetry.record_lock_miss(),
                }
            }
        } else {
            telemetry.record_lock_miss();
        }

        let out_vol = controls.out_volume();
        let limit = engine.settings.limit_output;
        let mut peak_out = 0.0_f32;
        for (frame, monitor) in out[..n].chunks_exact_mut(2).zip(in_to_out.chunks_exact(2)) {
            for (o, m) in frame.iter_mut().zip(monitor) {
                *o = (*o + m) * out_vol;
                if limit {
                    *o = o.clamp(-1.0, 1.0);
                }
            }
            peak_out = peak_out.max(frame[0].abs());
        }
        metronome.render(&mut out[..n]);
        controls.set_peaks(peak_out, peak_in);

        let budget = Duration::from_secs_f64(frames as f64 / clock.sample_rate().max(1) as f64);
        telemetry.record(started.elapsed(), budget);
        *callbacks = callbacks.wrapping_add(1);
        if *callbacks % TELEMETRY_INTERVAL == 0 {
            controls.publish_telemetry(&telemetry.take_summary());
        }
    }
}

/// Copy the actions the next `frames` frames can reach into `out`. That is
/// `[current, current + frames)` first, then `[0, frames)` for a wrap or a
/// rewind inside the block. At most [`SCHEDULE_CAPACITY`] actions are kept;
/// returns how many did not fit.
fn schedule(
    recorder: &ActionRecorder,
    current: u32,
    frames: u32,
    total: u32,
    out: &mut Vec<ScheduledAction>,
) -> usize {
    let (window, head_end) = if current < frames {
        (recorder.window(0, current.saturating_add(frames)), 0)
    } else {
        (recorder.window(current, current.saturating_add(frames)), frames)
    };
    let head = recorder.window(0, head_end);
    let mut dropped = 0;
    for action in window.iter().chain(head) {
        if out.len() >= SCHEDULE_CAPACITY {
            dropped += 1;
            continue;
        }
        let next_volume = if action.kind == ActionKind::Volume {
            next_volume(recorder, action, total)
        } else {
            None
        };
        out.push(ScheduledAction {
            action: *action,
            next_volume,
        });
    }
    dropped
}

/// Distance in frames to the channel's next volume point, wrapping to the
/// first one, and its value.
fn next_volume(
    recorder: &ActionRecorder,
    action: &ostinato_types::Action,
    total: u32,
) -> Option<(u32, f32)> {
    let mask = ActionMask::of(ActionKind::Volume);
    let next = recorder
        .next_action(action.channel, mask, action.frame, 0)
        .or_else(|| recorder.first_action(action.channel, mask))?;
    if next.frame == action.frame {
        return None;
    }
    let distance = if next.frame > action.frame {
        next.frame - action.frame
    } else {
        total - action.frame + next.frame
    };
    Some((distance, next.f_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::BuiltinLoader;
    use crate::engine::EngineSettings;
    use crate::lightning::MidiMap;
    use crate::wave::Wave;
    use ostinato_types::{Action, ChannelId, ChannelKind, ChannelMode, ChannelStatus};

    fn engine_with(settings: EngineSettings) -> Arc<Engine> {
        Arc::new(Engine::new(
            settings,
            MidiMap::default(),
            Box::new(BuiltinLoader),
        ))
    }

    fn run(mixer: &mut Mixer, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        mixer.process(&mut out, None);
        out
    }

    fn sample_channel(engine: &Engine, mode: ChannelMode) -> ChannelId {
        let id = engine.add_channel(ChannelKind::Sample);
        engine
            .with_channel(id, |ch, ctx| {
                let wave = Wave::from_stereo(vec![0.5; 44100 * 2], 44100, "tone");
                ch.set_wave(Some(wave), ctx);
                if let Some(s) = ch.sample_mut() {
                    s.mode = mode;
                }
            })
            .unwrap();
        id
    }

    #[test]
    fn unready_mixer_is_a_no_op() {
        let engine = engine_with(EngineSettings::default());
        engine.controls.set_ready(false);
        engine.start_transport();
        let mut mixer = Mixer::new(engine.clone());
        let out = run(&mut mixer, 256);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(engine.clock.current_frame(), 0);
    }

    #[test]
    fn clock_advances_one_frame_per_frame() {
        let engine = engine_with(EngineSettings::default());
        engine.start_transport();
        let mut mixer = Mixer::new(engine.clone());
        run(&mut mixer, 300);
        assert_eq!(engine.clock.current_frame(), 300);
    }

    #[test]
    fn quantized_rewind_lands_on_next_quanto() {
        let engine = engine_with(EngineSettings {
            quantize: 4,
            ..EngineSettings::default()
        });
        assert_eq!(engine.clock.quanto(), 5512);
        engine.start_transport();
        engine.clock.set_current_frame(6000);
        engine.rewind();
        assert!(engine.controls.rewind_pending());

        let mut mixer = Mixer::new(engine.clone());
        run(&mut mixer, 11024 - 6000);
        assert_eq!(engine.clock.current_frame(), 11024);
        assert!(engine.controls.rewind_pending());

        run(&mut mixer, 1);
        assert!(!engine.controls.rewind_pending());
        assert_eq!(engine.clock.current_frame(), 1);
    }

    #[test]
    fn quantized_start_plays_once_at_boundary() {
        let engine = engine_with(EngineSettings {
            quantize: 4,
            ..EngineSettings::default()
        });
        let id = sample_channel(&engine, ChannelMode::SingleBasic);
        engine.start_action_rec();
        engine.clock.set_current_frame(100);
        engine
            .with_channel(id, |ch, ctx| ch.start(ctx, true, false))
            .unwrap();
        assert_eq!(engine.channel_infos()[0].status, ChannelStatus::Wait);

        let mut mixer = Mixer::new(engine.clone());
        let out = run(&mut mixer, 1000);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(engine.channel_infos()[0].status, ChannelStatus::Wait);

        let out = run(&mut mixer, 5000);
        assert_eq!(engine.channel_infos()[0].status, ChannelStatus::Play);
        assert!(out[out.len() - 2] > 0.0);

        run(&mut mixer, 5512);
        let recorder = engine.lock_recorder();
        let presses: Vec<&Action> = recorder
            .actions()
            .iter()
            .filter(|a| a.kind == ActionKind::KeyPress)
            .collect();
        assert_eq!(presses.len(), 1);
        assert_eq!(presses[0].frame, 5512);
    }

    #[test]
    fn limiter_clamps_output() {
        let engine = engine_with(EngineSettings {
            limit_output: true,
            ..EngineSettings::default()
        });
        engine.controls.set_in_to_out(true);
        let mut mixer = Mixer::new(engine.clone());
        let input = vec![2.0; 64];
        let mut out = vec![0.0; 64];
        mixer.process(&mut out, Some(&input));
        assert!(out.iter().all(|&s| s == 1.0));
        assert_eq!(engine.controls.peak_in(), 2.0);
        assert_eq!(engine.controls.peak_out(), 1.0);
    }

    #[test]
    fn unlimited_output_passes_monitor_through_volume() {
        let engine = engine_with(EngineSettings::default());
        engine.controls.set_in_to_out(true);
        engine.controls.set_out_volume(0.5);
        let mut mixer = Mixer::new(engine);
        let input = vec![1.6; 8];
        let mut out = vec![0.0; 8];
        mixer.process(&mut out, Some(&input));
        assert!(out.iter().all(|&s| (s - 0.8).abs() < 1e-6));
    }

    #[test]
    fn metronome_ticks_on_first_beat() {
        let engine = engine_with(EngineSettings {
            metronome: true,
            ..EngineSettings::default()
        });
        engine.start_transport();
        let mut mixer = Mixer::new(engine);
        let out = run(&mut mixer, 64);
        assert!(out[0] != 0.0);
        assert_eq!(out[0], out[1]);
        assert_eq!(out[2 * 60], 0.0);
    }

    #[test]
    fn schedule_covers_wrap() {
        let mut recorder = ActionRecorder::new();
        let ch = ChannelId::new(1);
        for frame in [2, 50, 95] {
            recorder.rec(Action::new(ch, frame, ActionKind::KeyPress));
        }
        let mut out = Vec::with_capacity(8);
        assert_eq!(schedule(&recorder, 90, 10, 100, &mut out), 0);
        let frames: Vec<u32> = out.iter().map(|s| s.action.frame).collect();
        assert_eq!(frames, vec![95, 2]);

        out.clear();
        schedule(&recorder, 45, 10, 100, &mut out);
        let frames: Vec<u32> = out.iter().map(|s| s.action.frame).collect();
        assert_eq!(frames, vec![50, 2]);

        out.clear();
        schedule(&recorder, 3, 10, 100, &mut out);
        let frames: Vec<u32> = out.iter().map(|s| s.action.frame).collect();
        assert_eq!(frames, vec![2]);
    }

    #[test]
    fn crowded_head_does_not_starve_current_window() {
        let mut recorder = ActionRecorder::new();
        let ch = ChannelId::new(1);
        for frame in 0..1100 {
            recorder.rec(Action::new(ch, frame, ActionKind::KeyPress));
        }
        recorder.rec(Action::new(ch, 2100, ActionKind::KeyPress));

        let mut out = Vec::with_capacity(SCHEDULE_CAPACITY);
        let dropped = schedule(&recorder, 2000, 1500, 4000, &mut out);
        assert_eq!(out.len(), SCHEDULE_CAPACITY);
        assert_eq!(out[0].action.frame, 2100);
        assert_eq!(dropped, 77);
    }

    #[test]
    fn overfull_block_counts_dropped_actions() {
        let engine = engine_with(EngineSettings::default());
        {
            let mut recorder = engine.recorder.lock();
            let ch = ChannelId::new(99);
            for frame in 0..600 {
                recorder.rec(Action::new(ch, frame, ActionKind::KeyPress));
                recorder.rec(Action::new(ch, frame, ActionKind::KeyRelease));
            }
        }
        engine.start_transport();
        let mut mixer = Mixer::new(engine.clone());
        run(&mut mixer, 1024);
        assert_eq!(engine.controls.dropped_actions(), 176);
    }

    #[test]
    fn recording_survives_a_busy_recorder() {
        let engine = engine_with(EngineSettings {
            quantize: 4,
            ..EngineSettings::default()
        });
        let ids: Vec<ChannelId> = (0..70)
            .map(|_| {
                let id = engine.add_channel(ChannelKind::Sample);
                engine
                    .with_channel(id, |ch, ctx| {
                        let wave = Wave::from_stereo(vec![0.5; 1000 * 2], 44100, "hit");
                        ch.set_wave(Some(wave), ctx);
                    })
                    .unwrap();
                id
            })
            .collect();
        engine.start_action_rec();
        engine.clock.set_current_frame(5500);
        for id in &ids {
            engine
                .with_channel(*id, |ch, ctx| ch.start(ctx, true, false))
                .unwrap();
        }

        let mut mixer = Mixer::new(engine.clone());
        {
            // A control thread holding the action log for the whole block.
            let _held = engine.recorder.lock();
            run(&mut mixer, 64);
        }
        assert!(engine
            .channel_infos()
            .iter()
            .all(|c| c.status == ChannelStatus::Play));

        let recorder = engine.lock_recorder();
        assert_eq!(recorder.len(), 70);
        assert!(recorder
            .actions()
            .iter()
            .all(|a| a.frame == 5512 && a.kind == ActionKind::KeyPress));
        assert_eq!(engine.rec_queue.dropped(), 0);
    }

    #[test]
    fn next_volume_wraps_to_first_point() {
        let mut recorder = ActionRecorder::new();
        let ch = ChannelId::new(1);
        recorder.rec(Action::new(ch, 10, ActionKind::Volume).with_values(0, 0.2));
        recorder.rec(Action::new(ch, 80, ActionKind::Volume).with_values(0, 0.9));
        let first = recorder.actions()[0];
        let last = recorder.actions()[1];
        assert_eq!(next_volume(&recorder, &first, 100), Some((70, 0.9)));
        assert_eq!(next_volume(&recorder, &last, 100), Some((30, 0.2)));

        let mut single = ActionRecorder::new();
        single.rec(first);
        assert_eq!(next_volume(&single, &first, 100), None);
    }
}
