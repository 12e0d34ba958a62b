#![allow(dead_code)]
//! Shared harness for ostinato-core integration tests.

use ostinato_audio::{EngineSettings, Mixer, Wave};
use ostinato_core::EngineContext;
use ostinato_types::{ChannelCommand, ChannelId, ChannelKind, ChannelMode};

pub const RATE: u32 = 8000;

/// A context at 8 kHz, 120 bpm, 4 beats: one loop is 16000 frames.
pub fn context() -> EngineContext {
    EngineContext::with_settings(EngineSettings {
        sample_rate: RATE,
        buffer_frames: 256,
        ..EngineSettings::default()
    })
}

/// Render `frames` frames and return the interleaved output.
pub fn run(mixer: &mut Mixer, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0; frames * 2];
    mixer.process(&mut out, None);
    out
}

/// Render in blocks until the clock reaches `frame`.
pub fn run_until(mixer: &mut Mixer, frame: u32) {
    assert!(mixer.engine().clock.is_running(), "transport is stopped");
    let total = mixer.engine().clock.total_frames();
    assert!(frame < total, "frame {} past loop end {}", frame, total);
    loop {
        let current = mixer.engine().clock.current_frame();
        if current == frame {
            return;
        }
        let remaining = if current < frame {
            frame - current
        } else {
            total - current
        };
        run(mixer, remaining.min(1024) as usize);
    }
}

/// A ramp so that any shift in playback position changes the output.
pub fn ramp(frames: usize) -> Vec<f32> {
    (0..frames)
        .flat_map(|i| {
            let v = (i as f32 + 1.0) / frames as f32;
            [v, -v]
        })
        .collect()
}

pub fn sample_channel(ctx: &EngineContext, mode: ChannelMode, frames: usize) -> ChannelId {
    let id = ctx
        .dispatch(ChannelCommand::Add(ChannelKind::Sample))
        .channel
        .expect("channel created");
    ctx.engine()
        .with_channel(id, |ch, c| {
            ch.set_wave(Some(Wave::from_stereo(ramp(frames), RATE, "ramp")), c);
        })
        .expect("channel exists");
    let r = ctx.dispatch(ChannelCommand::SetMode { channel: id, mode });
    assert!(!r.is_error());
    id
}
