//! Plugins shipped with the engine: a gain stage, a one-pole low-pass and a
//! sine instrument.

use std::f32::consts::TAU;

use ostinato_types::midi::{CONTROL_CHANGE, NOTE_OFF, NOTE_ON};
use ostinato_types::MidiEvent;

use crate::plugin_host::{Plugin, PluginLoader};

/// Resolves the built-in uids.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinLoader;

impl PluginLoader for BuiltinLoader {
    fn load(
        &self,
        uid: &str,
        sample_rate: u32,
        _buffer_frames: usize,
    ) -> Result<Box<dyn Plugin>, String> {
        match uid {
            "gain" => Ok(Box::new(Gain { value: 0.5 })),
            "lowpass" => Ok(Box::new(LowPass::new(sample_rate))),
            "sine" => Ok(Box::new(Sine::new(sample_rate))),
            other => Err(format!("Unknown plugin uid '{}'", other)),
        }
    }

    fn available(&self) -> Vec<String> {
        ["gain", "lowpass", "sine"].map(String::from).to_vec()
    }
}

/// 0..=1 maps to 0..=2x; 0.5 is unity.
struct Gain {
    value: f32,
}

impl Plugin for Gain {
    fn uid(&self) -> &str {
        "gain"
    }

    fn name(&self) -> &str {
        "Gain"
    }

    fn param_count(&self) -> usize {
        1
    }

    fn param(&self, _index: usize) -> f32 {
        self.value
    }

    fn set_param(&mut self, _index: usize, value: f32) {
        self.value = value;
    }

    fn param_name(&self, _index: usize) -> String {
        "gain".to_string()
    }

    fn process(&mut self, buf: &mut [f32], _midi: &[MidiEvent]) {
        let g = self.value * 2.0;
        for s in buf {
            *s *= g;
        }
    }
}

struct LowPass {
    sample_rate: f32,
    cutoff: f32,
    coeff: f32,
    state: [f32; 2],
}

impl LowPass {
    fn new(sample_rate: u32) -> Self {
        let mut lp = Self {
            sample_rate: sample_rate.max(1) as f32,
            cutoff: 1.0,
            coeff: 1.0,
            state: [0.0; 2],
        };
        lp.update_coeff();
        lp
    }

    /// Cutoff sweeps 20 Hz .. 20 kHz exponentially.
    fn update_coeff(&mut self) {
        let hz = 20.0 * 1000.0_f32.powf(self.cutoff);
        let x = (-TAU * hz / self.sample_rate).exp();
        self.coeff = 1.0 - x;
    }
}

impl Plugin for LowPass {
    fn uid(&self) -> &str {
        "lowpass"
    }

    fn name(&self) -> &str {
        "Low-pass"
    }

    fn param_count(&self) -> usize {
        1
    }

    fn param(&self, _index: usize) -> f32 {
        self.cutoff
    }

    fn set_param(&mut self, _index: usize, value: f32) {
        self.cutoff = value;
        self.update_coeff();
    }

    fn param_name(&self, _index: usize) -> String {
        "cutoff".to_string()
    }

    fn process(&mut self, buf: &mut [f32], _midi: &[MidiEvent]) {
        for frame in buf.chunks_exact_mut(2) {
            for (s, z) in frame.iter_mut().zip(self.state.iter_mut()) {
                *z += self.coeff * (*s - *z);
                *s = *z;
            }
        }
    }
}

/// Monophonic sine voice, last note priority.
struct Sine {
    sample_rate: f32,
    level: f32,
    note: Option<u8>,
    velocity: f32,
    phase: f32,
}

impl Sine {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f32,
            level: 0.5,
            note: None,
            velocity: 0.0,
            phase: 0.0,
        }
    }

    fn handle(&mut self, event: &MidiEvent) {
        let event = event.normalized();
        match event.status() {
            NOTE_ON => {
                self.note = Some(event.note());
                self.velocity = event.velocity_unit();
            }
            NOTE_OFF if self.note == Some(event.note()) => self.note = None,
            // All notes off.
            CONTROL_CHANGE if event.note() == 0x7B => self.note = None,
            _ => {}
        }
    }
}

impl Plugin for Sine {
    fn uid(&self) -> &str {
        "sine"
    }

    fn name(&self) -> &str {
        "Sine"
    }

    fn param_count(&self) -> usize {
        1
    }

    fn param(&self, _index: usize) -> f32 {
        self.level
    }

    fn set_param(&mut self, _index: usize, value: f32) {
        self.level = value;
    }

    fn param_name(&self, _index: usize) -> String {
        "level".to_string()
    }

    fn is_instrument(&self) -> bool {
        true
    }

    fn process(&mut self, buf: &mut [f32], midi: &[MidiEvent]) {
        for event in midi {
            self.handle(event);
        }
        let Some(note) = self.note else {
            self.phase = 0.0;
            return;
        };
        let hz = 440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0);
        let inc = TAU * hz / self.sample_rate;
        let amp = self.level * self.velocity;
        for frame in buf.chunks_exact_mut(2) {
            let s = self.phase.sin() * amp;
            frame[0] = s;
            frame[1] = s;
            self.phase = (self.phase + inc) % TAU;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_half_is_unity() {
        let mut p = BuiltinLoader.load("gain", 44100, 4).unwrap();
        let mut buf = vec![0.3; 4];
        p.process(&mut buf, &[]);
        assert!((buf[0] - 0.3).abs() < 1e-6);
        p.set_param(0, 0.0);
        p.process(&mut buf, &[]);
        assert_eq!(buf[0], 0.0);
    }

    #[test]
    fn lowpass_smooths_a_step() {
        let mut p = BuiltinLoader.load("lowpass", 44100, 4).unwrap();
        p.set_param(0, 0.2);
        let mut buf = vec![1.0; 8];
        p.process(&mut buf, &[]);
        assert!(buf[0] < 1.0);
        assert!(buf[6] > buf[0]);
    }

    #[test]
    fn sine_follows_note_on_and_off() {
        let mut p = BuiltinLoader.load("sine", 44100, 4).unwrap();
        let mut buf = vec![0.0; 8];
        p.process(&mut buf, &[MidiEvent::from_bytes(0x90, 69, 127)]);
        assert!(buf[2] > 0.0);

        let mut buf = vec![0.0; 8];
        p.process(&mut buf, &[MidiEvent::from_bytes(0x80, 69, 0)]);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn unknown_uid_errors() {
        assert!(BuiltinLoader.load("reverb", 44100, 4).is_err());
        assert_eq!(BuiltinLoader.available().len(), 3);
    }
}
