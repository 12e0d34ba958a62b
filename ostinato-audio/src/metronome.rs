//! Metronome clicks.
//!
//! Two precomputed 38-sample click waveforms: "tick" marks bars, "tock"
//! marks the other beats. A click is mixed into both output channels and
//! resets once all of its samples have been emitted.

pub const CLICK_LEN: usize = 38;

const TOCK: [f32; CLICK_LEN] = [
    0.059033, 0.117240, 0.173807, 0.227943, 0.278890, 0.325936, 0.368423, 0.405755, 0.437413,
    0.462951, 0.482013, 0.494333, 0.499738, 0.498153, 0.489598, 0.474195, 0.452159, 0.423798,
    0.389509, 0.349771, 0.289883, 0.230617, 0.173194, 0.118739, 0.068260, 0.022631, -0.017423,
    -0.051339, -0.078721, -0.099345, -0.113163, -0.120295, -0.121028, -0.115804, -0.105209,
    -0.089954, -0.070862, -0.048844,
];

const TICK: [f32; CLICK_LEN] = [
    0.175860, 0.341914, 0.488904, 0.608633, 0.694426, 0.741500, 0.747229, 0.711293, 0.635697,
    0.524656, 0.384362, 0.222636, 0.048496, -0.128348, -0.298035, -0.451105, -0.579021,
    -0.674653, -0.732667, -0.749830, -0.688924, -0.594091, -0.474481, -0.340160, -0.201360,
    -0.067752, 0.052194, 0.151746, 0.226280, 0.273493, 0.293425, 0.288307, 0.262252, 0.220811,
    0.170435, 0.117887, 0.069639, 0.031320,
];

#[derive(Debug, Default, Clone, Copy)]
struct Click {
    playing: bool,
    pos: usize,
}

impl Click {
    #[inline]
    fn next(&mut self, wave: &[f32; CLICK_LEN]) -> f32 {
        if !self.playing {
            return 0.0;
        }
        let s = wave[self.pos];
        self.pos += 1;
        if self.pos >= CLICK_LEN {
            self.playing = false;
            self.pos = 0;
        }
        s
    }
}

/// Click playback state, owned by the mixer.
#[derive(Debug, Default)]
pub struct Metronome {
    tick: Click,
    tock: Click,
}

impl Metronome {
    pub fn trigger_tick(&mut self) {
        self.tick = Click { playing: true, pos: 0 };
    }

    /// Ignored while a tick is sounding, so bars don't double-click.
    pub fn trigger_tock(&mut self) {
        if !self.tick.playing {
            self.tock = Click { playing: true, pos: 0 };
        }
    }

    pub fn is_sounding(&self) -> bool {
        self.tick.playing || self.tock.playing
    }

    /// Add pending click samples to an interleaved stereo buffer.
    pub fn render(&mut self, out: &mut [f32]) {
        for frame in out.chunks_exact_mut(2) {
            if !self.is_sounding() {
                break;
            }
            let s = self.tock.next(&TOCK) + self.tick.next(&TICK);
            frame[0] += s;
            frame[1] += s;
        }
    }
}
