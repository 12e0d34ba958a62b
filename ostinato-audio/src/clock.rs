//! Frame-accurate transport.
//!
//! Every field is an atomic so the audio thread reads the transport without
//! locking while control threads change tempo or meter. All counts are in
//! frames (one stereo sample pair).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ostinato_types::transport::{
    DEFAULT_BPM, MAX_BARS, MAX_BEATS, MAX_BPM, MAX_QUANTIZE, MIN_BPM,
};

pub struct Clock {
    sample_rate: AtomicU32,
    /// f32 bits
    bpm: AtomicU32,
    beats: AtomicU32,
    bars: AtomicU32,
    quantize: AtomicU32,

    total_frames: AtomicU32,
    frames_per_bar: AtomicU32,
    frames_per_beat: AtomicU32,
    frames_in_sequencer: AtomicU32,
    quanto: AtomicU32,

    current_frame: AtomicU32,
    current_beat: AtomicU32,
    running: AtomicBool,
}

impl Clock {
    pub fn new(sample_rate: u32, bpm: f32, beats: u32, bars: u32, quantize: u32) -> Self {
        let clock = Self {
            sample_rate: AtomicU32::new(sample_rate.max(1)),
            bpm: AtomicU32::new(DEFAULT_BPM.to_bits()),
            beats: AtomicU32::new(1),
            bars: AtomicU32::new(1),
            quantize: AtomicU32::new(0),
            total_frames: AtomicU32::new(0),
            frames_per_bar: AtomicU32::new(0),
            frames_per_beat: AtomicU32::new(0),
            frames_in_sequencer: AtomicU32::new(0),
            quanto: AtomicU32::new(1),
            current_frame: AtomicU32::new(0),
            current_beat: AtomicU32::new(0),
            running: AtomicBool::new(false),
        };
        clock.bpm.store(clamp_bpm(bpm).to_bits(), Ordering::Relaxed);
        clock.beats.store(beats.clamp(1, MAX_BEATS), Ordering::Relaxed);
        clock.bars.store(bars.clamp(1, MAX_BARS), Ordering::Relaxed);
        clock.quantize.store(quantize.min(MAX_QUANTIZE), Ordering::Relaxed);
        clock.update_frame_bars();
        clock
    }

    /// Recompute frame counts from sample rate, bpm, beats and bars.
    pub fn update_frame_bars(&self) {
        let seconds = 60.0 / self.bpm() as f64 * self.beats() as f64;
        let total = ((self.sample_rate() as f64 * seconds) as u32).max(1);
        let per_bar = (total / self.bars()).max(1);
        let per_beat = (total / self.beats()).max(1);

        self.frames_per_bar.store(per_bar, Ordering::Relaxed);
        self.frames_per_beat.store(per_beat, Ordering::Relaxed);
        self.frames_in_sequencer
            .store(per_beat.saturating_mul(MAX_BEATS), Ordering::Relaxed);
        self.total_frames.store(total, Ordering::Release);
        self.update_quanto();
    }

    /// Quanto is `frames_per_beat / quantize`, truncated, never below one frame.
    fn update_quanto(&self) {
        let q = self.quantize();
        let quanto = if q == 0 {
            1
        } else {
            (self.frames_per_beat() / q).max(1)
        };
        self.quanto.store(quanto, Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn bpm(&self) -> f32 {
        f32::from_bits(self.bpm.load(Ordering::Relaxed))
    }

    pub fn beats(&self) -> u32 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn bars(&self) -> u32 {
        self.bars.load(Ordering::Relaxed)
    }

    pub fn quantize(&self) -> u32 {
        self.quantize.load(Ordering::Relaxed)
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames.load(Ordering::Acquire)
    }

    pub fn frames_per_bar(&self) -> u32 {
        self.frames_per_bar.load(Ordering::Relaxed)
    }

    pub fn frames_per_beat(&self) -> u32 {
        self.frames_per_beat.load(Ordering::Relaxed)
    }

    pub fn frames_in_sequencer(&self) -> u32 {
        self.frames_in_sequencer.load(Ordering::Relaxed)
    }

    pub fn quanto(&self) -> u32 {
        self.quanto.load(Ordering::Relaxed)
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame.load(Ordering::Acquire)
    }

    pub fn current_beat(&self) -> u32 {
        self.current_beat.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate.max(1), Ordering::Relaxed);
        self.update_frame_bars();
    }

    pub fn set_bpm(&self, bpm: f32) {
        self.bpm.store(clamp_bpm(bpm).to_bits(), Ordering::Relaxed);
        self.update_frame_bars();
    }

    pub fn set_beats(&self, beats: u32) {
        self.beats.store(beats.clamp(1, MAX_BEATS), Ordering::Relaxed);
        self.update_frame_bars();
    }

    pub fn set_bars(&self, bars: u32) {
        self.bars.store(bars.clamp(1, MAX_BARS), Ordering::Relaxed);
        self.update_frame_bars();
    }

    /// Set beats and bars together so the frame counts are recomputed once.
    pub fn set_meter(&self, beats: u32, bars: u32) {
        self.beats.store(beats.clamp(1, MAX_BEATS), Ordering::Relaxed);
        self.bars.store(bars.clamp(1, MAX_BARS), Ordering::Relaxed);
        self.update_frame_bars();
    }

    pub fn set_quantize(&self, quantize: u32) {
        self.quantize.store(quantize.min(MAX_QUANTIZE), Ordering::Relaxed);
        self.update_quanto();
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn rewind(&self) {
        self.current_frame.store(0, Ordering::Release);
        self.current_beat.store(0, Ordering::Relaxed);
    }

    /// Advance one frame. Wraps to 0 when the loop ends, otherwise bumps the
    /// beat counter on beat boundaries.
    pub fn incr_current_frame(&self) {
        let next = self.current_frame() + 1;
        if next >= self.total_frames() {
            self.rewind();
        } else {
            self.current_frame.store(next, Ordering::Release);
            if self.is_on_beat() {
                self.current_beat.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn quanto_has_passed(&self) -> bool {
        self.current_frame() % self.quanto() == 0
    }

    pub fn is_on_bar(&self) -> bool {
        let frame = self.current_frame();
        frame != 0 && frame % self.frames_per_bar() == 0
    }

    pub fn is_on_beat(&self) -> bool {
        let frame = self.current_frame();
        frame != 0 && frame % self.frames_per_beat() == 0
    }

    pub fn is_on_first_beat(&self) -> bool {
        self.current_frame() == 0
    }

    #[cfg(test)]
    pub(crate) fn set_current_frame(&self, frame: u32) {
        self.current_frame.store(frame, Ordering::Release);
    }
}

/// Values below the minimum clamp up; values above the maximum fall back to
/// the default tempo.
pub fn clamp_bpm(bpm: f32) -> f32 {
    if !bpm.is_finite() || bpm > MAX_BPM {
        DEFAULT_BPM
    } else {
        bpm.max(MIN_BPM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_counts_at_120_bpm() {
        let clock = Clock::new(44100, 120.0, 4, 4, 4);
        assert_eq!(clock.frames_per_beat(), 22050);
        assert_eq!(clock.total_frames(), 88200);
        assert_eq!(clock.frames_per_bar(), 22050);
        assert_eq!(clock.quanto(), 5512);
        assert_eq!(clock.frames_in_sequencer(), 22050 * 32);
    }

    #[test]
    fn quanto_without_quantize_is_every_frame() {
        let clock = Clock::new(44100, 120.0, 4, 1, 0);
        assert_eq!(clock.quanto(), 1);
        clock.set_current_frame(1234);
        assert!(clock.quanto_has_passed());
    }

    #[test]
    fn boundary_predicates() {
        let clock = Clock::new(44100, 120.0, 4, 2, 0);
        assert!(clock.is_on_first_beat());
        assert!(!clock.is_on_bar());
        assert!(!clock.is_on_beat());

        clock.set_current_frame(22050);
        assert!(clock.is_on_beat());
        assert!(!clock.is_on_bar());

        clock.set_current_frame(44100);
        assert!(clock.is_on_bar());
        assert!(clock.is_on_beat());
    }

    #[test]
    fn frame_wraps_at_loop_end() {
        let clock = Clock::new(44100, 120.0, 1, 1, 0);
        clock.set_current_frame(clock.total_frames() - 1);
        clock.incr_current_frame();
        assert_eq!(clock.current_frame(), 0);
        assert_eq!(clock.current_beat(), 0);
    }

    #[test]
    fn beat_counter_advances_on_beats() {
        let clock = Clock::new(44100, 120.0, 4, 1, 0);
        clock.set_current_frame(22049);
        clock.incr_current_frame();
        assert_eq!(clock.current_beat(), 1);
    }

    #[test]
    fn bpm_range() {
        let clock = Clock::new(44100, 120.0, 4, 1, 0);
        clock.set_bpm(5.0);
        assert_eq!(clock.bpm(), MIN_BPM);
        clock.set_bpm(5000.0);
        assert_eq!(clock.bpm(), DEFAULT_BPM);
        clock.set_bpm(60.0);
        assert_eq!(clock.frames_per_beat(), 44100);
    }

    #[test]
    fn quantize_clamps_and_updates_quanto() {
        let clock = Clock::new(44100, 120.0, 4, 1, 0);
        clock.set_quantize(100);
        assert_eq!(clock.quantize(), MAX_QUANTIZE);
        assert_eq!(clock.quanto(), 22050 / 8);
    }
}
