//! MIDI clock and MIDI time code generation.

use std::sync::atomic::{AtomicU32, Ordering};

use ostinato_types::midi::{
    END_OF_SYSEX, MTC_QUARTER_FRAME, SONG_POSITION, START, STOP, SYSEX, TIMING_CLOCK,
};
use ostinato_types::transport::MIDI_CLOCK_PPQ;
use ostinato_types::MidiSyncMode;

use crate::clock::Clock;
use crate::midi_out::{MidiOut, MidiOutMsg};

/// Sends transport sync to external gear according to the configured mode.
pub struct MidiSync {
    mode: MidiSyncMode,
    fps: u32,
    tc_frames: AtomicU32,
    tc_seconds: AtomicU32,
    tc_minutes: AtomicU32,
    tc_hours: AtomicU32,
}

impl MidiSync {
    pub fn new(mode: MidiSyncMode, fps: u32) -> Self {
        let fps = match fps {
            24 | 25 | 30 => fps,
            _ => 25,
        };
        Self {
            mode,
            fps,
            tc_frames: AtomicU32::new(0),
            tc_seconds: AtomicU32::new(0),
            tc_minutes: AtomicU32::new(0),
            tc_hours: AtomicU32::new(0),
        }
    }

    pub fn mode(&self) -> MidiSyncMode {
        self.mode
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// SMPTE rate code carried in the hours byte.
    fn rate_code(&self) -> u8 {
        match self.fps {
            24 => 0,
            25 => 1,
            _ => 3,
        }
    }

    pub fn on_start(&self, out: &MidiOut) {
        if self.mode == MidiSyncMode::Clock {
            out.send(MidiOutMsg::realtime(START));
            out.send(MidiOutMsg::from_bytes(&[SONG_POSITION, 0, 0]));
        }
    }

    pub fn on_stop(&self, out: &MidiOut) {
        if self.mode == MidiSyncMode::Clock {
            out.send(MidiOutMsg::realtime(STOP));
        }
    }

    /// Reset time code and tell the slave where we are.
    pub fn on_rewind(&self, out: &MidiOut) {
        self.tc_frames.store(0, Ordering::Relaxed);
        self.tc_seconds.store(0, Ordering::Relaxed);
        self.tc_minutes.store(0, Ordering::Relaxed);
        self.tc_hours.store(0, Ordering::Relaxed);
        match self.mode {
            MidiSyncMode::Mtc => {
                let hours = self.rate_code() << 5;
                out.send(MidiOutMsg::from_bytes(&[
                    SYSEX, 0x7F, 0x7F, 0x01, 0x01, hours, 0, 0, 0, END_OF_SYSEX,
                ]));
            }
            MidiSyncMode::Clock => {
                out.send(MidiOutMsg::from_bytes(&[SONG_POSITION, 0, 0]));
            }
            MidiSyncMode::None => {}
        }
    }

    /// Called by the mixer once per frame while the transport runs.
    pub fn on_frame(&self, clock: &Clock, out: &MidiOut) {
        let frame = clock.current_frame();
        match self.mode {
            MidiSyncMode::Clock => {
                let rate = clock.frames_per_beat() / MIDI_CLOCK_PPQ;
                if rate > 0 && frame % rate == 0 {
                    out.send(MidiOutMsg::realtime(TIMING_CLOCK));
                }
            }
            MidiSyncMode::Mtc => {
                let rate = clock.sample_rate() / self.fps;
                if rate > 0 && frame % rate == 0 {
                    self.send_quarter_frames(out);
                }
            }
            MidiSyncMode::None => {}
        }
    }

    fn send_quarter_frames(&self, out: &MidiOut) {
        let frames = self.tc_frames.load(Ordering::Relaxed) as u8;
        let seconds = self.tc_seconds.load(Ordering::Relaxed) as u8;
        let minutes = self.tc_minutes.load(Ordering::Relaxed) as u8;
        let hours = self.tc_hours.load(Ordering::Relaxed) as u8;

        let pieces = if frames % 2 == 0 {
            [
                frames & 0x0F,
                0x10 | (frames >> 4),
                0x20 | (seconds & 0x0F),
                0x30 | (seconds >> 4),
            ]
        } else {
            [
                0x40 | (minutes & 0x0F),
                0x50 | (minutes >> 4),
                0x60 | (hours & 0x0F),
                0x70 | ((hours >> 4) & 0x01) | (self.rate_code() << 1),
            ]
        };
        for p in pieces {
            out.send(MidiOutMsg::from_bytes(&[MTC_QUARTER_FRAME, p]));
        }
        self.advance();
    }

    fn advance(&self) {
        let frames = self.tc_frames.fetch_add(1, Ordering::Relaxed) + 1;
        if frames < self.fps {
            return;
        }
        self.tc_frames.store(0, Ordering::Relaxed);
        let seconds = self.tc_seconds.fetch_add(1, Ordering::Relaxed) + 1;
        if seconds < 60 {
            return;
        }
        self.tc_seconds.store(0, Ordering::Relaxed);
        let minutes = self.tc_minutes.fetch_add(1, Ordering::Relaxed) + 1;
        if minutes < 60 {
            return;
        }
        self.tc_minutes.store(0, Ordering::Relaxed);
        self.tc_hours.fetch_add(1, Ordering::Relaxed);
    }

    /// (hours, minutes, seconds, frames)
    pub fn timecode(&self) -> (u32, u32, u32, u32) {
        (
            self.tc_hours.load(Ordering::Relaxed),
            self.tc_minutes.load(Ordering::Relaxed),
            self.tc_seconds.load(Ordering::Relaxed),
            self.tc_frames.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_master_ticks_24_per_beat() {
        let clock = Clock::new(48000, 120.0, 1, 1, 0);
        let out = MidiOut::new(4096);
        let sync = MidiSync::new(MidiSyncMode::Clock, 25);
        for _ in 0..clock.total_frames() {
            sync.on_frame(&clock, &out);
            clock.incr_current_frame();
        }
        let ticks = out
            .drain()
            .iter()
            .filter(|m| m.as_bytes() == [TIMING_CLOCK])
            .count();
        assert_eq!(ticks, 24);
    }

    #[test]
    fn clock_master_start_sends_start_and_position() {
        let out = MidiOut::new(16);
        MidiSync::new(MidiSyncMode::Clock, 25).on_start(&out);
        let msgs = out.drain();
        assert_eq!(msgs[0].as_bytes(), &[START]);
        assert_eq!(msgs[1].as_bytes(), &[SONG_POSITION, 0, 0]);

        MidiSync::new(MidiSyncMode::None, 25).on_start(&out);
        assert!(out.drain().is_empty());
    }

    #[test]
    fn mtc_quarter_frames_and_carry() {
        let clock = Clock::new(44100, 120.0, 4, 1, 0);
        let out = MidiOut::new(4096);
        let sync = MidiSync::new(MidiSyncMode::Mtc, 25);
        sync.on_frame(&clock, &out);
        let msgs = out.drain();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].as_bytes(), &[MTC_QUARTER_FRAME, 0x00]);
        assert_eq!(msgs[3].as_bytes(), &[MTC_QUARTER_FRAME, 0x30]);

        for _ in 0..24 {
            sync.advance();
        }
        assert_eq!(sync.timecode(), (0, 0, 1, 0));
    }

    #[test]
    fn mtc_rewind_sends_full_frame() {
        let out = MidiOut::new(16);
        let sync = MidiSync::new(MidiSyncMode::Mtc, 25);
        sync.advance();
        sync.on_rewind(&out);
        assert_eq!(sync.timecode(), (0, 0, 0, 0));
        let msgs = out.drain();
        assert_eq!(msgs[0].as_bytes()[0], SYSEX);
        assert_eq!(msgs[0].as_bytes().len(), 10);
    }
}
