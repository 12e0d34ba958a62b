//! Transport constants and MIDI sync modes.

use serde::{Deserialize, Serialize};

pub const MIN_BPM: f32 = 20.0;
pub const MAX_BPM: f32 = 999.0;
pub const DEFAULT_BPM: f32 = 120.0;
pub const MAX_BEATS: u32 = 32;
pub const MAX_BARS: u32 = 32;
pub const DEFAULT_BEATS: u32 = 4;
pub const DEFAULT_BARS: u32 = 1;
pub const MAX_QUANTIZE: u32 = 8;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_BUFFER_FRAMES: usize = 1024;

pub const MIN_PITCH: f32 = 0.1;
pub const MAX_PITCH: f32 = 4.0;
/// Boost ceiling in dB; the channel stores linear gain.
pub const MAX_BOOST_DB: f32 = 20.0;

/// MIDI clock ticks per quarter note.
pub const MIDI_CLOCK_PPQ: u32 = 24;

/// How the engine drives external gear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiSyncMode {
    #[default]
    None,
    /// Send MIDI clock, start, stop and song position.
    Clock,
    /// Send MIDI time code quarter frames and full frames.
    Mtc,
}

impl MidiSyncMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "clock" => Some(Self::Clock),
            "mtc" => Some(Self::Mtc),
            _ => None,
        }
    }
}

/// Convert a boost value in dB to linear gain.
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_mode() {
        assert_eq!(MidiSyncMode::parse("Clock"), Some(MidiSyncMode::Clock));
        assert_eq!(MidiSyncMode::parse(" mtc "), Some(MidiSyncMode::Mtc));
        assert_eq!(MidiSyncMode::parse("off"), Some(MidiSyncMode::None));
        assert_eq!(MidiSyncMode::parse("slave"), None);
    }

    #[test]
    fn max_boost_is_ten_times() {
        assert!((db_to_linear(MAX_BOOST_DB) - 10.0).abs() < 1e-4);
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
    }
}
