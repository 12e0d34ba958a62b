use std::path::{Path, PathBuf};

use serde::Deserialize;

use ostinato_audio::clock::clamp_bpm;
use ostinato_audio::{Behavior, EngineSettings, StreamOptions};
use ostinato_types::transport::{
    DEFAULT_BARS, DEFAULT_BEATS, DEFAULT_BPM, DEFAULT_BUFFER_FRAMES, DEFAULT_SAMPLE_RATE,
    MAX_BEATS, MAX_BPM, MAX_QUANTIZE, MIN_BPM,
};
use ostinato_types::MidiSyncMode;

use crate::midi::MasterBindings;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    audio: AudioConfig,
    #[serde(default)]
    transport: TransportConfig,
    #[serde(default)]
    behavior: BehaviorConfig,
    #[serde(default)]
    midi: MidiConfig,
}

#[derive(Deserialize, Default)]
struct AudioConfig {
    sample_rate: Option<u32>,
    buffer_size: Option<usize>,
    delay_compensation: Option<u32>,
    limit_output: Option<bool>,
    enable_input: Option<bool>,
    input_device: Option<String>,
    output_device: Option<String>,
}

#[derive(Deserialize, Default)]
struct TransportConfig {
    bpm: Option<f32>,
    beats: Option<u32>,
    bars: Option<u32>,
    quantize: Option<u32>,
    metronome: Option<bool>,
}

#[derive(Deserialize, Default)]
struct BehaviorConfig {
    chans_stop_on_seq_halt: Option<bool>,
    treat_recs_as_loops: Option<bool>,
    recs_stop_on_chan_halt: Option<bool>,
    input_monitor_default: Option<bool>,
}

#[derive(Deserialize, Default)]
struct MidiConfig {
    input_port: Option<String>,
    output_port: Option<String>,
    sync: Option<String>,
    mtc_fps: Option<u32>,
    no_note_off: Option<bool>,
    midimap: Option<PathBuf>,
    #[serde(default)]
    master: MasterConfig,
}

#[derive(Deserialize, Default)]
struct MasterConfig {
    enabled: Option<bool>,
    filter: Option<i32>,
    rewind: Option<u32>,
    start_stop: Option<u32>,
    action_rec: Option<u32>,
    input_rec: Option<u32>,
    metronome: Option<u32>,
    volume_in: Option<u32>,
    volume_out: Option<u32>,
    beat_double: Option<u32>,
    beat_half: Option<u32>,
}

pub struct Config {
    file: ConfigFile,
}

impl Config {
    /// Embedded defaults merged with `<config_dir>/ostinato/config.toml`.
    pub fn load() -> Self {
        Self::load_from(user_config_path().as_deref())
    }

    /// Embedded defaults merged with the file at `path`, if it exists and
    /// parses. Problems with the user file are logged and ignored.
    pub fn load_from(path: Option<&Path>) -> Self {
        let mut base = embedded();

        if let Some(path) = path {
            if path.exists() {
                match std::fs::read_to_string(path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config { file: base }
    }

    /// Embedded defaults merged with a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, String> {
        let user: ConfigFile =
            toml::from_str(contents).map_err(|e| format!("Failed to parse config: {}", e))?;
        let mut base = embedded();
        merge(&mut base, user);
        Ok(Config { file: base })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let audio = &self.file.audio;
        let transport = &self.file.transport;
        let midi = &self.file.midi;

        let sample_rate = match audio.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE) {
            r @ 8_000..=192_000 => r,
            r => {
                log::warn!(target: "config", "sample_rate {} out of range, using {}", r, DEFAULT_SAMPLE_RATE);
                DEFAULT_SAMPLE_RATE
            }
        };
        let buffer_frames = match audio.buffer_size.unwrap_or(DEFAULT_BUFFER_FRAMES) {
            b @ 16..=8192 => b,
            b => {
                log::warn!(target: "config", "buffer_size {} out of range, using {}", b, DEFAULT_BUFFER_FRAMES);
                DEFAULT_BUFFER_FRAMES
            }
        };

        let raw_bpm = transport.bpm.unwrap_or(DEFAULT_BPM);
        let bpm = clamp_bpm(raw_bpm);
        if !(MIN_BPM..=MAX_BPM).contains(&raw_bpm) {
            log::warn!(target: "config", "bpm {} out of range, using {}", raw_bpm, bpm);
        }

        let raw_beats = transport.beats.unwrap_or(DEFAULT_BEATS);
        let beats = raw_beats.clamp(1, MAX_BEATS);
        if beats != raw_beats {
            log::warn!(target: "config", "beats {} out of range, using {}", raw_beats, beats);
        }
        let raw_bars = transport.bars.unwrap_or(DEFAULT_BARS);
        let bars = if raw_bars >= 1 && raw_bars <= beats && beats % raw_bars == 0 {
            raw_bars
        } else {
            log::warn!(target: "config", "bars {} does not divide {} beats, using 1", raw_bars, beats);
            1
        };

        let raw_quantize = transport.quantize.unwrap_or(0);
        let quantize = raw_quantize.min(MAX_QUANTIZE);
        if quantize != raw_quantize {
            log::warn!(target: "config", "quantize {} out of range, using {}", raw_quantize, quantize);
        }

        let sync = match midi.sync.as_deref() {
            None => MidiSyncMode::None,
            Some(s) => MidiSyncMode::parse(s).unwrap_or_else(|| {
                log::warn!(target: "config", "unknown midi sync mode '{}', using none", s);
                MidiSyncMode::None
            }),
        };
        let mtc_fps = match midi.mtc_fps.unwrap_or(25) {
            f @ (24 | 25 | 30) => f,
            f => {
                log::warn!(target: "config", "mtc_fps {} unsupported, using 25", f);
                25
            }
        };

        EngineSettings {
            sample_rate,
            buffer_frames,
            delay_compensation: audio.delay_compensation.unwrap_or(0),
            limit_output: audio.limit_output.unwrap_or(false),
            behavior: self.behavior(),
            sync,
            mtc_fps,
            bpm,
            beats,
            bars,
            quantize,
            metronome: transport.metronome.unwrap_or(false),
        }
    }

    pub fn behavior(&self) -> Behavior {
        let b = &self.file.behavior;
        Behavior {
            chans_stop_on_seq_halt: b.chans_stop_on_seq_halt.unwrap_or(false),
            treat_recs_as_loops: b.treat_recs_as_loops.unwrap_or(false),
            recs_stop_on_chan_halt: b.recs_stop_on_chan_halt.unwrap_or(false),
            input_monitor_default: b.input_monitor_default.unwrap_or(false),
        }
    }

    pub fn master_bindings(&self) -> MasterBindings {
        let m = &self.file.midi.master;
        let filter = match m.filter.unwrap_or(-1) {
            -1 => None,
            f @ 0..=15 => Some(f as u8),
            f => {
                log::warn!(target: "config", "master filter {} out of range, listening to all channels", f);
                None
            }
        };
        MasterBindings {
            enabled: m.enabled.unwrap_or(true),
            filter,
            rewind: m.rewind.unwrap_or(0),
            start_stop: m.start_stop.unwrap_or(0),
            action_rec: m.action_rec.unwrap_or(0),
            input_rec: m.input_rec.unwrap_or(0),
            metronome: m.metronome.unwrap_or(0),
            volume_in: m.volume_in.unwrap_or(0),
            volume_out: m.volume_out.unwrap_or(0),
            beat_double: m.beat_double.unwrap_or(0),
            beat_half: m.beat_half.unwrap_or(0),
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            output_device: self.file.audio.output_device.clone(),
            input_device: self.file.audio.input_device.clone(),
            enable_input: self.file.audio.enable_input.unwrap_or(true),
        }
    }

    pub fn midi_input_port(&self) -> Option<&str> {
        self.file.midi.input_port.as_deref()
    }

    pub fn midi_output_port(&self) -> Option<&str> {
        self.file.midi.output_port.as_deref()
    }

    pub fn midimap_path(&self) -> Option<&Path> {
        self.file.midi.midimap.as_deref()
    }

    /// Keep the velocity byte when matching learned bindings.
    pub fn no_note_off(&self) -> bool {
        self.file.midi.no_note_off.unwrap_or(false)
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ostinato").join("config.toml"))
}

fn embedded() -> ConfigFile {
    toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
        log::error!(target: "config", "embedded config.toml is invalid: {}", e);
        ConfigFile::default()
    })
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    merge_audio(&mut base.audio, user.audio);
    merge_transport(&mut base.transport, user.transport);
    merge_behavior(&mut base.behavior, user.behavior);
    merge_midi(&mut base.midi, user.midi);
}

fn merge_audio(base: &mut AudioConfig, user: AudioConfig) {
    if user.sample_rate.is_some() {
        base.sample_rate = user.sample_rate;
    }
    if user.buffer_size.is_some() {
        base.buffer_size = user.buffer_size;
    }
    if user.delay_compensation.is_some() {
        base.delay_compensation = user.delay_compensation;
    }
    if user.limit_output.is_some() {
        base.limit_output = user.limit_output;
    }
    if user.enable_input.is_some() {
        base.enable_input = user.enable_input;
    }
    if user.input_device.is_some() {
        base.input_device = user.input_device;
    }
    if user.output_device.is_some() {
        base.output_device = user.output_device;
    }
}

fn merge_transport(base: &mut TransportConfig, user: TransportConfig) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.beats.is_some() {
        base.beats = user.beats;
    }
    if user.bars.is_some() {
        base.bars = user.bars;
    }
    if user.quantize.is_some() {
        base.quantize = user.quantize;
    }
    if user.metronome.is_some() {
        base.metronome = user.metronome;
    }
}

fn merge_behavior(base: &mut BehaviorConfig, user: BehaviorConfig) {
    if user.chans_stop_on_seq_halt.is_some() {
        base.chans_stop_on_seq_halt = user.chans_stop_on_seq_halt;
    }
    if user.treat_recs_as_loops.is_some() {
        base.treat_recs_as_loops = user.treat_recs_as_loops;
    }
    if user.recs_stop_on_chan_halt.is_some() {
        base.recs_stop_on_chan_halt = user.recs_stop_on_chan_halt;
    }
    if user.input_monitor_default.is_some() {
        base.input_monitor_default = user.input_monitor_default;
    }
}

fn merge_midi(base: &mut MidiConfig, user: MidiConfig) {
    if user.input_port.is_some() {
        base.input_port = user.input_port;
    }
    if user.output_port.is_some() {
        base.output_port = user.output_port;
    }
    if user.sync.is_some() {
        base.sync = user.sync;
    }
    if user.mtc_fps.is_some() {
        base.mtc_fps = user.mtc_fps;
    }
    if user.no_note_off.is_some() {
        base.no_note_off = user.no_note_off;
    }
    if user.midimap.is_some() {
        base.midimap = user.midimap;
    }
    merge_master(&mut base.master, user.master);
}

fn merge_master(base: &mut MasterConfig, user: MasterConfig) {
    macro_rules! take {
        ($($field:ident),*) => {
            $(if user.$field.is_some() {
                base.$field = user.$field;
            })*
        };
    }
    take!(
        enabled,
        filter,
        rewind,
        start_stop,
        action_rec,
        input_rec,
        metronome,
        volume_in,
        volume_out,
        beat_double,
        beat_half
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_types::MasterParam;

    #[test]
    fn test_load_embedded_config() {
        let config = Config::load_from(None);
        let settings = config.engine_settings();
        assert_eq!(settings.sample_rate, 44100);
        assert_eq!(settings.buffer_frames, 1024);
        assert_eq!(settings.bpm, 120.0);
        assert_eq!(settings.beats, 4);
        assert_eq!(settings.bars, 1);
        assert_eq!(settings.quantize, 0);
        assert_eq!(settings.sync, MidiSyncMode::None);
        assert!(!settings.metronome);
        assert_eq!(settings.behavior, Behavior::default());
        assert!(!config.no_note_off());
        assert!(config.midimap_path().is_none());

        let master = config.master_bindings();
        assert!(master.enabled);
        assert_eq!(master.filter, None);
        for p in MasterParam::ALL {
            assert_eq!(master.get(p), 0);
        }
    }

    #[test]
    fn test_user_values_override_defaults() {
        let config = Config::from_toml(
            r#"
            [transport]
            bpm = 90.5
            quantize = 4

            [midi]
            sync = "clock"
            no_note_off = true

            [midi.master]
            filter = 3
            rewind = 0x90004000
            "#,
        )
        .unwrap();
        let settings = config.engine_settings();
        assert_eq!(settings.bpm, 90.5);
        assert_eq!(settings.quantize, 4);
        assert_eq!(settings.beats, 4);
        assert_eq!(settings.sync, MidiSyncMode::Clock);
        assert!(config.no_note_off());

        let master = config.master_bindings();
        assert_eq!(master.filter, Some(3));
        assert_eq!(master.rewind, 0x9000_4000);
        assert!(master.enabled);
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let config = Config::from_toml(
            r#"
            [audio]
            sample_rate = 10
            [transport]
            bpm = 1500.0
            beats = 64
            bars = 5
            quantize = 12
            [midi]
            sync = "smpte"
            mtc_fps = 29
            [midi.master]
            filter = 40
            "#,
        )
        .unwrap();
        let settings = config.engine_settings();
        assert_eq!(settings.sample_rate, 44100);
        assert_eq!(settings.bpm, 120.0);
        assert_eq!(settings.beats, 32);
        assert_eq!(settings.bars, 1);
        assert_eq!(settings.quantize, 8);
        assert_eq!(settings.sync, MidiSyncMode::None);
        assert_eq!(settings.mtc_fps, 25);
        assert_eq!(config.master_bindings().filter, None);

        let slow = Config::from_toml("[transport]\nbpm = 5.0\n").unwrap();
        assert_eq!(slow.engine_settings().bpm, 20.0);
    }

    #[test]
    fn test_malformed_user_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[transport\nbpm = ").unwrap();
        let config = Config::load_from(Some(&path));
        assert_eq!(config.engine_settings().bpm, 120.0);

        std::fs::write(&path, "[behavior]\ntreat_recs_as_loops = true\n").unwrap();
        let config = Config::load_from(Some(&path));
        assert!(config.behavior().treat_recs_as_loops);
        assert!(!config.behavior().chans_stop_on_seq_halt);
    }

    #[test]
    fn test_missing_user_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(Some(&dir.path().join("nope.toml")));
        assert!(config.stream_options().enable_input);
        assert!(config.midi_input_port().is_none());
    }
}
