//! Controller descriptions for MIDI lightning.
//!
//! A midimap is a JSON file:
//!
//! ```json
//! {
//!   "brand": "Novation",
//!   "device": "Launchpad S",
//!   "init_commands": [{ "channel": 0, "message": "0xB0000000" }],
//!   "mute_on":  { "channel": 0, "message": "0x90nn3F00" },
//!   "playing":  { "channel": 0, "message": "0x90nn3C00" }
//! }
//! ```
//!
//! Messages that are left out stay unset and are never sent.

use std::path::Path;

use serde::Deserialize;

use ostinato_audio::lightning::MidiMapMessage;
use ostinato_audio::MidiMap;

#[derive(Deserialize)]
struct Entry {
    #[serde(default)]
    channel: u8,
    message: String,
}

#[derive(Deserialize, Default)]
struct MidiMapFile {
    #[serde(default)]
    brand: String,
    #[serde(default)]
    device: String,
    #[serde(default)]
    init_commands: Vec<Entry>,
    mute_on: Option<Entry>,
    mute_off: Option<Entry>,
    solo_on: Option<Entry>,
    solo_off: Option<Entry>,
    waiting: Option<Entry>,
    playing: Option<Entry>,
    stopping: Option<Entry>,
    stopped: Option<Entry>,
}

fn message(entry: Option<Entry>) -> Result<MidiMapMessage, String> {
    match entry {
        Some(e) => MidiMapMessage::parse(e.channel, &e.message),
        None => Ok(MidiMapMessage::default()),
    }
}

pub fn parse_midimap(json: &str) -> Result<MidiMap, String> {
    let file: MidiMapFile =
        serde_json::from_str(json).map_err(|e| format!("Failed to parse midimap: {}", e))?;
    let init_commands = file
        .init_commands
        .into_iter()
        .map(|e| MidiMapMessage::parse(e.channel, &e.message))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MidiMap {
        brand: file.brand,
        device: file.device,
        init_commands,
        mute_on: message(file.mute_on)?,
        mute_off: message(file.mute_off)?,
        solo_on: message(file.solo_on)?,
        solo_off: message(file.solo_off)?,
        waiting: message(file.waiting)?,
        playing: message(file.playing)?,
        stopping: message(file.stopping)?,
        stopped: message(file.stopped)?,
    })
}

pub fn load_midimap(path: &Path) -> Result<MidiMap, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read midimap {}: {}", path.display(), e))?;
    let map = parse_midimap(&json)?;
    log::info!(target: "midi", "loaded midimap {} {} from {}", map.brand, map.device, path.display());
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAUNCHPAD: &str = r#"{
        "brand": "Novation",
        "device": "Launchpad S",
        "init_commands": [
            { "channel": 0, "message": "0xB0000000" },
            { "channel": 0, "message": "0xB0002800" }
        ],
        "mute_on":  { "channel": 0, "message": "0x90nn3F00" },
        "mute_off": { "channel": 0, "message": "0x90nn0C00" },
        "playing":  { "channel": 1, "message": "0x90nn3C00" }
    }"#;

    #[test]
    fn test_parse_midimap() {
        let map = parse_midimap(LAUNCHPAD).unwrap();
        assert_eq!(map.brand, "Novation");
        assert_eq!(map.device, "Launchpad S");
        assert_eq!(map.init_commands.len(), 2);
        assert_eq!(map.init_commands[1].value, 0xB000_2800);
        assert_eq!(map.mute_on.value, 0x9000_3F00);
        assert_eq!(map.mute_on.offset, Some(16));
        assert_eq!(map.playing.channel, 1);
        assert!(!map.solo_on.is_set());
        assert!(!map.stopped.is_set());
    }

    #[test]
    fn test_learned_note_lands_in_hole() {
        let map = parse_midimap(LAUNCHPAD).unwrap();
        // pad learned as note 0x24
        assert_eq!(map.playing.compose(0x9024_7F00), 0x9124_3C00);
    }

    #[test]
    fn test_parse_midimap_errors() {
        assert!(parse_midimap("{").is_err());
        assert!(parse_midimap(r#"{ "mute_on": { "message": "0xZZ" } }"#).is_err());
        let empty = parse_midimap("{}").unwrap();
        assert!(empty.init_commands.is_empty());
    }

    #[test]
    fn test_load_midimap_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launchpad.json");
        std::fs::write(&path, LAUNCHPAD).unwrap();
        let map = load_midimap(&path).unwrap();
        assert_eq!(map.device, "Launchpad S");
        assert!(load_midimap(&dir.path().join("missing.json")).is_err());
    }
}
