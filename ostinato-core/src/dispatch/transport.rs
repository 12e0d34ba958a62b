use ostinato_audio::Engine;
use ostinato_types::transport::MAX_QUANTIZE;
use ostinato_types::TransportCommand;

use super::DispatchResult;

pub(super) fn dispatch_transport(
    cmd: &TransportCommand,
    engine: &Engine,
) -> Result<DispatchResult, String> {
    match cmd {
        TransportCommand::StartStop => {
            engine.toggle_transport();
            let state = if engine.clock.is_running() { "playing" } else { "stopped" };
            Ok(DispatchResult::info(state))
        }
        TransportCommand::Rewind => {
            engine.rewind();
            Ok(DispatchResult::none())
        }
        TransportCommand::SetBpm(bpm) => {
            let applied = engine.set_bpm(*bpm)?;
            Ok(DispatchResult::info(format!("bpm {}", applied)))
        }
        TransportCommand::SetBeats { beats, bars, expand } => {
            let (beats, bars) = engine.set_beats(*beats, *bars, *expand)?;
            Ok(DispatchResult::info(format!("{} beats, {} bars", beats, bars)))
        }
        TransportCommand::BeatsMultiply => {
            let (beats, _) = engine.beats_multiply()?;
            Ok(DispatchResult::info(format!("{} beats", beats)))
        }
        TransportCommand::BeatsDivide => {
            let (beats, _) = engine.beats_divide()?;
            Ok(DispatchResult::info(format!("{} beats", beats)))
        }
        TransportCommand::SetQuantize(q) => {
            let q = (*q).min(MAX_QUANTIZE);
            engine.set_quantize(q);
            Ok(DispatchResult::none())
        }
        TransportCommand::ToggleMetronome => {
            let on = engine.toggle_metronome();
            Ok(DispatchResult::info(format!("metronome {}", if on { "on" } else { "off" })))
        }
        TransportCommand::SetInVolume(v) => {
            engine.controls.set_in_volume(*v);
            Ok(DispatchResult::none())
        }
        TransportCommand::SetOutVolume(v) => {
            engine.controls.set_out_volume(*v);
            Ok(DispatchResult::none())
        }
        TransportCommand::ToggleInToOut => {
            let on = !engine.controls.in_to_out();
            engine.controls.set_in_to_out(on);
            Ok(DispatchResult::none())
        }
    }
}
