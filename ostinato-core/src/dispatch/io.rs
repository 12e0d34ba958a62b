//! Performance gestures: key press and release, kill, and the two
//! recording toggles.

use ostinato_audio::recorder::RecOp;
use ostinato_audio::Engine;
use ostinato_types::{Action, ActionKind, ActionMask, ChannelId, ChannelMode, IoCommand, KeyMods};

use super::channel::toggle_mute;
use super::DispatchResult;

pub(super) fn dispatch_io(cmd: &IoCommand, engine: &Engine) -> Result<DispatchResult, String> {
    match cmd {
        IoCommand::KeyPress {
            channel,
            mods,
            velocity,
        } => {
            key_press(engine, *channel, *mods, *velocity)?;
            Ok(DispatchResult::none())
        }
        IoCommand::KeyRelease { channel, mods } => {
            key_release(engine, *channel, *mods)?;
            Ok(DispatchResult::none())
        }
        IoCommand::Kill(id) => {
            engine.with_channel(*id, |ch, ctx| ch.kill(ctx))?;
            Ok(DispatchResult::none())
        }
        IoCommand::ToggleActionRec => {
            let on = engine.toggle_action_rec();
            Ok(DispatchResult::info(format!(
                "action recording {}",
                if on { "on" } else { "off" }
            )))
        }
        IoCommand::ToggleInputRec => {
            if engine.controls.input_recording() {
                let filled = engine.stop_input_rec();
                return Ok(DispatchResult::info(format!(
                    "input recording stopped, {} channel(s) filled",
                    filled
                )));
            }
            if !engine.start_input_rec()? {
                return Err("No armed empty sample channel to record into".to_string());
            }
            Ok(DispatchResult::info("input recording"))
        }
    }
}

/// Ctrl toggles mute, shift kills, a plain press starts (or toggles) the
/// channel. Non-quantized presses on one-shot sample channels are recorded
/// here; quantized ones are recorded by the channel when the quanto passes.
fn key_press(engine: &Engine, id: ChannelId, mods: KeyMods, velocity: u8) -> Result<(), String> {
    log::debug!(target: "dispatch", "key press ch={} velocity={}", id, velocity);
    if mods.ctrl {
        toggle_mute(engine, id)?;
        return Ok(());
    }
    engine.with_channel(id, |ch, ctx| {
        let single = ch.mode().is_some_and(ChannelMode::is_single);
        let frame = ctx.clock.current_frame();

        if mods.shift {
            let record = single && ch.can_rec(ctx) && ch.status().is_playing();
            ch.kill(ctx);
            if record {
                ctx.rec(Action::new(id, frame, ActionKind::Kill));
                ch.core.has_actions = true;
            }
            return;
        }

        if single && ctx.clock.quantize() == 0 && ch.can_rec(ctx) {
            if ch.mode() == Some(ChannelMode::SinglePress) {
                ctx.push_rec(RecOp::StartOverdub {
                    channel: id,
                    mask: ActionMask::KEYS,
                    frame,
                });
                // no replay while overdubbing
                ch.core.read_actions = false;
            } else {
                ctx.rec(Action::new(id, frame, ActionKind::KeyPress));
            }
            ch.core.has_actions = true;
        }
        ch.start(ctx, true, false);
    })
}

/// Only plain releases matter; they stop press-mode channels.
fn key_release(engine: &Engine, id: ChannelId, mods: KeyMods) -> Result<(), String> {
    if mods.ctrl || mods.shift {
        return Ok(());
    }
    engine.with_channel(id, |ch, ctx| {
        ch.stop(ctx);
        if ch.mode() == Some(ChannelMode::SinglePress) && ch.can_rec(ctx) {
            let frame = ctx.clock.current_frame();
            ctx.push_rec(RecOp::StopOverdub { frame });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::engine;
    use super::*;
    use ostinato_audio::Wave;
    use ostinato_types::{ChannelKind, ChannelStatus};

    fn loaded(e: &Engine, mode: ChannelMode) -> ChannelId {
        let id = e.add_channel(ChannelKind::Sample);
        e.with_channel(id, |ch, ctx| {
            ch.set_wave(Some(Wave::from_stereo(vec![0.5; 2000], 44100, "w")), ctx);
            if let Some(s) = ch.sample_mut() {
                s.mode = mode;
            }
        })
        .unwrap();
        id
    }

    fn press(e: &Engine, id: ChannelId, mods: KeyMods) {
        dispatch_io(
            &IoCommand::KeyPress {
                channel: id,
                mods,
                velocity: 127,
            },
            e,
        )
        .unwrap();
    }

    #[test]
    fn plain_press_starts_and_release_stops_press_mode() {
        let e = engine();
        let id = loaded(&e, ChannelMode::SinglePress);
        press(&e, id, KeyMods::NONE);
        assert_eq!(e.channel_infos()[0].status, ChannelStatus::Play);
        dispatch_io(
            &IoCommand::KeyRelease {
                channel: id,
                mods: KeyMods::NONE,
            },
            &e,
        )
        .unwrap();
        assert_eq!(e.channel_infos()[0].status, ChannelStatus::Off);
    }

    #[test]
    fn ctrl_press_toggles_mute() {
        let e = engine();
        let id = loaded(&e, ChannelMode::SingleBasic);
        press(
            &e,
            id,
            KeyMods {
                ctrl: true,
                shift: false,
            },
        );
        let info = &e.channel_infos()[0];
        assert!(info.mute);
        assert_eq!(info.status, ChannelStatus::Off);
    }

    #[test]
    fn press_records_key_press_while_recording() {
        let e = engine();
        let id = loaded(&e, ChannelMode::SingleBasic);
        e.start_action_rec();
        press(&e, id, KeyMods::NONE);
        let actions = e.recorder.lock().actions().to_vec();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::KeyPress);
        assert_eq!(actions[0].channel, id);
        assert!(e.channel_infos()[0].has_actions);
    }

    #[test]
    fn loops_are_never_recorded() {
        let e = engine();
        let id = loaded(&e, ChannelMode::LoopBasic);
        e.start_action_rec();
        press(&e, id, KeyMods::NONE);
        assert_eq!(e.recorder.lock().len(), 0);
        assert_eq!(e.channel_infos()[0].status, ChannelStatus::Wait);
    }

    #[test]
    fn shift_press_kills_and_records_kill() {
        let e = engine();
        let id = loaded(&e, ChannelMode::SingleEndless);
        press(&e, id, KeyMods::NONE);
        e.start_action_rec();
        press(
            &e,
            id,
            KeyMods {
                ctrl: false,
                shift: true,
            },
        );
        let kinds: Vec<ActionKind> = e.recorder.lock().actions().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Kill]);
    }

    #[test]
    fn input_rec_without_target_reports_error() {
        let e = engine();
        e.add_channel(ChannelKind::Sample);
        assert!(dispatch_io(&IoCommand::ToggleInputRec, &e).is_err());
        assert!(!e.controls.input_recording());
    }
}
