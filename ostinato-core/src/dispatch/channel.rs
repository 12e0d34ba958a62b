use ostinato_audio::channel::SampleData;
use ostinato_audio::recorder::RecOp;
use ostinato_audio::Engine;
use ostinato_types::transport::{MAX_BOOST_DB, MAX_PITCH, MIN_PITCH};
use ostinato_types::{ActionMask, ChannelCommand, ChannelId};

use super::DispatchResult;

pub(super) fn dispatch_channel(
    cmd: &ChannelCommand,
    engine: &Engine,
) -> Result<DispatchResult, String> {
    match cmd {
        ChannelCommand::Add(kind) => {
            let id = engine.add_channel(*kind);
            Ok(DispatchResult::with_channel(id))
        }
        ChannelCommand::Delete(id) => {
            engine.delete_channel(*id)?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::Clone(id) => {
            let copy = engine.clone_channel(*id)?;
            Ok(DispatchResult::with_channel(copy))
        }
        ChannelCommand::LoadWave { channel, path } => {
            engine.load_wave(*channel, path)?;
            Ok(DispatchResult::info(format!("loaded {}", path.display())))
        }
        ChannelCommand::SaveWave { channel, path } => {
            engine.save_wave(*channel, path)?;
            Ok(DispatchResult::info(format!("saved {}", path.display())))
        }
        ChannelCommand::FreeWave(id) => {
            engine.free_wave(*id)?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::Rename { channel, name } => {
            engine.with_channel(*channel, |ch, _| ch.core.name = name.clone())?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::ToggleArm(id) => {
            engine.with_channel(*id, |ch, _| ch.core.armed = !ch.core.armed)?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::ToggleMute(id) => {
            toggle_mute(engine, *id)?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::ToggleSolo(id) => {
            engine.toggle_solo(*id)?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::SetVolume { channel, value } => {
            engine.with_channel(*channel, |ch, _| ch.set_volume(*value))?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::SetPan { channel, value } => {
            engine.with_channel(*channel, |ch, _| ch.set_pan(*value))?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::SetPitch { channel, value } => {
            let pitch = value.clamp(MIN_PITCH, MAX_PITCH);
            with_sample(engine, *channel, |s| s.set_pitch(pitch))?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::SetBoost { channel, db } => {
            let db = db.clamp(0.0, MAX_BOOST_DB);
            with_sample(engine, *channel, |s| s.set_boost_db(db))?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::SetMode { channel, mode } => {
            with_sample(engine, *channel, |s| s.mode = *mode)?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::SetBeginEnd { channel, begin, end } => {
            with_sample(engine, *channel, |s| {
                s.set_begin_end(*begin as usize, *end as usize)
            })??;
            Ok(DispatchResult::none())
        }
        ChannelCommand::ToggleInputMonitor(id) => {
            with_sample(engine, *id, |s| s.input_monitor = !s.input_monitor)?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::ToggleReadActions(id) => {
            engine.with_channel(*id, |ch, ctx| ch.toggle_read_actions(ctx))?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::SetMidiOut {
            channel,
            enabled,
            out_chan,
        } => {
            engine
                .with_channel(*channel, |ch, _| {
                    ch.midi_mut().map(|m| {
                        m.midi_out = *enabled;
                        m.set_out_chan(*out_chan);
                    })
                })?
                .ok_or_else(|| format!("Channel {} is not a MIDI channel", channel))?;
            Ok(DispatchResult::none())
        }
        ChannelCommand::ClearActions { channel, mask } => {
            engine.clear_actions(*channel, *mask)?;
            Ok(DispatchResult::none())
        }
    }
}

fn with_sample<R>(
    engine: &Engine,
    id: ChannelId,
    f: impl FnOnce(&mut SampleData) -> R,
) -> Result<R, String> {
    engine
        .with_channel(id, |ch, _| ch.sample_mut().map(f))?
        .ok_or_else(|| format!("Channel {} is not a sample channel", id))
}

/// Mute on/off. While recording actions, muting opens a mute overdub and
/// unmuting closes it. Returns the new mute state.
pub(crate) fn toggle_mute(engine: &Engine, id: ChannelId) -> Result<bool, String> {
    engine.with_channel(id, |ch, ctx| {
        let frame = ctx.clock.current_frame();
        let record = ch.can_rec(ctx);
        if ch.core.mute {
            if record {
                ctx.push_rec(RecOp::StopOverdub { frame });
                ch.core.has_actions = true;
            }
            ch.unset_mute(false, ctx);
        } else {
            if record {
                ctx.push_rec(RecOp::StartOverdub {
                    channel: id,
                    mask: ActionMask::MUTES,
                    frame,
                });
                ch.core.has_actions = true;
            }
            ch.set_mute(false, ctx);
        }
        ch.core.mute
    })
}
