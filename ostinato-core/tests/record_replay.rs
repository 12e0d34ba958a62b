mod common;

use ostinato_core::midi::Routed;
use ostinato_types::{ActionKind, ChannelMode, ChannelParam, IoCommand, KeyMods, MidiEvent};

#[test]
fn replayed_press_renders_like_live_press() {
    let ctx = common::context();
    let id = common::sample_channel(&ctx, ChannelMode::SingleBasic, 1000);
    let press = MidiEvent::from_bytes(0x90, 36, 100);
    ctx.engine()
        .with_channel(id, |ch, _| {
            ch.core.midi_in.set(ChannelParam::KeyPress, press.pure(false))
        })
        .unwrap();

    let mut mixer = ctx.mixer();
    ctx.dispatch(IoCommand::ToggleActionRec);
    assert!(ctx.engine().clock.is_running());
    common::run_until(&mut mixer, 2000);
    assert_eq!(ctx.dispatch_midi(press), Routed::Channels(1));
    let live = common::run(&mut mixer, 2000);
    ctx.dispatch(IoCommand::ToggleActionRec);

    let actions = ctx.engine().lock_recorder().actions().to_vec();
    assert_eq!(actions.len(), 1);
    assert_eq!((actions[0].frame, actions[0].kind), (2000, ActionKind::KeyPress));
    assert!(ctx.engine().channel_infos()[0].read_actions);

    // next time round the loop the recorder plays the press back
    common::run_until(&mut mixer, 2000);
    let replay = common::run(&mut mixer, 2000);
    assert!(live.iter().any(|s| *s != 0.0));
    assert_eq!(live, replay);
}

#[test]
fn channel_with_reading_disabled_stays_silent() {
    let ctx = common::context();
    let id = common::sample_channel(&ctx, ChannelMode::SingleBasic, 500);
    let mut mixer = ctx.mixer();
    ctx.dispatch(IoCommand::ToggleActionRec);
    common::run_until(&mut mixer, 100);
    ctx.dispatch(IoCommand::KeyPress {
        channel: id,
        mods: KeyMods::NONE,
        velocity: 127,
    });
    common::run(&mut mixer, 1000);
    ctx.dispatch(IoCommand::ToggleActionRec);
    ctx.dispatch(ostinato_types::ChannelCommand::ToggleReadActions(id));
    assert!(!ctx.engine().channel_infos()[0].read_actions);

    common::run_until(&mut mixer, 100);
    let out = common::run(&mut mixer, 600);
    assert!(out.iter().all(|s| *s == 0.0));
}
