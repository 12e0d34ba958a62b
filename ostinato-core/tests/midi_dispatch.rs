mod common;

use ostinato_core::midi::{LearnDone, Routed};
use ostinato_types::{
    ChannelMode, ChannelParam, ChannelStatus, LearnTarget, MasterParam, MidiEvent,
    TransportCommand,
};

#[test]
fn master_binding_wins_over_channel_binding() {
    let ctx = common::context();
    let id = common::sample_channel(&ctx, ChannelMode::SingleBasic, 100);
    let event = MidiEvent::from_bytes(0x90, 0x00, 0x40);
    let value = event.pure(false);
    ctx.dispatcher().set_master(MasterParam::Rewind, value);
    ctx.engine()
        .with_channel(id, |ch, _| ch.core.midi_in.set(ChannelParam::Mute, value))
        .unwrap();

    let mut mixer = ctx.mixer();
    ctx.dispatch(TransportCommand::StartStop);
    common::run(&mut mixer, 300);
    assert_eq!(ctx.engine().clock.current_frame(), 300);

    assert_eq!(ctx.dispatch_midi(event), Routed::Master(MasterParam::Rewind));
    assert_eq!(ctx.engine().clock.current_frame(), 0);
    assert!(!ctx.engine().channel_infos()[0].mute);
}

#[test]
fn velocity_zero_note_on_releases_key() {
    let ctx = common::context();
    let id = common::sample_channel(&ctx, ChannelMode::SinglePress, 4000);
    ctx.engine()
        .with_channel(id, |ch, _| {
            ch.core.midi_in.set(ChannelParam::KeyPress, 0x9024_0000);
            ch.core.midi_in.set(ChannelParam::KeyRelease, 0x8024_0000);
        })
        .unwrap();

    ctx.dispatch_midi(MidiEvent::from_bytes(0x90, 0x24, 90));
    assert_eq!(ctx.engine().channel_infos()[0].status, ChannelStatus::Play);
    ctx.dispatch_midi(MidiEvent::from_bytes(0x90, 0x24, 0));
    assert_eq!(ctx.engine().channel_infos()[0].status, ChannelStatus::Off);
}

#[test]
fn learn_commits_exactly_once() {
    let ctx = common::context();
    let id = common::sample_channel(&ctx, ChannelMode::SingleBasic, 100);
    let done = ctx.dispatcher().learn_done();
    let target = LearnTarget::Channel {
        channel: id,
        param: ChannelParam::Mute,
    };
    let token = ctx.dispatcher().start_learn(target);

    let first = MidiEvent::from_bytes(0xB3, 64, 127);
    let second = MidiEvent::from_bytes(0xB3, 65, 127);
    let routed = ctx.dispatch_midi(first);
    assert_eq!(
        routed,
        Routed::Learned(LearnDone {
            token,
            target,
            value: 0xB340_0000,
        })
    );
    assert_eq!(ctx.dispatch_midi(second), Routed::Channels(1));

    let events: Vec<LearnDone> = done.try_iter().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(ctx.dispatcher().learn_target(), None);
    let learned = ctx
        .engine()
        .with_channel(id, |ch, _| ch.core.midi_in.get(ChannelParam::Mute))
        .unwrap();
    assert_eq!(learned, 0xB340_0000);
    assert!(!ctx.engine().channel_infos()[0].mute);

    // the learned control now works
    ctx.dispatch_midi(MidiEvent::from_bytes(0xB3, 64, 0));
    assert!(ctx.engine().channel_infos()[0].mute);
}

#[test]
fn channel_learn_honours_midi_channel_filter() {
    let ctx = common::context();
    let id = common::sample_channel(&ctx, ChannelMode::SingleBasic, 100);
    ctx.engine()
        .with_channel(id, |ch, _| ch.core.midi_in.filter = Some(3))
        .unwrap();
    ctx.dispatcher().start_learn(LearnTarget::Channel {
        channel: id,
        param: ChannelParam::Solo,
    });

    assert_eq!(
        ctx.dispatch_midi(MidiEvent::from_bytes(0x90, 10, 1)),
        Routed::LearnPending
    );
    assert!(matches!(
        ctx.dispatch_midi(MidiEvent::from_bytes(0x93, 10, 1)),
        Routed::Learned(_)
    ));
}

#[test]
fn master_volume_learned_then_driven() {
    let ctx = common::context();
    ctx.dispatcher()
        .start_learn(LearnTarget::Master(MasterParam::VolumeOut));
    ctx.dispatch_midi(MidiEvent::from_bytes(0xB0, 7, 10));
    assert_eq!(ctx.dispatcher().master().volume_out, 0xB007_0000);

    ctx.dispatch_midi(MidiEvent::from_bytes(0xB0, 7, 0));
    assert_eq!(ctx.engine().controls.out_volume(), 0.0);
    ctx.dispatch_midi(MidiEvent::from_bytes(0xB0, 7, 127));
    assert_eq!(ctx.engine().controls.out_volume(), 1.0);
}
