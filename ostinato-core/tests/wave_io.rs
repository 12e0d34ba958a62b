mod common;

use ostinato_types::{ChannelCommand, ChannelKind, ChannelStatus};

fn write_mono_i16(path: &std::path::Path, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: common::RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for s in samples {
        writer.write_sample(*s).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn mono_wav_loads_as_stereo_and_saves_as_float() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("kick.wav");
    write_mono_i16(&src, &[0, 16384, -16384, 32767]);

    let ctx = common::context();
    let id = ctx
        .dispatch(ChannelCommand::Add(ChannelKind::Sample))
        .channel
        .unwrap();
    let r = ctx.dispatch(ChannelCommand::LoadWave {
        channel: id,
        path: src,
    });
    assert!(!r.is_error(), "{:?}", r.status);
    let info = &ctx.engine().channel_infos()[0];
    assert_eq!(info.wave_frames, Some(4));
    assert_eq!(info.status, ChannelStatus::Off);

    let dst = dir.path().join("out.wav");
    let r = ctx.dispatch(ChannelCommand::SaveWave {
        channel: id,
        path: dst.clone(),
    });
    assert!(!r.is_error(), "{:?}", r.status);

    let mut reader = hound::WavReader::open(&dst).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, common::RATE);
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);
    let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 8);
    assert_eq!(samples[2], samples[3]);
    assert!((samples[2] - 0.5).abs() < 1e-4);
    assert!((samples[4] + 0.5).abs() < 1e-4);
}

#[test]
fn unreadable_wav_marks_channel_wrong() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.wav");
    std::fs::write(&bogus, b"not a wave file").unwrap();

    let ctx = common::context();
    let id = ctx
        .dispatch(ChannelCommand::Add(ChannelKind::Sample))
        .channel
        .unwrap();
    let r = ctx.dispatch(ChannelCommand::LoadWave {
        channel: id,
        path: bogus,
    });
    assert!(r.is_error());
    assert_eq!(ctx.engine().channel_infos()[0].status, ChannelStatus::Wrong);
}

#[test]
fn saving_an_empty_channel_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = common::context();
    let id = ctx
        .dispatch(ChannelCommand::Add(ChannelKind::Sample))
        .channel
        .unwrap();
    let r = ctx.dispatch(ChannelCommand::SaveWave {
        channel: id,
        path: dir.path().join("nothing.wav"),
    });
    assert!(r.is_error());
}
