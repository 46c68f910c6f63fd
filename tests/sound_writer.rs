// The sound asset writer: framing, channel padding, MCA labels and the FSK sync track.

pub mod common;

use common::setup_logging;
use dcp::{Channel, Fraction, SoundAsset, Standard};

fn frame_samples(frame: &[u8]) -> Vec<i32> {
    frame
        .chunks_exact(3)
        .map(|c| {
            let raw = ((c[0] as i32) << 16) | ((c[1] as i32) << 8) | c[2] as i32;
            (raw << 8) >> 8
        })
        .collect()
}

#[test]
fn float_samples_round_trip_as_int24() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sound.mxf");

    let mut asset = SoundAsset::new(Fraction::new(24, 1), 48000, 6, Some("en-GB"), Standard::Smpte);
    let samples_per_frame = asset.samples_per_frame();
    assert_eq!(samples_per_frame, 2000);
    {
        let mut writer = asset.start_write(&path, vec![], false, true).unwrap();
        let ramp: Vec<f32> = (0..samples_per_frame).map(|i| i as f32 / 100_000.0).collect();
        let channels: Vec<&[f32]> = vec![&ramp; 6];
        writer.write(&channels, samples_per_frame).unwrap();
        writer.finalize().unwrap();
    }
    assert_eq!(asset.intrinsic_duration(), 1);

    let mut reader = asset.start_read().unwrap();
    let frame = reader.get_frame(0).unwrap();
    assert_eq!(frame.len(), 6 * samples_per_frame * 3);
    let samples = frame_samples(&frame);
    // sample 100 on every channel is 0.001 of full scale
    let expected = (0.001 * 8388607.0) as i32;
    for channel in 0..6 {
        assert_eq!(samples[100 * 6 + channel], expected);
    }
}

/// Fewer channel buffers than the asset declares: the remaining channels are silent.
#[test]
fn missing_channels_are_padded_with_silence() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sound.mxf");

    let mut asset = SoundAsset::new(Fraction::new(24, 1), 48000, 8, None, Standard::Smpte);
    let samples_per_frame = asset.samples_per_frame();
    {
        let mut writer = asset.start_write(&path, vec![], false, true).unwrap();
        let tone = vec![0.5f32; samples_per_frame];
        let channels: Vec<&[f32]> = vec![&tone; 2]; // L and R only
        writer.write(&channels, samples_per_frame).unwrap();
        writer.finalize().unwrap();
    }

    let mut reader = asset.start_read().unwrap();
    let samples = frame_samples(&reader.get_frame(0).unwrap());
    assert_ne!(samples[0], 0); // L
    assert_ne!(samples[1], 0); // R
    for channel in 2..8 {
        assert_eq!(samples[channel], 0, "channel {channel} should be silent");
    }
}

/// Partial frames are zero-padded on finalize.
#[test]
fn partial_final_frame_is_padded() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sound.mxf");

    let mut asset = SoundAsset::new(Fraction::new(24, 1), 48000, 6, None, Standard::Smpte);
    let samples_per_frame = asset.samples_per_frame();
    {
        let mut writer = asset.start_write(&path, vec![], false, true).unwrap();
        let half = vec![0.25f32; samples_per_frame / 2];
        let channels: Vec<&[f32]> = vec![&half; 6];
        writer.write(&channels, samples_per_frame / 2).unwrap();
        writer.finalize().unwrap();
    }
    assert_eq!(asset.intrinsic_duration(), 1);

    let mut reader = asset.start_read().unwrap();
    let samples = frame_samples(&reader.get_frame(0).unwrap());
    assert_ne!(samples[(samples_per_frame / 2 - 1) * 6], 0);
    assert_eq!(samples[(samples_per_frame / 2) * 6], 0);
    assert_eq!(*samples.last().unwrap(), 0);
}

/// The 5.1 main channels always carry MCA labels; extra active channels are added with
/// their conventional channel numbers and everything links to one soundfield group.
#[test]
fn mca_labels_cover_active_channels() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sound.mxf");

    let mut asset = SoundAsset::new(Fraction::new(24, 1), 48000, 8, Some("de"), Standard::Smpte);
    let samples_per_frame = asset.samples_per_frame();
    {
        let mut writer = asset
            .start_write(&path, vec![Channel::Hi, Channel::Vi], false, true)
            .unwrap();
        let silence = vec![0.0f32; samples_per_frame];
        writer.write(&[&silence], samples_per_frame).unwrap();
        writer.finalize().unwrap();
    }

    let header = dcp::SoundAsset::from_file(&path, asset.id()).unwrap();
    assert_eq!(header.channels(), 8);
    assert_eq!(header.language(), Some("de"));
}

/// With AtmosSync enabled, channel 14 carries the FSK pattern instead of input audio.
#[test]
fn sync_track_replaces_channel_14() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sound.mxf");

    let mut asset = SoundAsset::new(Fraction::new(24, 1), 48000, 16, None, Standard::Smpte);
    let samples_per_frame = asset.samples_per_frame();
    {
        let mut writer = asset.start_write(&path, vec![], true, true).unwrap();
        let silence = vec![0.0f32; samples_per_frame];
        let channels: Vec<&[f32]> = vec![&silence; 16];
        writer.write(&channels, samples_per_frame).unwrap();
        writer.finalize().unwrap();
    }

    let mut reader = asset.start_read().unwrap();
    let samples = frame_samples(&reader.get_frame(0).unwrap());
    // the first four samples of channel 14 (index 13) encode the first id bit
    let sync: Vec<i32> = (0..4).map(|i| samples[i * 16 + 13]).collect();
    const A: i32 = 0x08000;
    const B: i32 = 0x10000;
    const C: i32 = 0x18000;
    assert!(
        sync == [A, B, B, A] || sync == [C, C, -C, -C],
        "unexpected sync symbol pattern: {sync:?}"
    );
    // all other channels stay silent
    assert!(samples.iter().enumerate().all(|(i, s)| i % 16 == 13 || *s == 0));
}

/// A sync track cannot be requested with fewer than 14 channels.
#[test]
fn sync_needs_fourteen_channels() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut asset = SoundAsset::new(Fraction::new(24, 1), 48000, 6, None, Standard::Smpte);
    assert!(asset
        .start_write(&dir.path().join("sound.mxf"), vec![], true, true)
        .is_err());
}
