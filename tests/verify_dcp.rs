// The verifier against whole packages.

pub mod common;

use common::{
    dump_notes, setup_logging, verify_one, write_test_dcp, J2kParams, TestDcpParams,
};
use dcp::{ContentKind, NoteCode, NoteType};

/// A well-formed single-reel package produces no notes at all.
#[test]
fn clean_dcp_verifies_without_notes() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert!(notes.is_empty());
}

/// Encrypted content without signatures: the CPL and PKL must both be flagged, and with no
/// markers the FFOC/LFOC warnings (and feature credit markers) appear too.
#[test]
fn encrypted_unsigned_feature_without_markers() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &TestDcpParams {
            encrypted: true,
            with_markers: false,
            content_kind: ContentKind::feature(),
            sign: false,
            ..Default::default()
        },
    );

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    let codes: Vec<NoteCode> = notes.iter().map(|n| n.code()).collect();
    assert_eq!(
        codes,
        vec![
            NoteCode::MissingFfecInFeature,
            NoteCode::MissingFfmcInFeature,
            NoteCode::MissingFfoc,
            NoteCode::MissingLfoc,
            NoteCode::UnsignedCplWithEncryptedContent,
            NoteCode::UnsignedPklWithEncryptedContent,
        ]
    );
}

/// Signing the same encrypted package clears the signature notes.
#[test]
fn encrypted_signed_dcp_is_clean() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &TestDcpParams { encrypted: true, sign: true, ..Default::default() },
    );

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert!(notes.is_empty());
}

#[test]
fn nonstandard_picture_size_is_flagged() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &TestDcpParams {
            j2k: J2kParams { width: 2048, height: 1080, ..Default::default() },
            ..Default::default()
        },
    );

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::InvalidPictureSizeInPixels);
    assert_eq!(notes[0].note_type(), NoteType::Bv21Error);
    assert_eq!(notes[0].note(), Some("2048x1080"));
}

#[test]
fn missing_cpl_metadata_is_flagged() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams { with_metadata: false, ..Default::default() });

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::MissingCplMetadata);
}

/// Corrupting essence after the PKL was written breaks the hash agreement.
#[test]
fn corrupted_picture_hash_is_detected() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());

    // flip one byte inside the picture file, away from the container structures
    let path = dir.path().join("picture.mxf");
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert!(notes.iter().any(|n| n.code() == NoteCode::IncorrectPictureHash));
}

/// Deleting an essence file leaves a dangling asset-map entry and an unresolved reference.
#[test]
fn missing_asset_and_external_reference() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());
    std::fs::remove_file(dir.path().join("sound.mxf")).unwrap();

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert!(notes.iter().any(|n| n.code() == NoteCode::MissingAsset));
    // the sound reference can no longer resolve, so its hash cannot be checked; but it must
    // not be reported as external (it is still in the asset map)
    assert!(!notes.iter().any(|n| n.code() == NoteCode::ExternalAsset));
}

/// A deleted ASSETMAP cannot be verified at all.
#[test]
fn unreadable_dcp_reports_failed_read() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());
    std::fs::remove_file(dir.path().join("ASSETMAP.xml")).unwrap();

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::FailedRead);
}

/// 26 fps is outside both the general table and the 2K list.
#[test]
fn twok_at_26_fps_is_rejected() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &TestDcpParams {
            frames: 26,
            edit_rate: dcp::Fraction::new(26, 1),
            ..Default::default()
        },
    );

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    let codes: Vec<NoteCode> = notes.iter().map(|n| n.code()).collect();
    assert_eq!(
        codes,
        vec![NoteCode::InvalidPictureFrameRate, NoteCode::InvalidPictureFrameRateFor2k]
    );
}

/// 4K at 24 fps is fine; 4K at 25 fps is not.
#[test]
fn fourk_frame_rates() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &TestDcpParams { j2k: J2kParams::fourk(), ..Default::default() },
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert!(notes.is_empty());

    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &TestDcpParams {
            frames: 25,
            edit_rate: dcp::Fraction::new(25, 1),
            j2k: J2kParams::fourk(),
            ..Default::default()
        },
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::InvalidPictureFrameRateFor4k);
    assert_eq!(notes[0].note(), Some("25/1"));
}

/// Stereoscopic 2K passes; stereoscopic 4K is rejected outright.
#[test]
fn stereo_4k_is_rejected() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams { stereo: true, ..Default::default() });
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert!(notes.is_empty());

    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &TestDcpParams { stereo: true, j2k: J2kParams::fourk(), ..Default::default() },
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::InvalidPictureAssetResolutionFor3d);
}

/// A malformed additional subtitle language in the CPL metadata.
#[test]
fn bad_language_tag_is_flagged() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &TestDcpParams {
            customize_cpl: Some(|cpl| {
                cpl.set_additional_subtitle_languages(vec!["notalanguage-at-all!".to_string()])
            }),
            ..Default::default()
        },
    );

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::InvalidLanguage);
    assert_eq!(notes[0].note(), Some("notalanguage-at-all!"));
}

/// An Interop package is structurally readable but Bv2.1 requires SMPTE.
#[test]
fn interop_is_not_smpte() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    common::write_interop_dcp(dir.path());

    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert!(notes.iter().any(|n| n.code() == NoteCode::InvalidStandard));
}

/// Cancelling from the progress callback returns early with the notes so far.
#[test]
fn progress_callback_can_cancel() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());

    let mut calls = 0;
    let notes = dcp::verify(
        &[dir.path().to_path_buf()],
        &mut |_stage, _path| {},
        &mut |_progress| {
            calls += 1;
            dcp::Cancel::Cancel
        },
    );
    assert!(calls >= 1);
    // cancellation is not an error and produces no spurious notes
    dump_notes(&notes);
    assert!(notes.iter().all(|n| n.code() != NoteCode::FailedRead));
}
