// Subtitle timing and layout rules across a composition.

pub mod common;

use common::{cue, dump_notes, setup_logging, verify_one, write_test_dcp, TestDcpParams};
use dcp::{NoteCode, NoteType, Time};

fn params_with_cues(cues: Vec<dcp::SubtitleText>) -> TestDcpParams {
    TestDcpParams {
        frames: 240, // a ten-second reel
        subtitle_cues: Some(cues),
        ..Default::default()
    }
}

/// Well-spaced cues starting at 4s: nothing to report.
#[test]
fn comfortable_subtitles_are_clean() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &params_with_cues(vec![
            cue("First line", Time::new(0, 0, 4, 0, 24), Time::new(0, 0, 5, 0, 24)),
            cue("Second line", Time::new(0, 0, 6, 0, 24), Time::new(0, 0, 7, 0, 24)),
        ]),
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert!(notes.is_empty());
}

/// Two cues separated by a single frame: one spacing warning.
#[test]
fn close_subtitles_get_a_spacing_note() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &params_with_cues(vec![
            cue("First", Time::new(0, 0, 4, 0, 24), Time::new(0, 0, 5, 0, 24)),
            cue("Second", Time::new(0, 0, 5, 1, 24), Time::new(0, 0, 6, 0, 24)),
        ]),
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::InvalidSubtitleSpacing);
    assert_eq!(notes[0].note_type(), NoteType::Warning);
}

/// The first text before 4 seconds draws a warning.
#[test]
fn early_first_text_is_flagged() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &params_with_cues(vec![cue(
            "Too soon",
            Time::new(0, 0, 2, 0, 24),
            Time::new(0, 0, 3, 12, 24),
        )]),
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::InvalidSubtitleFirstTextTime);
}

/// A cue shorter than 15 frames draws a warning.
#[test]
fn short_subtitle_is_flagged() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &params_with_cues(vec![cue(
            "Blink",
            Time::new(0, 0, 4, 0, 24),
            Time::new(0, 0, 4, 10, 24),
        )]),
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::InvalidSubtitleDuration);
}

/// A cue that runs past the end of its reel is an error.
#[test]
fn subtitle_over_reel_boundary_is_an_error() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &params_with_cues(vec![cue(
            "Lingering",
            Time::new(0, 0, 9, 0, 24),
            Time::new(0, 0, 11, 0, 24),
        )]),
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::SubtitleOverlapsReelBoundary);
    assert_eq!(notes[0].note_type(), NoteType::Error);
}

/// 52 characters in a line is tolerated with a warning; 79 is the hard limit.
#[test]
fn long_subtitle_lines_are_flagged() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &params_with_cues(vec![cue(
            &"x".repeat(60),
            Time::new(0, 0, 4, 0, 24),
            Time::new(0, 0, 5, 0, 24),
        )]),
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::NearlyInvalidSubtitleLineLength);

    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(
        dir.path(),
        &params_with_cues(vec![cue(
            &"x".repeat(90),
            Time::new(0, 0, 4, 0, 24),
            Time::new(0, 0, 5, 0, 24),
        )]),
    );
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::InvalidSubtitleLineLength);
}

/// More than three simultaneous lines draws a warning.
#[test]
fn too_many_simultaneous_lines_are_flagged() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut cues = Vec::new();
    for i in 0..5 {
        let mut c = cue("Line", Time::new(0, 0, 4, 0, 24), Time::new(0, 0, 6, 0, 24));
        c.v_position = 0.1 + i as f32 * 0.08;
        cues.push(c);
    }
    write_test_dcp(dir.path(), &params_with_cues(cues));
    let notes = verify_one(dir.path());
    dump_notes(&notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].code(), NoteCode::InvalidSubtitleLineCount);
}
