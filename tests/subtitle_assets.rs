// Subtitle assets in both dialects.

pub mod common;

use common::setup_logging;
use dcp::{
    Fraction, InteropSubtitleAsset, SmpteSubtitleAsset, Subtitle, SubtitleText, Time, VAlign,
};

fn text_cue(text: &str, in_time: Time, out_time: Time) -> Subtitle {
    Subtitle::Text(SubtitleText {
        text: text.to_string(),
        in_time,
        out_time,
        v_position: 0.08,
        v_align: VAlign::Bottom,
        font_id: Some("font".to_string()),
        fade_up: None,
        fade_down: None,
    })
}

#[test]
fn interop_subtitles_round_trip_through_xml() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subs.xml");

    let mut asset = InteropSubtitleAsset::new();
    asset.set_movie_title("Round Trip");
    asset.set_language("fr");
    asset.add_font("font", b"not really a font".to_vec());
    asset.add(text_cue(
        "Bonjour",
        Time::new(0, 0, 5, 0, 250),
        Time::new(0, 0, 7, 0, 250),
    ));
    asset.add(text_cue(
        "tout le monde",
        Time::new(0, 0, 8, 0, 250),
        Time::new(0, 0, 10, 125, 250),
    ));
    asset.write(&path).unwrap();

    // the font lands as a sibling file named after its uuid
    let font_uri = asset.load_font_nodes()[0].uri.clone().unwrap();
    assert!(dir.path().join(&font_uri).exists());

    let reread = InteropSubtitleAsset::from_file(&path).unwrap();
    assert_eq!(reread.id(), asset.id());
    assert_eq!(reread.language(), Some("fr"));
    assert_eq!(reread.subtitles().len(), 2);
    assert_eq!(reread.subtitles(), asset.subtitles());
    assert_eq!(reread.load_font_nodes(), asset.load_font_nodes());
    assert_eq!(reread.time_code_rate(), 250);

    // Interop times are written with the 250-ticks form
    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("TimeIn=\"00:00:05:000\""));
    assert!(xml.contains("TimeOut=\"00:00:10:125\""));
}

#[test]
fn smpte_subtitles_round_trip_through_mxf() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subs.mxf");

    let mut asset = SmpteSubtitleAsset::new();
    asset.set_content_title_text("Round Trip");
    asset.set_language("de-DE");
    asset.set_edit_rate(Fraction::new(25, 1));
    asset.set_time_code_rate(25);
    asset.set_start_time(Time::new(0, 0, 0, 0, 25));
    asset.set_intrinsic_duration(250);
    asset.add_font("font", b"glyphs go here".to_vec());
    asset.add(text_cue(
        "Hallo",
        Time::new(0, 0, 5, 0, 25),
        Time::new(0, 0, 7, 0, 25),
    ));
    asset.write(&path).unwrap();

    let reread = SmpteSubtitleAsset::from_file(&path).unwrap();
    assert_eq!(reread.content_title_text(), "Round Trip");
    assert_eq!(reread.language(), Some("de-DE"));
    assert_eq!(reread.time_code_rate(), 25);
    assert_eq!(reread.start_time(), Some(Time::new(0, 0, 0, 0, 25)));
    assert_eq!(reread.intrinsic_duration(), 250);
    assert_eq!(reread.subtitles(), asset.subtitles());
    assert_eq!(reread.fonts().len(), 1);
    assert_eq!(reread.fonts()[0].data, b"glyphs go here");

    // the id triple: container id differs from the XML resource, which equals the XML id
    assert_eq!(reread.resource_id(), Some(reread.xml_id()));
    assert_ne!(reread.id(), reread.xml_id());
}

/// A fresh SMPTE subtitle asset starts at zero and keeps id, resource id and XML id
/// correctly related.
#[test]
fn new_smpte_subtitle_asset_invariants() {
    setup_logging();
    let asset = SmpteSubtitleAsset::new();
    assert_eq!(asset.start_time(), Some(Time::default()));
    assert_eq!(asset.resource_id(), Some(asset.xml_id()));
    assert_ne!(asset.id(), asset.xml_id());
}

#[test]
fn encrypted_smpte_subtitle_keeps_its_xml_private() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subs.mxf");

    let mut asset = SmpteSubtitleAsset::new();
    asset.set_content_title_text("Secret");
    asset.set_language("en");
    asset.set_intrinsic_duration(24);
    asset.set_key(dcp::Key::random().unwrap());
    asset.add(text_cue(
        "hidden",
        Time::new(0, 0, 4, 0, 24),
        Time::new(0, 0, 5, 0, 24),
    ));
    asset.write(&path).unwrap();
    assert!(asset.encrypted());

    let reread = SmpteSubtitleAsset::from_file(&path).unwrap();
    assert!(reread.encrypted());
    assert!(reread.key_id().is_some());
    // without a key, the XML cannot be read
    assert!(reread.subtitles().is_empty());
    assert!(reread.raw_xml().is_empty());

    // the raw container bytes must not leak the text
    let bytes = std::fs::read(&path).unwrap();
    let haystack = String::from_utf8_lossy(&bytes);
    assert!(!haystack.contains("hidden"));
}

#[test]
fn subtitle_equality_options() {
    setup_logging();
    let mut a = InteropSubtitleAsset::new();
    a.add_font("one", vec![1, 2, 3]);
    a.add(text_cue("x", Time::new(0, 0, 4, 0, 250), Time::new(0, 0, 5, 0, 250)));
    let mut b = InteropSubtitleAsset::new();
    b.add_font("two", vec![1, 2, 3]);
    b.add(text_cue("x", Time::new(0, 0, 4, 0, 250), Time::new(0, 0, 5, 0, 250)));

    let mut sink = |_t: dcp::EqualityNoteType, _m: String| {};
    let strict = dcp::EqualityOptions::default();
    assert!(!a.equals(&b, &strict, &mut sink));
    let relaxed = dcp::EqualityOptions { load_font_ids_can_differ: true, ..Default::default() };
    assert!(a.equals(&b, &relaxed, &mut sink));
}
