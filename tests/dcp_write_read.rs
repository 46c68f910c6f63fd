// Writing a package and reading it back: file layout, hashes and reference resolution.

pub mod common;

use std::path::PathBuf;

use common::{setup_logging, write_test_dcp, TestDcpParams, TEST_TITLE};
use dcp::{Dcp, EqualityOptions, NameFormat, Standard};
use pretty_assertions::assert_eq;

fn read_back(dir: &std::path::Path) -> Dcp {
    let mut dcp = Dcp::new(dir).unwrap();
    let mut notes = Vec::new();
    dcp.read(Some(&mut notes), false).expect("reading DCP");
    assert!(notes.is_empty(), "unexpected read notes: {notes:?}");
    dcp
}

#[test]
fn written_dcp_has_the_expected_files() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let cpl_id = write_test_dcp(dir.path(), &TestDcpParams::default());

    assert!(dir.path().join("ASSETMAP.xml").exists());
    assert!(dir.path().join("VOLINDEX.xml").exists());
    assert!(dir.path().join(format!("cpl_{cpl_id}.xml")).exists());
    assert!(dir.path().join("picture.mxf").exists());
    assert!(dir.path().join("sound.mxf").exists());
    let pkls: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("pkl_"))
        .collect();
    assert_eq!(pkls.len(), 1);
}

#[test]
fn read_back_graph_matches_what_was_written() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let cpl_id = write_test_dcp(dir.path(), &TestDcpParams::default());

    let dcp = read_back(dir.path());
    assert_eq!(dcp.standard(), Some(Standard::Smpte));
    assert_eq!(dcp.cpls().len(), 1);
    assert_eq!(dcp.pkls().len(), 1);

    let cpl = &dcp.cpls()[0];
    assert_eq!(cpl.id(), cpl_id);
    assert_eq!(cpl.content_title_text(), TEST_TITLE);
    assert_eq!(cpl.annotation_text(), Some(TEST_TITLE));
    assert_eq!(cpl.reels().len(), 1);
    assert_eq!(cpl.duration(), 24);
    assert_eq!(cpl.main_sound_sample_rate(), Some(48000));
    assert_eq!(
        cpl.main_sound_configuration().unwrap().to_string(),
        "51/L,R,C,LFE,Ls,Rs"
    );
    assert_eq!(cpl.version_number(), Some(1));
    assert_eq!(cpl.full_content_title_text(), Some(TEST_TITLE));

    let reel = &cpl.reels()[0];
    let picture = reel.main_picture().expect("reel has a picture");
    assert!(picture.core.resolved());
    assert_eq!(picture.core.intrinsic_duration(), 24);
    assert_eq!(picture.frame_rate().numerator, 24);
    let sound = reel.main_sound().expect("reel has sound");
    assert!(sound.core.resolved());
    assert_eq!(sound.language(), Some("en-US"));
    let markers = reel.main_markers().expect("reel has markers");
    assert_eq!(markers.get().len(), 2);
}

/// The PKL's hashes must be the actual base64 SHA-1 of the files on disk; the CPL entry
/// and asset map ids must line up.
#[test]
fn pkl_hashes_agree_with_content() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let cpl_id = write_test_dcp(dir.path(), &TestDcpParams::default());

    let dcp = read_back(dir.path());
    let pkl = &dcp.pkls()[0];
    // CPL, picture, sound
    assert_eq!(pkl.asset_list().len(), 3);

    let asset_map = dcp.asset_map().unwrap();
    for entry in pkl.asset_list() {
        let map_entry = asset_map
            .entries()
            .iter()
            .find(|e| e.id == entry.id)
            .expect("PKL asset is in the asset map");
        let path = dir.path().join(&map_entry.path);
        assert!(path.exists());
        // recompute the digest independently of the library's caches
        let bytes = std::fs::read(&path).unwrap();
        let digest = {
            use base64::prelude::{Engine, BASE64_STANDARD};
            BASE64_STANDARD.encode(openssl::sha::sha1(&bytes))
        };
        assert_eq!(entry.hash, digest, "hash mismatch for {}", path.display());
        assert_eq!(entry.size, bytes.len() as u64);
    }

    assert!(pkl.hash(&cpl_id).is_some());
    assert_eq!(pkl.pkl_type(&cpl_id), Some("text/xml"));
}

/// Reel references record the same hash as the PKL.
#[test]
fn reel_reference_hashes_match_pkl() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());

    let dcp = read_back(dir.path());
    let pkl = &dcp.pkls()[0];
    for reference in dcp.cpls()[0].reel_file_assets() {
        let reference_hash = reference.hash().expect("reference carries a hash");
        assert_eq!(Some(reference_hash), pkl.hash(reference.id()));
    }
}

#[test]
fn resolve_refs_is_idempotent() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());

    let mut dcp = read_back(dir.path());
    let before: Vec<String> = dcp.cpls()[0]
        .reel_file_assets()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    dcp.resolve_refs();
    dcp.resolve_refs();
    let after: Vec<String> = dcp.cpls()[0]
        .reel_file_assets()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    assert_eq!(before, after);
    assert!(dcp.cpls()[0].reel_file_assets().iter().all(|r| r.resolved()));
}

#[test]
fn two_reads_of_the_same_dcp_are_equal() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());

    let a = read_back(dir.path());
    let b = read_back(dir.path());
    let mut messages = Vec::new();
    let mut sink = |_type: dcp::EqualityNoteType, message: String| messages.push(message);
    assert!(
        a.equals(&b, &EqualityOptions::default(), &mut sink),
        "DCPs differ: {messages:?}"
    );
}

#[test]
fn signed_dcp_round_trips() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams { sign: true, ..Default::default() });

    let dcp = read_back(dir.path());
    // the signature hangs off the CPL document
    let cpl_file = dcp.cpls()[0].file().unwrap();
    let text = std::fs::read_to_string(cpl_file).unwrap();
    assert!(text.contains("<dsig:Signature"));
    assert!(text.contains("<dsig:X509Certificate>"));
    let doc = dcp::xml::Document::read_string(&text).unwrap();
    assert!(dcp::xml::Document::read_string(&text).is_ok());
    assert_eq!(doc.root().name(), "CompositionPlaylist");
}

/// The Interop dialect: extensionless index files, parameterised PKL types.
#[test]
fn interop_package_round_trips() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let cpl_id = common::write_interop_dcp(dir.path());

    assert!(dir.path().join("ASSETMAP").exists());
    assert!(dir.path().join("VOLINDEX").exists());
    assert!(!dir.path().join("ASSETMAP.xml").exists());

    let mut dcp = Dcp::new(dir.path()).unwrap();
    let mut notes = Vec::new();
    dcp.read(Some(&mut notes), false).unwrap();
    assert!(notes.is_empty(), "unexpected read notes: {notes:?}");
    assert_eq!(dcp.standard(), Some(Standard::Interop));
    assert_eq!(dcp.cpls()[0].id(), cpl_id);

    let pkl = &dcp.pkls()[0];
    assert_eq!(pkl.pkl_type(&cpl_id), Some("text/xml;asdcpKind=CPL"));
    let picture_id = dcp.cpls()[0].reels()[0].main_picture().unwrap().core.id().to_string();
    assert_eq!(pkl.pkl_type(&picture_id), Some("application/mxf;asdcpKind=Picture"));
    assert!(dcp.cpls()[0].reel_file_assets().iter().all(|r| r.resolved()));
}

#[test]
fn writing_empty_dcp_fails() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut dcp = Dcp::new(dir.path()).unwrap();
    assert!(matches!(
        dcp.write_xml("i", "c", "2030-01-01T00:00:00+00:00", "a", None, &NameFormat::new("%t")),
        Err(dcp::Error::MiscError(_))
    ));
}

#[test]
fn missing_assetmap_is_its_own_error() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut dcp = Dcp::new(dir.path()).unwrap();
    assert!(matches!(
        dcp.read(None, false),
        Err(dcp::Error::MissingAssetmapError(_))
    ));
}
