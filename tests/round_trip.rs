// Read/write round trips: stable bytes for re-serialized documents and rewritten packages.

pub mod common;

use common::{setup_logging, write_test_dcp, TestDcpParams, TEST_TITLE};
use dcp::{AssetMap, Dcp, LocalTime, NameFormat};
use pretty_assertions::assert_eq;

fn find_file(dir: &std::path::Path, prefix: &str) -> std::path::PathBuf {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with(prefix))
        .unwrap_or_else(|| panic!("no file starting with {prefix}"))
}

/// Parsing a CPL and writing it again reproduces the file byte for byte.
#[test]
fn cpl_reserialization_is_byte_identical() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());

    let cpl_path = find_file(dir.path(), "cpl_");
    let original = std::fs::read_to_string(&cpl_path).unwrap();

    let mut dcp = Dcp::new(dir.path()).unwrap();
    dcp.read(None, false).unwrap();
    let rewritten_path = dir.path().join("rewritten.xml");
    dcp.cpls_mut()[0].write_xml(&rewritten_path, None).unwrap();

    let rewritten = std::fs::read_to_string(&rewritten_path).unwrap();
    assert_eq!(rewritten, original);
}

/// Rewriting a freshly-loaded package reproduces the PKL bytes and the asset-map content
/// (modulo the asset map's own fresh id).
#[test]
fn rewriting_a_loaded_dcp_is_stable() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());

    let pkl_path = find_file(dir.path(), "pkl_");
    let original_pkl = std::fs::read_to_string(&pkl_path).unwrap();
    let original_assetmap = AssetMap::from_file(&dir.path().join("ASSETMAP.xml")).unwrap();

    let mut dcp = Dcp::new(dir.path()).unwrap();
    dcp.read(None, false).unwrap();
    dcp.write_xml(
        "test issuer",
        "test creator",
        &LocalTime::now().as_string(),
        TEST_TITLE,
        None,
        &NameFormat::new("%t"),
    )
    .unwrap();

    let rewritten_pkl = std::fs::read_to_string(&pkl_path).unwrap();
    assert_eq!(rewritten_pkl, original_pkl);

    let rewritten_assetmap = AssetMap::from_file(&dir.path().join("ASSETMAP.xml")).unwrap();
    assert_eq!(rewritten_assetmap.entries(), original_assetmap.entries());
    assert_eq!(rewritten_assetmap.standard(), original_assetmap.standard());
    assert_ne!(rewritten_assetmap.id(), original_assetmap.id());
}

/// An asset hash is computed once and cached; later file changes are not observed until
/// the cache is dropped.
#[test]
fn asset_hashes_are_cached() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    write_test_dcp(dir.path(), &TestDcpParams::default());

    let mut dcp = Dcp::new(dir.path()).unwrap();
    dcp.read(None, false).unwrap();
    let assets = dcp.assets();
    let picture = assets
        .iter()
        .find(|a| matches!(&*a.borrow(), dcp::Asset::MonoPicture(_)))
        .unwrap();

    let first = picture.borrow_mut().hash(None).unwrap();
    // tamper with the file behind the cache's back
    let path = picture.borrow().file().unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    let len = bytes.len();
    bytes[len / 2] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let second = picture.borrow_mut().hash(None).unwrap();
    assert_eq!(first, second);
}

/// Deterministic-id mode makes two separately-built packages identical apart from their
/// content timestamps.
#[test]
fn deterministic_ids_give_reproducible_identifiers() {
    setup_logging();
    dcp::set_deterministic_ids(0x00dcf00d);
    let dir_a = tempfile::tempdir().unwrap();
    let cpl_a = write_test_dcp(dir_a.path(), &TestDcpParams::default());

    dcp::set_deterministic_ids(0x00dcf00d);
    let dir_b = tempfile::tempdir().unwrap();
    let cpl_b = write_test_dcp(dir_b.path(), &TestDcpParams::default());
    dcp::unset_deterministic_ids();

    assert_eq!(cpl_a, cpl_b);
    let pkl_a = find_file(dir_a.path(), "pkl_").file_name().unwrap().to_os_string();
    let pkl_b = find_file(dir_b.path(), "pkl_").file_name().unwrap().to_os_string();
    assert_eq!(pkl_a, pkl_b);
}
