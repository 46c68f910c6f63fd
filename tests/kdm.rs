// KDM construction, encryption, signing, parsing and decryption.

pub mod common;

use common::{make_signing_chain, setup_logging};
use dcp::{DecryptedKdm, DecryptedKdmKey, EncryptedKdm, Formulation, Key, LocalTime, Standard};

const PICTURE_KEY_ID: &str = "4ac4f922-8239-4831-b23b-31426d0542c4";
const SOUND_KEY_ID: &str = "73baf5de-e195-4542-ab28-8a465f7d4079";
const CPL_ID: &str = "eece17de-77e8-4a55-9347-b6bab5724b9f";

fn make_decrypted() -> DecryptedKdm {
    let mut kdm = DecryptedKdm::new(
        LocalTime::from_string("2030-01-01T00:00:00+00:00").unwrap(),
        LocalTime::from_string("2031-01-01T00:00:00+00:00").unwrap(),
        "test annotation",
        "Test Composition",
        "2030-01-01T00:00:00+00:00",
    );
    kdm.add_key(DecryptedKdmKey::new(
        Some("MDIK"),
        PICTURE_KEY_ID,
        Key::from_hex("8a2729c3e5b65c45d78305462104c3fb").unwrap(),
        CPL_ID,
        Standard::Smpte,
    ));
    kdm.add_key(DecryptedKdmKey::new(
        Some("MDAK"),
        SOUND_KEY_ID,
        Key::from_hex("5327fb7ec2e807bd57059615bf8a169d").unwrap(),
        CPL_ID,
        Standard::Smpte,
    ));
    kdm
}

fn encrypt(
    kdm: &DecryptedKdm,
    picture: bool,
    audio: Option<u32>,
) -> EncryptedKdm {
    let signer = make_signing_chain();
    kdm.encrypt(
        &signer,
        &signer.leaf().unwrap(),
        &[],
        Formulation::ModifiedTransitional1,
        picture,
        audio,
    )
    .expect("encrypting KDM")
}

/// Encrypt then decrypt with the recipient's private key; the keys must survive exactly.
#[test]
fn encrypt_decrypt_round_trip() {
    setup_logging();
    let signer = make_signing_chain();
    let decrypted = make_decrypted();
    let encrypted = decrypted
        .encrypt(
            &signer,
            &signer.leaf().unwrap(),
            &[],
            Formulation::ModifiedTransitional1,
            true,
            None,
        )
        .unwrap();

    let again = DecryptedKdm::from_encrypted(&encrypted, signer.key().unwrap()).unwrap();
    let keys = again.keys();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].cpl_id(), CPL_ID);
    assert_eq!(keys[0].id(), PICTURE_KEY_ID);
    assert_eq!(keys[0].key().hex(), "8a2729c3e5b65c45d78305462104c3fb");
    assert_eq!(keys[0].kdm_type(), Some("MDIK"));
    assert_eq!(keys[1].cpl_id(), CPL_ID);
    assert_eq!(keys[1].id(), SOUND_KEY_ID);
    assert_eq!(keys[1].key().hex(), "5327fb7ec2e807bd57059615bf8a169d");
}

/// A KDM we produced parses back and re-serializes byte-for-byte.
#[test]
fn xml_passthrough_is_byte_identical() {
    setup_logging();
    let encrypted = encrypt(&make_decrypted(), true, Some(3));
    let xml = encrypted.as_xml();
    let reparsed = EncryptedKdm::from_xml(&xml).unwrap();
    assert_eq!(reparsed.as_xml(), xml);
}

#[test]
fn wrong_private_key_fails_decryption() {
    setup_logging();
    let encrypted = encrypt(&make_decrypted(), false, None);
    let other = make_signing_chain();
    assert!(matches!(
        DecryptedKdm::from_encrypted(&encrypted, other.key().unwrap()),
        Err(dcp::Error::KDMDecryptionError(_))
    ));
}

#[test]
fn signature_on_kdm_verifies() {
    setup_logging();
    let encrypted = encrypt(&make_decrypted(), false, None);
    assert!(encrypted.signed());
    assert!(encrypted.signature_valid().unwrap());
    // parse and re-check: the signature must survive the round trip
    let reparsed = EncryptedKdm::from_xml(&encrypted.as_xml()).unwrap();
    assert!(reparsed.signature_valid().unwrap());
}

#[test]
fn key_types_carry_their_scope() {
    setup_logging();
    let encrypted = encrypt(&make_decrypted(), false, None);
    let xml = encrypted.as_xml();
    assert!(xml.contains(
        "<KeyType scope=\"http://www.smpte-ra.org/430-1/2006/KDM#kdm-key-type\">MDIK</KeyType>"
    ));
    assert_eq!(encrypted.typed_key_ids().len(), 2);
}

/// Disable picture and all audio marking: exactly two flags, picture first.
#[test]
fn forensic_flags_picture_and_all_audio() {
    setup_logging();
    let encrypted = encrypt(&make_decrypted(), true, Some(0));
    assert_eq!(
        encrypted.forensic_mark_flags(),
        &[
            "http://www.smpte-ra.org/430-1/2006/KDM#mrkflg-picture-disable".to_string(),
            "http://www.smpte-ra.org/430-1/2006/KDM#mrkflg-audio-disable".to_string(),
        ]
    );
}

#[test]
fn forensic_flags_picture_only() {
    setup_logging();
    let encrypted = encrypt(&make_decrypted(), true, None);
    assert_eq!(
        encrypted.forensic_mark_flags(),
        &["http://www.smpte-ra.org/430-1/2006/KDM#mrkflg-picture-disable".to_string()]
    );
}

#[test]
fn forensic_flags_audio_only() {
    setup_logging();
    let encrypted = encrypt(&make_decrypted(), false, Some(0));
    assert_eq!(
        encrypted.forensic_mark_flags(),
        &["http://www.smpte-ra.org/430-1/2006/KDM#mrkflg-audio-disable".to_string()]
    );
}

#[test]
fn forensic_flags_audio_above_channel() {
    setup_logging();
    let encrypted = encrypt(&make_decrypted(), true, Some(3));
    assert_eq!(
        encrypted.forensic_mark_flags(),
        &[
            "http://www.smpte-ra.org/430-1/2006/KDM#mrkflg-picture-disable".to_string(),
            "http://www.smpte-ra.org/430-1/2006/KDM#mrkflg-audio-disable-above-channel-3".to_string(),
        ]
    );
}

/// No flags requested: the ForensicMarkFlagList element is omitted entirely.
#[test]
fn forensic_flags_absent() {
    setup_logging();
    let encrypted = encrypt(&make_decrypted(), false, None);
    assert!(encrypted.forensic_mark_flags().is_empty());
    assert!(!encrypted.as_xml().contains("ForensicMarkFlagList"));
}

/// The validity window must sit inside the signer certificate's lifetime.
#[test]
fn validity_window_outside_certificate_is_rejected() {
    setup_logging();
    let signer = make_signing_chain();
    let recipient = signer.leaf().unwrap();

    let starts_too_early = DecryptedKdm::new(
        LocalTime::from_string("1981-01-01T00:00:00+00:00").unwrap(),
        LocalTime::from_string("2030-01-01T00:00:00+00:00").unwrap(),
        "",
        "",
        "2030-01-01T00:00:00+00:00",
    );
    let mut kdm = starts_too_early;
    kdm.add_key(DecryptedKdmKey::new(
        Some("MDIK"),
        PICTURE_KEY_ID,
        Key::random().unwrap(),
        CPL_ID,
        Standard::Smpte,
    ));
    assert!(matches!(
        kdm.encrypt(&signer, &recipient, &[], Formulation::ModifiedTransitional1, true, None),
        Err(dcp::Error::BadKDMDateError(_))
    ));

    let mut ends_too_late = DecryptedKdm::new(
        LocalTime::from_string("2030-01-01T00:00:00+00:00").unwrap(),
        LocalTime::from_string("2135-01-01T00:00:00+00:00").unwrap(),
        "",
        "",
        "2030-01-01T00:00:00+00:00",
    );
    ends_too_late.add_key(DecryptedKdmKey::new(
        Some("MDIK"),
        PICTURE_KEY_ID,
        Key::random().unwrap(),
        CPL_ID,
        Standard::Smpte,
    ));
    assert!(matches!(
        ends_too_late.encrypt(&signer, &recipient, &[], Formulation::ModifiedTransitional1, true, None),
        Err(dcp::Error::BadKDMDateError(_))
    ));
}

/// The full circle: an encrypted package, a KDM targeted at its CPL, and frame decryption
/// after the keys are distributed through the reels.
#[test]
fn kdm_unlocks_an_encrypted_package() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    common::write_test_dcp(
        dir.path(),
        &common::TestDcpParams { encrypted: true, sign: true, ..Default::default() },
    );

    let mut package = dcp::Dcp::new(dir.path()).unwrap();
    package.read(None, true).unwrap();

    // before any KDM arrives, picture frames come back as ciphertext
    {
        let assets = package.assets();
        let picture = assets
            .iter()
            .find(|a| matches!(&*a.borrow(), dcp::Asset::MonoPicture(_)))
            .unwrap();
        let picture_borrow = picture.borrow();
        if let dcp::Asset::MonoPicture(p) = &*picture_borrow {
            assert!(p.encrypted());
            let mut reader = p.start_read().unwrap();
            let frame = reader.get_frame(0).unwrap();
            assert_ne!(&frame[0..2], &[0xff, 0x4f], "frame should not be plaintext");
        }
    }

    let signer = make_signing_chain();
    let kdm = DecryptedKdm::from_cpl(
        &package.cpls()[0],
        common::content_key(),
        LocalTime::from_string("2030-01-01T00:00:00+00:00").unwrap(),
        LocalTime::from_string("2031-01-01T00:00:00+00:00").unwrap(),
        "annotation",
        common::TEST_TITLE,
        "2030-01-01T00:00:00+00:00",
    );
    assert_eq!(kdm.keys().len(), 2); // picture and sound
    let encrypted = kdm
        .encrypt(
            &signer,
            &signer.leaf().unwrap(),
            &[],
            Formulation::ModifiedTransitional1,
            false,
            None,
        )
        .unwrap();
    let delivered = DecryptedKdm::from_encrypted(&encrypted, signer.key().unwrap()).unwrap();
    package.add_kdm(&delivered);

    // with the key installed the codestream decrypts
    let assets = package.assets();
    let picture = assets
        .iter()
        .find(|a| matches!(&*a.borrow(), dcp::Asset::MonoPicture(_)))
        .unwrap();
    let picture_borrow = picture.borrow();
    if let dcp::Asset::MonoPicture(p) = &*picture_borrow {
        let mut reader = p.start_read().unwrap();
        let frame = reader.get_frame(0).unwrap();
        assert_eq!(&frame[0..2], &[0xff, 0x4f]);
    }
}

/// Extra trusted devices appear in the device list after the formulation's own entry.
#[test]
fn trusted_devices_are_listed() {
    setup_logging();
    let signer = make_signing_chain();
    let thumbprint = signer.root().unwrap().thumbprint().unwrap();
    let encrypted = make_decrypted()
        .encrypt(
            &signer,
            &signer.leaf().unwrap(),
            &[thumbprint.clone()],
            Formulation::ModifiedTransitional1,
            false,
            None,
        )
        .unwrap();
    assert_eq!(encrypted.trusted_devices().len(), 2);
    assert_eq!(encrypted.trusted_devices()[1], thumbprint);
}
