//! Shared code for our test harness: logging setup, signing chains, synthetic JPEG 2000
//! codestreams and complete test packages.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Once;

use lazy_static::lazy_static;

use dcp::{
    Cancel, ContentKind, Cpl, Dcp, Fraction, LocalTime, Marker, MonoPictureAsset, NameFormat,
    Reel, ReelMarkersAsset, ReelPictureAsset, ReelSoundAsset, ReelSubtitleAsset, Size,
    SmpteSubtitleAsset, SoundAsset, Standard, StereoPictureAsset, Subtitle, SubtitleText, Time,
    VerificationNote,
};

/// The symmetric key used for every encrypted test asset, so that tests can build KDMs for
/// the packages they write.
pub const CONTENT_KEY_HEX: &str = "0123456789abcdef0123456789abcdef";

pub fn content_key() -> dcp::Key {
    dcp::Key::from_hex(CONTENT_KEY_HEX).unwrap()
}

lazy_static! {
    static ref TRACING_INIT: Once = Once::new();
}

pub fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    TRACING_INIT.call_once(|| {
        let fmt_layer = fmt::layer().compact().with_target(false);
        let filter_layer = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .expect("initializing logging");
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}

/// A freshly generated signing chain with its leaf private key.
pub fn make_signing_chain() -> dcp::CertificateChain {
    dcp::CertificateChain::new_for_signing(
        "example.org",
        "example.org",
        ".smpte-430-2.ROOT.NOT_FOR_PRODUCTION",
        ".smpte-430-2.INTERMEDIATE.NOT_FOR_PRODUCTION",
        "CS.smpte-430-2.LEAF.NOT_FOR_PRODUCTION",
    )
    .expect("generating certificate chain")
}

/// Knobs for [`make_j2k`]; the default is a conforming 2K codestream.
pub struct J2kParams {
    pub width: u32,
    pub height: u32,
    pub code_block_exponent: u8,
    pub guard_bits: u8,
    pub tile_parts: u8,
    pub with_tlm: bool,
    pub poc_in_main: usize,
}

impl Default for J2kParams {
    fn default() -> J2kParams {
        J2kParams {
            width: 1998,
            height: 1080,
            code_block_exponent: 3,
            guard_bits: 1,
            tile_parts: 3,
            with_tlm: true,
            poc_in_main: 0,
        }
    }
}

impl J2kParams {
    pub fn fourk() -> J2kParams {
        J2kParams {
            width: 3996,
            height: 2160,
            guard_bits: 2,
            tile_parts: 6,
            poc_in_main: 1,
            ..J2kParams::default()
        }
    }
}

/// Build a synthetic codestream with exactly the header markers the DCI profile asks for.
pub fn make_j2k(params: &J2kParams) -> Vec<u8> {
    let fourk = params.width > 2048;
    let mut out = Vec::new();

    // SOC
    out.extend_from_slice(&[0xff, 0x4f]);

    // SIZ
    out.extend_from_slice(&[0xff, 0x51]);
    out.extend_from_slice(&47u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // capabilities
    out.extend_from_slice(&params.width.to_be_bytes());
    out.extend_from_slice(&params.height.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // XOsiz
    out.extend_from_slice(&0u32.to_be_bytes()); // YOsiz
    out.extend_from_slice(&params.width.to_be_bytes()); // XTsiz
    out.extend_from_slice(&params.height.to_be_bytes()); // YTsiz
    out.extend_from_slice(&0u32.to_be_bytes()); // XTOsiz
    out.extend_from_slice(&0u32.to_be_bytes()); // YTOsiz
    out.extend_from_slice(&3u16.to_be_bytes()); // components
    for _ in 0..3 {
        out.extend_from_slice(&[11, 1, 1]); // 12-bit, 1/1 subsampling
    }

    // COD
    let precincts: usize = if fourk { 7 } else { 6 };
    out.extend_from_slice(&[0xff, 0x52]);
    out.extend_from_slice(&((12 + precincts) as u16).to_be_bytes());
    out.push(1); // Scod
    out.push(4); // CPRL
    out.extend_from_slice(&1u16.to_be_bytes()); // layers
    out.push(1); // multi-component transform
    out.push(if fourk { 6 } else { 5 }); // DWT levels
    out.push(params.code_block_exponent); // code block width
    out.push(params.code_block_exponent); // code block height
    out.push(0); // mode variations
    out.push(0); // 9/7 irreversible
    out.push(0x77);
    for _ in 1..precincts {
        out.push(0x88);
    }

    // QCD
    out.extend_from_slice(&[0xff, 0x5c]);
    out.extend_from_slice(&5u16.to_be_bytes());
    out.push((params.guard_bits << 5) | 0x02);
    out.extend_from_slice(&[0x00, 0x00]); // abbreviated step sizes

    // TLM
    if params.with_tlm {
        out.extend_from_slice(&[0xff, 0x55]);
        out.extend_from_slice(&6u16.to_be_bytes());
        out.extend_from_slice(&[0x00, 0x40, 0x00, 0x00]);
    }

    // POC (4K only, in the main header)
    for _ in 0..params.poc_in_main {
        out.extend_from_slice(&[0xff, 0x5f]);
        out.extend_from_slice(&16u16.to_be_bytes());
        out.push(0); // RSpoc
        out.push(0); // CSpoc
        out.extend_from_slice(&1u16.to_be_bytes()); // LYEpoc
        out.push(6); // REpoc
        out.push(3); // CEpoc
        out.push(4); // Ppoc
        out.push(6); // RSpoc
        out.push(0); // CSpoc
        out.extend_from_slice(&1u16.to_be_bytes()); // LYEpoc
        out.push(7); // REpoc
        out.push(3); // CEpoc
        out.push(4); // Ppoc
    }

    // tile parts: SOT + SOD + entropy data, then EOC
    for part in 0..params.tile_parts {
        out.extend_from_slice(&[0xff, 0x90]);
        out.extend_from_slice(&10u16.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // tile index
        out.extend_from_slice(&64u32.to_be_bytes()); // tile part length
        out.push(part); // tile part index
        out.push(params.tile_parts);
        out.extend_from_slice(&[0xff, 0x93]);
        out.extend_from_slice(&[0u8; 48]);
    }
    out.extend_from_slice(&[0xff, 0xd9]);

    out
}

/// What [`write_test_dcp`] should build.
pub struct TestDcpParams {
    pub frames: i64,
    pub edit_rate: Fraction,
    pub content_kind: ContentKind,
    pub encrypted: bool,
    pub stereo: bool,
    pub with_markers: bool,
    pub with_metadata: bool,
    pub sign: bool,
    pub j2k: J2kParams,
    /// Text cues for a main subtitle track (at the picture edit rate's tick rate).
    pub subtitle_cues: Option<Vec<SubtitleText>>,
    /// Applied to the CPL before the package is written.
    pub customize_cpl: Option<fn(&mut Cpl)>,
}

/// A text cue with unexciting layout.
pub fn cue(text: &str, in_time: Time, out_time: Time) -> SubtitleText {
    SubtitleText {
        text: text.to_string(),
        in_time,
        out_time,
        v_position: 0.1,
        v_align: dcp::VAlign::Bottom,
        font_id: None,
        fade_up: None,
        fade_down: None,
    }
}

impl Default for TestDcpParams {
    fn default() -> TestDcpParams {
        TestDcpParams {
            frames: 24,
            edit_rate: Fraction::new(24, 1),
            content_kind: ContentKind::test(),
            encrypted: false,
            stereo: false,
            with_markers: true,
            with_metadata: true,
            sign: false,
            j2k: J2kParams::default(),
            subtitle_cues: None,
            customize_cpl: None,
        }
    }
}

pub const TEST_TITLE: &str = "Verification Test Composition";

/// Build a complete one-reel SMPTE DCP under `dir` and return the CPL id.
pub fn write_test_dcp(dir: &Path, params: &TestDcpParams) -> String {
    let edit_rate = params.edit_rate;
    let frame = make_j2k(&params.j2k);

    let picture_ref = if params.stereo {
        let mut picture = StereoPictureAsset::new(edit_rate, Standard::Smpte);
        if params.encrypted {
            picture.set_key(content_key());
        }
        {
            let mut writer = picture
                .start_write(&dir.join("picture.mxf"), true)
                .expect("starting picture write");
            for _ in 0..params.frames {
                writer.write(&frame, &frame).expect("writing picture frame");
            }
            writer.finalize().expect("finalizing picture");
        }
        dcp::Asset::new_ref(dcp::Asset::StereoPicture(picture))
    } else {
        let mut picture = MonoPictureAsset::new(edit_rate, Standard::Smpte);
        if params.encrypted {
            picture.set_key(content_key());
        }
        {
            let mut writer = picture
                .start_write(&dir.join("picture.mxf"), true)
                .expect("starting picture write");
            for _ in 0..params.frames {
                writer.write(&frame).expect("writing picture frame");
            }
            writer.finalize().expect("finalizing picture");
        }
        dcp::Asset::new_ref(dcp::Asset::MonoPicture(picture))
    };

    let mut sound = SoundAsset::new(edit_rate, 48000, 6, Some("en-US"), Standard::Smpte);
    if params.encrypted {
        sound.set_key(content_key());
    }
    {
        let samples_per_frame = sound.samples_per_frame();
        let mut writer = sound
            .start_write(&dir.join("sound.mxf"), vec![], false, true)
            .expect("starting sound write");
        let silence = vec![0.0f32; samples_per_frame];
        let channels: Vec<&[f32]> = vec![&silence; 6];
        for _ in 0..params.frames {
            writer.write(&channels, samples_per_frame).expect("writing sound frame");
        }
        writer.finalize().expect("finalizing sound");
    }

    let sound_ref = dcp::Asset::new_ref(dcp::Asset::Sound(sound));

    let mut reel = Reel::new();
    if params.with_markers {
        let mut markers = ReelMarkersAsset::new(edit_rate, params.frames);
        markers.set(Marker::Ffoc, Time::from_editable_units(1, edit_rate.numerator));
        markers.set(
            Marker::Lfoc,
            Time::from_editable_units(params.frames - 1, edit_rate.numerator),
        );
        reel.set_main_markers(markers);
    }
    reel.set_main_picture(ReelPictureAsset::new(picture_ref, 0).unwrap());
    reel.set_main_sound(ReelSoundAsset::new(sound_ref, 0).unwrap());

    if let Some(cues) = &params.subtitle_cues {
        let mut subtitle = SmpteSubtitleAsset::new();
        subtitle.set_content_title_text(TEST_TITLE);
        subtitle.set_language("en-US");
        subtitle.set_edit_rate(edit_rate);
        subtitle.set_time_code_rate(edit_rate.numerator);
        subtitle.set_start_time(Time::new(0, 0, 0, 0, edit_rate.numerator));
        subtitle.set_intrinsic_duration(params.frames);
        for c in cues {
            subtitle.add(Subtitle::Text(c.clone()));
        }
        subtitle.write(&dir.join("subtitle.mxf")).expect("writing subtitle asset");
        let subtitle_ref = dcp::Asset::new_ref(dcp::Asset::SmpteSubtitle(subtitle));
        reel.set_main_subtitle(
            ReelSubtitleAsset::new(subtitle_ref, edit_rate, params.frames, 0).unwrap(),
        );
    }

    let mut cpl = Cpl::new(TEST_TITLE, params.content_kind.clone(), Standard::Smpte);
    cpl.add_reel(reel);
    if params.with_metadata {
        cpl.set_main_sound_configuration("51/L,R,C,LFE,Ls,Rs".parse().unwrap());
        cpl.set_main_sound_sample_rate(48000);
        cpl.set_main_picture_stored_area(Size::new(params.j2k.width, params.j2k.height));
        cpl.set_main_picture_active_area(Size::new(params.j2k.width, params.j2k.height));
        cpl.set_full_content_title_text(TEST_TITLE);
        cpl.set_version_number(1).unwrap();
    }
    if let Some(customize) = params.customize_cpl {
        customize(&mut cpl);
    }
    let cpl_id = cpl.id().to_string();

    let mut package = Dcp::new(dir).expect("creating DCP");
    package.add_cpl(cpl);
    let signer = if params.sign { Some(make_signing_chain()) } else { None };
    package
        .write_xml(
            "test issuer",
            "test creator",
            &LocalTime::now().as_string(),
            TEST_TITLE,
            signer.as_ref(),
            &NameFormat::new("%t"),
        )
        .expect("writing DCP");

    cpl_id
}

/// Build a minimal Interop-dialect package under `dir` and return the CPL id.
pub fn write_interop_dcp(dir: &Path) -> String {
    let edit_rate = Fraction::new(24, 1);
    let frame = make_j2k(&J2kParams::default());

    let mut picture = MonoPictureAsset::new(edit_rate, Standard::Interop);
    {
        let mut writer = picture.start_write(&dir.join("picture.mxf"), true).unwrap();
        for _ in 0..24 {
            writer.write(&frame).unwrap();
        }
        writer.finalize().unwrap();
    }
    let mut sound = SoundAsset::new(edit_rate, 48000, 6, Some("en-US"), Standard::Interop);
    {
        let samples_per_frame = sound.samples_per_frame();
        let mut writer = sound.start_write(&dir.join("sound.mxf"), vec![], false, true).unwrap();
        let silence = vec![0.0f32; samples_per_frame];
        let channels: Vec<&[f32]> = vec![&silence; 6];
        for _ in 0..24 {
            writer.write(&channels, samples_per_frame).unwrap();
        }
        writer.finalize().unwrap();
    }

    let mut reel = Reel::new();
    reel.set_main_picture(
        ReelPictureAsset::new(dcp::Asset::new_ref(dcp::Asset::MonoPicture(picture)), 0).unwrap(),
    );
    reel.set_main_sound(
        ReelSoundAsset::new(dcp::Asset::new_ref(dcp::Asset::Sound(sound)), 0).unwrap(),
    );

    let mut cpl = Cpl::new(TEST_TITLE, ContentKind::test(), Standard::Interop);
    cpl.add_reel(reel);
    let cpl_id = cpl.id().to_string();

    let mut package = Dcp::new(dir).unwrap();
    package.add_cpl(cpl);
    package
        .write_xml(
            "test issuer",
            "test creator",
            &LocalTime::now().as_string(),
            TEST_TITLE,
            None,
            &NameFormat::new("%t"),
        )
        .unwrap();
    cpl_id
}

/// Run the verifier over one directory with no-op callbacks.
pub fn verify_one(dir: &Path) -> Vec<VerificationNote> {
    dcp::verify(
        &[dir.to_path_buf()],
        &mut |_stage, _path| {},
        &mut |_progress| Cancel::Continue,
    )
}

pub fn dump_notes(notes: &[VerificationNote]) {
    for note in notes {
        eprintln!("note> {:?}: {}", note.code(), dcp::note_to_string(note));
    }
}
