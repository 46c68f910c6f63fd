//! Verification: walk one or more DCPs and report everything questionable as typed notes.
//!
//! Notes never abort the walk; only a package so broken that it cannot be read at all cuts a
//! DCP's checks short (and that, too, becomes a note). Note order is DCP, then CPL, then
//! reel, with per-frame notes in frame order within a reel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::asset::Asset;
use crate::certificate_chain::verify_signature;
use crate::cpl::Cpl;
use crate::dcp::Dcp;
use crate::dcp_time::Time;
use crate::language_tag::LanguageTag;
use crate::reel::Reel;
use crate::subtitle::{Subtitle, VAlign};
use crate::types::Standard;
use crate::util::make_digest;
use crate::verify_j2k::verify_j2k;
use crate::xml::{Document, Element};
use crate::Error;

/// How bad a note is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteType {
    /// Informational; nothing is wrong.
    Ok,
    /// A "should" has been ignored.
    Warning,
    /// A hard error by any reading of the specifications.
    Error,
    /// Violates a "shall" of SMPTE Bv2.1 (RDD 52); not all deployments treat this as fatal.
    Bv21Error,
}

/// The open catalogue of things the verifier can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoteCode {
    FailedRead,
    MismatchedCplHashes,
    InvalidPictureFrameRate,
    IncorrectPictureHash,
    MismatchedPictureHashes,
    IncorrectSoundHash,
    MismatchedSoundHashes,
    EmptyAssetPath,
    MissingAsset,
    MismatchedStandard,
    InvalidXml,
    MissingAssetmap,
    InvalidIntrinsicDuration,
    InvalidDuration,
    InvalidPictureFrameSizeInBytes,
    NearlyInvalidPictureFrameSizeInBytes,
    ExternalAsset,
    ThreedAssetMarkedAsTwod,
    InvalidStandard,
    InvalidLanguage,
    InvalidPictureSizeInPixels,
    InvalidPictureFrameRateFor2k,
    InvalidPictureFrameRateFor4k,
    InvalidPictureAssetResolutionFor3d,
    InvalidClosedCaptionXmlSizeInBytes,
    InvalidTimedTextSizeInBytes,
    InvalidTimedTextFontSizeInBytes,
    MissingSubtitleLanguage,
    MismatchedSubtitleLanguages,
    MissingSubtitleStartTime,
    InvalidSubtitleStartTime,
    InvalidSubtitleFirstTextTime,
    InvalidSubtitleDuration,
    InvalidSubtitleSpacing,
    SubtitleOverlapsReelBoundary,
    InvalidSubtitleLineCount,
    NearlyInvalidSubtitleLineLength,
    InvalidSubtitleLineLength,
    InvalidClosedCaptionLineCount,
    InvalidClosedCaptionLineLength,
    InvalidSoundFrameRate,
    MissingCplAnnotationText,
    MismatchedCplAnnotationText,
    MismatchedAssetDuration,
    MissingMainSubtitleFromSomeReels,
    MismatchedClosedCaptionAssetCounts,
    MissingSubtitleEntryPoint,
    IncorrectSubtitleEntryPoint,
    MissingClosedCaptionEntryPoint,
    IncorrectClosedCaptionEntryPoint,
    MissingHash,
    MissingFfecInFeature,
    MissingFfmcInFeature,
    MissingFfoc,
    MissingLfoc,
    IncorrectFfoc,
    IncorrectLfoc,
    MissingCplMetadata,
    MissingCplMetadataVersionNumber,
    MissingExtensionMetadata,
    InvalidExtensionMetadata,
    UnsignedCplWithEncryptedContent,
    UnsignedPklWithEncryptedContent,
    MismatchedPklAnnotationTextWithCpl,
    PartiallyEncrypted,
    InvalidJpeg2000Codestream,
    InvalidJpeg2000GuardBitsFor2k,
    InvalidJpeg2000GuardBitsFor4k,
    InvalidJpeg2000TileSize,
    InvalidJpeg2000CodeBlockWidth,
    InvalidJpeg2000CodeBlockHeight,
    IncorrectJpeg2000PocMarkerCountFor2k,
    IncorrectJpeg2000PocMarkerCountFor4k,
    IncorrectJpeg2000PocMarker,
    InvalidJpeg2000PocMarkerLocation,
    InvalidJpeg2000TilePartsFor2k,
    InvalidJpeg2000TilePartsFor4k,
    MissingJpeg2000TlmMarker,
    MismatchedTimedTextResourceId,
    IncorrectTimedTextAssetId,
    MismatchedTimedTextDuration,
}

/// One finding, with enough context to localise it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationNote {
    #[serde(rename = "type")]
    note_type: NoteType,
    code: NoteCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u64>,
}

impl VerificationNote {
    pub fn new(note_type: NoteType, code: NoteCode) -> VerificationNote {
        VerificationNote { note_type, code, note: None, file: None, line: None }
    }

    pub fn with_note(mut self, note: &str) -> VerificationNote {
        self.note = Some(note.to_string());
        self
    }

    pub fn with_file(mut self, file: &Path) -> VerificationNote {
        self.file = Some(file.to_path_buf());
        self
    }

    pub fn with_line(mut self, line: u64) -> VerificationNote {
        self.line = Some(line);
        self
    }

    pub fn note_type(&self) -> NoteType {
        self.note_type
    }

    pub fn code(&self) -> NoteCode {
        self.code
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn line(&self) -> Option<u64> {
        self.line
    }
}

/// Returned by the progress callback to continue or to abandon verification, keeping the
/// notes gathered so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancel {
    Continue,
    Cancel,
}

fn filename(path: &Path) -> String {
    path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default()
}

/// A one-line human-readable rendering of a note.
pub fn note_to_string(note: &VerificationNote) -> String {
    let n = || note.note().unwrap_or("").to_string();
    let f = || note.file().map(filename).unwrap_or_default();
    match note.code() {
        NoteCode::FailedRead => n(),
        NoteCode::MismatchedCplHashes => format!("The hash of the CPL {} in the PKL does not agree with the CPL file.", n()),
        NoteCode::InvalidPictureFrameRate => format!("The picture in a reel has an invalid frame rate {}.", n()),
        NoteCode::IncorrectPictureHash => format!("The hash of the picture asset {} does not agree with the PKL file.", f()),
        NoteCode::MismatchedPictureHashes => format!("The PKL and CPL hashes differ for the picture asset {}.", f()),
        NoteCode::IncorrectSoundHash => format!("The hash of the sound asset {} does not agree with the PKL file.", f()),
        NoteCode::MismatchedSoundHashes => format!("The PKL and CPL hashes differ for the sound asset {}.", f()),
        NoteCode::EmptyAssetPath => "The asset map contains an empty asset path.".to_string(),
        NoteCode::MissingAsset => format!("The file {} for an asset in the asset map cannot be found.", f()),
        NoteCode::MismatchedStandard => "The DCP contains both SMPTE and Interop parts.".to_string(),
        NoteCode::InvalidXml => format!("An XML file is badly formed: {} ({}:{})", n(), f(), note.line().unwrap_or(0)),
        NoteCode::MissingAssetmap => "No ASSETMAP or ASSETMAP.xml was found.".to_string(),
        NoteCode::InvalidIntrinsicDuration => format!("The intrinsic duration of the asset {} is less than 1 second.", n()),
        NoteCode::InvalidDuration => format!("The duration of the asset {} is less than 1 second.", n()),
        NoteCode::InvalidPictureFrameSizeInBytes => format!("The instantaneous bit rate of the picture asset {} is larger than the limit of 250Mbit/s in at least one place.", f()),
        NoteCode::NearlyInvalidPictureFrameSizeInBytes => format!("The instantaneous bit rate of the picture asset {} is close to the limit of 250Mbit/s in at least one place.", f()),
        NoteCode::ExternalAsset => format!("The asset {} that this DCP refers to is not included in the DCP. It may be a VF.", n()),
        NoteCode::ThreedAssetMarkedAsTwod => format!("The asset {} is 3D but its MXF is marked as 2D.", f()),
        NoteCode::InvalidStandard => "This DCP does not use the SMPTE standard.".to_string(),
        NoteCode::InvalidLanguage => format!("The DCP specifies a language '{}' which does not conform to the RFC 5646 standard.", n()),
        NoteCode::InvalidPictureSizeInPixels => format!("The size {} of picture asset {} is not allowed.", n(), f()),
        NoteCode::InvalidPictureFrameRateFor2k => format!("The frame rate {} of picture asset {} is not allowed for 2K DCPs.", n(), f()),
        NoteCode::InvalidPictureFrameRateFor4k => format!("The frame rate {} of picture asset {} is not allowed for 4K DCPs.", n(), f()),
        NoteCode::InvalidPictureAssetResolutionFor3d => "3D 4K DCPs are not allowed.".to_string(),
        NoteCode::InvalidClosedCaptionXmlSizeInBytes => format!("The size {} of the closed caption asset {} is larger than the 256KB maximum.", n(), f()),
        NoteCode::InvalidTimedTextSizeInBytes => format!("The size {} of the timed text asset {} is larger than the 115MB maximum.", n(), f()),
        NoteCode::InvalidTimedTextFontSizeInBytes => format!("The size {} of the fonts in timed text asset {} is larger than the 10MB maximum.", n(), f()),
        NoteCode::MissingSubtitleLanguage => format!("The XML for the SMPTE subtitle asset {} has no <Language> tag.", f()),
        NoteCode::MismatchedSubtitleLanguages => "Some subtitle assets have different <Language> tags than others".to_string(),
        NoteCode::MissingSubtitleStartTime => format!("The XML for the SMPTE subtitle asset {} has no <StartTime> tag.", f()),
        NoteCode::InvalidSubtitleStartTime => format!("The XML for a SMPTE subtitle asset {} has a non-zero <StartTime> tag.", f()),
        NoteCode::InvalidSubtitleFirstTextTime => "The first subtitle or closed caption is less than 4 seconds from the start of the DCP.".to_string(),
        NoteCode::InvalidSubtitleDuration => "At least one subtitle lasts less than 15 frames.".to_string(),
        NoteCode::InvalidSubtitleSpacing => "At least one pair of subtitles is separated by less than 2 frames.".to_string(),
        NoteCode::SubtitleOverlapsReelBoundary => "At least one subtitle extends outside of its reel.".to_string(),
        NoteCode::InvalidSubtitleLineCount => "There are more than 3 subtitle lines in at least one place in the DCP.".to_string(),
        NoteCode::NearlyInvalidSubtitleLineLength => "There are more than 52 characters in at least one subtitle line.".to_string(),
        NoteCode::InvalidSubtitleLineLength => "There are more than 79 characters in at least one subtitle line.".to_string(),
        NoteCode::InvalidClosedCaptionLineCount => "There are more than 3 closed caption lines in at least one place.".to_string(),
        NoteCode::InvalidClosedCaptionLineLength => "There are more than 32 characters in at least one closed caption line.".to_string(),
        NoteCode::InvalidSoundFrameRate => format!("The sound asset {} has a sampling rate of {}", f(), n()),
        NoteCode::MissingCplAnnotationText => format!("The CPL {} has no <AnnotationText> tag.", n()),
        NoteCode::MismatchedCplAnnotationText => format!("The CPL {} has an <AnnotationText> which differs from its <ContentTitleText>", n()),
        NoteCode::MismatchedAssetDuration => "All assets in a reel do not have the same duration.".to_string(),
        NoteCode::MissingMainSubtitleFromSomeReels => "At least one reel contains a subtitle asset, but some reel(s) do not".to_string(),
        NoteCode::MismatchedClosedCaptionAssetCounts => "At least one reel has closed captions, but reels have different numbers of closed caption assets.".to_string(),
        NoteCode::MissingSubtitleEntryPoint => format!("The subtitle asset {} has no <EntryPoint> tag.", n()),
        NoteCode::IncorrectSubtitleEntryPoint => format!("The subtitle asset {} has an <EntryPoint> other than 0.", n()),
        NoteCode::MissingClosedCaptionEntryPoint => format!("The closed caption asset {} has no <EntryPoint> tag.", n()),
        NoteCode::IncorrectClosedCaptionEntryPoint => format!("The closed caption asset {} has an <EntryPoint> other than 0.", n()),
        NoteCode::MissingHash => format!("The asset {} has no <Hash> tag in the CPL.", n()),
        NoteCode::MissingFfecInFeature => "The DCP is marked as a Feature but there is no FFEC (first frame of end credits) marker".to_string(),
        NoteCode::MissingFfmcInFeature => "The DCP is marked as a Feature but there is no FFMC (first frame of moving credits) marker".to_string(),
        NoteCode::MissingFfoc => "There should be a FFOC (first frame of content) marker".to_string(),
        NoteCode::MissingLfoc => "There should be a LFOC (last frame of content) marker".to_string(),
        NoteCode::IncorrectFfoc => format!("The FFOC marker is {} instead of 1", n()),
        NoteCode::IncorrectLfoc => format!("The LFOC marker is {} instead of 1 less than the duration of the last reel.", n()),
        NoteCode::MissingCplMetadata => format!("The CPL {} has no <CompositionMetadataAsset> tag.", n()),
        NoteCode::MissingCplMetadataVersionNumber => format!("The CPL {} has no <VersionNumber> in its <CompositionMetadataAsset>.", n()),
        NoteCode::MissingExtensionMetadata => format!("The CPL {} has no <ExtensionMetadata> in its <CompositionMetadataAsset>.", n()),
        NoteCode::InvalidExtensionMetadata => format!("The CPL {} has a malformed <ExtensionMetadata> ({}).", f(), n()),
        NoteCode::UnsignedCplWithEncryptedContent => format!("The CPL {}, which has encrypted content, is not signed.", n()),
        NoteCode::UnsignedPklWithEncryptedContent => format!("The PKL {}, which has encrypted content, is not signed.", n()),
        NoteCode::MismatchedPklAnnotationTextWithCpl => format!("The PKL {} has only one CPL but its <AnnotationText> does not match the CPL's <ContentTitleText>.", n()),
        NoteCode::PartiallyEncrypted => "Some assets are encrypted but some are not.".to_string(),
        NoteCode::InvalidJpeg2000Codestream => format!("The JPEG2000 codestream for at least one frame is invalid ({})", n()),
        NoteCode::InvalidJpeg2000GuardBitsFor2k => format!("The JPEG2000 codestream uses {} guard bits in a 2K image instead of 1.", n()),
        NoteCode::InvalidJpeg2000GuardBitsFor4k => format!("The JPEG2000 codestream uses {} guard bits in a 4K image instead of 2.", n()),
        NoteCode::InvalidJpeg2000TileSize => "The JPEG2000 tile size is not the same as the image size.".to_string(),
        NoteCode::InvalidJpeg2000CodeBlockWidth => format!("The JPEG2000 codestream uses a code block width of {} instead of 32.", n()),
        NoteCode::InvalidJpeg2000CodeBlockHeight => format!("The JPEG2000 codestream uses a code block height of {} instead of 32.", n()),
        NoteCode::IncorrectJpeg2000PocMarkerCountFor2k => format!("{} POC markers found in 2K JPEG2000 codestream instead of 0.", n()),
        NoteCode::IncorrectJpeg2000PocMarkerCountFor4k => format!("{} POC markers found in 4K JPEG2000 codestream instead of 1.", n()),
        NoteCode::IncorrectJpeg2000PocMarker => format!("Incorrect POC marker content found ({})", n()),
        NoteCode::InvalidJpeg2000PocMarkerLocation => "POC marker found outside main header".to_string(),
        NoteCode::InvalidJpeg2000TilePartsFor2k => format!("The JPEG2000 codestream has {} tile parts in a 2K image instead of 3.", n()),
        NoteCode::InvalidJpeg2000TilePartsFor4k => format!("The JPEG2000 codestream has {} tile parts in a 4K image instead of 6.", n()),
        NoteCode::MissingJpeg2000TlmMarker => "No TLM marker was found in a JPEG2000 codestream.".to_string(),
        NoteCode::MismatchedTimedTextResourceId => "The Resource ID in a timed text MXF did not match the ID of the contained XML.".to_string(),
        NoteCode::IncorrectTimedTextAssetId => "The Asset ID in a timed text MXF is the same as the Resource ID or that of the contained XML.".to_string(),
        NoteCode::MismatchedTimedTextDuration => {
            let text = note.note().unwrap_or("");
            let mut parts = text.split_whitespace();
            let reel = parts.next().unwrap_or("");
            let container = parts.next().unwrap_or("");
            format!("The reel duration of some timed text ({reel}) is not the same as the ContainerDuration of its MXF ({container}).")
        }
    }
}

fn verify_language_tag(tag: &str, notes: &mut Vec<VerificationNote>) {
    if LanguageTag::new(tag).is_err() {
        notes.push(
            VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidLanguage).with_note(tag),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaKind {
    Cpl,
    Pkl,
    AssetMap,
    SmpteSubtitle,
    InteropSubtitle,
}

/// A structural stand-in for XSD validation: the required elements of each document kind.
/// Violations become `INVALID_XML` notes just as schema failures would.
fn validate_xml(
    source: XmlSource<'_>,
    kind: SchemaKind,
    notes: &mut Vec<VerificationNote>,
) {
    let (doc, file) = match source {
        XmlSource::File(path) => match Document::read_file(path) {
            Ok(d) => (d, Some(path.to_path_buf())),
            Err(e) => {
                notes.push(
                    VerificationNote::new(NoteType::Error, NoteCode::InvalidXml)
                        .with_note(&e.to_string())
                        .with_file(path),
                );
                return;
            }
        },
        XmlSource::Text(text, path) => match Document::read_string(text) {
            Ok(d) => (d, path.map(Path::to_path_buf)),
            Err(e) => {
                let mut note = VerificationNote::new(NoteType::Error, NoteCode::InvalidXml)
                    .with_note(&e.to_string());
                if let Some(p) = path {
                    note = note.with_file(p);
                }
                notes.push(note);
                return;
            }
        },
    };
    let root = doc.root();

    let mut problem = |message: String, line: Option<u64>| {
        let mut note = VerificationNote::new(NoteType::Error, NoteCode::InvalidXml)
            .with_note(&message);
        if let Some(f) = &file {
            note = note.with_file(f);
        }
        if let Some(l) = line {
            note = note.with_line(l);
        }
        notes.push(note);
    };

    let require = |name: &str, parent: &Element, problem: &mut dyn FnMut(String, Option<u64>)| {
        if parent.child(name).is_none() {
            problem(
                format!("element '{}' is missing required child '{}'", parent.name(), name),
                parent.line(),
            );
        }
    };

    match kind {
        SchemaKind::Cpl => {
            if root.name() != "CompositionPlaylist" {
                problem(format!("unexpected root element '{}'", root.name()), root.line());
                return;
            }
            for name in ["Id", "IssueDate", "ContentTitleText", "ContentKind", "ReelList"] {
                require(name, root, &mut problem);
            }
            if let Some(reel_list) = root.child("ReelList") {
                for reel in reel_list.children_named("Reel") {
                    require("Id", reel, &mut problem);
                    require("AssetList", reel, &mut problem);
                }
            }
        }
        SchemaKind::Pkl => {
            if root.name() != "PackingList" {
                problem(format!("unexpected root element '{}'", root.name()), root.line());
                return;
            }
            for name in ["Id", "IssueDate", "AssetList"] {
                require(name, root, &mut problem);
            }
            if let Some(list) = root.child("AssetList") {
                for asset in list.children_named("Asset") {
                    for name in ["Id", "Hash", "Size", "Type"] {
                        require(name, asset, &mut problem);
                    }
                }
            }
        }
        SchemaKind::AssetMap => {
            if root.name() != "AssetMap" {
                problem(format!("unexpected root element '{}'", root.name()), root.line());
                return;
            }
            for name in ["Id", "AssetList"] {
                require(name, root, &mut problem);
            }
            if let Some(list) = root.child("AssetList") {
                for asset in list.children_named("Asset") {
                    require("Id", asset, &mut problem);
                    require("ChunkList", asset, &mut problem);
                }
            }
        }
        SchemaKind::SmpteSubtitle => {
            if root.name() != "SubtitleReel" {
                problem(format!("unexpected root element '{}'", root.name()), root.line());
                return;
            }
            for name in ["Id", "TimeCodeRate", "SubtitleList"] {
                require(name, root, &mut problem);
            }
        }
        SchemaKind::InteropSubtitle => {
            if root.name() != "DCSubtitle" {
                problem(format!("unexpected root element '{}'", root.name()), root.line());
                return;
            }
            require("SubtitleID", root, &mut problem);
        }
    }
}

enum XmlSource<'a> {
    File(&'a Path),
    Text(&'a str, Option<&'a Path>),
}

#[derive(Default)]
struct State {
    subtitle_language: Option<String>,
}

enum HashCheck {
    Good,
    CplPklDiffer,
    Bad,
}

/// Compare the on-disk hash of a resolved reel asset against the PKL (and the CPL's own
/// record of it).
fn check_asset_hash(
    dcp: &Dcp,
    reference_hash: Option<&str>,
    asset: &crate::asset::AssetRef,
    progress: &mut dyn FnMut(f32) -> Cancel,
) -> crate::Result<HashCheck> {
    let id = asset.borrow().id().to_string();
    let mut cancelled = false;
    let actual = {
        let mut cb = |f: f32| {
            if progress(f) == Cancel::Cancel {
                cancelled = true;
            }
        };
        asset.borrow_mut().hash(Some(&mut cb))?
    };
    if cancelled {
        // too late to stop the hash, but the caller will see the cancellation on its next poll
        debug!("cancellation requested during hash of {id}");
    }
    let pkl_hash = dcp.pkls().iter().find_map(|p| p.hash(&id));
    let pkl_hash = match pkl_hash {
        Some(h) => h.to_string(),
        None => return Ok(HashCheck::Good),
    };
    if let Some(cpl_hash) = reference_hash {
        if cpl_hash != pkl_hash {
            return Ok(HashCheck::CplPklDiffer);
        }
    }
    if actual != pkl_hash {
        return Ok(HashCheck::Bad);
    }
    Ok(HashCheck::Good)
}

fn verify_main_picture_asset(
    dcp: &Dcp,
    reel: &Reel,
    stage: &mut dyn FnMut(&str, Option<&Path>),
    progress: &mut dyn FnMut(f32) -> Cancel,
    notes: &mut Vec<VerificationNote>,
) -> crate::Result<()> {
    let picture = reel.main_picture().unwrap();
    let asset = match picture.core.asset() {
        Some(a) => a,
        None => return Ok(()),
    };
    let file = match asset.borrow().file() {
        Some(f) => f,
        None => return Ok(()),
    };

    stage("Checking picture asset hash", Some(file.as_path()));
    match check_asset_hash(dcp, picture.core.hash(), &asset, progress)? {
        HashCheck::Bad => notes.push(
            VerificationNote::new(NoteType::Error, NoteCode::IncorrectPictureHash)
                .with_file(&file),
        ),
        HashCheck::CplPklDiffer => notes.push(
            VerificationNote::new(NoteType::Error, NoteCode::MismatchedPictureHashes)
                .with_file(&file),
        ),
        HashCheck::Good => {}
    }

    stage("Checking picture frame sizes", Some(file.as_path()));
    let (size, edit_rate, duration, stereoscopic, have_key) = {
        let borrowed = asset.borrow();
        match &*borrowed {
            Asset::MonoPicture(p) => (
                p.size(),
                p.edit_rate(),
                p.intrinsic_duration(),
                false,
                !p.encrypted() || p.key().is_some(),
            ),
            Asset::StereoPicture(p) => (
                p.size(),
                p.edit_rate(),
                p.intrinsic_duration(),
                true,
                !p.encrypted() || p.key().is_some(),
            ),
            _ => return Ok(()),
        }
    };

    // per-frame checks: codestream conformance and the instantaneous bit-rate caps
    let max_frame = (250.0 * 1_000_000.0 / (8.0 * edit_rate.as_f64())).round() as usize;
    let risky_frame = (230.0 * 1_000_000.0 / (8.0 * edit_rate.as_f64())).round() as usize;
    let mut biggest_frame = 0usize;
    let mut j2k_seen: Vec<VerificationNote> = Vec::new();
    let mut check_and_add = |frame_notes: Vec<VerificationNote>, seen: &mut Vec<VerificationNote>, notes: &mut Vec<VerificationNote>| {
        for n in frame_notes {
            if !seen.contains(&n) {
                seen.push(n.clone());
                notes.push(n);
            }
        }
    };

    let borrowed = asset.borrow();
    match &*borrowed {
        Asset::MonoPicture(p) => {
            let mut reader = p.start_read()?;
            for i in 0..duration {
                let frame = reader.get_frame(i)?;
                biggest_frame = biggest_frame.max(frame.len());
                if have_key {
                    let mut frame_notes = Vec::new();
                    verify_j2k(&frame, &mut frame_notes);
                    check_and_add(frame_notes, &mut j2k_seen, notes);
                }
                if progress(i as f32 / duration.max(1) as f32) == Cancel::Cancel {
                    return Err(Error::MiscError("cancelled".to_string()));
                }
            }
        }
        Asset::StereoPicture(p) => {
            let mut reader = p.start_read()?;
            for i in 0..duration {
                let frame = reader.get_frame(i)?;
                biggest_frame = biggest_frame.max(frame.left.len()).max(frame.right.len());
                if have_key {
                    let mut frame_notes = Vec::new();
                    verify_j2k(&frame.left, &mut frame_notes);
                    verify_j2k(&frame.right, &mut frame_notes);
                    check_and_add(frame_notes, &mut j2k_seen, notes);
                }
                if progress(i as f32 / duration.max(1) as f32) == Cancel::Cancel {
                    return Err(Error::MiscError("cancelled".to_string()));
                }
            }
        }
        _ => {}
    }
    drop(borrowed);

    if biggest_frame > max_frame {
        notes.push(
            VerificationNote::new(NoteType::Error, NoteCode::InvalidPictureFrameSizeInBytes)
                .with_file(&file),
        );
    } else if biggest_frame > risky_frame {
        notes.push(
            VerificationNote::new(NoteType::Warning, NoteCode::NearlyInvalidPictureFrameSizeInBytes)
                .with_file(&file),
        );
    }

    // Bv2.1 permits flat and scope containers only
    let twok = |s: crate::types::Size| (s.width, s.height) == (2048, 858) || (s.width, s.height) == (1998, 1080);
    let fourk = |s: crate::types::Size| (s.width, s.height) == (4096, 1716) || (s.width, s.height) == (3996, 2160);
    if let Some(size) = size {
        if !twok(size) && !fourk(size) {
            notes.push(
                VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidPictureSizeInPixels)
                    .with_note(&size.to_string())
                    .with_file(&file),
            );
        }
        let rate_ok_2k = [24, 25, 48].contains(&edit_rate.numerator) && edit_rate.denominator == 1;
        if twok(size) && !rate_ok_2k {
            notes.push(
                VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidPictureFrameRateFor2k)
                    .with_note(&edit_rate.to_string())
                    .with_file(&file),
            );
        }
        if fourk(size) {
            if edit_rate != crate::types::Fraction::new(24, 1) {
                notes.push(
                    VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidPictureFrameRateFor4k)
                        .with_note(&edit_rate.to_string())
                        .with_file(&file),
                );
            }
            if stereoscopic {
                notes.push(
                    VerificationNote::new(
                        NoteType::Bv21Error,
                        NoteCode::InvalidPictureAssetResolutionFor3d,
                    )
                    .with_note(&edit_rate.to_string())
                    .with_file(&file),
                );
            }
        }
    }
    Ok(())
}

fn verify_main_sound_asset(
    dcp: &Dcp,
    reel: &Reel,
    stage: &mut dyn FnMut(&str, Option<&Path>),
    progress: &mut dyn FnMut(f32) -> Cancel,
    notes: &mut Vec<VerificationNote>,
) -> crate::Result<()> {
    let sound = reel.main_sound().unwrap();
    let asset = match sound.core.asset() {
        Some(a) => a,
        None => return Ok(()),
    };
    let file = match asset.borrow().file() {
        Some(f) => f,
        None => return Ok(()),
    };

    stage("Checking sound asset hash", Some(file.as_path()));
    match check_asset_hash(dcp, sound.core.hash(), &asset, progress)? {
        HashCheck::Bad => notes.push(
            VerificationNote::new(NoteType::Error, NoteCode::IncorrectSoundHash).with_file(&file),
        ),
        HashCheck::CplPklDiffer => notes.push(
            VerificationNote::new(NoteType::Error, NoteCode::MismatchedSoundHashes)
                .with_file(&file),
        ),
        HashCheck::Good => {}
    }

    stage("Checking sound asset metadata", Some(file.as_path()));
    if let Asset::Sound(s) = &*asset.borrow() {
        if let Some(language) = s.language() {
            verify_language_tag(language, notes);
        }
        if s.sampling_rate() != 48000 {
            notes.push(
                VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidSoundFrameRate)
                    .with_note(&s.sampling_rate().to_string())
                    .with_file(&file),
            );
        }
    }
    Ok(())
}

/// Checks shared by SMPTE subtitles and closed captions.
fn verify_smpte_timed_text_asset(
    asset: &crate::smpte_subtitle_asset::SmpteSubtitleAsset,
    reel_asset_duration: Option<i64>,
    notes: &mut Vec<VerificationNote>,
) {
    let file = asset.file().map(Path::to_path_buf).unwrap_or_default();

    match asset.language() {
        Some(language) => verify_language_tag(language, notes),
        None => notes.push(
            VerificationNote::new(NoteType::Bv21Error, NoteCode::MissingSubtitleLanguage)
                .with_file(&file),
        ),
    }

    if let Ok(metadata) = std::fs::metadata(&file) {
        if metadata.len() > 115 * 1024 * 1024 {
            notes.push(
                VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidTimedTextSizeInBytes)
                    .with_note(&metadata.len().to_string())
                    .with_file(&file),
            );
        }
    }

    let fonts_size = asset.fonts_size();
    if fonts_size > 10 * 1024 * 1024 {
        notes.push(
            VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidTimedTextFontSizeInBytes)
                .with_note(&fonts_size.to_string())
                .with_file(&file),
        );
    }

    match asset.start_time() {
        None => notes.push(
            VerificationNote::new(NoteType::Bv21Error, NoteCode::MissingSubtitleStartTime)
                .with_file(&file),
        ),
        Some(t) if t != Time::default() => notes.push(
            VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidSubtitleStartTime)
                .with_file(&file),
        ),
        Some(_) => {}
    }

    if let Some(duration) = reel_asset_duration {
        if duration != asset.intrinsic_duration() {
            notes.push(
                VerificationNote::new(NoteType::Bv21Error, NoteCode::MismatchedTimedTextDuration)
                    .with_note(&format!("{} {}", duration, asset.intrinsic_duration()))
                    .with_file(&file),
            );
        }
    }
}

fn verify_smpte_subtitle_asset(
    asset: &crate::smpte_subtitle_asset::SmpteSubtitleAsset,
    notes: &mut Vec<VerificationNote>,
    state: &mut State,
) {
    if let Some(language) = asset.language() {
        match &state.subtitle_language {
            None => state.subtitle_language = Some(language.to_string()),
            Some(seen) if seen != language => notes.push(VerificationNote::new(
                NoteType::Bv21Error,
                NoteCode::MismatchedSubtitleLanguages,
            )),
            Some(_) => {}
        }
    }

    if let Some(resource_id) = asset.resource_id() {
        if resource_id != asset.xml_id() {
            notes.push(VerificationNote::new(
                NoteType::Bv21Error,
                NoteCode::MismatchedTimedTextResourceId,
            ));
        }
        if asset.id() == resource_id || asset.id() == asset.xml_id() {
            notes.push(VerificationNote::new(
                NoteType::Bv21Error,
                NoteCode::IncorrectTimedTextAssetId,
            ));
        }
    }
}

fn verify_subtitle_asset(
    asset: &crate::asset::AssetRef,
    reel_asset_duration: Option<i64>,
    stage: &mut dyn FnMut(&str, Option<&Path>),
    notes: &mut Vec<VerificationNote>,
    state: &mut State,
) {
    let borrowed = asset.borrow();
    stage("Checking subtitle XML", borrowed.file().as_deref());
    match &*borrowed {
        Asset::SmpteSubtitle(s) => {
            // validate the raw on-disk XML, not a cleaned-up re-serialization
            validate_xml(
                XmlSource::Text(s.raw_xml(), s.file()),
                SchemaKind::SmpteSubtitle,
                notes,
            );
            verify_smpte_timed_text_asset(s, reel_asset_duration, notes);
            verify_smpte_subtitle_asset(s, notes, state);
        }
        Asset::InteropSubtitle(s) => {
            validate_xml(
                XmlSource::Text(s.raw_xml(), s.file()),
                SchemaKind::InteropSubtitle,
                notes,
            );
        }
        _ => {}
    }
}

fn verify_closed_caption_asset(
    asset: &crate::asset::AssetRef,
    reel_asset_duration: Option<i64>,
    stage: &mut dyn FnMut(&str, Option<&Path>),
    notes: &mut Vec<VerificationNote>,
) {
    let borrowed = asset.borrow();
    stage("Checking closed caption XML", borrowed.file().as_deref());
    let raw_xml = match &*borrowed {
        Asset::SmpteSubtitle(s) => {
            validate_xml(
                XmlSource::Text(s.raw_xml(), s.file()),
                SchemaKind::SmpteSubtitle,
                notes,
            );
            verify_smpte_timed_text_asset(s, reel_asset_duration, notes);
            s.raw_xml().to_string()
        }
        Asset::InteropSubtitle(s) => {
            validate_xml(
                XmlSource::Text(s.raw_xml(), s.file()),
                SchemaKind::InteropSubtitle,
                notes,
            );
            s.raw_xml().to_string()
        }
        _ => return,
    };
    if raw_xml.len() > 256 * 1024 {
        let mut note = VerificationNote::new(
            NoteType::Bv21Error,
            NoteCode::InvalidClosedCaptionXmlSizeInBytes,
        )
        .with_note(&raw_xml.len().to_string());
        if let Some(f) = borrowed.file() {
            note = note.with_file(&f);
        }
        notes.push(note);
    }
}

/// Timing checks over one column of timed text (the main subtitle, or the i'th closed
/// caption) across all reels: first-cue time, cue length, cue spacing and reel overlap.
fn verify_text_timing(
    reels: &[Reel],
    edit_rate: i64,
    notes: &mut Vec<VerificationNote>,
    check: &dyn Fn(&Reel) -> bool,
    xml: &dyn Fn(&Reel) -> Option<String>,
    duration: &dyn Fn(&Reel) -> i64,
) {
    let mut last_out: Option<i64> = None;
    let mut too_short = false;
    let mut too_close = false;
    let mut too_early = false;
    let mut reel_overlap = false;
    let mut reel_offset: i64 = 0;

    fn parse_cues(
        node: &Element,
        tcr: Option<i64>,
        start_time: Option<Time>,
        er: i64,
        first_reel: bool,
        last_out: &mut Option<i64>,
        too_short: &mut bool,
        too_close: &mut bool,
        too_early: &mut bool,
        reel_offset: i64,
    ) {
        if node.name() == "Subtitle" {
            let in_time = node
                .attribute("TimeIn")
                .and_then(|t| Time::from_string(t, tcr).ok());
            let out_time = node
                .attribute("TimeOut")
                .and_then(|t| Time::from_string(t, tcr).ok());
            if let (Some(mut in_time), Some(mut out_time)) = (in_time, out_time) {
                if let Some(start) = start_time {
                    in_time = in_time - start;
                    out_time = out_time - start;
                }
                if first_reel && tcr.is_some() && in_time < Time::new(0, 0, 4, 0, tcr.unwrap()) {
                    *too_early = true;
                }
                let length = out_time - in_time;
                if length.as_editable_units_ceil(er) < 15 {
                    *too_short = true;
                }
                if let Some(last) = *last_out {
                    let distance = reel_offset + in_time.as_editable_units_ceil(er) - last;
                    if (0..2).contains(&distance) {
                        *too_close = true;
                    }
                }
                *last_out = Some(reel_offset + out_time.as_editable_units_floor(er));
            }
        } else {
            for child in node.child_elements() {
                parse_cues(
                    child, tcr, start_time, er, first_reel, last_out, too_short, too_close,
                    too_early, reel_offset,
                );
            }
        }
    }

    for (i, reel) in reels.iter().enumerate() {
        if !check(reel) {
            reel_offset += duration(reel);
            continue;
        }
        let raw = match xml(reel) {
            Some(x) => x,
            None => {
                reel_offset += duration(reel);
                continue;
            }
        };
        let doc = match Document::read_string(&raw) {
            Ok(d) => d,
            Err(_) => {
                reel_offset += duration(reel);
                continue;
            }
        };
        let root = doc.root();
        let (tcr, start_time) = if root.name() == "SubtitleReel" {
            let tcr = root.optional_number_child::<i64>("TimeCodeRate").ok().flatten();
            let start = root
                .optional_string_child("StartTime")
                .and_then(|s| Time::from_string(&s, tcr).ok());
            (tcr, start)
        } else {
            (None, None)
        };
        parse_cues(
            root,
            tcr,
            start_time,
            edit_rate,
            i == 0,
            &mut last_out,
            &mut too_short,
            &mut too_close,
            &mut too_early,
            reel_offset,
        );
        let end = reel_offset + duration(reel);
        if let Some(last) = last_out {
            if last > end {
                reel_overlap = true;
            }
        }
        reel_offset = end;
    }

    if let Some(last) = last_out {
        if last > reel_offset {
            reel_overlap = true;
        }
    }

    if too_early {
        notes.push(VerificationNote::new(
            NoteType::Warning,
            NoteCode::InvalidSubtitleFirstTextTime,
        ));
    }
    if too_short {
        notes.push(VerificationNote::new(NoteType::Warning, NoteCode::InvalidSubtitleDuration));
    }
    if too_close {
        notes.push(VerificationNote::new(NoteType::Warning, NoteCode::InvalidSubtitleSpacing));
    }
    if reel_overlap {
        notes.push(VerificationNote::new(
            NoteType::Error,
            NoteCode::SubtitleOverlapsReelBoundary,
        ));
    }
}

fn subtitle_raw_xml(reel: &Reel) -> Option<String> {
    reel.main_subtitle()
        .and_then(|s| s.core.asset())
        .and_then(|a| match &*a.borrow() {
            Asset::SmpteSubtitle(s) => Some(s.raw_xml().to_string()),
            Asset::InteropSubtitle(s) => Some(s.raw_xml().to_string()),
            _ => None,
        })
}

fn closed_caption_raw_xml(reel: &Reel, i: usize) -> Option<String> {
    reel.closed_captions()
        .get(i)
        .and_then(|cc| cc.core.asset())
        .and_then(|a| match &*a.borrow() {
            Asset::SmpteSubtitle(s) => Some(s.raw_xml().to_string()),
            Asset::InteropSubtitle(s) => Some(s.raw_xml().to_string()),
            _ => None,
        })
}

fn verify_all_text_timing(reels: &[Reel], notes: &mut Vec<VerificationNote>) {
    if reels.is_empty() {
        return;
    }
    if let Some(subtitle) = reels[0].main_subtitle() {
        verify_text_timing(
            reels,
            subtitle.core.edit_rate().numerator,
            notes,
            &|reel| reel.main_subtitle().is_some(),
            &subtitle_raw_xml,
            &|reel| reel.main_subtitle().map(|s| s.core.actual_duration()).unwrap_or(0),
        );
    }
    for i in 0..reels[0].closed_captions().len() {
        let edit_rate = reels[0].closed_captions()[i].core.edit_rate().numerator;
        verify_text_timing(
            reels,
            edit_rate,
            notes,
            &move |reel: &Reel| i < reel.closed_captions().len(),
            &move |reel: &Reel| closed_caption_raw_xml(reel, i),
            &move |reel: &Reel| {
                reel.closed_captions().get(i).map(|c| c.core.actual_duration()).unwrap_or(0)
            },
        );
    }
}

#[derive(Default)]
struct LinesCharactersResult {
    warning_length_exceeded: bool,
    error_length_exceeded: bool,
    line_count_exceeded: bool,
}

/// Sweep cue start/stop events counting concurrent lines per screen position and the length
/// of each line.
fn verify_text_lines_and_characters(
    subtitles: &[Subtitle],
    warning_length: usize,
    error_length: usize,
    result: &mut LinesCharactersResult,
) {
    struct Event {
        time: Time,
        position: i64,
        characters: usize,
        start: bool,
    }

    let position = |s: &Subtitle| -> i64 {
        let v = s.v_position();
        match s.v_align() {
            VAlign::Top => (v * 100.0).round() as i64,
            VAlign::Center => ((0.5 + v) * 100.0).round() as i64,
            VAlign::Bottom => ((1.0 - v) * 100.0).round() as i64,
        }
    };

    let mut events: Vec<Event> = Vec::new();
    for subtitle in subtitles {
        if let Subtitle::Text(text) = subtitle {
            events.push(Event {
                time: text.in_time,
                position: position(subtitle),
                characters: text.text.chars().count(),
                start: true,
            });
            events.push(Event {
                time: text.out_time,
                position: position(subtitle),
                characters: text.text.chars().count(),
                start: false,
            });
        }
    }
    events.sort_by(|a, b| a.time.cmp(&b.time));

    let mut current: BTreeMap<i64, usize> = BTreeMap::new();
    for event in events {
        if current.len() > 3 {
            result.line_count_exceeded = true;
        }
        for characters in current.values() {
            if *characters >= warning_length {
                result.warning_length_exceeded = true;
            }
            if *characters >= error_length {
                result.error_length_exceeded = true;
            }
        }
        if event.start {
            *current.entry(event.position).or_insert(0) += event.characters;
        } else if let Some(characters) = current.get_mut(&event.position) {
            if *characters <= event.characters {
                current.remove(&event.position);
            } else {
                *characters -= event.characters;
            }
        }
    }
}

fn asset_subtitles(asset: &crate::asset::AssetRef) -> Vec<Subtitle> {
    match &*asset.borrow() {
        Asset::SmpteSubtitle(s) => s.subtitles().to_vec(),
        Asset::InteropSubtitle(s) => s.subtitles().to_vec(),
        _ => Vec::new(),
    }
}

/// The `<ExtensionMetadataList>` of a Bv2.1 CPL must declare the DCP Constraints Profile;
/// read it back from the file to see what was actually shipped.
fn verify_extension_metadata(cpl: &Cpl, notes: &mut Vec<VerificationNote>) {
    let file = match cpl.file() {
        Some(f) => f.to_path_buf(),
        None => return,
    };
    let doc = match Document::read_file(&file) {
        Ok(d) => d,
        Err(_) => return,
    };

    let mut missing = false;
    let mut malformed = String::new();

    let extension_list = doc
        .root()
        .child("ReelList")
        .and_then(|rl| rl.children_named("Reel").first().copied())
        .and_then(|r| r.child("AssetList"))
        .and_then(|al| al.child("CompositionMetadataAsset"))
        .map(|md| (md, md.child("ExtensionMetadataList")));

    if let Some((_, extension_list)) = extension_list {
        match extension_list {
            None => missing = true,
            Some(list) => {
                missing = true;
                for extension in list.children_named("ExtensionMetadata") {
                    if extension.attribute("scope") != Some("http://isdcf.com/ns/cplmd/app") {
                        continue;
                    }
                    missing = false;
                    if let Some(name) = extension.child("Name") {
                        if name.text() != "Application" {
                            malformed = "<Name> should be 'Application'".to_string();
                        }
                    }
                    if let Some(property) =
                        extension.child("PropertyList").and_then(|pl| pl.child("Property"))
                    {
                        if let Some(name) = property.child("Name") {
                            if name.text() != "DCP Constraints Profile" {
                                malformed =
                                    "<Name> property should be 'DCP Constraints Profile'".to_string();
                            }
                        }
                        if let Some(value) = property.child("Value") {
                            if value.text() != "SMPTE-RDD-52:2020-Bv2.1" {
                                malformed =
                                    "<Value> property should be 'SMPTE-RDD-52:2020-Bv2.1'".to_string();
                            }
                        }
                    }
                }
            }
        }
    }

    if missing {
        notes.push(
            VerificationNote::new(NoteType::Bv21Error, NoteCode::MissingExtensionMetadata)
                .with_note(cpl.id())
                .with_file(&file),
        );
    } else if !malformed.is_empty() {
        notes.push(
            VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidExtensionMetadata)
                .with_note(&malformed)
                .with_file(&file),
        );
    }
}

fn pkl_has_encrypted_assets(dcp: &Dcp, pkl: &crate::pkl::Pkl) -> bool {
    let mut encrypted = Vec::new();
    for cpl in dcp.cpls() {
        for reference in cpl.reel_file_assets() {
            if let Some(asset) = reference.asset() {
                if asset.borrow().encrypted() {
                    encrypted.push(reference.id().to_string());
                }
            }
        }
    }
    pkl.asset_list().iter().any(|a| encrypted.contains(&a.id))
}

/// Does the (re-read) document carry a `<Signature>`, and if so does it verify?
fn check_document_signature(
    path: &Path,
    id: &str,
    unsigned_code: NoteCode,
    require_signed: bool,
    notes: &mut Vec<VerificationNote>,
) {
    let doc = match Document::read_file(path) {
        Ok(d) => d,
        Err(_) => return,
    };
    match doc.root().child("Signature") {
        None => {
            if require_signed {
                notes.push(
                    VerificationNote::new(NoteType::Bv21Error, unsigned_code)
                        .with_note(id)
                        .with_file(path),
                );
            }
        }
        Some(_) => match verify_signature(doc.root()) {
            Ok(true) => {}
            Ok(false) => notes.push(
                VerificationNote::new(NoteType::Error, NoteCode::InvalidXml)
                    .with_note("signature does not verify")
                    .with_file(path),
            ),
            Err(e) => notes.push(
                VerificationNote::new(NoteType::Error, NoteCode::InvalidXml)
                    .with_note(&format!("signature cannot be checked: {e}"))
                    .with_file(path),
            ),
        },
    }
}

/// Verify every DCP in `directories`, producing the accumulated notes.
///
/// `stage` receives a description of each verification stage as it starts; `progress` is
/// called with a fraction during long-running per-frame work and may cancel the walk, in
/// which case the notes gathered so far are returned.
pub fn verify(
    directories: &[PathBuf],
    stage: &mut dyn FnMut(&str, Option<&Path>),
    progress: &mut dyn FnMut(f32) -> Cancel,
) -> Vec<VerificationNote> {
    let mut notes = Vec::new();
    let mut state = State::default();

    for directory in directories {
        stage("Checking DCP", Some(directory.as_path()));
        let mut dcp = match Dcp::new(directory) {
            Ok(d) => d,
            Err(e) => {
                notes.push(
                    VerificationNote::new(NoteType::Error, NoteCode::FailedRead)
                        .with_note(&e.to_string()),
                );
                continue;
            }
        };
        if let Err(e) = dcp.read(Some(&mut notes), true) {
            notes.push(
                VerificationNote::new(NoteType::Error, NoteCode::FailedRead)
                    .with_note(&e.to_string()),
            );
            continue;
        }

        if dcp.standard() != Some(Standard::Smpte) {
            notes.push(VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidStandard));
        }

        if verify_dcp(&dcp, &mut state, stage, progress, &mut notes) == Cancel::Cancel {
            return notes;
        }
    }

    notes
}

fn verify_dcp(
    dcp: &Dcp,
    state: &mut State,
    stage: &mut dyn FnMut(&str, Option<&Path>),
    progress: &mut dyn FnMut(f32) -> Cancel,
    notes: &mut Vec<VerificationNote>,
) -> Cancel {
    for cpl in dcp.cpls() {
        stage("Checking CPL", cpl.file());
        if let Some(file) = cpl.file() {
            validate_xml(XmlSource::File(file), SchemaKind::Cpl, notes);
        }

        if cpl.any_encrypted() && !cpl.all_encrypted() {
            notes.push(VerificationNote::new(NoteType::Bv21Error, NoteCode::PartiallyEncrypted));
        }

        for language in cpl.additional_subtitle_languages() {
            verify_language_tag(language, notes);
        }

        if let Some(territory) = cpl.release_territory() {
            let unm49 = cpl.release_territory_scope()
                == Some("http://www.smpte-ra.org/schemas/429-16/2014/CPL-Metadata#scope/release-territory/UNM49");
            if !unm49 && !LanguageTag::valid_region(territory) && territory != "001" {
                notes.push(
                    VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidLanguage)
                        .with_note(territory),
                );
            }
        }

        if let Some(language) = cpl.sign_language_video_language() {
            verify_language_tag(language, notes);
        }

        if dcp.standard() == Some(Standard::Smpte) {
            match cpl.annotation_text() {
                None => {
                    let mut note =
                        VerificationNote::new(NoteType::Bv21Error, NoteCode::MissingCplAnnotationText)
                            .with_note(cpl.id());
                    if let Some(f) = cpl.file() {
                        note = note.with_file(f);
                    }
                    notes.push(note);
                }
                Some(annotation) if annotation != cpl.content_title_text() => {
                    let mut note = VerificationNote::new(
                        NoteType::Warning,
                        NoteCode::MismatchedCplAnnotationText,
                    )
                    .with_note(cpl.id());
                    if let Some(f) = cpl.file() {
                        note = note.with_file(f);
                    }
                    notes.push(note);
                }
                Some(_) => {}
            }
        }

        for pkl in dcp.pkls() {
            // the PKL's record of the CPL must match the file we actually read
            if let (Some(pkl_hash), Some(file)) = (pkl.hash(cpl.id()), cpl.file()) {
                if let Ok(actual) = make_digest(file, None) {
                    if actual != pkl_hash {
                        notes.push(
                            VerificationNote::new(NoteType::Error, NoteCode::MismatchedCplHashes)
                                .with_note(cpl.id())
                                .with_file(file),
                        );
                    }
                }
            }

            // a PKL with a single CPL must use that CPL's title as its annotation
            let cpls_in_pkl = dcp
                .cpls()
                .iter()
                .filter(|c| pkl.hash(c.id()).is_some())
                .count();
            if cpls_in_pkl == 1
                && pkl.hash(cpl.id()).is_some()
                && pkl.annotation_text() != Some(cpl.content_title_text())
            {
                let mut note = VerificationNote::new(
                    NoteType::Bv21Error,
                    NoteCode::MismatchedPklAnnotationTextWithCpl,
                )
                .with_note(pkl.id());
                if let Some(f) = pkl.file() {
                    note = note.with_file(f);
                }
                notes.push(note);
            }
        }

        let mut have_main_subtitle = false;
        let mut have_no_main_subtitle = false;
        let mut fewest_closed_captions = usize::MAX;
        let mut most_closed_captions = 0usize;
        let mut markers_seen: BTreeMap<crate::types::Marker, Time> = BTreeMap::new();

        for reel in cpl.reels() {
            stage("Checking reel", None);

            for reference in reel.file_assets() {
                let edit_rate = reference.edit_rate();
                if let Some(duration) = reference.duration() {
                    if duration * edit_rate.denominator / edit_rate.numerator < 1 {
                        notes.push(
                            VerificationNote::new(NoteType::Error, NoteCode::InvalidDuration)
                                .with_note(reference.id()),
                        );
                    }
                }
                if reference.intrinsic_duration() * edit_rate.denominator / edit_rate.numerator < 1
                {
                    notes.push(
                        VerificationNote::new(NoteType::Error, NoteCode::InvalidIntrinsicDuration)
                            .with_note(reference.id()),
                    );
                }
                let encryptable = reference
                    .asset()
                    .map(|a| !matches!(&*a.borrow(), Asset::Font(_) | Asset::InteropSubtitle(_)))
                    .unwrap_or(true);
                if encryptable && reference.hash().is_none() {
                    notes.push(
                        VerificationNote::new(NoteType::Bv21Error, NoteCode::MissingHash)
                            .with_note(reference.id()),
                    );
                }
            }

            if dcp.standard() == Some(Standard::Smpte) {
                let file_assets = reel.file_assets();
                let mut durations = file_assets.iter().map(|a| a.actual_duration());
                if let Some(first) = durations.next() {
                    if durations.any(|d| d != first) {
                        notes.push(VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::MismatchedAssetDuration,
                        ));
                    }
                }
            }

            if let Some(picture) = reel.main_picture() {
                let frame_rate = picture.frame_rate();
                if frame_rate.denominator != 1
                    || ![24, 25, 30, 48, 50, 60, 96].contains(&frame_rate.numerator)
                {
                    notes.push(
                        VerificationNote::new(NoteType::Error, NoteCode::InvalidPictureFrameRate)
                            .with_note(&frame_rate.to_string()),
                    );
                }
                if picture.core.resolved() {
                    match verify_main_picture_asset(dcp, reel, stage, progress, notes) {
                        Ok(()) => {}
                        Err(Error::MiscError(m)) if m == "cancelled" => return Cancel::Cancel,
                        Err(e) => notes.push(
                            VerificationNote::new(NoteType::Error, NoteCode::FailedRead)
                                .with_note(&e.to_string()),
                        ),
                    }
                }
            }

            if reel.main_sound().map(|s| s.core.resolved()).unwrap_or(false) {
                match verify_main_sound_asset(dcp, reel, stage, progress, notes) {
                    Ok(()) => {}
                    Err(Error::MiscError(m)) if m == "cancelled" => return Cancel::Cancel,
                    Err(e) => notes.push(
                        VerificationNote::new(NoteType::Error, NoteCode::FailedRead)
                            .with_note(&e.to_string()),
                    ),
                }
            }

            if let Some(subtitle) = reel.main_subtitle() {
                if let Some(language) = subtitle.language() {
                    verify_language_tag(language, notes);
                }
                match subtitle.core.entry_point() {
                    None => notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::MissingSubtitleEntryPoint,
                        )
                        .with_note(subtitle.core.id()),
                    ),
                    Some(e) if e != 0 => notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::IncorrectSubtitleEntryPoint,
                        )
                        .with_note(subtitle.core.id()),
                    ),
                    Some(_) => {}
                }
                if let Some(asset) = subtitle.core.asset() {
                    verify_subtitle_asset(
                        &asset,
                        subtitle.core.duration(),
                        stage,
                        notes,
                        state,
                    );
                }
                have_main_subtitle = true;
            } else {
                have_no_main_subtitle = true;
            }

            for cc in reel.closed_captions() {
                if let Some(language) = cc.language() {
                    verify_language_tag(language, notes);
                }
                match cc.core.entry_point() {
                    None => notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::MissingClosedCaptionEntryPoint,
                        )
                        .with_note(cc.core.id()),
                    ),
                    Some(e) if e != 0 => notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::IncorrectClosedCaptionEntryPoint,
                        )
                        .with_note(cc.core.id()),
                    ),
                    Some(_) => {}
                }
                if let Some(asset) = cc.core.asset() {
                    verify_closed_caption_asset(&asset, cc.core.duration(), stage, notes);
                }
            }

            if let Some(markers) = reel.main_markers() {
                for (marker, time) in markers.get() {
                    markers_seen.entry(*marker).or_insert(*time);
                }
            }

            fewest_closed_captions = fewest_closed_captions.min(reel.closed_captions().len());
            most_closed_captions = most_closed_captions.max(reel.closed_captions().len());
        }

        verify_all_text_timing(cpl.reels(), notes);

        if dcp.standard() == Some(Standard::Smpte) {
            if have_main_subtitle && have_no_main_subtitle {
                notes.push(VerificationNote::new(
                    NoteType::Bv21Error,
                    NoteCode::MissingMainSubtitleFromSomeReels,
                ));
            }
            if fewest_closed_captions != most_closed_captions {
                notes.push(VerificationNote::new(
                    NoteType::Bv21Error,
                    NoteCode::MismatchedClosedCaptionAssetCounts,
                ));
            }

            if cpl.content_kind().name() == "feature" {
                if !markers_seen.contains_key(&crate::types::Marker::Ffec) {
                    notes.push(VerificationNote::new(
                        NoteType::Bv21Error,
                        NoteCode::MissingFfecInFeature,
                    ));
                }
                if !markers_seen.contains_key(&crate::types::Marker::Ffmc) {
                    notes.push(VerificationNote::new(
                        NoteType::Bv21Error,
                        NoteCode::MissingFfmcInFeature,
                    ));
                }
            }

            match markers_seen.get(&crate::types::Marker::Ffoc) {
                None => notes
                    .push(VerificationNote::new(NoteType::Warning, NoteCode::MissingFfoc)),
                Some(time) if time.e != 1 => notes.push(
                    VerificationNote::new(NoteType::Warning, NoteCode::IncorrectFfoc)
                        .with_note(&time.e.to_string()),
                ),
                Some(_) => {}
            }
            match markers_seen.get(&crate::types::Marker::Lfoc) {
                None => notes
                    .push(VerificationNote::new(NoteType::Warning, NoteCode::MissingLfoc)),
                Some(time) => {
                    let lfoc = time.as_editable_units_ceil(time.tcr);
                    let expected = cpl.reels().last().map(|r| r.duration() - 1).unwrap_or(0);
                    if lfoc != expected {
                        notes.push(
                            VerificationNote::new(NoteType::Warning, NoteCode::IncorrectLfoc)
                                .with_note(&lfoc.to_string()),
                        );
                    }
                }
            }

            let mut result = LinesCharactersResult::default();
            for reel in cpl.reels() {
                if let Some(asset) = reel.main_subtitle().and_then(|s| s.core.asset()) {
                    verify_text_lines_and_characters(&asset_subtitles(&asset), 52, 79, &mut result);
                }
            }
            if result.line_count_exceeded {
                notes.push(VerificationNote::new(
                    NoteType::Warning,
                    NoteCode::InvalidSubtitleLineCount,
                ));
            }
            if result.error_length_exceeded {
                notes.push(VerificationNote::new(
                    NoteType::Warning,
                    NoteCode::InvalidSubtitleLineLength,
                ));
            } else if result.warning_length_exceeded {
                notes.push(VerificationNote::new(
                    NoteType::Warning,
                    NoteCode::NearlyInvalidSubtitleLineLength,
                ));
            }

            let mut result = LinesCharactersResult::default();
            for reel in cpl.reels() {
                for cc in reel.closed_captions() {
                    if let Some(asset) = cc.core.asset() {
                        verify_text_lines_and_characters(
                            &asset_subtitles(&asset),
                            32,
                            32,
                            &mut result,
                        );
                    }
                }
            }
            if result.line_count_exceeded {
                notes.push(VerificationNote::new(
                    NoteType::Bv21Error,
                    NoteCode::InvalidClosedCaptionLineCount,
                ));
            }
            if result.error_length_exceeded {
                notes.push(VerificationNote::new(
                    NoteType::Bv21Error,
                    NoteCode::InvalidClosedCaptionLineLength,
                ));
            }

            // FullContentTitleText is a proxy for the whole CompositionMetadataAsset
            if cpl.full_content_title_text().is_none() {
                let mut note =
                    VerificationNote::new(NoteType::Bv21Error, NoteCode::MissingCplMetadata)
                        .with_note(cpl.id());
                if let Some(f) = cpl.file() {
                    note = note.with_file(f);
                }
                notes.push(note);
            } else {
                if cpl.version_number().is_none() {
                    let mut note = VerificationNote::new(
                        NoteType::Bv21Error,
                        NoteCode::MissingCplMetadataVersionNumber,
                    )
                    .with_note(cpl.id());
                    if let Some(f) = cpl.file() {
                        note = note.with_file(f);
                    }
                    notes.push(note);
                }
                verify_extension_metadata(cpl, notes);
            }

            if let Some(file) = cpl.file() {
                check_document_signature(
                    file,
                    cpl.id(),
                    NoteCode::UnsignedCplWithEncryptedContent,
                    cpl.any_encrypted(),
                    notes,
                );
            }
        }
    }

    for pkl in dcp.pkls() {
        stage("Checking PKL", pkl.file());
        if let Some(file) = pkl.file() {
            validate_xml(XmlSource::File(file), SchemaKind::Pkl, notes);
            check_document_signature(
                file,
                pkl.id(),
                NoteCode::UnsignedPklWithEncryptedContent,
                pkl_has_encrypted_assets(dcp, pkl),
                notes,
            );
        }
    }

    match dcp.asset_map_path() {
        Some(path) => {
            stage("Checking ASSETMAP", Some(path.as_path()));
            validate_xml(XmlSource::File(&path), SchemaKind::AssetMap, notes);
        }
        None => {
            notes.push(VerificationNote::new(NoteType::Error, NoteCode::MissingAssetmap));
        }
    }

    Cancel::Continue
}
