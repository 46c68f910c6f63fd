//! A Rust library for reading, writing, verifying and decrypting Digital Cinema Packages (DCPs),
//! the bundles of XML metadata and MXF-wrapped essence that cinema servers ingest and play.
//!
//! A [DCP](https://en.wikipedia.org/wiki/Digital_Cinema_Package) is a directory containing an
//! asset map, one or more packing lists (PKLs), one or more composition playlists (CPLs) and a
//! set of essence files (JPEG 2000 picture, PCM sound, timed text, optional auxiliary data),
//! possibly encrypted and unlocked by Key Delivery Messages (KDMs). The formats are standardised
//! by SMPTE (the 429 and 430 families) with a legacy "Interop" dialect still in circulation;
//! where practical deployments diverge from the letter of the standard, this library prefers to
//! interoperate with existing practice.
//!
//! The library provides:
//!
//! - a cross-referenced object model (DCP → CPL → reel → asset) built by reading a package
//!   directory, with explicit reference resolution between reels and the flat asset list;
//! - deterministic, byte-stable XML serialization with enveloped XML digital signatures, so
//!   that a signed CPL, PKL or KDM survives a parse/serialize round trip;
//! - the KDM pipeline: construction, RSA-OAEP key wrapping per recipient, signing, parsing and
//!   decryption;
//! - a verifier producing structured diagnostic notes for schema, hash, timing, size, language,
//!   marker and signature problems, including the SMPTE Bv2.1 (RDD 52) constraint catalogue and
//!   a JPEG 2000 codestream conformance check.
//!
//! ## Example
//!
//! ```no_run
//! let mut dcp = dcp::Dcp::new("/media/my-film")?;
//! dcp.read(None, false)?;
//! for cpl in dcp.cpls() {
//!     println!("{}: {}", cpl.id(), cpl.content_title_text());
//! }
//! # Ok::<(), dcp::Error>(())
//! ```
//!
//! ## Limitations
//!
//! - No JPEG 2000 encoding or decoding: picture essence is handled frame-at-a-time as opaque
//!   codestreams (which the verifier can nevertheless parse for conformance).
//! - No audio processing (resampling, dialnorm): sound samples are wrapped as given.
//! - No trust store: certificates are supplied by the caller and embedded in what we sign.

use std::path::PathBuf;

mod asset;
mod asset_map;
mod atmos_asset;
mod certificate;
mod certificate_chain;
mod cpl;
mod dcp;
mod dcp_time;
mod font_asset;
mod interop_subtitle_asset;
mod kdm;
mod key;
mod language_tag;
mod mxf;
mod picture_asset;
mod pkl;
mod reel;
mod smpte_subtitle_asset;
mod sound_asset;
mod subtitle;
mod types;
mod util;
mod verify;
mod verify_j2k;
mod verify_report;
pub mod xml;

pub use asset::{Asset, AssetRef};
pub use asset_map::{AssetMap, AssetMapEntry};
pub use atmos_asset::{AtmosAsset, AtmosAssetReader, AtmosAssetWriter};
pub use certificate::Certificate;
pub use certificate_chain::CertificateChain;
pub use cpl::Cpl;
pub use dcp::Dcp;
pub use dcp_time::{LocalTime, Time};
pub use font_asset::FontAsset;
pub use interop_subtitle_asset::InteropSubtitleAsset;
pub use kdm::{DecryptedKdm, DecryptedKdmKey, EncryptedKdm};
pub use key::Key;
pub use language_tag::LanguageTag;
pub use mxf::{AudioChannelLabel, MxfMetadata, SoundfieldGroupLabel};
pub use picture_asset::{
    MonoPictureAsset, MonoPictureAssetReader, MonoPictureAssetWriter, StereoPictureAsset,
    StereoPictureAssetReader, StereoPictureAssetWriter, StereoPictureFrame,
};
pub use pkl::{Pkl, PklAsset};
pub use reel::{
    Reel, ReelAtmosAsset, ReelClosedCaptionAsset, ReelFileAsset, ReelMarkersAsset,
    ReelPictureAsset, ReelSoundAsset, ReelSubtitleAsset,
};
pub use smpte_subtitle_asset::SmpteSubtitleAsset;
pub use sound_asset::{SoundAsset, SoundAssetReader, SoundAssetWriter};
pub use subtitle::{Font, LoadFontNode, Subtitle, SubtitleImage, SubtitleText, VAlign};
pub use types::{
    Channel, ContentKind, ContentVersion, EqualityOptions, Formulation, Fraction, Luminance,
    LuminanceUnit, MainSoundConfiguration, Marker, McaSoundField, Rating, Size, Standard, Status,
};
pub use util::{set_deterministic_ids, unset_deterministic_ids, NameFormat};
pub use verify::{note_to_string, verify, Cancel, NoteCode, NoteType, VerificationNote};
pub use verify_j2k::verify_j2k;
pub use verify_report::{write_json_report, write_text_report};

/// Everything that can go wrong at the library boundary.
///
/// Content problems found while *verifying* a package are not errors; they are reported as
/// [`VerificationNote`]s. An `Error` means an operation could not make progress at all.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O problem with a named file.
    #[error("I/O error with {1}: {0}")]
    FileError(std::io::Error, PathBuf),
    /// A file could not be understood as the kind of thing we were asked to read.
    #[error("could not read {0}")]
    ReadError(String),
    /// Malformed or surprising XML.
    #[error("XML error: {0}")]
    XMLError(String),
    /// A problem with an essence container file.
    #[error("MXF error in {1}: {0}")]
    MXFFileError(String, PathBuf),
    /// Neither `ASSETMAP` nor `ASSETMAP.xml` exists in the directory.
    #[error("no ASSETMAP or ASSETMAP.xml found in {0}")]
    MissingAssetmapError(PathBuf),
    /// A catch-all for operations that were asked to do something impossible.
    #[error("{0}")]
    MiscError(String),
    /// A setter was handed an out-of-range value.
    #[error("bad setting: {0}")]
    BadSettingError(String),
    /// Two objects that must have distinct identifiers do not.
    #[error("duplicate id: {0}")]
    DuplicateIdError(String),
    /// A string is not a well-formed RFC 5646 language tag.
    #[error("unrecognised language tag {0}")]
    LanguageTagError(String),
    /// A KDM validity window is not contained within the signer certificate's validity.
    #[error("KDM validity period ({0}) is outside the signer certificate validity period")]
    BadKDMDateError(String),
    /// A KDM could not be decrypted with the private key given.
    #[error("could not decrypt KDM: {0}")]
    KDMDecryptionError(String),
    /// A certificate chain is incomplete, ambiguous or fails signature checks.
    #[error("certificate chain error: {0}")]
    CertificateChainError(String),
    /// A CPL with no reels cannot be written.
    #[error("a CPL with no reels cannot be written")]
    NoReelsError,
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(e: openssl::error::ErrorStack) -> Error {
        Error::MiscError(format!("OpenSSL error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Severity of a message passed to a [`NoteHandler`] during equality comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityNoteType {
    Error,
    Note,
}

/// Callback receiving human-readable details of why two objects compare unequal.
pub type NoteHandler<'a> = &'a mut dyn FnMut(EqualityNoteType, String);
