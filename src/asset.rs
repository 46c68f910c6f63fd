//! The asset sum type, shared ownership, and the factory that turns asset-map entries into
//! concrete assets.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::atmos_asset::AtmosAsset;
use crate::font_asset::FontAsset;
use crate::interop_subtitle_asset::InteropSubtitleAsset;
use crate::key::Key;
use crate::mxf::EssenceKind;
use crate::picture_asset::{MonoPictureAsset, StereoPictureAsset};
use crate::smpte_subtitle_asset::SmpteSubtitleAsset;
use crate::sound_asset::SoundAsset;
use crate::types::{EqualityOptions, Standard};
use crate::util::make_digest;
use crate::{Error, EqualityNoteType, NoteHandler, Result};

/// Shared ownership of an asset: a CPL's reels and the DCP's flat asset list alias the same
/// objects, and installing KDM keys mutates them.
pub type AssetRef = Rc<RefCell<Asset>>;

/// Any concrete asset that can appear in a package.
#[derive(Debug)]
pub enum Asset {
    MonoPicture(MonoPictureAsset),
    StereoPicture(StereoPictureAsset),
    Sound(SoundAsset),
    InteropSubtitle(InteropSubtitleAsset),
    SmpteSubtitle(SmpteSubtitleAsset),
    Atmos(AtmosAsset),
    Font(FontAsset),
}

impl Asset {
    pub fn new_ref(asset: Asset) -> AssetRef {
        Rc::new(RefCell::new(asset))
    }

    pub fn id(&self) -> &str {
        match self {
            Asset::MonoPicture(a) => a.id(),
            Asset::StereoPicture(a) => a.id(),
            Asset::Sound(a) => a.id(),
            Asset::InteropSubtitle(a) => a.id(),
            Asset::SmpteSubtitle(a) => a.id(),
            Asset::Atmos(a) => a.id(),
            Asset::Font(a) => a.id(),
        }
    }

    pub fn file(&self) -> Option<PathBuf> {
        match self {
            Asset::MonoPicture(a) => a.file().map(Path::to_path_buf),
            Asset::StereoPicture(a) => a.file().map(Path::to_path_buf),
            Asset::Sound(a) => a.file().map(Path::to_path_buf),
            Asset::InteropSubtitle(a) => a.file().map(Path::to_path_buf),
            Asset::SmpteSubtitle(a) => a.file().map(Path::to_path_buf),
            Asset::Atmos(a) => a.file().map(Path::to_path_buf),
            Asset::Font(a) => a.file().map(Path::to_path_buf),
        }
    }

    /// The base64 SHA-1 of the asset file, computed on first demand and cached.
    pub fn hash(&mut self, progress: Option<&mut dyn FnMut(f32)>) -> Result<String> {
        let cached = match self {
            Asset::MonoPicture(a) => a.hash_cache().cloned(),
            Asset::StereoPicture(a) => a.hash_cache().cloned(),
            Asset::Sound(a) => a.hash_cache().cloned(),
            Asset::InteropSubtitle(a) => a.hash_cache().cloned(),
            Asset::SmpteSubtitle(a) => a.hash_cache().cloned(),
            Asset::Atmos(a) => a.hash_cache().cloned(),
            Asset::Font(a) => a.hash_cache().cloned(),
        };
        if let Some(hash) = cached {
            return Ok(hash);
        }
        let file = self
            .file()
            .ok_or_else(|| Error::MiscError(format!("asset {} has no file to hash", self.id())))?;
        let hash = make_digest(&file, progress)?;
        match self {
            Asset::MonoPicture(a) => a.set_hash_cache(hash.clone()),
            Asset::StereoPicture(a) => a.set_hash_cache(hash.clone()),
            Asset::Sound(a) => a.set_hash_cache(hash.clone()),
            Asset::InteropSubtitle(a) => a.set_hash_cache(hash.clone()),
            Asset::SmpteSubtitle(a) => a.set_hash_cache(hash.clone()),
            Asset::Atmos(a) => a.set_hash_cache(hash.clone()),
            Asset::Font(a) => a.set_hash_cache(hash.clone()),
        }
        Ok(hash)
    }

    pub fn pkl_type(&self, standard: Standard) -> String {
        match self {
            Asset::MonoPicture(a) => a.pkl_type(standard),
            Asset::StereoPicture(a) => a.pkl_type(standard),
            Asset::Sound(a) => a.pkl_type(standard),
            Asset::InteropSubtitle(a) => a.pkl_type(standard),
            Asset::SmpteSubtitle(a) => a.pkl_type(standard),
            Asset::Atmos(a) => a.pkl_type(standard),
            Asset::Font(a) => a.pkl_type(standard),
        }
    }

    /// True iff the essence container on disk declares encryption.
    pub fn encrypted(&self) -> bool {
        match self {
            Asset::MonoPicture(a) => a.encrypted(),
            Asset::StereoPicture(a) => a.encrypted(),
            Asset::Sound(a) => a.encrypted(),
            Asset::SmpteSubtitle(a) => a.encrypted(),
            Asset::Atmos(a) => a.encrypted(),
            Asset::InteropSubtitle(_) | Asset::Font(_) => false,
        }
    }

    pub fn key_id(&self) -> Option<String> {
        match self {
            Asset::MonoPicture(a) => a.key_id().map(str::to_string),
            Asset::StereoPicture(a) => a.key_id().map(str::to_string),
            Asset::Sound(a) => a.key_id().map(str::to_string),
            Asset::SmpteSubtitle(a) => a.key_id().map(str::to_string),
            Asset::Atmos(a) => a.key_id().map(str::to_string),
            Asset::InteropSubtitle(_) | Asset::Font(_) => None,
        }
    }

    /// Install a decryption key on an MXF-backed asset; no-op for file kinds that cannot be
    /// encrypted.
    pub fn set_key(&mut self, key: Key) {
        match self {
            Asset::MonoPicture(a) => a.set_key(key),
            Asset::StereoPicture(a) => a.set_key(key),
            Asset::Sound(a) => a.set_key(key),
            Asset::SmpteSubtitle(a) => a.set_key(key),
            Asset::Atmos(a) => a.set_key(key),
            Asset::InteropSubtitle(_) | Asset::Font(_) => {}
        }
    }

    pub fn equals(&self, other: &Asset, opt: &EqualityOptions, note: NoteHandler) -> bool {
        match (self, other) {
            (Asset::MonoPicture(a), Asset::MonoPicture(b)) => a.equals(b, opt, note),
            (Asset::StereoPicture(a), Asset::StereoPicture(b)) => a.equals(b, opt, note),
            (Asset::Sound(a), Asset::Sound(b)) => a.equals(b, opt, note),
            (Asset::InteropSubtitle(a), Asset::InteropSubtitle(b)) => a.equals(b, opt, note),
            (Asset::SmpteSubtitle(a), Asset::SmpteSubtitle(b)) => a.equals(b, opt, note),
            (Asset::Atmos(a), Asset::Atmos(b)) => a.equals(b, note),
            (Asset::Font(a), Asset::Font(b)) => a.equals(b, note),
            _ => {
                note(EqualityNoteType::Error, "assets are of different kinds".to_string());
                false
            }
        }
    }
}

/// Build an asset from an MXF file found in the asset map.
///
/// Returns the asset and a flag which is set when the container is labelled 2D but actually
/// lays out stereoscopic frame pairs; with `ignore_incorrect_picture_mxf_type` the file is
/// then loaded as a stereo asset anyway.
pub fn asset_factory(
    path: &Path,
    id: &str,
    ignore_incorrect_picture_mxf_type: bool,
) -> Result<(Asset, bool)> {
    let reader = crate::mxf::MxfReader::open(path)?;
    let header = reader.header().clone();
    debug!("probed {} as {:?}", path.display(), header.kind);
    match header.kind {
        EssenceKind::MonoPicture => {
            let threed_marked_as_twod = header.intrinsic_duration > 0
                && reader.frame_count() == header.intrinsic_duration * 2;
            if threed_marked_as_twod && ignore_incorrect_picture_mxf_type {
                Ok((
                    Asset::StereoPicture(StereoPictureAsset::from_mislabelled_file(path, id)?),
                    true,
                ))
            } else {
                Ok((
                    Asset::MonoPicture(MonoPictureAsset::from_file(path, id)?),
                    threed_marked_as_twod,
                ))
            }
        }
        EssenceKind::StereoPicture => {
            Ok((Asset::StereoPicture(StereoPictureAsset::from_file(path, id)?), false))
        }
        EssenceKind::Sound => Ok((Asset::Sound(SoundAsset::from_file(path, id)?), false)),
        EssenceKind::TimedText => {
            let mut asset = SmpteSubtitleAsset::from_file(path)?;
            asset.set_id(id);
            Ok((Asset::SmpteSubtitle(asset), false))
        }
        EssenceKind::AuxData => Ok((Asset::Atmos(AtmosAsset::from_file(path, id)?), false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mxf::{MxfHeader, MxfWriter};
    use crate::types::Fraction;

    // a container labelled 2D but holding left/right frame pairs
    fn write_mislabelled_stereo(path: &Path) {
        let header = MxfHeader::new(EssenceKind::MonoPicture, Fraction::new(24, 1));
        let mut writer = MxfWriter::create(path, header, None, true).unwrap();
        for _ in 0..4 {
            writer.write_frame(b"left eye").unwrap();
            writer.write_frame(b"right eye").unwrap();
        }
        writer.finalize_with_duration(4).unwrap();
    }

    #[test]
    fn mislabelled_stereo_is_detected() {
        let dir = std::env::temp_dir().join("dcp-asset-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mislabelled.mxf");
        write_mislabelled_stereo(&path);

        // strict: report the problem but load as declared
        let (asset, threed) = asset_factory(&path, "x", false).unwrap();
        assert!(threed);
        assert!(matches!(asset, Asset::MonoPicture(_)));

        // tolerant: load as the stereo asset it really is
        let (asset, threed) = asset_factory(&path, "x", true).unwrap();
        assert!(threed);
        match asset {
            Asset::StereoPicture(p) => assert_eq!(p.intrinsic_duration(), 4),
            other => panic!("expected stereo, got {other:?}"),
        }
    }

    #[test]
    fn honest_mono_is_not_flagged() {
        let dir = std::env::temp_dir().join("dcp-asset-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mono.mxf");
        let header = MxfHeader::new(EssenceKind::MonoPicture, Fraction::new(24, 1));
        let mut writer = MxfWriter::create(&path, header, None, true).unwrap();
        for _ in 0..4 {
            writer.write_frame(b"frame").unwrap();
        }
        writer.finalize().unwrap();

        let (asset, threed) = asset_factory(&path, "x", true).unwrap();
        assert!(!threed);
        assert!(matches!(asset, Asset::MonoPicture(_)));
    }
}
