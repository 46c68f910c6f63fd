//! JPEG 2000 picture assets, in 2D (mono) and 3D (stereo) flavours.
//!
//! Frames are opaque JPEG 2000 codestreams; we read their `SIZ` marker to learn the image
//! dimensions but otherwise pass them through untouched.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::key::Key;
use crate::mxf::{EssenceKind, MxfHeader, MxfReader, MxfWriter};
use crate::types::{EqualityOptions, Fraction, Size, Standard};
use crate::util::make_uuid;
use crate::{Error, EqualityNoteType, NoteHandler, Result};

/// Image dimensions from the `SIZ` marker of a JPEG 2000 codestream.
pub fn j2k_size(data: &[u8]) -> Option<Size> {
    if data.len() < 16 || data[0] != 0xff || data[1] != 0x4f || data[2] != 0xff || data[3] != 0x51 {
        return None;
    }
    let width = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
    let height = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
    Some(Size::new(width, height))
}

macro_rules! picture_asset_common {
    ($name:ident) => {
        impl $name {
            pub fn id(&self) -> &str {
                &self.id
            }

            pub fn file(&self) -> Option<&Path> {
                self.file.as_deref()
            }

            pub fn set_file(&mut self, file: &Path) {
                self.file = Some(file.to_path_buf());
                self.hash = None;
            }

            pub fn edit_rate(&self) -> Fraction {
                self.edit_rate
            }

            /// The rate at which frames are presented; for picture essence this is the edit rate.
            pub fn frame_rate(&self) -> Fraction {
                self.edit_rate
            }

            pub fn intrinsic_duration(&self) -> i64 {
                self.intrinsic_duration
            }

            pub fn size(&self) -> Option<Size> {
                self.size
            }

            pub fn screen_aspect_ratio(&self) -> Option<Fraction> {
                self.size.map(|s| Fraction::new(s.width as i64, s.height as i64))
            }

            /// True iff the container on disk declares encryption, whether or not we have a key.
            pub fn encrypted(&self) -> bool {
                self.encrypted
            }

            pub fn key_id(&self) -> Option<&str> {
                self.key_id.as_deref()
            }

            pub fn key(&self) -> Option<&Key> {
                self.key.as_ref()
            }

            /// Install a content key; marks the asset as to-be-encrypted if it has no file yet.
            pub fn set_key(&mut self, key: Key) {
                if self.file.is_none() {
                    self.encrypted = true;
                    if self.key_id.is_none() {
                        self.key_id = Some(make_uuid());
                    }
                }
                self.key = Some(key);
            }

            pub fn standard(&self) -> Standard {
                self.standard
            }

            pub fn pkl_type(&self, standard: Standard) -> String {
                match standard {
                    Standard::Interop => "application/mxf;asdcpKind=Picture".to_string(),
                    Standard::Smpte => "application/mxf".to_string(),
                }
            }

            pub fn hash_cache(&self) -> Option<&String> {
                self.hash.as_ref()
            }

            pub fn set_hash_cache(&mut self, hash: String) {
                self.hash = Some(hash);
            }
        }
    };
}

/// A 2D picture asset.
#[derive(Debug)]
pub struct MonoPictureAsset {
    id: String,
    file: Option<PathBuf>,
    hash: Option<String>,
    edit_rate: Fraction,
    intrinsic_duration: i64,
    size: Option<Size>,
    encrypted: bool,
    key_id: Option<String>,
    key: Option<Key>,
    standard: Standard,
}

picture_asset_common!(MonoPictureAsset);

impl MonoPictureAsset {
    /// A new, empty asset ready for writing.
    pub fn new(edit_rate: Fraction, standard: Standard) -> MonoPictureAsset {
        MonoPictureAsset {
            id: make_uuid(),
            file: None,
            hash: None,
            edit_rate,
            intrinsic_duration: 0,
            size: None,
            encrypted: false,
            key_id: None,
            key: None,
            standard,
        }
    }

    /// Read an existing asset's metadata from its container file.
    pub fn from_file(path: &Path, id: &str) -> Result<MonoPictureAsset> {
        let header = crate::mxf::probe(path)?;
        if header.kind != EssenceKind::MonoPicture {
            return Err(Error::MXFFileError(
                "container does not hold 2D picture".to_string(),
                path.to_path_buf(),
            ));
        }
        Ok(MonoPictureAsset {
            id: id.to_string(),
            file: Some(path.to_path_buf()),
            hash: None,
            edit_rate: header.edit_rate,
            intrinsic_duration: header.intrinsic_duration,
            size: header.size,
            encrypted: header.encrypted,
            key_id: header.key_id,
            key: None,
            standard: Standard::Smpte,
        })
    }

    /// Begin writing frames to `path`.
    pub fn start_write(&mut self, path: &Path, overwrite: bool) -> Result<MonoPictureAssetWriter<'_>> {
        let mut header = MxfHeader::new(EssenceKind::MonoPicture, self.edit_rate);
        header.size = self.size;
        header.encrypted = self.key.is_some();
        if header.encrypted && self.key_id.is_none() {
            self.key_id = Some(make_uuid());
        }
        header.key_id = self.key_id.clone();
        self.encrypted = header.encrypted;
        let writer = MxfWriter::create(path, header, self.key, overwrite)?;
        self.file = Some(path.to_path_buf());
        self.hash = None;
        debug!("writing 2D picture asset {} to {}", self.id, path.display());
        Ok(MonoPictureAssetWriter { asset: self, writer })
    }

    /// Begin random-access reading.
    pub fn start_read(&self) -> Result<MonoPictureAssetReader> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::MiscError("picture asset has no file".to_string()))?;
        let mut reader = MxfReader::open(file)?;
        if let Some(key) = self.key {
            reader.set_key(key);
        }
        Ok(MonoPictureAssetReader { reader })
    }

    pub fn equals(&self, other: &MonoPictureAsset, opt: &EqualityOptions, note: NoteHandler) -> bool {
        picture_metadata_equal(
            (self.edit_rate, self.intrinsic_duration, self.size),
            (other.edit_rate, other.intrinsic_duration, other.size),
            note,
        ) && picture_frames_equal(&mut || self.start_read().map(ReaderKind::Mono),
                                  &mut || other.start_read().map(ReaderKind::Mono),
                                  self.intrinsic_duration, opt, note)
    }
}

/// A 3D picture asset; each edit unit has a left-eye and a right-eye frame.
#[derive(Debug)]
pub struct StereoPictureAsset {
    id: String,
    file: Option<PathBuf>,
    hash: Option<String>,
    edit_rate: Fraction,
    intrinsic_duration: i64,
    size: Option<Size>,
    encrypted: bool,
    key_id: Option<String>,
    key: Option<Key>,
    standard: Standard,
}

picture_asset_common!(StereoPictureAsset);

impl StereoPictureAsset {
    pub fn new(edit_rate: Fraction, standard: Standard) -> StereoPictureAsset {
        StereoPictureAsset {
            id: make_uuid(),
            file: None,
            hash: None,
            edit_rate,
            intrinsic_duration: 0,
            size: None,
            encrypted: false,
            key_id: None,
            key: None,
            standard,
        }
    }

    /// Read an existing asset's metadata. `tolerate_mono_label` loads a container whose
    /// header claims 2D but whose frame layout is stereoscopic.
    pub fn from_file(path: &Path, id: &str) -> Result<StereoPictureAsset> {
        let header = crate::mxf::probe(path)?;
        if header.kind != EssenceKind::StereoPicture {
            return Err(Error::MXFFileError(
                "container does not hold 3D picture".to_string(),
                path.to_path_buf(),
            ));
        }
        Ok(StereoPictureAsset {
            id: id.to_string(),
            file: Some(path.to_path_buf()),
            hash: None,
            edit_rate: header.edit_rate,
            intrinsic_duration: header.intrinsic_duration,
            size: header.size,
            encrypted: header.encrypted,
            key_id: header.key_id,
            key: None,
            standard: Standard::Smpte,
        })
    }

    /// Load a container whose header claims 2D but whose frame layout is stereoscopic
    /// (left/right pairs). Seen in the wild; the caller decides whether to tolerate it.
    pub(crate) fn from_mislabelled_file(path: &Path, id: &str) -> Result<StereoPictureAsset> {
        let header = crate::mxf::probe(path)?;
        Ok(StereoPictureAsset {
            id: id.to_string(),
            file: Some(path.to_path_buf()),
            hash: None,
            edit_rate: header.edit_rate,
            intrinsic_duration: header.intrinsic_duration / 2,
            size: header.size,
            encrypted: header.encrypted,
            key_id: header.key_id,
            key: None,
            standard: Standard::Smpte,
        })
    }

    pub fn start_write(&mut self, path: &Path, overwrite: bool) -> Result<StereoPictureAssetWriter<'_>> {
        let mut header = MxfHeader::new(EssenceKind::StereoPicture, self.edit_rate);
        header.size = self.size;
        header.encrypted = self.key.is_some();
        if header.encrypted && self.key_id.is_none() {
            self.key_id = Some(make_uuid());
        }
        header.key_id = self.key_id.clone();
        self.encrypted = header.encrypted;
        let writer = MxfWriter::create(path, header, self.key, overwrite)?;
        self.file = Some(path.to_path_buf());
        self.hash = None;
        debug!("writing 3D picture asset {} to {}", self.id, path.display());
        Ok(StereoPictureAssetWriter { asset: self, writer })
    }

    pub fn start_read(&self) -> Result<StereoPictureAssetReader> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::MiscError("picture asset has no file".to_string()))?;
        let mut reader = MxfReader::open(file)?;
        if let Some(key) = self.key {
            reader.set_key(key);
        }
        Ok(StereoPictureAssetReader { reader })
    }

    pub fn equals(&self, other: &StereoPictureAsset, opt: &EqualityOptions, note: NoteHandler) -> bool {
        picture_metadata_equal(
            (self.edit_rate, self.intrinsic_duration, self.size),
            (other.edit_rate, other.intrinsic_duration, other.size),
            note,
        ) && picture_frames_equal(&mut || self.start_read().map(ReaderKind::Stereo),
                                  &mut || other.start_read().map(ReaderKind::Stereo),
                                  self.intrinsic_duration, opt, note)
    }
}

/// Writes 2D frames; created by [`MonoPictureAsset::start_write`].
pub struct MonoPictureAssetWriter<'a> {
    asset: &'a mut MonoPictureAsset,
    writer: MxfWriter,
}

impl MonoPictureAssetWriter<'_> {
    /// Write one frame: a complete JPEG 2000 codestream.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.asset.size.is_none() {
            if let Some(size) = j2k_size(data) {
                self.asset.size = Some(size);
                self.writer.header_mut().size = Some(size);
            }
        }
        self.writer.write_frame(data)
    }

    pub fn finalize(self) -> Result<()> {
        self.asset.intrinsic_duration = self.writer.finalize()?;
        Ok(())
    }
}

/// Writes left/right frame pairs; created by [`StereoPictureAsset::start_write`].
pub struct StereoPictureAssetWriter<'a> {
    asset: &'a mut StereoPictureAsset,
    writer: MxfWriter,
}

impl StereoPictureAssetWriter<'_> {
    /// Write one edit unit: left-eye and right-eye codestreams.
    pub fn write(&mut self, left: &[u8], right: &[u8]) -> Result<()> {
        if self.asset.size.is_none() {
            if let Some(size) = j2k_size(left) {
                self.asset.size = Some(size);
                self.writer.header_mut().size = Some(size);
            }
        }
        self.writer.write_frame(left)?;
        self.writer.write_frame(right)
    }

    pub fn finalize(self) -> Result<()> {
        let duration = self.writer.frames_written() / 2;
        self.writer.finalize_with_duration(duration)?;
        self.asset.intrinsic_duration = duration;
        Ok(())
    }
}

/// Random access to 2D frames; created by [`MonoPictureAsset::start_read`].
pub struct MonoPictureAssetReader {
    reader: MxfReader,
}

impl MonoPictureAssetReader {
    /// The codestream for one frame, decrypted when the asset has its key.
    pub fn get_frame(&mut self, frame: i64) -> Result<Vec<u8>> {
        self.reader.read_frame(frame)
    }
}

/// One 3D edit unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StereoPictureFrame {
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

/// Random access to 3D frames; created by [`StereoPictureAsset::start_read`].
pub struct StereoPictureAssetReader {
    reader: MxfReader,
}

impl StereoPictureAssetReader {
    pub fn get_frame(&mut self, frame: i64) -> Result<StereoPictureFrame> {
        Ok(StereoPictureFrame {
            left: self.reader.read_frame(frame * 2)?,
            right: self.reader.read_frame(frame * 2 + 1)?,
        })
    }
}

enum ReaderKind {
    Mono(MonoPictureAssetReader),
    Stereo(StereoPictureAssetReader),
}

fn picture_metadata_equal(
    a: (Fraction, i64, Option<Size>),
    b: (Fraction, i64, Option<Size>),
    note: NoteHandler,
) -> bool {
    if a.0 != b.0 {
        note(EqualityNoteType::Error, format!("picture edit rates differ: {} vs {}", a.0, b.0));
        return false;
    }
    if a.1 != b.1 {
        note(
            EqualityNoteType::Error,
            format!("picture intrinsic durations differ: {} vs {}", a.1, b.1),
        );
        return false;
    }
    if a.2 != b.2 {
        note(EqualityNoteType::Error, "picture sizes differ".to_string());
        return false;
    }
    true
}

fn picture_frames_equal(
    a: &mut dyn FnMut() -> Result<ReaderKind>,
    b: &mut dyn FnMut() -> Result<ReaderKind>,
    duration: i64,
    _opt: &EqualityOptions,
    note: NoteHandler,
) -> bool {
    let (a, b) = match (a(), b()) {
        (Ok(a), Ok(b)) => (a, b),
        // an asset without a file (e.g. an unresolved reference) compares by metadata only
        _ => return true,
    };
    match (a, b) {
        (ReaderKind::Mono(mut a), ReaderKind::Mono(mut b)) => {
            for i in 0..duration {
                match (a.get_frame(i), b.get_frame(i)) {
                    (Ok(fa), Ok(fb)) if fa == fb => {}
                    _ => {
                        note(EqualityNoteType::Error, format!("picture frame {i} differs"));
                        return false;
                    }
                }
            }
            true
        }
        (ReaderKind::Stereo(mut a), ReaderKind::Stereo(mut b)) => {
            for i in 0..duration {
                match (a.get_frame(i), b.get_frame(i)) {
                    (Ok(fa), Ok(fb)) if fa == fb => {}
                    _ => {
                        note(EqualityNoteType::Error, format!("picture frame {i} differs"));
                        return false;
                    }
                }
            }
            true
        }
        _ => {
            note(EqualityNoteType::Error, "2D compared with 3D".to_string());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siz_parsing() {
        let mut data = vec![0xff, 0x4f, 0xff, 0x51, 0x00, 0x2f, 0x00, 0x00];
        data.extend_from_slice(&1998u32.to_be_bytes());
        data.extend_from_slice(&1080u32.to_be_bytes());
        assert_eq!(j2k_size(&data), Some(Size::new(1998, 1080)));
        assert_eq!(j2k_size(&[0xff, 0x4f]), None);
        assert_eq!(j2k_size(b"not a codestream"), None);
    }
}
