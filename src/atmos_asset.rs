//! Auxiliary data (Atmos) assets: opaque per-edit-unit payloads in an MXF container.

use std::path::{Path, PathBuf};

use crate::key::Key;
use crate::mxf::{EssenceKind, MxfHeader, MxfReader, MxfWriter};
use crate::types::{Fraction, Standard};
use crate::util::make_uuid;
use crate::{Error, EqualityNoteType, NoteHandler, Result};

/// An auxiliary data track, typically Dolby Atmos.
#[derive(Debug)]
pub struct AtmosAsset {
    id: String,
    file: Option<PathBuf>,
    hash: Option<String>,
    edit_rate: Fraction,
    intrinsic_duration: i64,
    encrypted: bool,
    key_id: Option<String>,
    key: Option<Key>,
}

impl AtmosAsset {
    pub fn new(edit_rate: Fraction) -> AtmosAsset {
        AtmosAsset {
            id: make_uuid(),
            file: None,
            hash: None,
            edit_rate,
            intrinsic_duration: 0,
            encrypted: false,
            key_id: None,
            key: None,
        }
    }

    pub fn from_file(path: &Path, id: &str) -> Result<AtmosAsset> {
        let header = crate::mxf::probe(path)?;
        if header.kind != EssenceKind::AuxData {
            return Err(Error::MXFFileError(
                "container does not hold auxiliary data".to_string(),
                path.to_path_buf(),
            ));
        }
        Ok(AtmosAsset {
            id: id.to_string(),
            file: Some(path.to_path_buf()),
            hash: None,
            edit_rate: header.edit_rate,
            intrinsic_duration: header.intrinsic_duration,
            encrypted: header.encrypted,
            key_id: header.key_id,
            key: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn edit_rate(&self) -> Fraction {
        self.edit_rate
    }

    pub fn intrinsic_duration(&self) -> i64 {
        self.intrinsic_duration
    }

    pub fn encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn set_key(&mut self, key: Key) {
        if self.file.is_none() {
            self.encrypted = true;
            if self.key_id.is_none() {
                self.key_id = Some(make_uuid());
            }
        }
        self.key = Some(key);
    }

    pub fn pkl_type(&self, _standard: Standard) -> String {
        "application/mxf".to_string()
    }

    pub fn hash_cache(&self) -> Option<&String> {
        self.hash.as_ref()
    }

    pub fn set_hash_cache(&mut self, hash: String) {
        self.hash = Some(hash);
    }

    /// Begin writing auxiliary frames to `path`.
    pub fn start_write(&mut self, path: &Path, overwrite: bool) -> Result<AtmosAssetWriter<'_>> {
        let mut header = MxfHeader::new(EssenceKind::AuxData, self.edit_rate);
        header.encrypted = self.key.is_some();
        if header.encrypted && self.key_id.is_none() {
            self.key_id = Some(make_uuid());
        }
        header.key_id = self.key_id.clone();
        self.encrypted = header.encrypted;
        let writer = MxfWriter::create(path, header, self.key, overwrite)?;
        self.file = Some(path.to_path_buf());
        self.hash = None;
        Ok(AtmosAssetWriter { asset: self, writer })
    }

    pub fn start_read(&self) -> Result<AtmosAssetReader> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::MiscError("atmos asset has no file".to_string()))?;
        let mut reader = MxfReader::open(file)?;
        if let Some(key) = self.key {
            reader.set_key(key);
        }
        Ok(AtmosAssetReader { reader })
    }

    pub fn equals(&self, other: &AtmosAsset, note: NoteHandler) -> bool {
        if self.edit_rate != other.edit_rate {
            note(EqualityNoteType::Error, "atmos edit rates differ".to_string());
            return false;
        }
        if self.intrinsic_duration != other.intrinsic_duration {
            note(EqualityNoteType::Error, "atmos durations differ".to_string());
            return false;
        }
        true
    }
}

pub struct AtmosAssetWriter<'a> {
    asset: &'a mut AtmosAsset,
    writer: MxfWriter,
}

impl AtmosAssetWriter<'_> {
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_frame(data)
    }

    pub fn finalize(self) -> Result<()> {
        self.asset.intrinsic_duration = self.writer.finalize()?;
        Ok(())
    }
}

pub struct AtmosAssetReader {
    reader: MxfReader,
}

impl AtmosAssetReader {
    pub fn get_frame(&mut self, frame: i64) -> Result<Vec<u8>> {
        self.reader.read_frame(frame)
    }
}
