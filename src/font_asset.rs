//! Raw font files referenced by Interop subtitle assets.

use std::path::{Path, PathBuf};

use crate::types::Standard;
use crate::{EqualityNoteType, NoteHandler};

/// A TrueType font shipped as its own asset in an Interop package.
#[derive(Debug)]
pub struct FontAsset {
    id: String,
    file: Option<PathBuf>,
    hash: Option<String>,
}

impl FontAsset {
    pub fn new(id: &str, file: &Path) -> FontAsset {
        FontAsset {
            id: id.to_string(),
            file: Some(file.to_path_buf()),
            hash: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn pkl_type(&self, _standard: Standard) -> String {
        "application/ttf".to_string()
    }

    pub fn hash_cache(&self) -> Option<&String> {
        self.hash.as_ref()
    }

    pub fn set_hash_cache(&mut self, hash: String) {
        self.hash = Some(hash);
    }

    pub fn equals(&self, other: &FontAsset, note: NoteHandler) -> bool {
        let ours = self.file.as_ref().and_then(|f| std::fs::read(f).ok());
        let theirs = other.file.as_ref().and_then(|f| std::fs::read(f).ok());
        if ours != theirs {
            note(EqualityNoteType::Error, "font data differs".to_string());
            return false;
        }
        true
    }
}
