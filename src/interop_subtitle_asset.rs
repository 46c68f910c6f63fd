//! Interop subtitles: a `<DCSubtitle>` XML file with sibling font and PNG files.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::asset::{Asset, AssetRef};
use crate::subtitle::{parse_subtitles, subtitles_as_xml, Font, LoadFontNode, Subtitle};
use crate::types::{EqualityOptions, Standard};
use crate::util::make_uuid;
use crate::xml::{Document, Element};
use crate::{Error, EqualityNoteType, NoteHandler, Result};

/// A set of subtitles in the Interop dialect.
#[derive(Debug)]
pub struct InteropSubtitleAsset {
    id: String,
    file: Option<PathBuf>,
    hash: Option<String>,
    movie_title: Option<String>,
    reel_number: String,
    language: Option<String>,
    subtitles: Vec<Subtitle>,
    load_font_nodes: Vec<LoadFontNode>,
    fonts: Vec<Font>,
    font_assets: Vec<AssetRef>,
    raw_xml: String,
}

impl InteropSubtitleAsset {
    pub fn new() -> InteropSubtitleAsset {
        InteropSubtitleAsset {
            id: make_uuid(),
            file: None,
            hash: None,
            movie_title: None,
            reel_number: "1".to_string(),
            language: None,
            subtitles: Vec::new(),
            load_font_nodes: Vec::new(),
            fonts: Vec::new(),
            font_assets: Vec::new(),
            raw_xml: String::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<InteropSubtitleAsset> {
        let raw_xml = std::fs::read_to_string(path)
            .map_err(|e| Error::FileError(e, path.to_path_buf()))?;
        let doc = Document::read_string(&raw_xml)
            .map_err(|e| Error::XMLError(format!("{} in {}", e, path.display())))?;
        let root = doc.root();
        if root.name() != "DCSubtitle" {
            return Err(Error::XMLError(format!(
                "root is <{}>, expecting <DCSubtitle>",
                root.name()
            )));
        }

        let id = crate::util::remove_urn_uuid(&root.string_child("SubtitleID")?);
        let mut load_font_nodes = Vec::new();
        for node in root.children_named("LoadFont") {
            load_font_nodes.push(LoadFontNode {
                id: node.attribute("Id").unwrap_or_default().to_string(),
                uri: node.attribute("URI").map(|u| u.to_string()),
            });
        }
        let mut subtitles = Vec::new();
        parse_subtitles(root, None, None, &mut subtitles)?;

        debug!("read {} Interop subtitles from {}", subtitles.len(), path.display());
        Ok(InteropSubtitleAsset {
            id,
            file: Some(path.to_path_buf()),
            hash: None,
            movie_title: root.optional_string_child("MovieTitle"),
            reel_number: root.optional_string_child("ReelNumber").unwrap_or_else(|| "1".to_string()),
            language: root.optional_string_child("Language"),
            subtitles,
            load_font_nodes,
            fonts: Vec::new(),
            font_assets: Vec::new(),
            raw_xml,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: &str) {
        self.language = Some(language.to_string());
    }

    pub fn set_movie_title(&mut self, title: &str) {
        self.movie_title = Some(title.to_string());
    }

    pub fn set_reel_number(&mut self, n: &str) {
        self.reel_number = n.to_string();
    }

    pub fn subtitles(&self) -> &[Subtitle] {
        &self.subtitles
    }

    pub fn add(&mut self, subtitle: Subtitle) {
        self.subtitles.push(subtitle);
    }

    pub fn add_font(&mut self, load_id: &str, data: Vec<u8>) {
        let uuid = make_uuid();
        self.load_font_nodes.push(LoadFontNode {
            id: load_id.to_string(),
            uri: Some(format!("{uuid}.ttf")),
        });
        self.fonts.push(Font { load_id: load_id.to_string(), uuid, data });
    }

    pub fn load_font_nodes(&self) -> &[LoadFontNode] {
        &self.load_font_nodes
    }

    pub fn fonts(&self) -> &[Font] {
        &self.fonts
    }

    /// The raw on-disk XML, as needed for schema validation of what was actually shipped.
    pub fn raw_xml(&self) -> &str {
        &self.raw_xml
    }

    pub fn time_code_rate(&self) -> i64 {
        250
    }

    pub fn pkl_type(&self, _standard: Standard) -> String {
        "text/xml;asdcpKind=Subtitle".to_string()
    }

    pub fn hash_cache(&self) -> Option<&String> {
        self.hash.as_ref()
    }

    pub fn set_hash_cache(&mut self, hash: String) {
        self.hash = Some(hash);
    }

    pub fn as_xml(&self) -> String {
        let mut root = Element::new("DCSubtitle");
        root.set_attribute("Version", "1.0");
        root.add_text_child("SubtitleID", &self.id);
        root.add_text_child("MovieTitle", self.movie_title.as_deref().unwrap_or(""));
        root.add_text_child("ReelNumber", &self.reel_number);
        root.add_text_child("Language", self.language.as_deref().unwrap_or(""));
        for node in &self.load_font_nodes {
            let lf = root.add_child("LoadFont");
            lf.set_attribute("Id", &node.id);
            if let Some(uri) = &node.uri {
                lf.set_attribute("URI", uri);
            }
        }
        subtitles_as_xml(&mut root, &self.subtitles, 250, Standard::Interop);
        Document::new(root).serialize()
    }

    /// Write the XML, and any font data we hold, as sibling files of `path`.
    pub fn write(&mut self, path: &Path) -> Result<()> {
        let xml = self.as_xml();
        std::fs::write(path, &xml).map_err(|e| Error::FileError(e, path.to_path_buf()))?;
        self.raw_xml = xml;
        self.file = Some(path.to_path_buf());
        self.hash = None;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        for font in &self.fonts {
            let font_path = parent.join(format!("{}.ttf", font.uuid));
            std::fs::write(&font_path, &font.data)
                .map_err(|e| Error::FileError(e, font_path.clone()))?;
        }
        Ok(())
    }

    /// Match our `LoadFont` URIs against font assets from the asset map.
    pub fn resolve_fonts(&mut self, assets: &[AssetRef]) {
        for asset in assets {
            // the list includes this very subtitle asset, which the caller holds borrowed
            let borrowed = match asset.try_borrow() {
                Ok(b) => b,
                Err(_) => continue,
            };
            let matched = if let Asset::Font(font) = &*borrowed {
                font.file()
                    .and_then(|file| file.file_name())
                    .map(|name| {
                        self.load_font_nodes
                            .iter()
                            .any(|n| n.uri.as_deref() == Some(name.to_string_lossy().as_ref()))
                    })
                    .unwrap_or(false)
            } else {
                false
            };
            drop(borrowed);
            if matched && !self.font_assets.iter().any(|a| std::rc::Rc::ptr_eq(a, asset)) {
                self.font_assets.push(asset.clone());
            }
        }
    }

    /// Append our resolved font assets to a flat asset list.
    pub fn add_font_assets(&self, assets: &mut Vec<AssetRef>) {
        for font in &self.font_assets {
            let id = font.borrow().id().to_string();
            if !assets.iter().any(|a| a.borrow().id() == id) {
                assets.push(font.clone());
            }
        }
    }

    pub fn equals(
        &self,
        other: &InteropSubtitleAsset,
        opt: &EqualityOptions,
        note: NoteHandler,
    ) -> bool {
        if self.language != other.language {
            note(EqualityNoteType::Error, "subtitle languages differ".to_string());
            return false;
        }
        if self.subtitles != other.subtitles {
            note(EqualityNoteType::Error, "subtitle content differs".to_string());
            return false;
        }
        if !opt.load_font_ids_can_differ {
            let ours: Vec<&str> = self.load_font_nodes.iter().map(|n| n.id.as_str()).collect();
            let theirs: Vec<&str> = other.load_font_nodes.iter().map(|n| n.id.as_str()).collect();
            if ours != theirs {
                note(EqualityNoteType::Error, "LoadFont ids differ".to_string());
                return false;
            }
        }
        true
    }
}

impl Default for InteropSubtitleAsset {
    fn default() -> InteropSubtitleAsset {
        InteropSubtitleAsset::new()
    }
}
