//! The asset map (`ASSETMAP` / `ASSETMAP.xml`) and the volume index.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::Standard;
use crate::util::{make_uuid, remove_urn_uuid};
use crate::xml::{Document, Element};
use crate::{Error, Result};

const AM_INTEROP_NS: &str = "http://www.digicine.com/PROTO-ASDCP-AM-20040311#";
const AM_SMPTE_NS: &str = "http://www.smpte-ra.org/schemas/429-9/2007/AM";
const VI_INTEROP_NS: &str = "http://www.digicine.com/PROTO-ASDCP-VL-20040311#";
const VI_SMPTE_NS: &str = "http://www.smpte-ra.org/schemas/429-9/2007/AM";

/// One `<Asset>` in the asset map: an id, its on-disk path, and whether it is a packing list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMapEntry {
    pub id: String,
    pub path: PathBuf,
    pub pkl: bool,
    pub size: Option<u64>,
}

/// The map from asset ids to relative paths for everything in a package.
#[derive(Debug)]
pub struct AssetMap {
    id: String,
    file: Option<PathBuf>,
    standard: Standard,
    annotation_text: Option<String>,
    entries: Vec<AssetMapEntry>,
}

impl AssetMap {
    pub fn new(standard: Standard, annotation_text: &str) -> AssetMap {
        AssetMap {
            id: make_uuid(),
            file: None,
            standard,
            annotation_text: Some(annotation_text.to_string()),
            entries: Vec::new(),
        }
    }

    /// Find and read `ASSETMAP` or `ASSETMAP.xml` under `directory`.
    pub fn find_and_read(directory: &Path) -> Result<AssetMap> {
        for name in ["ASSETMAP", "ASSETMAP.xml"] {
            let candidate = directory.join(name);
            if candidate.exists() {
                return AssetMap::from_file(&candidate);
            }
        }
        Err(Error::MissingAssetmapError(directory.to_path_buf()))
    }

    pub fn from_file(path: &Path) -> Result<AssetMap> {
        let doc = Document::read_file(path)?;
        let root = doc.root();
        if root.name() != "AssetMap" {
            return Err(Error::XMLError(format!(
                "root is <{}>, expecting <AssetMap>",
                root.name()
            )));
        }
        let standard = match root.namespace_uri() {
            Some(AM_INTEROP_NS) => Standard::Interop,
            Some(AM_SMPTE_NS) => Standard::Smpte,
            other => {
                return Err(Error::XMLError(format!(
                    "unrecognised asset map namespace {}",
                    other.unwrap_or("(none)")
                )))
            }
        };

        let mut entries = Vec::new();
        let list = root
            .child("AssetList")
            .ok_or_else(|| Error::XMLError("asset map has no AssetList".to_string()))?;
        for asset in list.children_named("Asset") {
            let chunk_list = asset
                .child("ChunkList")
                .ok_or_else(|| Error::XMLError("asset has no ChunkList".to_string()))?;
            let chunks = chunk_list.children_named("Chunk");
            if chunks.len() != 1 {
                return Err(Error::XMLError("unsupported asset chunk count".to_string()));
            }
            let mut chunk_path = chunks[0].string_child("Path")?;
            if let Some(stripped) = chunk_path.strip_prefix("file://") {
                chunk_path = stripped.to_string();
            }
            let pkl = match standard {
                // Interop marks packing lists by the presence of the element
                Standard::Interop => asset.child("PackingList").is_some(),
                Standard::Smpte => {
                    asset.optional_string_child("PackingList").as_deref() == Some("true")
                }
            };
            entries.push(AssetMapEntry {
                id: remove_urn_uuid(&asset.string_child("Id")?),
                path: PathBuf::from(chunk_path),
                pkl,
                size: chunks[0].optional_number_child("Length")?,
            });
        }

        debug!("read asset map from {} ({} entries)", path.display(), entries.len());
        Ok(AssetMap {
            id: remove_urn_uuid(&root.string_child("Id")?),
            file: Some(path.to_path_buf()),
            standard,
            annotation_text: root.optional_string_child("AnnotationText"),
            entries,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn standard(&self) -> Standard {
        self.standard
    }

    pub fn entries(&self) -> &[AssetMapEntry] {
        &self.entries
    }

    pub fn add(&mut self, id: &str, path: &Path, pkl: bool, size: Option<u64>) {
        self.entries.push(AssetMapEntry {
            id: id.to_string(),
            path: path.to_path_buf(),
            pkl,
            size,
        });
    }

    /// Packing-list entries, in document order.
    pub fn pkl_entries(&self) -> Vec<&AssetMapEntry> {
        self.entries.iter().filter(|e| e.pkl).collect()
    }

    /// Non-PKL entries, in document order.
    pub fn other_entries(&self) -> Vec<&AssetMapEntry> {
        self.entries.iter().filter(|e| !e.pkl).collect()
    }

    /// Write `ASSETMAP` (Interop) or `ASSETMAP.xml` (SMPTE) into `directory`; the asset map
    /// is the last file a write touches, so a partial package is visibly incomplete.
    pub fn write_xml(
        &mut self,
        directory: &Path,
        issuer: &str,
        creator: &str,
        issue_date: &str,
    ) -> Result<PathBuf> {
        let (filename, ns) = match self.standard {
            Standard::Interop => ("ASSETMAP", AM_INTEROP_NS),
            Standard::Smpte => ("ASSETMAP.xml", AM_SMPTE_NS),
        };
        let mut root = Element::with_namespace("AssetMap", ns);
        root.add_text_child("Id", &format!("urn:uuid:{}", self.id));
        root.add_text_child(
            "AnnotationText",
            self.annotation_text.as_deref().unwrap_or(""),
        );
        match self.standard {
            Standard::Interop => {
                root.add_text_child("VolumeCount", "1");
                root.add_text_child("IssueDate", issue_date);
                root.add_text_child("Issuer", issuer);
                root.add_text_child("Creator", creator);
            }
            Standard::Smpte => {
                root.add_text_child("Creator", creator);
                root.add_text_child("VolumeCount", "1");
                root.add_text_child("IssueDate", issue_date);
                root.add_text_child("Issuer", issuer);
            }
        }
        let list = root.add_child("AssetList");
        for entry in &self.entries {
            let asset = list.add_child("Asset");
            asset.add_text_child("Id", &format!("urn:uuid:{}", entry.id));
            if entry.pkl {
                asset.add_text_child("PackingList", "true");
            }
            let chunk = asset.add_child("ChunkList").add_child("Chunk");
            chunk.add_text_child("Path", &entry.path.to_string_lossy());
            chunk.add_text_child("VolumeIndex", "1");
            chunk.add_text_child("Offset", "0");
            if let Some(size) = entry.size {
                chunk.add_text_child("Length", &size.to_string());
            }
        }
        let path = directory.join(filename);
        Document::new(root).write_to_file(&path)?;
        self.file = Some(path.clone());
        debug!("wrote asset map to {}", path.display());
        Ok(path)
    }
}

/// Write the volume index file for a single-volume package.
pub fn write_volindex(directory: &Path, standard: Standard) -> Result<()> {
    let (filename, ns) = match standard {
        Standard::Interop => ("VOLINDEX", VI_INTEROP_NS),
        Standard::Smpte => ("VOLINDEX.xml", VI_SMPTE_NS),
    };
    let mut root = Element::with_namespace("VolumeIndex", ns);
    root.add_text_child("Index", "1");
    Document::new(root).write_to_file(&directory.join(filename))
}
