//! Packing lists: the inventory of every file in a package with its hash, size and type.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::certificate_chain::CertificateChain;
use crate::types::Standard;
use crate::util::{make_uuid, remove_urn_uuid};
use crate::xml::{Document, Element};
use crate::{Error, Result};

const PKL_INTEROP_NS: &str = "http://www.digicine.com/PROTO-ASDCP-PKL-20040311#";
const PKL_SMPTE_NS: &str = "http://www.smpte-ra.org/schemas/429-8/2007/PKL";

/// One `<Asset>` entry in a packing list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PklAsset {
    pub id: String,
    pub annotation_text: Option<String>,
    /// base64 SHA-1 of the file
    pub hash: String,
    pub size: u64,
    /// MIME-like type string, possibly with `;parameters`
    pub pkl_type: String,
}

/// A packing list.
#[derive(Debug)]
pub struct Pkl {
    id: String,
    file: Option<PathBuf>,
    annotation_text: Option<String>,
    issue_date: String,
    issuer: String,
    creator: String,
    standard: Standard,
    assets: Vec<PklAsset>,
}

impl Pkl {
    pub fn new(
        standard: Standard,
        annotation_text: &str,
        issue_date: &str,
        issuer: &str,
        creator: &str,
    ) -> Pkl {
        Pkl {
            id: make_uuid(),
            file: None,
            annotation_text: Some(annotation_text.to_string()),
            issue_date: issue_date.to_string(),
            issuer: issuer.to_string(),
            creator: creator.to_string(),
            standard,
            assets: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Pkl> {
        let doc = Document::read_file(path)?;
        let root = doc.root();
        if root.name() != "PackingList" {
            return Err(Error::XMLError(format!(
                "root is <{}>, expecting <PackingList>",
                root.name()
            )));
        }
        let standard = match root.namespace_uri() {
            Some(PKL_INTEROP_NS) => Standard::Interop,
            Some(PKL_SMPTE_NS) => Standard::Smpte,
            other => {
                return Err(Error::XMLError(format!(
                    "unrecognised PKL namespace {}",
                    other.unwrap_or("(none)")
                )))
            }
        };
        let mut assets = Vec::new();
        if let Some(list) = root.child("AssetList") {
            for asset in list.children_named("Asset") {
                assets.push(PklAsset {
                    id: remove_urn_uuid(&asset.string_child("Id")?),
                    annotation_text: asset.optional_string_child("AnnotationText"),
                    hash: asset.string_child("Hash")?,
                    size: asset.number_child("Size")?,
                    pkl_type: asset.string_child("Type")?,
                });
            }
        }
        debug!("read PKL from {} ({} assets)", path.display(), assets.len());
        Ok(Pkl {
            id: remove_urn_uuid(&root.string_child("Id")?),
            file: Some(path.to_path_buf()),
            annotation_text: root.optional_string_child("AnnotationText"),
            issue_date: root.string_child("IssueDate")?,
            issuer: root.optional_string_child("Issuer").unwrap_or_default(),
            creator: root.optional_string_child("Creator").unwrap_or_default(),
            standard,
            assets,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn annotation_text(&self) -> Option<&str> {
        self.annotation_text.as_deref()
    }

    pub fn issue_date(&self) -> &str {
        &self.issue_date
    }

    pub fn standard(&self) -> Standard {
        self.standard
    }

    pub fn asset_list(&self) -> &[PklAsset] {
        &self.assets
    }

    pub fn add_asset(
        &mut self,
        id: &str,
        annotation_text: Option<&str>,
        hash: &str,
        size: u64,
        pkl_type: &str,
    ) {
        self.assets.push(PklAsset {
            id: id.to_string(),
            annotation_text: annotation_text.map(|a| a.to_string()),
            hash: hash.to_string(),
            size,
            pkl_type: pkl_type.to_string(),
        });
    }

    /// The recorded hash for an asset id, if this PKL lists it.
    pub fn hash(&self, id: &str) -> Option<&str> {
        self.assets.iter().find(|a| a.id == id).map(|a| a.hash.as_str())
    }

    /// The recorded type for an asset id, if this PKL lists it.
    pub fn pkl_type(&self, id: &str) -> Option<&str> {
        self.assets.iter().find(|a| a.id == id).map(|a| a.pkl_type.as_str())
    }

    pub fn write_xml(&mut self, path: &Path, signer: Option<&CertificateChain>) -> Result<()> {
        let ns = match self.standard {
            Standard::Interop => PKL_INTEROP_NS,
            Standard::Smpte => PKL_SMPTE_NS,
        };
        let mut root = Element::with_namespace("PackingList", ns);
        root.add_text_child("Id", &format!("urn:uuid:{}", self.id));
        if let Some(a) = &self.annotation_text {
            root.add_text_child("AnnotationText", a);
        }
        root.add_text_child("IssueDate", &self.issue_date);
        root.add_text_child("Issuer", &self.issuer);
        root.add_text_child("Creator", &self.creator);
        let list = root.add_child("AssetList");
        for asset in &self.assets {
            let node = list.add_child("Asset");
            node.add_text_child("Id", &format!("urn:uuid:{}", asset.id));
            if let Some(a) = &asset.annotation_text {
                node.add_text_child("AnnotationText", a);
            }
            node.add_text_child("Hash", &asset.hash);
            node.add_text_child("Size", &asset.size.to_string());
            node.add_text_child("Type", &asset.pkl_type);
        }
        if let Some(signer) = signer {
            signer.sign(&mut root, self.standard)?;
        }
        Document::new(root).write_to_file(path)?;
        self.file = Some(path.to_path_buf());
        debug!("wrote PKL {} to {}", self.id, path.display());
        Ok(())
    }
}
