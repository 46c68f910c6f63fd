//! The top-level package: reads a directory into the (CPL, PKL, asset map, asset) graph and
//! writes the same graph back out.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::asset::{asset_factory, Asset, AssetRef};
use crate::asset_map::{write_volindex, AssetMap};
use crate::certificate_chain::CertificateChain;
use crate::cpl::Cpl;
use crate::font_asset::FontAsset;
use crate::interop_subtitle_asset::InteropSubtitleAsset;
use crate::kdm::DecryptedKdm;
use crate::pkl::Pkl;
use crate::types::{EqualityOptions, Standard};
use crate::util::{make_digest, NameFormat};
use crate::verify::{NoteCode, NoteType, VerificationNote};
use crate::xml::Document;
use crate::{Error, EqualityNoteType, NoteHandler, Result};

/// A DCP: a directory containing an asset map, packing lists, composition playlists and
/// essence files.
#[derive(Debug, Default)]
pub struct Dcp {
    directory: PathBuf,
    standard: Option<Standard>,
    cpls: Vec<Cpl>,
    pkls: Vec<Pkl>,
    asset_map: Option<AssetMap>,
    assets: Vec<AssetRef>,
}

impl Dcp {
    /// Open (and create, if necessary) a package directory. Nothing is read until
    /// [`read`](Self::read) is called.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Result<Dcp> {
        let directory = directory.into();
        if !directory.exists() {
            std::fs::create_dir_all(&directory)
                .map_err(|e| Error::FileError(e, directory.clone()))?;
        }
        Ok(Dcp { directory, ..Default::default() })
    }

    /// Read the asset map, packing lists, CPLs and assets, then resolve reel references.
    ///
    /// Problems that do not prevent reading (a missing file, an empty path, a standards
    /// mismatch) are reported into `notes` when given; `ignore_incorrect_picture_mxf_type`
    /// loads a 3D container mislabelled as 2D as the stereo asset it really is.
    pub fn read(
        &mut self,
        mut notes: Option<&mut Vec<VerificationNote>>,
        ignore_incorrect_picture_mxf_type: bool,
    ) -> Result<()> {
        let asset_map = AssetMap::find_and_read(&self.directory)?;
        self.standard = Some(asset_map.standard());
        let standard = asset_map.standard();

        if asset_map.pkl_entries().is_empty() {
            return Err(Error::XMLError("no packing lists found in asset map".to_string()));
        }
        for entry in asset_map.pkl_entries() {
            self.pkls.push(Pkl::from_file(&self.directory.join(&entry.path))?);
        }

        for entry in asset_map.other_entries() {
            if entry.path.as_os_str().is_empty() {
                if let Some(notes) = notes.as_deref_mut() {
                    notes.push(VerificationNote::new(NoteType::Warning, NoteCode::EmptyAssetPath));
                }
                continue;
            }
            let path = self.directory.join(&entry.path);
            if !path.exists() {
                if let Some(notes) = notes.as_deref_mut() {
                    notes.push(
                        VerificationNote::new(NoteType::Error, NoteCode::MissingAsset)
                            .with_file(&path),
                    );
                }
                continue;
            }

            // the PKL, not the filename, tells us what an asset is
            let pkl_type = self.pkls.iter().find_map(|p| p.pkl_type(&entry.id));
            let pkl_type = match pkl_type {
                Some(t) => t.split(';').next().unwrap_or("").to_string(),
                // in the ASSETMAP but no PKL mentions it; not our problem
                None => continue,
            };

            match pkl_type.as_str() {
                "text/xml" => {
                    let doc = Document::read_file(&path)
                        .map_err(|e| Error::ReadError(format!("XML error in {}: {e}", path.display())))?;
                    match doc.root().name() {
                        "CompositionPlaylist" => {
                            let cpl = Cpl::from_file(&path)?;
                            if cpl.standard() != standard {
                                if let Some(notes) = notes.as_deref_mut() {
                                    notes.push(VerificationNote::new(
                                        NoteType::Error,
                                        NoteCode::MismatchedStandard,
                                    ));
                                }
                            }
                            self.cpls.push(cpl);
                        }
                        "DCSubtitle" => {
                            if standard == Standard::Smpte {
                                if let Some(notes) = notes.as_deref_mut() {
                                    notes.push(VerificationNote::new(
                                        NoteType::Error,
                                        NoteCode::MismatchedStandard,
                                    ));
                                }
                            }
                            self.assets.push(Asset::new_ref(Asset::InteropSubtitle(
                                InteropSubtitleAsset::from_file(&path)?,
                            )));
                        }
                        other => {
                            return Err(Error::ReadError(format!(
                                "unexpected XML root <{other}> in {}",
                                path.display()
                            )))
                        }
                    }
                }
                "application/mxf" => {
                    let (asset, threed_marked_as_twod) =
                        asset_factory(&path, &entry.id, ignore_incorrect_picture_mxf_type)?;
                    if threed_marked_as_twod {
                        if let Some(notes) = notes.as_deref_mut() {
                            notes.push(
                                VerificationNote::new(
                                    NoteType::Warning,
                                    NoteCode::ThreedAssetMarkedAsTwod,
                                )
                                .with_file(&path),
                            );
                        }
                    }
                    self.assets.push(Asset::new_ref(asset));
                }
                "application/ttf" => {
                    self.assets
                        .push(Asset::new_ref(Asset::Font(FontAsset::new(&entry.id, &path))));
                }
                // Interop PNG subtitle images are referenced from the subtitle XML
                "image/png" => {}
                other => {
                    return Err(Error::ReadError(format!("unknown asset type {other} in PKL")))
                }
            }
        }

        self.resolve_refs();

        // look for references to things that are not in this package at all
        if let Some(notes) = notes.as_deref_mut() {
            for cpl in &self.cpls {
                for reference in cpl.reel_file_assets() {
                    if !reference.resolved()
                        && !asset_map.entries().iter().any(|e| e.id == reference.id())
                    {
                        notes.push(
                            VerificationNote::new(NoteType::Warning, NoteCode::ExternalAsset)
                                .with_note(reference.id()),
                        );
                    }
                }
            }
        }

        self.asset_map = Some(asset_map);
        info!(
            "read DCP at {}: {} CPL(s), {} PKL(s), {} asset(s)",
            self.directory.display(),
            self.cpls.len(),
            self.pkls.len(),
            self.assets.len()
        );
        Ok(())
    }

    /// Hand every CPL the flat asset list; idempotent.
    pub fn resolve_refs(&mut self) {
        let assets = self.assets.clone();
        for cpl in &mut self.cpls {
            cpl.resolve_refs(&assets);
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn standard(&self) -> Option<Standard> {
        self.standard
    }

    pub fn cpls(&self) -> &[Cpl] {
        &self.cpls
    }

    pub fn cpls_mut(&mut self) -> &mut [Cpl] {
        &mut self.cpls
    }

    pub fn pkls(&self) -> &[Pkl] {
        &self.pkls
    }

    pub fn asset_map(&self) -> Option<&AssetMap> {
        self.asset_map.as_ref()
    }

    pub fn asset_map_path(&self) -> Option<PathBuf> {
        self.asset_map.as_ref().and_then(|a| a.file().map(Path::to_path_buf))
    }

    pub fn add_cpl(&mut self, cpl: Cpl) {
        self.cpls.push(cpl);
    }

    /// The flat list of essence and font assets referenced by our CPLs, deduplicated by id.
    /// Unresolved references are skipped.
    pub fn assets(&self) -> Vec<AssetRef> {
        let mut out: Vec<AssetRef> = Vec::new();
        for cpl in &self.cpls {
            for reference in cpl.reel_file_assets() {
                let asset = match reference.asset() {
                    Some(a) => a,
                    None => continue,
                };
                let id = asset.borrow().id().to_string();
                if out.iter().any(|a| a.borrow().id() == id) {
                    continue;
                }
                out.push(asset.clone());
                // Interop subtitles bring their fonts with them
                let borrowed = asset.borrow();
                if let Asset::InteropSubtitle(s) = &*borrowed {
                    s.add_font_assets(&mut out);
                }
                drop(borrowed);
            }
        }
        out
    }

    pub fn any_encrypted(&self) -> bool {
        self.cpls.iter().any(|c| c.any_encrypted())
    }

    pub fn all_encrypted(&self) -> bool {
        self.cpls.iter().all(|c| c.all_encrypted())
    }

    /// Feed a decrypted KDM to the CPLs it names.
    pub fn add_kdm(&mut self, kdm: &DecryptedKdm) {
        for cpl in &mut self.cpls {
            if kdm.keys().iter().any(|k| k.cpl_id() == cpl.id()) {
                cpl.add_kdm(kdm);
            }
        }
    }

    /// Write CPLs, a PKL, the volume index and finally the asset map.
    ///
    /// `name_format` shapes the CPL/PKL filenames: `%t` is the file type (`cpl`/`pkl`) and
    /// `%i` the identifier; the id and `.xml` are appended when the format does not use `%i`.
    pub fn write_xml(
        &mut self,
        issuer: &str,
        creator: &str,
        issue_date: &str,
        annotation_text: &str,
        signer: Option<&CertificateChain>,
        name_format: &NameFormat,
    ) -> Result<()> {
        if self.cpls.is_empty() {
            return Err(Error::MiscError("cannot write a DCP with no CPLs".to_string()));
        }
        let standard = self.cpls[0].standard();
        if self.cpls.iter().any(|c| c.standard() != standard) {
            return Err(Error::MiscError(
                "cannot make a DCP with mixed Interop and SMPTE CPLs".to_string(),
            ));
        }
        self.standard = Some(standard);

        // hashes of the essence must be in the reel references before the CPLs are serialized
        for cpl in &mut self.cpls {
            for reel in cpl.reels_mut() {
                for reference in reel.file_assets_mut() {
                    if reference.hash().is_none() {
                        if let Some(asset) = reference.asset() {
                            let hash = asset.borrow_mut().hash(None)?;
                            reference.set_hash(&hash);
                        }
                    }
                }
            }
        }

        for cpl in &mut self.cpls {
            let filename = name_format
                .format(&[('t', "cpl"), ('i', cpl.id())], &format!("_{}.xml", cpl.id()));
            cpl.write_xml(&self.directory.join(filename), signer)?;
        }

        if self.pkls.is_empty() {
            let mut pkl = Pkl::new(standard, annotation_text, issue_date, issuer, creator);
            for cpl in &mut self.cpls {
                let file = cpl.file().unwrap().to_path_buf();
                let size = file_size(&file)?;
                let hash = cpl.hash()?;
                pkl.add_asset(
                    cpl.id(),
                    Some(cpl.content_title_text()),
                    &hash,
                    size,
                    &Cpl::static_pkl_type(standard),
                );
            }
            for asset in self.assets() {
                let mut borrowed = asset.borrow_mut();
                let file = borrowed.file().ok_or_else(|| {
                    Error::MiscError(format!("asset {} has no file", borrowed.id()))
                })?;
                let hash = borrowed.hash(None)?;
                let size = file_size(&file)?;
                let pkl_type = borrowed.pkl_type(standard);
                pkl.add_asset(borrowed.id(), None, &hash, size, &pkl_type);
            }
            self.pkls.push(pkl);
        }

        let pkl_filename = {
            let pkl = self.pkls.first().unwrap();
            name_format.format(&[('t', "pkl"), ('i', pkl.id())], &format!("_{}.xml", pkl.id()))
        };
        let pkl_path = self.directory.join(&pkl_filename);
        self.pkls.first_mut().unwrap().write_xml(&pkl_path, signer)?;

        write_volindex(&self.directory, standard)?;

        let mut asset_map = AssetMap::new(standard, annotation_text);
        {
            let pkl = self.pkls.first().unwrap();
            asset_map.add(pkl.id(), Path::new(&pkl_filename), true, Some(file_size(&pkl_path)?));
        }
        for cpl in &self.cpls {
            let file = cpl.file().unwrap();
            asset_map.add(cpl.id(), &relative_to(file, &self.directory), false, None);
        }
        for asset in self.assets() {
            let borrowed = asset.borrow();
            let file = borrowed
                .file()
                .ok_or_else(|| Error::MiscError(format!("asset {} has no file", borrowed.id())))?;
            asset_map.add(borrowed.id(), &relative_to(&file, &self.directory), false, None);
        }
        asset_map.write_xml(&self.directory, issuer, creator, issue_date)?;
        self.asset_map = Some(asset_map);

        info!("wrote DCP to {}", self.directory.display());
        Ok(())
    }

    pub fn equals(&self, other: &Dcp, opt: &EqualityOptions, note: NoteHandler) -> bool {
        if self.cpls.len() != other.cpls.len() {
            note(
                EqualityNoteType::Error,
                format!("CPL counts differ: {} vs {}", self.cpls.len(), other.cpls.len()),
            );
            return false;
        }
        for ours in &self.cpls {
            if !other.cpls.iter().any(|theirs| {
                let mut sink = |_: EqualityNoteType, _: String| {};
                ours.equals(theirs, opt, &mut sink)
            }) {
                note(
                    EqualityNoteType::Error,
                    format!("no match found for CPL {}", ours.id()),
                );
                return false;
            }
        }
        true
    }

    /// Given files belonging to one or more DCPs, the distinct DCP directories involved.
    pub fn directories_from_files(files: &[PathBuf]) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for file in files {
            let name = file.file_name().map(|f| f.to_string_lossy().into_owned());
            if matches!(name.as_deref(), Some("ASSETMAP") | Some("ASSETMAP.xml")) {
                if let Some(parent) = file.parent() {
                    if !out.contains(&parent.to_path_buf()) {
                        out.push(parent.to_path_buf());
                    }
                }
            }
        }
        out
    }
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)
        .map_err(|e| Error::FileError(e, path.to_path_buf()))?
        .len())
}

fn relative_to(path: &Path, directory: &Path) -> PathBuf {
    path.strip_prefix(directory)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_from_files_picks_assetmap_parents() {
        let files = vec![
            PathBuf::from("/a/ASSETMAP.xml"),
            PathBuf::from("/a/cpl_x.xml"),
            PathBuf::from("/b/ASSETMAP"),
            PathBuf::from("/b/ASSETMAP"),
        ];
        let dirs = Dcp::directories_from_files(&files);
        assert_eq!(dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
