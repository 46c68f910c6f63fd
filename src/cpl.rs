//! Composition playlists.
//!
//! Serialization follows SMPTE ST 429-7 child order exactly; the
//! `<CompositionMetadataAsset>` of the first reel additionally follows the ST 429-16 order,
//! with the MCA sub-descriptors transcribed from the sound essence container.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::asset::{Asset, AssetRef};
use crate::certificate_chain::CertificateChain;
use crate::dcp_time::LocalTime;
use crate::kdm::DecryptedKdm;
use crate::mxf;
use crate::reel::{Reel, ReelFileAsset};
use crate::types::{
    ContentKind, ContentVersion, EqualityOptions, Luminance, MainSoundConfiguration, Rating, Size,
    Standard, Status,
};
use crate::util::{make_digest, make_uuid, remove_urn_uuid};
use crate::xml::{Document, Element};
use crate::{Error, EqualityNoteType, NoteHandler, Result};

const CPL_INTEROP_NS: &str = "http://www.digicine.com/PROTO-ASDCP-CPL-20040511#";
const CPL_SMPTE_NS: &str = "http://www.smpte-ra.org/schemas/429-7/2006/CPL";
const CPL_METADATA_NS: &str = "http://www.smpte-ra.org/schemas/429-16/2014/CPL-Metadata";
const MCA_SUB_DESCRIPTORS_NS: &str = "http://isdcf.com/ns/cplmd/mca";
const SMPTE_395_NS: &str = "http://www.smpte-ra.org/reg/395/2014/13/1/aaf";
const SMPTE_335_NS: &str = "http://www.smpte-ra.org/reg/335/2012";

/// A composition playlist: an ordered list of reels plus composition-level metadata.
#[derive(Debug)]
pub struct Cpl {
    id: String,
    file: Option<PathBuf>,
    hash: Option<String>,
    annotation_text: Option<String>,
    issuer: String,
    creator: String,
    issue_date: String,
    content_title_text: String,
    content_kind: ContentKind,
    content_versions: Vec<ContentVersion>,
    ratings: Vec<Rating>,
    reels: Vec<Reel>,
    standard: Standard,

    // ST 429-16 composition metadata
    cpl_metadata_id: String,
    full_content_title_text: Option<String>,
    full_content_title_text_language: Option<String>,
    release_territory: Option<String>,
    release_territory_scope: Option<String>,
    version_number: Option<i32>,
    status: Option<Status>,
    chain: Option<String>,
    distributor: Option<String>,
    facility: Option<String>,
    luminance: Option<Luminance>,
    main_sound_configuration: Option<MainSoundConfiguration>,
    main_sound_sample_rate: Option<i64>,
    main_picture_stored_area: Option<Size>,
    main_picture_active_area: Option<Size>,
    additional_subtitle_languages: Vec<String>,
    sign_language_video_language: Option<String>,
}

impl Cpl {
    pub fn new(annotation_text: &str, content_kind: ContentKind, standard: Standard) -> Cpl {
        let issue_date = LocalTime::now().as_string();
        let id = make_uuid();
        Cpl {
            id,
            file: None,
            hash: None,
            annotation_text: Some(annotation_text.to_string()),
            issuer: format!("dcp {}", env!("CARGO_PKG_VERSION")),
            creator: format!("dcp {}", env!("CARGO_PKG_VERSION")),
            issue_date: issue_date.clone(),
            content_title_text: annotation_text.to_string(),
            content_kind,
            content_versions: vec![ContentVersion::with_label(&format!(
                "{annotation_text} {issue_date}"
            ))],
            ratings: Vec::new(),
            reels: Vec::new(),
            standard,
            cpl_metadata_id: make_uuid(),
            full_content_title_text: None,
            full_content_title_text_language: None,
            release_territory: None,
            release_territory_scope: None,
            version_number: None,
            status: None,
            chain: None,
            distributor: None,
            facility: None,
            luminance: None,
            main_sound_configuration: None,
            main_sound_sample_rate: None,
            main_picture_stored_area: None,
            main_picture_active_area: None,
            additional_subtitle_languages: Vec::new(),
            sign_language_video_language: None,
        }
    }

    pub fn from_file(path: &Path) -> Result<Cpl> {
        let doc = Document::read_file(path)?;
        let root = doc.root();
        if root.name() != "CompositionPlaylist" {
            return Err(Error::XMLError(format!(
                "root is <{}>, expecting <CompositionPlaylist>",
                root.name()
            )));
        }
        let standard = match root.namespace_uri() {
            Some(CPL_INTEROP_NS) => Standard::Interop,
            Some(CPL_SMPTE_NS) => Standard::Smpte,
            other => {
                return Err(Error::XMLError(format!(
                    "unrecognised CPL namespace {}",
                    other.unwrap_or("(none)")
                )))
            }
        };

        let mut content_versions = Vec::new();
        if let Some(cv) = root.child("ContentVersion") {
            content_versions.push(ContentVersion::from_xml(cv));
        } else if standard == Standard::Smpte {
            return Err(Error::XMLError("missing ContentVersion tag in CPL".to_string()));
        }

        let mut ratings = Vec::new();
        if let Some(list) = root.child("RatingList") {
            for r in list.children_named("Rating") {
                ratings.push(Rating::from_xml(r)?);
            }
        }

        let content_kind_node = root
            .child("ContentKind")
            .ok_or_else(|| Error::XMLError("missing ContentKind in CPL".to_string()))?;
        let content_kind =
            ContentKind::new(&content_kind_node.text(), content_kind_node.attribute("scope"));

        let mut reels = Vec::new();
        let reel_list = root
            .child("ReelList")
            .ok_or_else(|| Error::XMLError("missing ReelList in CPL".to_string()))?;
        for node in reel_list.children_named("Reel") {
            reels.push(Reel::from_xml(node, standard)?);
        }

        let mut cpl = Cpl {
            id: remove_urn_uuid(&root.string_child("Id")?),
            file: Some(path.to_path_buf()),
            hash: None,
            annotation_text: root.optional_string_child("AnnotationText"),
            issuer: root.optional_string_child("Issuer").unwrap_or_default(),
            creator: root.optional_string_child("Creator").unwrap_or_default(),
            issue_date: root.string_child("IssueDate")?,
            content_title_text: root.string_child("ContentTitleText")?,
            content_kind,
            content_versions,
            ratings,
            reels,
            standard,
            cpl_metadata_id: make_uuid(),
            full_content_title_text: None,
            full_content_title_text_language: None,
            release_territory: None,
            release_territory_scope: None,
            version_number: None,
            status: None,
            chain: None,
            distributor: None,
            facility: None,
            luminance: None,
            main_sound_configuration: None,
            main_sound_sample_rate: None,
            main_picture_stored_area: None,
            main_picture_active_area: None,
            additional_subtitle_languages: Vec::new(),
            sign_language_video_language: None,
        };

        // composition metadata lives in the first reel's AssetList
        if let Some(first) = reel_list.children_named("Reel").first() {
            if let Some(asset_list) = first.child("AssetList") {
                if let Some(metadata) = asset_list.child("CompositionMetadataAsset") {
                    cpl.read_composition_metadata_asset(metadata)?;
                }
            }
        }

        debug!("read CPL {} ({} reels)", cpl.id, cpl.reels.len());
        Ok(cpl)
    }

    fn read_composition_metadata_asset(&mut self, node: &Element) -> Result<()> {
        self.cpl_metadata_id = remove_urn_uuid(&node.string_child("Id")?);

        if let Some(fctt) = node.child("FullContentTitleText") {
            self.full_content_title_text = Some(fctt.text());
            self.full_content_title_text_language =
                fctt.attribute("language").map(|l| l.to_string());
        }

        if let Some(territory) = node.child("ReleaseTerritory") {
            self.release_territory = Some(territory.text());
            self.release_territory_scope = territory.attribute("scope").map(|s| s.to_string());
        }

        if let Some(vn) = node.child("VersionNumber") {
            self.version_number = vn.text().trim().parse().ok();
            if let Some(status) = vn.attribute("status") {
                self.status = Some(status.parse()?);
            }
        }

        self.chain = node.optional_string_child("Chain");
        self.distributor = node.optional_string_child("Distributor");
        self.facility = node.optional_string_child("Facility");

        if let Some(acv) = node.child("AlternateContentVersionList") {
            for cv in acv.children_named("ContentVersion") {
                self.content_versions.push(ContentVersion::from_xml(cv));
            }
        }

        if let Some(lum) = node.child("Luminance") {
            self.luminance = Some(Luminance::from_xml(lum)?);
        }

        if let Some(msc) = node.optional_string_child("MainSoundConfiguration") {
            self.main_sound_configuration = Some(msc.parse()?);
        }

        if let Some(sr) = node.optional_string_child("MainSoundSampleRate") {
            let first = sr.split_whitespace().next().unwrap_or("");
            self.main_sound_sample_rate = Some(first.parse().map_err(|_| {
                Error::XMLError(format!("bad MainSoundSampleRate {sr}"))
            })?);
        }

        if let Some(area) = node.child("MainPictureStoredArea") {
            self.main_picture_stored_area =
                Some(Size::new(area.number_child("Width")?, area.number_child("Height")?));
        }
        if let Some(area) = node.child("MainPictureActiveArea") {
            self.main_picture_active_area =
                Some(Size::new(area.number_child("Width")?, area.number_child("Height")?));
        }

        if let Some(sll) = node.optional_string_child("MainSubtitleLanguageList") {
            let mut split: Vec<&str> = sll.split_whitespace().collect();
            // the leading entry duplicates the first reel's subtitle language
            if let Some(first_language) =
                self.reels.iter().find_map(|r| r.main_subtitle().and_then(|s| s.language()))
            {
                if split.first() == Some(&first_language) {
                    split.remove(0);
                }
            }
            self.additional_subtitle_languages =
                split.into_iter().map(|s| s.to_string()).collect();
        }

        if let Some(eml) = node.child("ExtensionMetadataList") {
            for extension in eml.children_named("ExtensionMetadata") {
                if extension.optional_string_child("Name").as_deref() == Some("Sign Language Video") {
                    if let Some(property_list) = extension.child("PropertyList") {
                        for property in property_list.children_named("Property") {
                            if property.optional_string_child("Name").as_deref() == Some("Language Tag") {
                                self.sign_language_video_language =
                                    property.optional_string_child("Value");
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Serialize. SMPTE child order per ST 429-7:
    /// Id, AnnotationText?, IssueDate, Issuer, Creator, ContentTitleText, ContentKind,
    /// ContentVersion, RatingList, ReelList, then the signature appended by the signer.
    fn as_element(&self) -> Result<Element> {
        if self.reels.is_empty() {
            return Err(Error::NoReelsError);
        }
        let ns = match self.standard {
            Standard::Interop => CPL_INTEROP_NS,
            Standard::Smpte => CPL_SMPTE_NS,
        };
        let mut root = Element::with_namespace("CompositionPlaylist", ns);
        root.add_text_child("Id", &format!("urn:uuid:{}", self.id));
        if let Some(a) = &self.annotation_text {
            root.add_text_child("AnnotationText", a);
        }
        root.add_text_child("IssueDate", &self.issue_date);
        root.add_text_child("Issuer", &self.issuer);
        root.add_text_child("Creator", &self.creator);
        root.add_text_child("ContentTitleText", &self.content_title_text);
        let kind = root.add_text_child("ContentKind", self.content_kind.name());
        if let Some(scope) = self.content_kind.scope() {
            kind.set_attribute("scope", scope);
        }
        match self.content_versions.first() {
            Some(cv) => cv.as_xml(&mut root),
            None => ContentVersion::with_label("").as_xml(&mut root),
        }
        let rating_list = root.add_child("RatingList");
        for rating in &self.ratings {
            rating.as_xml(rating_list);
        }

        let reel_list = root.add_child("ReelList");
        for (i, reel) in self.reels.iter().enumerate() {
            let asset_list = reel.write_to_cpl(reel_list, self.standard);
            if i == 0 && self.standard == Standard::Smpte {
                self.maybe_write_composition_metadata_asset(asset_list)?;
            }
        }
        Ok(root)
    }

    /// Write a `<meta:CompositionMetadataAsset>` into the first reel's asset list, provided
    /// the required metadata is present. Does nothing when any required piece is missing.
    fn maybe_write_composition_metadata_asset(&self, asset_list: &mut Element) -> Result<()> {
        let main_picture = match self.reels.first().and_then(|r| r.main_picture()) {
            Some(p) => p,
            None => return Ok(()),
        };
        if self.main_sound_configuration.is_none()
            || self.main_sound_sample_rate.is_none()
            || self.main_picture_stored_area.is_none()
            || self.main_picture_active_area.is_none()
        {
            return Ok(());
        }

        let meta = asset_list.add_child("meta:CompositionMetadataAsset");
        meta.declare_namespace(CPL_METADATA_NS, "meta");

        meta.add_text_child("Id", &format!("urn:uuid:{}", self.cpl_metadata_id));
        meta.add_text_child("EditRate", &main_picture.core.edit_rate().as_xml_string());
        meta.add_text_child(
            "IntrinsicDuration",
            &main_picture.core.intrinsic_duration().to_string(),
        );

        let fctt = meta.add_child("meta:FullContentTitleText");
        if let Some(text) = &self.full_content_title_text {
            fctt.set_text(text);
        }
        if let Some(language) = &self.full_content_title_text_language {
            fctt.set_attribute("language", language);
        }

        if let Some(territory) = &self.release_territory {
            let node = meta.add_text_child("meta:ReleaseTerritory", territory);
            if let Some(scope) = &self.release_territory_scope {
                node.set_attribute("scope", scope);
            }
        }

        if let Some(version) = self.version_number {
            let node = meta.add_text_child("meta:VersionNumber", &version.to_string());
            if let Some(status) = self.status {
                node.set_attribute("status", status.as_str());
            }
        }

        if let Some(chain) = &self.chain {
            meta.add_text_child("meta:Chain", chain);
        }
        if let Some(distributor) = &self.distributor {
            meta.add_text_child("meta:Distributor", distributor);
        }
        if let Some(facility) = &self.facility {
            meta.add_text_child("meta:Facility", facility);
        }

        if self.content_versions.len() > 1 {
            let list = meta.add_child("meta:AlternateContentVersionList");
            for cv in &self.content_versions[1..] {
                cv.as_xml(list);
            }
        }

        if let Some(luminance) = &self.luminance {
            luminance.as_xml(meta, "meta");
        }

        meta.add_text_child(
            "meta:MainSoundConfiguration",
            &self.main_sound_configuration.as_ref().unwrap().to_string(),
        );
        meta.add_text_child(
            "meta:MainSoundSampleRate",
            &format!("{} 1", self.main_sound_sample_rate.unwrap()),
        );

        let stored = self.main_picture_stored_area.unwrap();
        let area = meta.add_child("meta:MainPictureStoredArea");
        area.add_text_child("meta:Width", &stored.width.to_string());
        area.add_text_child("meta:Height", &stored.height.to_string());

        let active = self.main_picture_active_area.unwrap();
        let area = meta.add_child("meta:MainPictureActiveArea");
        area.add_text_child("meta:Width", &active.width.to_string());
        area.add_text_child("meta:Height", &active.height.to_string());

        let first_subtitle_language =
            self.reels.iter().find_map(|r| r.main_subtitle().and_then(|s| s.language()));
        if first_subtitle_language.is_some() || !self.additional_subtitle_languages.is_empty() {
            let mut languages = Vec::new();
            if let Some(l) = first_subtitle_language {
                languages.push(l.to_string());
            }
            languages.extend(self.additional_subtitle_languages.iter().cloned());
            meta.add_text_child("meta:MainSubtitleLanguageList", &languages.join(" "));
        }

        let extension_list = meta.add_child("meta:ExtensionMetadataList");
        let mut add_extension =
            |list: &mut Element, scope: &str, name: &str, property_name: &str, value: &str| {
                let extension = list.add_child("meta:ExtensionMetadata");
                extension.set_attribute("scope", scope);
                extension.add_text_child("meta:Name", name);
                let property = extension.add_child("meta:PropertyList").add_child("meta:Property");
                property.add_text_child("meta:Name", property_name);
                property.add_text_child("meta:Value", value);
            };
        add_extension(
            extension_list,
            "http://isdcf.com/ns/cplmd/app",
            "Application",
            "DCP Constraints Profile",
            "SMPTE-RDD-52:2020-Bv2.1",
        );
        if let Some(language) = &self.sign_language_video_language {
            add_extension(
                extension_list,
                "http://isdcf.com/2017/10/SignLanguageVideo",
                "Sign Language Video",
                "Language Tag",
                language,
            );
        }

        self.maybe_write_mca_sub_descriptors(meta)?;
        Ok(())
    }

    /// Transcribe the MCA sub-descriptors from the first reel's sound container, verbatim.
    fn maybe_write_mca_sub_descriptors(&self, meta: &mut Element) -> Result<()> {
        let sound_file = match self
            .reels
            .first()
            .and_then(|r| r.main_sound())
            .and_then(|s| s.core.asset())
            .and_then(|a| a.borrow().file())
        {
            Some(f) => f,
            None => return Ok(()),
        };
        let header = match mxf::probe(&sound_file) {
            Ok(h) => h,
            Err(_) => return Ok(()),
        };
        let soundfield = match &header.soundfield {
            Some(sf) => sf.clone(),
            None => return Ok(()),
        };

        let subs = meta.add_child("mca:MCASubDescriptors");
        subs.declare_namespace(MCA_SUB_DESCRIPTORS_NS, "mca");
        subs.declare_namespace(SMPTE_395_NS, "r0");
        subs.declare_namespace(SMPTE_335_NS, "r1");

        let sf = subs.add_child("r0:SoundfieldGroupLabelSubDescriptor");
        sf.add_text_child("r1:InstanceID", &format!("urn:uuid:{}", soundfield.instance_id));
        sf.add_text_child(
            "r1:MCALabelDictionaryID",
            &format!("urn:smpte:ul:{}", soundfield.dictionary_id),
        );
        sf.add_text_child("r1:MCALinkID", &format!("urn:uuid:{}", soundfield.link_id));
        sf.add_text_child("r1:MCATagSymbol", &soundfield.tag_symbol);
        if let Some(name) = &soundfield.tag_name {
            sf.add_text_child("r1:MCATagName", name);
        }
        if let Some(language) = &soundfield.spoken_language {
            sf.add_text_child("r1:RFC5646SpokenLanguage", language);
        }

        for channel in &header.channel_labels {
            let ch = subs.add_child("r0:AudioChannelLabelSubDescriptor");
            ch.add_text_child("r1:InstanceID", &format!("urn:uuid:{}", channel.instance_id));
            ch.add_text_child(
                "r1:MCALabelDictionaryID",
                &format!("urn:smpte:ul:{}", channel.dictionary_id),
            );
            ch.add_text_child("r1:MCALinkID", &format!("urn:uuid:{}", channel.link_id));
            ch.add_text_child("r1:MCATagSymbol", &channel.tag_symbol);
            if let Some(name) = &channel.tag_name {
                ch.add_text_child("r1:MCATagName", name);
            }
            if let Some(id) = channel.channel_id {
                ch.add_text_child("r1:MCAChannelID", &id.to_string());
            }
            if let Some(language) = &channel.spoken_language {
                ch.add_text_child("r1:RFC5646SpokenLanguage", language);
            }
            if let Some(group) = &channel.soundfield_group_link_id {
                ch.add_text_child("r1:SoundfieldGroupLinkID", &format!("urn:uuid:{group}"));
            }
        }
        Ok(())
    }

    /// Write this CPL to `path`, optionally signing it.
    pub fn write_xml(&mut self, path: &Path, signer: Option<&CertificateChain>) -> Result<()> {
        let mut root = self.as_element()?;
        if let Some(signer) = signer {
            signer.sign(&mut root, self.standard)?;
        }
        Document::new(root).write_to_file(path)?;
        self.file = Some(path.to_path_buf());
        self.hash = None;
        debug!("wrote CPL {} to {}", self.id, path.display());
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Hash of the CPL file, computed on first demand and cached.
    pub fn hash(&mut self) -> Result<String> {
        if let Some(h) = &self.hash {
            return Ok(h.clone());
        }
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::MiscError("CPL has no file to hash".to_string()))?;
        let hash = make_digest(file, None)?;
        self.hash = Some(hash.clone());
        Ok(hash)
    }

    pub fn standard(&self) -> Standard {
        self.standard
    }

    pub fn annotation_text(&self) -> Option<&str> {
        self.annotation_text.as_deref()
    }

    pub fn set_annotation_text(&mut self, text: &str) {
        self.annotation_text = Some(text.to_string());
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn set_issuer(&mut self, issuer: &str) {
        self.issuer = issuer.to_string();
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn set_creator(&mut self, creator: &str) {
        self.creator = creator.to_string();
    }

    pub fn issue_date(&self) -> &str {
        &self.issue_date
    }

    pub fn set_issue_date(&mut self, date: &str) {
        self.issue_date = date.to_string();
    }

    pub fn content_title_text(&self) -> &str {
        &self.content_title_text
    }

    pub fn set_content_title_text(&mut self, text: &str) {
        self.content_title_text = text.to_string();
    }

    pub fn content_kind(&self) -> &ContentKind {
        &self.content_kind
    }

    pub fn set_content_kind(&mut self, kind: ContentKind) {
        self.content_kind = kind;
    }

    pub fn content_version(&self) -> Option<&ContentVersion> {
        self.content_versions.first()
    }

    pub fn content_versions(&self) -> &[ContentVersion] {
        &self.content_versions
    }

    pub fn set_content_versions(&mut self, versions: Vec<ContentVersion>) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for v in &versions {
            if !seen.insert(v.id.clone()) {
                return Err(Error::DuplicateIdError(format!(
                    "duplicate id {} in ContentVersion list",
                    v.id
                )));
            }
        }
        self.content_versions = versions;
        Ok(())
    }

    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    pub fn set_ratings(&mut self, ratings: Vec<Rating>) {
        self.ratings = ratings;
    }

    pub fn reels(&self) -> &[Reel] {
        &self.reels
    }

    pub fn reels_mut(&mut self) -> &mut [Reel] {
        &mut self.reels
    }

    pub fn add_reel(&mut self, reel: Reel) {
        self.reels.push(reel);
    }

    /// References to every file-backed asset in every reel, in reel order.
    pub fn reel_file_assets(&self) -> Vec<&ReelFileAsset> {
        self.reels.iter().flat_map(|r| r.file_assets()).collect()
    }

    pub fn any_encrypted(&self) -> bool {
        self.reels.iter().any(|r| r.any_encrypted())
    }

    pub fn all_encrypted(&self) -> bool {
        self.reels.iter().all(|r| r.all_encrypted())
    }

    /// Install the keys of `kdm` on every matching asset in our reels.
    pub fn add_kdm(&mut self, kdm: &DecryptedKdm) {
        for reel in &mut self.reels {
            reel.add_kdm(kdm);
        }
    }

    /// Hand every reel the flat asset list for reference resolution.
    pub fn resolve_refs(&mut self, assets: &[AssetRef]) {
        for reel in &mut self.reels {
            reel.resolve_refs(assets);
        }
    }

    pub fn duration(&self) -> i64 {
        self.reels.iter().map(|r| r.duration()).sum()
    }

    pub fn pkl_type(&self, standard: Standard) -> String {
        Cpl::static_pkl_type(standard)
    }

    pub fn static_pkl_type(standard: Standard) -> String {
        match standard {
            Standard::Interop => "text/xml;asdcpKind=CPL".to_string(),
            Standard::Smpte => "text/xml".to_string(),
        }
    }

    pub fn version_number(&self) -> Option<i32> {
        self.version_number
    }

    pub fn set_version_number(&mut self, v: i32) -> Result<()> {
        if v < 0 {
            return Err(Error::BadSettingError(
                "CPL version number cannot be negative".to_string(),
            ));
        }
        self.version_number = Some(v);
        Ok(())
    }

    pub fn unset_version_number(&mut self) {
        self.version_number = None;
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    pub fn full_content_title_text(&self) -> Option<&str> {
        self.full_content_title_text.as_deref()
    }

    pub fn set_full_content_title_text(&mut self, text: &str) {
        self.full_content_title_text = Some(text.to_string());
    }

    pub fn full_content_title_text_language(&self) -> Option<&str> {
        self.full_content_title_text_language.as_deref()
    }

    pub fn set_full_content_title_text_language(&mut self, language: &str) {
        self.full_content_title_text_language = Some(language.to_string());
    }

    pub fn release_territory(&self) -> Option<&str> {
        self.release_territory.as_deref()
    }

    pub fn set_release_territory(&mut self, territory: &str) {
        self.release_territory = Some(territory.to_string());
    }

    pub fn release_territory_scope(&self) -> Option<&str> {
        self.release_territory_scope.as_deref()
    }

    pub fn set_release_territory_scope(&mut self, scope: &str) {
        self.release_territory_scope = Some(scope.to_string());
    }

    pub fn chain(&self) -> Option<&str> {
        self.chain.as_deref()
    }

    pub fn set_chain(&mut self, chain: &str) {
        self.chain = Some(chain.to_string());
    }

    pub fn distributor(&self) -> Option<&str> {
        self.distributor.as_deref()
    }

    pub fn set_distributor(&mut self, distributor: &str) {
        self.distributor = Some(distributor.to_string());
    }

    pub fn facility(&self) -> Option<&str> {
        self.facility.as_deref()
    }

    pub fn set_facility(&mut self, facility: &str) {
        self.facility = Some(facility.to_string());
    }

    pub fn luminance(&self) -> Option<&Luminance> {
        self.luminance.as_ref()
    }

    pub fn set_luminance(&mut self, luminance: Luminance) {
        self.luminance = Some(luminance);
    }

    pub fn main_sound_configuration(&self) -> Option<&MainSoundConfiguration> {
        self.main_sound_configuration.as_ref()
    }

    pub fn set_main_sound_configuration(&mut self, configuration: MainSoundConfiguration) {
        self.main_sound_configuration = Some(configuration);
    }

    pub fn main_sound_sample_rate(&self) -> Option<i64> {
        self.main_sound_sample_rate
    }

    pub fn set_main_sound_sample_rate(&mut self, rate: i64) {
        self.main_sound_sample_rate = Some(rate);
    }

    pub fn main_picture_stored_area(&self) -> Option<Size> {
        self.main_picture_stored_area
    }

    pub fn set_main_picture_stored_area(&mut self, area: Size) {
        self.main_picture_stored_area = Some(area);
    }

    pub fn main_picture_active_area(&self) -> Option<Size> {
        self.main_picture_active_area
    }

    pub fn set_main_picture_active_area(&mut self, area: Size) {
        self.main_picture_active_area = Some(area);
    }

    pub fn additional_subtitle_languages(&self) -> &[String] {
        &self.additional_subtitle_languages
    }

    pub fn set_additional_subtitle_languages(&mut self, languages: Vec<String>) {
        self.additional_subtitle_languages = languages;
    }

    pub fn sign_language_video_language(&self) -> Option<&str> {
        self.sign_language_video_language.as_deref()
    }

    pub fn set_sign_language_video_language(&mut self, language: &str) {
        self.sign_language_video_language = Some(language.to_string());
    }

    pub fn equals(&self, other: &Cpl, opt: &EqualityOptions, note: NoteHandler) -> bool {
        if !opt.cpl_annotation_texts_can_differ && self.annotation_text != other.annotation_text {
            note(
                EqualityNoteType::Error,
                format!(
                    "CPL annotation texts differ: {} vs {}",
                    self.annotation_text.as_deref().unwrap_or(""),
                    other.annotation_text.as_deref().unwrap_or("")
                ),
            );
            return false;
        }
        if self.content_kind != other.content_kind {
            note(EqualityNoteType::Error, "CPL content kinds differ".to_string());
            return false;
        }
        if self.reels.len() != other.reels.len() {
            note(
                EqualityNoteType::Error,
                format!("CPL reel counts differ ({} vs {})", self.reels.len(), other.reels.len()),
            );
            return false;
        }
        for (a, b) in self.reels.iter().zip(&other.reels) {
            if !a.equals(b, opt, note) {
                return false;
            }
        }
        true
    }
}
