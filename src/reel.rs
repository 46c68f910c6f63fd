//! Reels: ordered groupings of synchronized asset references within a CPL.
//!
//! A reel holds *references* — id, timing window, optional hash and key id — which may or may
//! not be resolved to concrete assets. Resolution is an explicit step after the asset map and
//! PKLs have been read.

use std::collections::BTreeMap;

use tracing::debug;

use crate::asset::{Asset, AssetRef};
use crate::dcp_time::Time;
use crate::kdm::DecryptedKdm;
use crate::types::{EqualityOptions, Fraction, Marker, Standard};
use crate::util::{make_uuid, remove_urn_uuid};
use crate::xml::Element;
use crate::{Error, EqualityNoteType, NoteHandler, Result};

/// The reference core shared by every file-backed reel slot.
#[derive(Debug, Clone)]
pub struct ReelFileAsset {
    id: String,
    annotation_text: Option<String>,
    edit_rate: Fraction,
    intrinsic_duration: i64,
    entry_point: Option<i64>,
    duration: Option<i64>,
    hash: Option<String>,
    key_id: Option<String>,
    asset: Option<AssetRef>,
}

impl ReelFileAsset {
    fn from_asset(
        asset: &AssetRef,
        edit_rate: Fraction,
        intrinsic_duration: i64,
        entry_point: i64,
    ) -> ReelFileAsset {
        let borrowed = asset.borrow();
        ReelFileAsset {
            id: borrowed.id().to_string(),
            annotation_text: None,
            edit_rate,
            intrinsic_duration,
            entry_point: Some(entry_point),
            duration: Some(intrinsic_duration - entry_point),
            hash: None,
            key_id: borrowed.key_id(),
            asset: Some(asset.clone()),
        }
    }

    fn from_xml(node: &Element) -> Result<ReelFileAsset> {
        Ok(ReelFileAsset {
            id: remove_urn_uuid(&node.string_child("Id")?),
            annotation_text: node.optional_string_child("AnnotationText"),
            edit_rate: Fraction::from_xml_string(&node.string_child("EditRate")?)?,
            intrinsic_duration: node.number_child("IntrinsicDuration")?,
            entry_point: node.optional_number_child("EntryPoint")?,
            duration: node.optional_number_child("Duration")?,
            hash: node.optional_string_child("Hash"),
            key_id: node.optional_string_child("KeyId").map(|k| remove_urn_uuid(&k)),
            asset: None,
        })
    }

    fn write_head(&self, node: &mut Element) {
        node.add_text_child("Id", &format!("urn:uuid:{}", self.id));
        if let Some(a) = &self.annotation_text {
            node.add_text_child("AnnotationText", a);
        }
        node.add_text_child("EditRate", &self.edit_rate.as_xml_string());
        node.add_text_child("IntrinsicDuration", &self.intrinsic_duration.to_string());
        if let Some(e) = self.entry_point {
            node.add_text_child("EntryPoint", &e.to_string());
        }
        if let Some(d) = self.duration {
            node.add_text_child("Duration", &d.to_string());
        }
        if let Some(k) = &self.key_id {
            node.add_text_child("KeyId", &format!("urn:uuid:{k}"));
        }
        if let Some(h) = &self.hash {
            node.add_text_child("Hash", h);
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn annotation_text(&self) -> Option<&str> {
        self.annotation_text.as_deref()
    }

    pub fn set_annotation_text(&mut self, text: &str) {
        self.annotation_text = Some(text.to_string());
    }

    pub fn edit_rate(&self) -> Fraction {
        self.edit_rate
    }

    pub fn intrinsic_duration(&self) -> i64 {
        self.intrinsic_duration
    }

    pub fn entry_point(&self) -> Option<i64> {
        self.entry_point
    }

    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    /// The presented length: the stated duration, or what remains of the intrinsic duration
    /// after the entry point.
    pub fn actual_duration(&self) -> i64 {
        self.duration
            .unwrap_or(self.intrinsic_duration - self.entry_point.unwrap_or(0))
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn set_hash(&mut self, hash: &str) {
        self.hash = Some(hash.to_string());
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn resolved(&self) -> bool {
        self.asset.is_some()
    }

    pub fn asset(&self) -> Option<AssetRef> {
        self.asset.clone()
    }

    /// Look our id up in `assets`; idempotent.
    pub fn resolve(&mut self, assets: &[AssetRef]) {
        if self.asset.is_some() {
            return;
        }
        for candidate in assets {
            if candidate.borrow().id() == self.id {
                self.asset = Some(candidate.clone());
                return;
            }
        }
        debug!("reel reference {} is unresolved", self.id);
    }

    fn equals(&self, other: &ReelFileAsset, opt: &EqualityOptions, note: NoteHandler) -> bool {
        if self.edit_rate != other.edit_rate {
            note(EqualityNoteType::Error, "reel asset edit rates differ".to_string());
            return false;
        }
        if self.intrinsic_duration != other.intrinsic_duration
            || self.entry_point != other.entry_point
            || self.duration != other.duration
        {
            note(EqualityNoteType::Error, "reel asset timings differ".to_string());
            return false;
        }
        if !opt.reel_hashes_can_differ && self.hash != other.hash {
            note(EqualityNoteType::Error, "reel asset hashes differ".to_string());
            return false;
        }
        match (&self.asset, &other.asset) {
            (Some(a), Some(b)) => a.borrow().equals(&b.borrow(), opt, note),
            _ => true,
        }
    }
}

/// `<MainPicture>` or `<MainStereoscopicPicture>`.
#[derive(Debug, Clone)]
pub struct ReelPictureAsset {
    pub core: ReelFileAsset,
    frame_rate: Fraction,
    screen_aspect_ratio: Option<Fraction>,
    stereoscopic: bool,
}

impl ReelPictureAsset {
    pub fn new(asset: AssetRef, entry_point: i64) -> Result<ReelPictureAsset> {
        let (edit_rate, duration, sar, stereoscopic) = match &*asset.borrow() {
            Asset::MonoPicture(p) => {
                (p.edit_rate(), p.intrinsic_duration(), p.screen_aspect_ratio(), false)
            }
            Asset::StereoPicture(p) => {
                (p.edit_rate(), p.intrinsic_duration(), p.screen_aspect_ratio(), true)
            }
            _ => return Err(Error::MiscError("asset is not a picture".to_string())),
        };
        Ok(ReelPictureAsset {
            core: ReelFileAsset::from_asset(&asset, edit_rate, duration, entry_point),
            frame_rate: edit_rate,
            screen_aspect_ratio: sar,
            stereoscopic,
        })
    }

    fn from_xml(node: &Element, stereoscopic: bool) -> Result<ReelPictureAsset> {
        let core = ReelFileAsset::from_xml(node)?;
        let frame_rate = match node.optional_string_child("FrameRate") {
            Some(f) => Fraction::from_xml_string(&f)?,
            None => core.edit_rate(),
        };
        let screen_aspect_ratio = match node.optional_string_child("ScreenAspectRatio") {
            Some(s) => Fraction::from_xml_string(&s).ok(),
            None => None,
        };
        Ok(ReelPictureAsset { core, frame_rate, screen_aspect_ratio, stereoscopic })
    }

    fn write_to_cpl(&self, parent: &mut Element) {
        let name = if self.stereoscopic { "msp-cpl:MainStereoscopicPicture" } else { "MainPicture" };
        let node = parent.add_child(name);
        if self.stereoscopic {
            node.declare_namespace(
                "http://www.smpte-ra.org/schemas/429-10/2008/Main-Stereo-Picture-CPL",
                "msp-cpl",
            );
        }
        self.core.write_head(node);
        node.add_text_child("FrameRate", &self.frame_rate.as_xml_string());
        if let Some(sar) = self.screen_aspect_ratio {
            node.add_text_child("ScreenAspectRatio", &sar.as_xml_string());
        }
    }

    pub fn frame_rate(&self) -> Fraction {
        self.frame_rate
    }

    pub fn stereoscopic(&self) -> bool {
        self.stereoscopic
    }

    pub fn encrypted(&self) -> bool {
        self.core
            .asset()
            .map(|a| a.borrow().encrypted())
            .unwrap_or(self.core.key_id.is_some())
    }
}

/// `<MainSound>`.
#[derive(Debug, Clone)]
pub struct ReelSoundAsset {
    pub core: ReelFileAsset,
    language: Option<String>,
}

impl ReelSoundAsset {
    pub fn new(asset: AssetRef, entry_point: i64) -> Result<ReelSoundAsset> {
        let (edit_rate, duration, language) = match &*asset.borrow() {
            Asset::Sound(s) => {
                (s.edit_rate(), s.intrinsic_duration(), s.language().map(str::to_string))
            }
            _ => return Err(Error::MiscError("asset is not sound".to_string())),
        };
        Ok(ReelSoundAsset {
            core: ReelFileAsset::from_asset(&asset, edit_rate, duration, entry_point),
            language,
        })
    }

    fn from_xml(node: &Element) -> Result<ReelSoundAsset> {
        Ok(ReelSoundAsset {
            core: ReelFileAsset::from_xml(node)?,
            language: node.optional_string_child("Language"),
        })
    }

    fn write_to_cpl(&self, parent: &mut Element) {
        let node = parent.add_child("MainSound");
        self.core.write_head(node);
        if let Some(l) = &self.language {
            node.add_text_child("Language", l);
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn encrypted(&self) -> bool {
        self.core
            .asset()
            .map(|a| a.borrow().encrypted())
            .unwrap_or(self.core.key_id.is_some())
    }
}

/// `<MainSubtitle>`.
#[derive(Debug, Clone)]
pub struct ReelSubtitleAsset {
    pub core: ReelFileAsset,
    language: Option<String>,
}

impl ReelSubtitleAsset {
    pub fn new(asset: AssetRef, edit_rate: Fraction, intrinsic_duration: i64, entry_point: i64) -> Result<ReelSubtitleAsset> {
        let language = match &*asset.borrow() {
            Asset::InteropSubtitle(s) => s.language().map(str::to_string),
            Asset::SmpteSubtitle(s) => s.language().map(str::to_string),
            _ => return Err(Error::MiscError("asset is not timed text".to_string())),
        };
        Ok(ReelSubtitleAsset {
            core: ReelFileAsset::from_asset(&asset, edit_rate, intrinsic_duration, entry_point),
            language,
        })
    }

    fn from_xml(node: &Element) -> Result<ReelSubtitleAsset> {
        Ok(ReelSubtitleAsset {
            core: ReelFileAsset::from_xml(node)?,
            language: node.optional_string_child("Language"),
        })
    }

    fn write_to_cpl(&self, parent: &mut Element) {
        let node = parent.add_child("MainSubtitle");
        self.core.write_head(node);
        if let Some(l) = &self.language {
            node.add_text_child("Language", l);
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn encrypted(&self) -> bool {
        self.core
            .asset()
            .map(|a| a.borrow().encrypted())
            .unwrap_or(self.core.key_id.is_some())
    }
}

/// `<MainClosedCaption>` (SMPTE) or `<ClosedCaption>` (Interop).
#[derive(Debug, Clone)]
pub struct ReelClosedCaptionAsset {
    pub core: ReelFileAsset,
    language: Option<String>,
}

impl ReelClosedCaptionAsset {
    pub fn new(asset: AssetRef, edit_rate: Fraction, intrinsic_duration: i64, entry_point: i64) -> Result<ReelClosedCaptionAsset> {
        let language = match &*asset.borrow() {
            Asset::InteropSubtitle(s) => s.language().map(str::to_string),
            Asset::SmpteSubtitle(s) => s.language().map(str::to_string),
            _ => return Err(Error::MiscError("asset is not timed text".to_string())),
        };
        Ok(ReelClosedCaptionAsset {
            core: ReelFileAsset::from_asset(&asset, edit_rate, intrinsic_duration, entry_point),
            language,
        })
    }

    fn from_xml(node: &Element) -> Result<ReelClosedCaptionAsset> {
        Ok(ReelClosedCaptionAsset {
            core: ReelFileAsset::from_xml(node)?,
            language: node.optional_string_child("Language"),
        })
    }

    fn write_to_cpl(&self, parent: &mut Element, standard: Standard) {
        let name = match standard {
            Standard::Smpte => "cc-cpl:MainClosedCaption",
            Standard::Interop => "ClosedCaption",
        };
        let node = parent.add_child(name);
        if standard == Standard::Smpte {
            node.declare_namespace("http://www.digicine.com/PROTO-ASDCP-CC-CPL-20070926#", "cc-cpl");
        }
        self.core.write_head(node);
        if let Some(l) = &self.language {
            node.add_text_child("Language", l);
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn encrypted(&self) -> bool {
        self.core
            .asset()
            .map(|a| a.borrow().encrypted())
            .unwrap_or(self.core.key_id.is_some())
    }
}

/// `<AuxData>`.
#[derive(Debug, Clone)]
pub struct ReelAtmosAsset {
    pub core: ReelFileAsset,
}

impl ReelAtmosAsset {
    pub fn new(asset: AssetRef, entry_point: i64) -> Result<ReelAtmosAsset> {
        let (edit_rate, duration) = match &*asset.borrow() {
            Asset::Atmos(a) => (a.edit_rate(), a.intrinsic_duration()),
            _ => return Err(Error::MiscError("asset is not auxiliary data".to_string())),
        };
        Ok(ReelAtmosAsset {
            core: ReelFileAsset::from_asset(&asset, edit_rate, duration, entry_point),
        })
    }

    fn from_xml(node: &Element) -> Result<ReelAtmosAsset> {
        Ok(ReelAtmosAsset { core: ReelFileAsset::from_xml(node)? })
    }

    fn write_to_cpl(&self, parent: &mut Element) {
        let node = parent.add_child("AuxData");
        self.core.write_head(node);
    }

    pub fn encrypted(&self) -> bool {
        self.core
            .asset()
            .map(|a| a.borrow().encrypted())
            .unwrap_or(self.core.key_id.is_some())
    }
}

/// `<MainMarkers>`: not file-backed, the labelled time points live in the CPL itself.
#[derive(Debug, Clone)]
pub struct ReelMarkersAsset {
    id: String,
    edit_rate: Fraction,
    intrinsic_duration: i64,
    markers: BTreeMap<Marker, Time>,
}

impl ReelMarkersAsset {
    pub fn new(edit_rate: Fraction, intrinsic_duration: i64) -> ReelMarkersAsset {
        ReelMarkersAsset {
            id: make_uuid(),
            edit_rate,
            intrinsic_duration,
            markers: BTreeMap::new(),
        }
    }

    fn from_xml(node: &Element) -> Result<ReelMarkersAsset> {
        let edit_rate = Fraction::from_xml_string(&node.string_child("EditRate")?)?;
        let mut markers = BTreeMap::new();
        if let Some(list) = node.child("MarkerList") {
            for m in list.children_named("Marker") {
                let label: Marker = m.string_child("Label")?.parse()?;
                let offset: i64 = m.number_child("Offset")?;
                markers.insert(label, Time::from_editable_units(offset, edit_rate.numerator));
            }
        }
        Ok(ReelMarkersAsset {
            id: remove_urn_uuid(&node.string_child("Id")?),
            edit_rate,
            intrinsic_duration: node.number_child("IntrinsicDuration")?,
            markers,
        })
    }

    fn write_to_cpl(&self, parent: &mut Element) {
        let node = parent.add_child("MainMarkers");
        node.add_text_child("Id", &format!("urn:uuid:{}", self.id));
        node.add_text_child("EditRate", &self.edit_rate.as_xml_string());
        node.add_text_child("IntrinsicDuration", &self.intrinsic_duration.to_string());
        node.add_text_child("EntryPoint", "0");
        node.add_text_child("Duration", &self.intrinsic_duration.to_string());
        if !self.markers.is_empty() {
            let list = node.add_child("MarkerList");
            for (label, time) in &self.markers {
                let marker = list.add_child("Marker");
                marker.add_text_child("Label", label.as_str());
                marker.add_text_child(
                    "Offset",
                    &time.as_editable_units_ceil(self.edit_rate.numerator).to_string(),
                );
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn edit_rate(&self) -> Fraction {
        self.edit_rate
    }

    pub fn intrinsic_duration(&self) -> i64 {
        self.intrinsic_duration
    }

    pub fn actual_duration(&self) -> i64 {
        self.intrinsic_duration
    }

    pub fn set(&mut self, marker: Marker, time: Time) {
        self.markers.insert(marker, time);
    }

    pub fn unset(&mut self, marker: Marker) {
        self.markers.remove(&marker);
    }

    pub fn get(&self) -> &BTreeMap<Marker, Time> {
        &self.markers
    }

    fn equals(&self, other: &ReelMarkersAsset, note: NoteHandler) -> bool {
        if self.markers != other.markers {
            note(EqualityNoteType::Error, "markers differ".to_string());
            return false;
        }
        true
    }
}

/// One reel: at most one of each principal slot, any number of closed captions.
#[derive(Debug, Clone, Default)]
pub struct Reel {
    id: String,
    main_picture: Option<ReelPictureAsset>,
    main_sound: Option<ReelSoundAsset>,
    main_subtitle: Option<ReelSubtitleAsset>,
    main_markers: Option<ReelMarkersAsset>,
    closed_captions: Vec<ReelClosedCaptionAsset>,
    atmos: Option<ReelAtmosAsset>,
}

impl Reel {
    pub fn new() -> Reel {
        Reel { id: make_uuid(), ..Default::default() }
    }

    pub fn from_xml(node: &Element, standard: Standard) -> Result<Reel> {
        let asset_list = node
            .child("AssetList")
            .ok_or_else(|| Error::XMLError("reel has no AssetList".to_string()))?;

        let mut reel = Reel {
            id: remove_urn_uuid(&node.string_child("Id")?),
            ..Default::default()
        };
        if let Some(p) = asset_list.child("MainPicture") {
            reel.main_picture = Some(ReelPictureAsset::from_xml(p, false)?);
        }
        if let Some(p) = asset_list.child("MainStereoscopicPicture") {
            reel.main_picture = Some(ReelPictureAsset::from_xml(p, true)?);
        }
        if let Some(s) = asset_list.child("MainSound") {
            reel.main_sound = Some(ReelSoundAsset::from_xml(s)?);
        }
        if let Some(s) = asset_list.child("MainSubtitle") {
            reel.main_subtitle = Some(ReelSubtitleAsset::from_xml(s)?);
        }
        if let Some(m) = asset_list.child("MainMarkers") {
            reel.main_markers = Some(ReelMarkersAsset::from_xml(m)?);
        }
        // SMPTE names these MainClosedCaption; Interop used ClosedCaption. Tolerate both.
        let mut ccs = asset_list.children_named("MainClosedCaption");
        if ccs.is_empty() {
            ccs = asset_list.children_named("ClosedCaption");
        }
        for cc in ccs {
            reel.closed_captions.push(ReelClosedCaptionAsset::from_xml(cc)?);
        }
        if let Some(a) = asset_list.child("AuxData") {
            reel.atmos = Some(ReelAtmosAsset::from_xml(a)?);
        }
        let _ = standard;
        Ok(reel)
    }

    /// Serialize this reel under `parent`, returning the `<AssetList>` element so that the
    /// first reel of a SMPTE CPL can receive a `<CompositionMetadataAsset>`.
    pub fn write_to_cpl<'a>(&self, parent: &'a mut Element, standard: Standard) -> &'a mut Element {
        let reel = parent.add_child("Reel");
        reel.add_text_child("Id", &format!("urn:uuid:{}", self.id));
        let asset_list = reel.add_child("AssetList");

        if let Some(m) = &self.main_markers {
            m.write_to_cpl(asset_list);
        }
        // mono pictures come before the other essence; stereo pictures after
        if let Some(p) = &self.main_picture {
            if !p.stereoscopic() {
                p.write_to_cpl(asset_list);
            }
        }
        if let Some(s) = &self.main_sound {
            s.write_to_cpl(asset_list);
        }
        if let Some(s) = &self.main_subtitle {
            s.write_to_cpl(asset_list);
        }
        for cc in &self.closed_captions {
            cc.write_to_cpl(asset_list, standard);
        }
        if let Some(p) = &self.main_picture {
            if p.stereoscopic() {
                p.write_to_cpl(asset_list);
            }
        }
        if let Some(a) = &self.atmos {
            a.write_to_cpl(asset_list);
        }
        asset_list
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn main_picture(&self) -> Option<&ReelPictureAsset> {
        self.main_picture.as_ref()
    }

    pub fn main_picture_mut(&mut self) -> Option<&mut ReelPictureAsset> {
        self.main_picture.as_mut()
    }

    pub fn main_sound(&self) -> Option<&ReelSoundAsset> {
        self.main_sound.as_ref()
    }

    pub fn main_sound_mut(&mut self) -> Option<&mut ReelSoundAsset> {
        self.main_sound.as_mut()
    }

    pub fn main_subtitle(&self) -> Option<&ReelSubtitleAsset> {
        self.main_subtitle.as_ref()
    }

    pub fn main_markers(&self) -> Option<&ReelMarkersAsset> {
        self.main_markers.as_ref()
    }

    pub fn main_markers_mut(&mut self) -> Option<&mut ReelMarkersAsset> {
        self.main_markers.as_mut()
    }

    pub fn closed_captions(&self) -> &[ReelClosedCaptionAsset] {
        &self.closed_captions
    }

    pub fn atmos(&self) -> Option<&ReelAtmosAsset> {
        self.atmos.as_ref()
    }

    pub fn set_main_picture(&mut self, asset: ReelPictureAsset) {
        self.main_picture = Some(asset);
    }

    pub fn set_main_sound(&mut self, asset: ReelSoundAsset) {
        self.main_sound = Some(asset);
    }

    pub fn set_main_subtitle(&mut self, asset: ReelSubtitleAsset) {
        self.main_subtitle = Some(asset);
    }

    pub fn set_main_markers(&mut self, asset: ReelMarkersAsset) {
        self.main_markers = Some(asset);
    }

    pub fn add_closed_caption(&mut self, asset: ReelClosedCaptionAsset) {
        self.closed_captions.push(asset);
    }

    pub fn set_atmos(&mut self, asset: ReelAtmosAsset) {
        self.atmos = Some(asset);
    }

    /// References (in CPL order) to every file-backed slot in this reel.
    pub fn file_assets(&self) -> Vec<&ReelFileAsset> {
        let mut out = Vec::new();
        if let Some(p) = &self.main_picture {
            out.push(&p.core);
        }
        if let Some(s) = &self.main_sound {
            out.push(&s.core);
        }
        if let Some(s) = &self.main_subtitle {
            out.push(&s.core);
        }
        for cc in &self.closed_captions {
            out.push(&cc.core);
        }
        if let Some(a) = &self.atmos {
            out.push(&a.core);
        }
        out
    }

    pub fn file_assets_mut(&mut self) -> Vec<&mut ReelFileAsset> {
        let mut out = Vec::new();
        if let Some(p) = &mut self.main_picture {
            out.push(&mut p.core);
        }
        if let Some(s) = &mut self.main_sound {
            out.push(&mut s.core);
        }
        if let Some(s) = &mut self.main_subtitle {
            out.push(&mut s.core);
        }
        for cc in &mut self.closed_captions {
            out.push(&mut cc.core);
        }
        if let Some(a) = &mut self.atmos {
            out.push(&mut a.core);
        }
        out
    }

    /// True iff any slot's container declares encryption.
    pub fn any_encrypted(&self) -> bool {
        self.main_picture.as_ref().map(|a| a.encrypted()).unwrap_or(false)
            || self.main_sound.as_ref().map(|a| a.encrypted()).unwrap_or(false)
            || self.main_subtitle.as_ref().map(|a| a.encrypted()).unwrap_or(false)
            || self.closed_captions.iter().any(|a| a.encrypted())
            || self.atmos.as_ref().map(|a| a.encrypted()).unwrap_or(false)
    }

    pub fn all_encrypted(&self) -> bool {
        self.main_picture.as_ref().map(|a| a.encrypted()).unwrap_or(true)
            && self.main_sound.as_ref().map(|a| a.encrypted()).unwrap_or(true)
            && self.main_subtitle.as_ref().map(|a| a.encrypted()).unwrap_or(true)
            && self.closed_captions.iter().all(|a| a.encrypted())
            && self.atmos.as_ref().map(|a| a.encrypted()).unwrap_or(true)
    }

    /// Install every KDM key whose id matches one of our references.
    pub fn add_kdm(&mut self, kdm: &DecryptedKdm) {
        for key in kdm.keys() {
            for reference in self.file_assets_mut() {
                if reference.key_id() == Some(key.id()) {
                    if let Some(asset) = reference.asset() {
                        asset.borrow_mut().set_key(*key.key());
                        debug!("installed KDM key {} on asset {}", key.id(), reference.id());
                    }
                }
            }
        }
    }

    /// Resolve every reference against `assets`; calling twice is a no-op.
    pub fn resolve_refs(&mut self, assets: &[AssetRef]) {
        for reference in self.file_assets_mut() {
            reference.resolve(assets);
        }
        // Interop subtitles drag their fonts along
        let subtitle_assets: Vec<AssetRef> = self
            .file_assets()
            .iter()
            .filter_map(|r| r.asset())
            .collect();
        for asset in subtitle_assets {
            if let Asset::InteropSubtitle(s) = &mut *asset.borrow_mut() {
                s.resolve_fonts(assets);
            }
        }
    }

    /// The duration of this reel: the main picture's, else the shortest slot present.
    pub fn duration(&self) -> i64 {
        if let Some(p) = &self.main_picture {
            return p.core.actual_duration();
        }
        let mut durations = Vec::new();
        if let Some(s) = &self.main_sound {
            durations.push(s.core.actual_duration());
        }
        if let Some(s) = &self.main_subtitle {
            durations.push(s.core.actual_duration());
        }
        if let Some(m) = &self.main_markers {
            durations.push(m.actual_duration());
        }
        for cc in &self.closed_captions {
            durations.push(cc.core.actual_duration());
        }
        if let Some(a) = &self.atmos {
            durations.push(a.core.actual_duration());
        }
        durations.into_iter().min().unwrap_or(0)
    }

    pub fn equals(&self, other: &Reel, opt: &EqualityOptions, note: NoteHandler) -> bool {
        match (&self.main_picture, &other.main_picture) {
            (Some(a), Some(b)) => {
                if a.stereoscopic() != b.stereoscopic() {
                    note(EqualityNoteType::Error, "2D and 3D pictures compared".to_string());
                    return false;
                }
                if !a.core.equals(&b.core, opt, note) {
                    return false;
                }
            }
            (None, None) => {}
            _ => {
                note(EqualityNoteType::Error, "picture assets differ".to_string());
                return false;
            }
        }
        match (&self.main_sound, &other.main_sound) {
            (Some(a), Some(b)) => {
                if !a.core.equals(&b.core, opt, note) {
                    return false;
                }
            }
            (None, None) => {}
            _ => {
                note(EqualityNoteType::Error, "sound assets differ".to_string());
                return false;
            }
        }
        match (&self.main_subtitle, &other.main_subtitle) {
            (Some(a), Some(b)) => {
                if !a.core.equals(&b.core, opt, note) {
                    return false;
                }
            }
            (None, None) => {}
            _ => {
                note(EqualityNoteType::Error, "subtitle assets differ".to_string());
                return false;
            }
        }
        match (&self.main_markers, &other.main_markers) {
            (Some(a), Some(b)) => {
                if !a.equals(b, note) {
                    return false;
                }
            }
            (None, None) => {}
            _ => {
                note(EqualityNoteType::Error, "one reel has markers and the other does not".to_string());
                return false;
            }
        }
        if self.closed_captions.len() != other.closed_captions.len() {
            note(EqualityNoteType::Error, "closed caption counts differ".to_string());
            return false;
        }
        for (a, b) in self.closed_captions.iter().zip(&other.closed_captions) {
            if !a.core.equals(&b.core, opt, note) {
                return false;
            }
        }
        match (&self.atmos, &other.atmos) {
            (Some(a), Some(b)) => {
                if !a.core.equals(&b.core, opt, note) {
                    return false;
                }
            }
            (None, None) => {}
            _ => {
                note(EqualityNoteType::Error, "atmos assets differ".to_string());
                return false;
            }
        }
        true
    }
}
