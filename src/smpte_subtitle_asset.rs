//! SMPTE subtitles: a `<SubtitleReel>` XML document wrapped in a timed-text MXF, with the
//! id triple that Bv2.1 polices (asset id, container ResourceID, XML id).

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dcp_time::{LocalTime, Time};
use crate::key::Key;
use crate::mxf::{EssenceKind, MxfHeader, MxfReader, MxfWriter};
use crate::subtitle::{parse_subtitles, subtitles_as_xml, Font, LoadFontNode, Subtitle};
use crate::types::{EqualityOptions, Fraction, Standard};
use crate::util::make_uuid;
use crate::xml::{Document, Element};
use crate::{Error, EqualityNoteType, NoteHandler, Result};

const DCST_NS: &str = "http://www.smpte-ra.org/schemas/428-7/2010/DCST";

/// A set of subtitles in the SMPTE dialect.
///
/// Invariants (checked by the verifier rather than enforced blindly on read): the asset id
/// differs from both the container's ResourceID and the XML-internal id, and those two are
/// equal to each other.
#[derive(Debug)]
pub struct SmpteSubtitleAsset {
    id: String,
    file: Option<PathBuf>,
    hash: Option<String>,
    content_title_text: String,
    language: Option<String>,
    annotation_text: Option<String>,
    issue_date: LocalTime,
    reel_number: i32,
    edit_rate: Fraction,
    time_code_rate: i64,
    start_time: Option<Time>,
    intrinsic_duration: i64,
    xml_id: String,
    resource_id: Option<String>,
    subtitles: Vec<Subtitle>,
    load_font_nodes: Vec<LoadFontNode>,
    fonts: Vec<Font>,
    raw_xml: String,
    encrypted: bool,
    key_id: Option<String>,
    key: Option<Key>,
}

impl SmpteSubtitleAsset {
    pub fn new() -> SmpteSubtitleAsset {
        let xml_id = make_uuid();
        SmpteSubtitleAsset {
            id: make_uuid(),
            file: None,
            hash: None,
            content_title_text: String::new(),
            language: None,
            annotation_text: None,
            issue_date: LocalTime::now(),
            reel_number: 1,
            edit_rate: Fraction::new(24, 1),
            time_code_rate: 24,
            start_time: Some(Time::new(0, 0, 0, 0, 24)),
            intrinsic_duration: 0,
            resource_id: Some(xml_id.clone()),
            xml_id,
            subtitles: Vec::new(),
            load_font_nodes: Vec::new(),
            fonts: Vec::new(),
            raw_xml: String::new(),
            encrypted: false,
            key_id: None,
            key: None,
        }
    }

    /// Read from a timed-text MXF. If the container is encrypted and no key has been
    /// installed the XML stays unread; metadata from the container header is still available.
    pub fn from_file(path: &Path) -> Result<SmpteSubtitleAsset> {
        let mut reader = MxfReader::open(path)?;
        if reader.header().kind != EssenceKind::TimedText {
            return Err(Error::MXFFileError(
                "container does not hold timed text".to_string(),
                path.to_path_buf(),
            ));
        }
        let header = reader.header().clone();
        let mut asset = SmpteSubtitleAsset {
            id: make_uuid(),
            file: Some(path.to_path_buf()),
            hash: None,
            content_title_text: String::new(),
            language: header.language.clone(),
            annotation_text: None,
            issue_date: LocalTime::now(),
            reel_number: 1,
            edit_rate: header.edit_rate,
            time_code_rate: header.edit_rate.numerator,
            start_time: None,
            intrinsic_duration: header.intrinsic_duration,
            xml_id: String::new(),
            resource_id: header.resource_id.clone(),
            subtitles: Vec::new(),
            load_font_nodes: Vec::new(),
            fonts: Vec::new(),
            raw_xml: String::new(),
            encrypted: header.encrypted,
            key_id: header.key_id.clone(),
            key: None,
        };
        if !header.encrypted {
            let xml = reader.read_frame(0)?;
            asset.parse_xml(&String::from_utf8_lossy(&xml))?;
            asset.read_fonts(&mut reader, &header.font_ids)?;
        }
        Ok(asset)
    }

    /// The id of the container file (the `AssetUUID`); distinct from [`xml_id`](Self::xml_id).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn content_title_text(&self) -> &str {
        &self.content_title_text
    }

    pub fn set_content_title_text(&mut self, t: &str) {
        self.content_title_text = t.to_string();
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: &str) {
        self.language = Some(language.to_string());
    }

    pub fn annotation_text(&self) -> Option<&str> {
        self.annotation_text.as_deref()
    }

    pub fn issue_date(&self) -> LocalTime {
        self.issue_date
    }

    pub fn set_issue_date(&mut self, t: LocalTime) {
        self.issue_date = t;
    }

    pub fn reel_number(&self) -> i32 {
        self.reel_number
    }

    pub fn set_reel_number(&mut self, n: i32) {
        self.reel_number = n;
    }

    pub fn edit_rate(&self) -> Fraction {
        self.edit_rate
    }

    pub fn set_edit_rate(&mut self, rate: Fraction) {
        self.edit_rate = rate;
    }

    /// Ticks per second used by this asset's subtitle times.
    pub fn time_code_rate(&self) -> i64 {
        self.time_code_rate
    }

    pub fn set_time_code_rate(&mut self, tcr: i64) {
        self.time_code_rate = tcr;
    }

    pub fn start_time(&self) -> Option<Time> {
        self.start_time
    }

    pub fn set_start_time(&mut self, t: Time) {
        self.start_time = Some(t);
    }

    pub fn intrinsic_duration(&self) -> i64 {
        self.intrinsic_duration
    }

    pub fn set_intrinsic_duration(&mut self, d: i64) {
        self.intrinsic_duration = d;
    }

    /// The id inside the XML document.
    pub fn xml_id(&self) -> &str {
        &self.xml_id
    }

    /// The ResourceID of the container, which Bv2.1 requires to equal [`xml_id`](Self::xml_id).
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
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
            uri: Some(format!("urn:uuid:{uuid}")),
        });
        self.fonts.push(Font { load_id: load_id.to_string(), uuid, data });
    }

    pub fn load_font_nodes(&self) -> &[LoadFontNode] {
        &self.load_font_nodes
    }

    pub fn fonts(&self) -> &[Font] {
        &self.fonts
    }

    /// Total size in bytes of all embedded fonts.
    pub fn fonts_size(&self) -> usize {
        self.fonts.iter().map(|f| f.data.len()).sum()
    }

    pub fn raw_xml(&self) -> &str {
        &self.raw_xml
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

    fn parse_xml(&mut self, xml: &str) -> Result<()> {
        let doc = Document::read_string(xml)?;
        let root = doc.root();
        if root.name() != "SubtitleReel" {
            return Err(Error::XMLError(format!(
                "root is <{}>, expecting <SubtitleReel>",
                root.name()
            )));
        }
        if root.namespace_uri() != Some(DCST_NS) {
            debug!("unexpected SubtitleReel namespace {:?}", root.namespace_uri());
        }
        self.xml_id = crate::util::remove_urn_uuid(&root.string_child("Id")?);
        self.content_title_text = root.optional_string_child("ContentTitleText").unwrap_or_default();
        self.annotation_text = root.optional_string_child("AnnotationText");
        if let Some(d) = root.optional_string_child("IssueDate") {
            self.issue_date = LocalTime::from_string(&d)?;
        }
        if let Some(n) = root.optional_number_child::<i32>("ReelNumber")? {
            self.reel_number = n;
        }
        self.language = root.optional_string_child("Language");
        if let Some(er) = root.optional_string_child("EditRate") {
            self.edit_rate = Fraction::from_xml_string(&er)?;
        }
        if let Some(tcr) = root.optional_number_child::<i64>("TimeCodeRate")? {
            self.time_code_rate = tcr;
        }
        self.start_time = match root.optional_string_child("StartTime") {
            Some(s) => Some(Time::from_string(&s, Some(self.time_code_rate))?),
            None => None,
        };
        for node in root.children_named("LoadFont") {
            self.load_font_nodes.push(LoadFontNode {
                id: node.attribute("ID").unwrap_or_default().to_string(),
                uri: Some(node.text()),
            });
        }
        if let Some(list) = root.child("SubtitleList") {
            parse_subtitles(list, Some(self.time_code_rate), None, &mut self.subtitles)?;
        }
        self.raw_xml = xml.to_string();
        Ok(())
    }

    fn read_fonts(&mut self, reader: &mut MxfReader, font_ids: &[String]) -> Result<()> {
        for (i, font_id) in font_ids.iter().enumerate() {
            let data = reader.read_frame(1 + i as i64)?;
            let load_id = self
                .load_font_nodes
                .iter()
                .find(|n| n.uri.as_deref() == Some(&format!("urn:uuid:{font_id}")))
                .map(|n| n.id.clone())
                .unwrap_or_default();
            self.fonts.push(Font { load_id, uuid: font_id.clone(), data });
        }
        Ok(())
    }

    pub fn xml_as_string(&self) -> String {
        let mut root = Element::with_namespace("SubtitleReel", DCST_NS);
        root.add_text_child("Id", &format!("urn:uuid:{}", self.xml_id));
        root.add_text_child("ContentTitleText", &self.content_title_text);
        if let Some(a) = &self.annotation_text {
            root.add_text_child("AnnotationText", a);
        }
        root.add_text_child("IssueDate", &self.issue_date.as_string());
        root.add_text_child("ReelNumber", &self.reel_number.to_string());
        if let Some(l) = &self.language {
            root.add_text_child("Language", l);
        }
        root.add_text_child("EditRate", &self.edit_rate.as_xml_string());
        root.add_text_child("TimeCodeRate", &self.time_code_rate.to_string());
        if let Some(t) = self.start_time {
            root.add_text_child("StartTime", &t.rebase(self.time_code_rate).as_string(Standard::Smpte));
        }
        for node in &self.load_font_nodes {
            let lf = root.add_text_child("LoadFont", node.uri.as_deref().unwrap_or(""));
            lf.set_attribute("ID", &node.id);
        }
        let list = root.add_child("SubtitleList");
        subtitles_as_xml(list, &self.subtitles, self.time_code_rate, Standard::Smpte);
        Document::new(root).serialize()
    }

    /// Write the XML (and fonts) into a timed-text MXF at `path`.
    pub fn write(&mut self, path: &Path) -> Result<()> {
        let mut header = MxfHeader::new(EssenceKind::TimedText, self.edit_rate);
        header.language = self.language.clone();
        header.resource_id = self.resource_id.clone();
        header.encrypted = self.key.is_some();
        if header.encrypted && self.key_id.is_none() {
            self.key_id = Some(make_uuid());
        }
        header.key_id = self.key_id.clone();
        header.font_ids = self.fonts.iter().map(|f| f.uuid.clone()).collect();
        self.encrypted = header.encrypted;

        let xml = self.xml_as_string();
        let mut writer = MxfWriter::create(path, header, self.key, true)?;
        writer.write_frame(xml.as_bytes())?;
        for font in &self.fonts {
            writer.write_frame(&font.data)?;
        }
        let resources = writer.frames_written();
        // the container duration is the declared timeline length, not the resource count
        writer.finalize_with_duration(self.intrinsic_duration)?;
        debug!("wrote SMPTE subtitle asset {} ({} resources)", self.id, resources);
        self.raw_xml = xml;
        self.file = Some(path.to_path_buf());
        self.hash = None;
        Ok(())
    }

    pub fn equals(
        &self,
        other: &SmpteSubtitleAsset,
        opt: &EqualityOptions,
        note: NoteHandler,
    ) -> bool {
        if self.language != other.language {
            note(EqualityNoteType::Error, "subtitle languages differ".to_string());
            return false;
        }
        if self.time_code_rate != other.time_code_rate {
            note(EqualityNoteType::Error, "subtitle time code rates differ".to_string());
            return false;
        }
        if self.start_time != other.start_time {
            note(EqualityNoteType::Error, "subtitle start times differ".to_string());
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

impl Default for SmpteSubtitleAsset {
    fn default() -> SmpteSubtitleAsset {
        SmpteSubtitleAsset::new()
    }
}
