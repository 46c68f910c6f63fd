//! Small shared value types: edit-rate fractions, picture sizes, content kinds, channel
//! identities and the other plain data that the CPL and KDM models are built from.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::xml::Element;
use crate::{Error, Result};

/// The two DCP dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Standard {
    /// The legacy PROTO-ASDCP ("Interop") dialect.
    Interop,
    /// The SMPTE 429-family dialect.
    Smpte,
}

/// A rational number, used mainly for edit rates and frame rates.
///
/// The numerator/denominator pair is stored as given and never normalised, since the pair
/// itself is what appears on the wire (`24 1`, `48 1`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: i64,
    pub denominator: i64,
}

impl Fraction {
    pub fn new(numerator: i64, denominator: i64) -> Fraction {
        Fraction { numerator, denominator }
    }

    /// Parse the space-separated XML form, e.g. `24 1`.
    pub fn from_xml_string(s: &str) -> Result<Fraction> {
        let mut parts = s.split_whitespace();
        let n = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| Error::XMLError(format!("bad fraction {s}")))?;
        let d = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| Error::XMLError(format!("bad fraction {s}")))?;
        if d == 0 {
            return Err(Error::XMLError(format!("fraction {s} has a zero denominator")));
        }
        Ok(Fraction::new(n, d))
    }

    /// The space-separated XML form.
    pub fn as_xml_string(&self) -> String {
        format!("{} {}", self.numerator, self.denominator)
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Fraction) -> Option<std::cmp::Ordering> {
        (self.numerator * other.denominator).partial_cmp(&(other.numerator * self.denominator))
    }
}

/// A picture size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Size {
        Size { width, height }
    }

    pub fn ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The default scope URI for `<ContentKind>`; kinds within it omit the `scope` attribute.
pub const CONTENT_KIND_SCOPE: &str =
    "http://www.smpte-ra.org/schemas/429-7/2014/CPL-Metadata#scope/content-kind";

/// What a composition *is*: a feature, a trailer, an advertisement and so on.
///
/// Kinds outside the standard vocabulary carry their defining scope URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKind {
    name: String,
    scope: Option<String>,
}

impl ContentKind {
    pub fn new(name: &str, scope: Option<&str>) -> ContentKind {
        ContentKind {
            name: name.to_string(),
            scope: scope.map(|s| s.to_string()),
        }
    }

    pub fn from_name(name: &str) -> ContentKind {
        ContentKind { name: name.to_lowercase(), scope: None }
    }

    pub fn feature() -> ContentKind {
        ContentKind::from_name("feature")
    }

    pub fn trailer() -> ContentKind {
        ContentKind::from_name("trailer")
    }

    pub fn test() -> ContentKind {
        ContentKind::from_name("test")
    }

    pub fn short() -> ContentKind {
        ContentKind::from_name("short")
    }

    pub fn advertisement() -> ContentKind {
        ContentKind::from_name("advertisement")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope attribute to serialize, if any. The default scope is elided.
    pub fn scope(&self) -> Option<&str> {
        match self.scope.as_deref() {
            Some(CONTENT_KIND_SCOPE) | None => None,
            other => other,
        }
    }
}

/// A `(agency, label)` pair from a CPL `<RatingList>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rating {
    pub agency: String,
    pub label: String,
}

impl Rating {
    pub fn new(agency: &str, label: &str) -> Rating {
        Rating { agency: agency.to_string(), label: label.to_string() }
    }

    pub fn from_xml(node: &Element) -> Result<Rating> {
        Ok(Rating {
            agency: node.string_child("Agency")?,
            label: node.string_child("Label")?,
        })
    }

    pub fn as_xml(&self, parent: &mut Element) {
        let rating = parent.add_child("Rating");
        rating.add_text_child("Agency", &self.agency);
        rating.add_text_child("Label", &self.label);
    }
}

/// One `<ContentVersion>`: an id and a label presented to projectionists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentVersion {
    pub id: String,
    pub label_text: String,
}

impl ContentVersion {
    /// A fresh content version with a URN id and the given label.
    pub fn with_label(label_text: &str) -> ContentVersion {
        ContentVersion {
            id: format!("urn:uuid:{}", crate::util::make_uuid()),
            label_text: label_text.to_string(),
        }
    }

    pub fn new(id: &str, label_text: &str) -> ContentVersion {
        ContentVersion { id: id.to_string(), label_text: label_text.to_string() }
    }

    pub fn from_xml(node: &Element) -> ContentVersion {
        ContentVersion {
            id: node.optional_string_child("Id").unwrap_or_default(),
            label_text: node.optional_string_child("LabelText").unwrap_or_default(),
        }
    }

    pub fn as_xml(&self, parent: &mut Element) {
        let cv = parent.add_child("ContentVersion");
        cv.add_text_child("Id", &self.id);
        cv.add_text_child("LabelText", &self.label_text);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuminanceUnit {
    CandelaPerSquareMetre,
    FootLambert,
}

impl LuminanceUnit {
    fn as_str(&self) -> &'static str {
        match self {
            LuminanceUnit::CandelaPerSquareMetre => "candela-per-square-metre",
            LuminanceUnit::FootLambert => "foot-lambert",
        }
    }
}

impl FromStr for LuminanceUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<LuminanceUnit> {
        match s {
            "candela-per-square-metre" => Ok(LuminanceUnit::CandelaPerSquareMetre),
            "foot-lambert" => Ok(LuminanceUnit::FootLambert),
            _ => Err(Error::XMLError(format!("unrecognised luminance unit {s}"))),
        }
    }
}

/// A screen luminance value with its unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Luminance {
    value: f32,
    unit: LuminanceUnit,
}

impl Luminance {
    /// Construct a luminance; negative values are rejected.
    pub fn new(value: f32, unit: LuminanceUnit) -> Result<Luminance> {
        if value < 0.0 {
            return Err(Error::BadSettingError(format!("luminance {value} is negative")));
        }
        Ok(Luminance { value, unit })
    }

    /// Read from XML. Negative values are accepted here so that the verifier can see them.
    pub fn from_xml(node: &Element) -> Result<Luminance> {
        let unit = node
            .attribute("units")
            .ok_or_else(|| Error::XMLError("Luminance has no units attribute".to_string()))?
            .parse()?;
        let value = node
            .text()
            .parse::<f32>()
            .map_err(|_| Error::XMLError("bad Luminance value".to_string()))?;
        Ok(Luminance { value, unit })
    }

    pub fn as_xml(&self, parent: &mut Element, prefix: &str) {
        let lum = parent.add_child(&format!("{prefix}:Luminance"));
        lum.set_attribute("units", self.unit.as_str());
        lum.set_text(&format!("{}", self.value));
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn unit(&self) -> LuminanceUnit {
        self.unit
    }
}

/// The soundfield token at the front of a `MainSoundConfiguration` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McaSoundField {
    FiveOne,
    SevenOne,
    Other,
}

impl McaSoundField {
    fn as_str(&self) -> &'static str {
        match self {
            McaSoundField::FiveOne => "51",
            McaSoundField::SevenOne => "71",
            McaSoundField::Other => "MC",
        }
    }
}

/// An audio channel identity, named by its MCA tag symbol on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
    Centre,
    Lfe,
    Ls,
    Rs,
    Lss,
    Rss,
    Lrs,
    Rrs,
    /// Hearing-impaired mix.
    Hi,
    /// Visually-impaired narration.
    Vi,
    /// D-BOX motion data.
    MotionData,
    /// FSK sync signal (channel 14 of an Atmos-synced track).
    SyncSignal,
    /// Sign-language video stream.
    SignLanguage,
}

impl Channel {
    pub fn as_token(&self) -> &'static str {
        match self {
            Channel::Left => "L",
            Channel::Right => "R",
            Channel::Centre => "C",
            Channel::Lfe => "LFE",
            Channel::Ls => "Ls",
            Channel::Rs => "Rs",
            Channel::Lss => "Lss",
            Channel::Rss => "Rss",
            Channel::Lrs => "Lrs",
            Channel::Rrs => "Rrs",
            Channel::Hi => "HI",
            Channel::Vi => "VIN",
            Channel::MotionData => "DBOX",
            Channel::SyncSignal => "FSKSync",
            Channel::SignLanguage => "SLVS",
        }
    }

    pub fn from_token(s: &str) -> Result<Channel> {
        Ok(match s {
            "L" => Channel::Left,
            "R" => Channel::Right,
            "C" => Channel::Centre,
            "LFE" => Channel::Lfe,
            "Ls" => Channel::Ls,
            "Rs" => Channel::Rs,
            "Lss" => Channel::Lss,
            "Rss" => Channel::Rss,
            "Lrs" => Channel::Lrs,
            "Rrs" => Channel::Rrs,
            "HI" => Channel::Hi,
            "VIN" => Channel::Vi,
            "DBOX" => Channel::MotionData,
            "FSKSync" => Channel::SyncSignal,
            "SLVS" => Channel::SignLanguage,
            _ => return Err(Error::XMLError(format!("unrecognised channel {s}"))),
        })
    }

    /// 1-based channel slot in a sound MXF, per the conventional ISDCF assignment.
    pub fn mca_channel_id(&self) -> u32 {
        match self {
            Channel::Left => 1,
            Channel::Right => 2,
            Channel::Centre => 3,
            Channel::Lfe => 4,
            Channel::Ls => 5,
            Channel::Rs => 6,
            Channel::Hi => 7,
            Channel::Vi => 8,
            Channel::Lss => 9,
            Channel::Rss => 10,
            Channel::Lrs => 11,
            Channel::Rrs => 12,
            Channel::MotionData => 13,
            Channel::SyncSignal => 14,
            Channel::SignLanguage => 15,
        }
    }
}

/// The `MainSoundConfiguration` string: `<field>/c1,c2,...,cN` with `-` for unnamed slots.
///
/// The serializer writes exactly the slots stored here; it never pads to the channel count of
/// the underlying MXF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainSoundConfiguration {
    pub field: McaSoundField,
    pub channels: Vec<Option<Channel>>,
}

impl MainSoundConfiguration {
    pub fn new(field: McaSoundField, channels: Vec<Option<Channel>>) -> MainSoundConfiguration {
        MainSoundConfiguration { field, channels }
    }
}

impl FromStr for MainSoundConfiguration {
    type Err = Error;

    fn from_str(s: &str) -> Result<MainSoundConfiguration> {
        let (field_str, channels_str) = s
            .split_once('/')
            .ok_or_else(|| Error::XMLError(format!("bad MainSoundConfiguration {s}")))?;
        let field = match field_str {
            "51" => McaSoundField::FiveOne,
            "71" => McaSoundField::SevenOne,
            "MC" => McaSoundField::Other,
            _ => return Err(Error::XMLError(format!("bad MainSoundConfiguration field {field_str}"))),
        };
        let mut channels = Vec::new();
        for token in channels_str.split(',') {
            if token == "-" {
                channels.push(None);
            } else {
                channels.push(Some(Channel::from_token(token)?));
            }
        }
        Ok(MainSoundConfiguration { field, channels })
    }
}

impl fmt::Display for MainSoundConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.field.as_str())?;
        for (i, c) in self.channels.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match c {
                Some(c) => write!(f, "{}", c.as_token())?,
                None => write!(f, "-")?,
            }
        }
        Ok(())
    }
}

/// A CPL marker label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Marker {
    /// First frame of composition.
    Ffoc,
    /// Last frame of composition.
    Lfoc,
    /// First frame of title credits.
    Fftc,
    /// Last frame of title credits.
    Lftc,
    /// First frame of intermission.
    Ffoi,
    /// Last frame of intermission.
    Lfoi,
    /// First frame of end credits.
    Ffec,
    /// Last frame of end credits.
    Lfec,
    /// First frame of moving credits.
    Ffmc,
    /// Last frame of moving credits.
    Lfmc,
    /// First frame of ratings band.
    Ffob,
    /// Last frame of ratings band.
    Lfob,
}

impl Marker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::Ffoc => "FFOC",
            Marker::Lfoc => "LFOC",
            Marker::Fftc => "FFTC",
            Marker::Lftc => "LFTC",
            Marker::Ffoi => "FFOI",
            Marker::Lfoi => "LFOI",
            Marker::Ffec => "FFEC",
            Marker::Lfec => "LFEC",
            Marker::Ffmc => "FFMC",
            Marker::Lfmc => "LFMC",
            Marker::Ffob => "FFOB",
            Marker::Lfob => "LFOB",
        }
    }
}

impl FromStr for Marker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Marker> {
        Ok(match s {
            "FFOC" => Marker::Ffoc,
            "LFOC" => Marker::Lfoc,
            "FFTC" => Marker::Fftc,
            "LFTC" => Marker::Lftc,
            "FFOI" => Marker::Ffoi,
            "LFOI" => Marker::Lfoi,
            "FFEC" => Marker::Ffec,
            "LFEC" => Marker::Lfec,
            "FFMC" => Marker::Ffmc,
            "LFMC" => Marker::Lfmc,
            "FFOB" => Marker::Ffob,
            "LFOB" => Marker::Lfob,
            _ => return Err(Error::XMLError(format!("unrecognised marker {s}"))),
        })
    }
}

/// The status attribute of a CPL `<VersionNumber>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Final,
    Temp,
    PreRelease,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Final => "final",
            Status::Temp => "temp",
            Status::PreRelease => "pre-release",
        }
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Status> {
        match s {
            "final" => Ok(Status::Final),
            "temp" => Ok(Status::Temp),
            "pre-release" => Ok(Status::PreRelease),
            _ => Err(Error::XMLError(format!("unrecognised status {s}"))),
        }
    }
}

/// KDM formulations, controlling which devices a KDM addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formulation {
    ModifiedTransitional1,
    MultipleModifiedTransitional1,
    DciAny,
    DciSpecific,
}

/// Tolerances used by the `equals` family of comparisons.
#[derive(Debug, Clone, Copy)]
pub struct EqualityOptions {
    /// Largest tolerated absolute difference between two corresponding 24-bit audio samples.
    pub max_audio_sample_error: i32,
    /// Allow reel `<Hash>` values to differ.
    pub reel_hashes_can_differ: bool,
    /// Allow `LoadFont` identifiers to differ.
    pub load_font_ids_can_differ: bool,
    /// Allow CPL `<AnnotationText>` values to differ.
    pub cpl_annotation_texts_can_differ: bool,
    /// Allow CPL `<IssueDate>` values to differ.
    pub issue_dates_can_differ: bool,
}

impl Default for EqualityOptions {
    fn default() -> EqualityOptions {
        EqualityOptions {
            max_audio_sample_error: 0,
            reel_hashes_can_differ: false,
            load_font_ids_can_differ: false,
            cpl_annotation_texts_can_differ: false,
            issue_dates_can_differ: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_comparison_cross_multiplies() {
        assert!(Fraction::new(24, 1) < Fraction::new(25, 1));
        assert!(Fraction::new(48, 2) < Fraction::new(25, 1));
        assert_eq!(Fraction::new(24, 1), Fraction::new(24, 1));
        // stored, not normalised
        assert_ne!(Fraction::new(48, 2), Fraction::new(24, 1));
    }

    #[test]
    fn fraction_xml_round_trip() {
        let f = Fraction::from_xml_string("24 1").unwrap();
        assert_eq!(f, Fraction::new(24, 1));
        assert_eq!(f.as_xml_string(), "24 1");
        assert!(Fraction::from_xml_string("24 0").is_err());
        assert!(Fraction::from_xml_string("24").is_err());
    }

    #[test]
    fn main_sound_configuration_round_trip() {
        let msc: MainSoundConfiguration = "51/L,R,C,LFE,-,-".parse().unwrap();
        assert_eq!(msc.field, McaSoundField::FiveOne);
        assert_eq!(
            msc.channels,
            vec![
                Some(Channel::Left),
                Some(Channel::Right),
                Some(Channel::Centre),
                Some(Channel::Lfe),
                None,
                None
            ]
        );
        assert_eq!(msc.to_string(), "51/L,R,C,LFE,-,-");

        let msc: MainSoundConfiguration = "71/L,R,C,LFE,Lss,Rss,Lrs,Rrs,HI,VIN".parse().unwrap();
        assert_eq!(msc.to_string(), "71/L,R,C,LFE,Lss,Rss,Lrs,Rrs,HI,VIN");
    }

    #[test]
    fn bad_main_sound_configuration_rejected() {
        assert!("99/L,R".parse::<MainSoundConfiguration>().is_err());
        assert!("51:L,R".parse::<MainSoundConfiguration>().is_err());
        assert!("51/L,R,XX".parse::<MainSoundConfiguration>().is_err());
    }

    #[test]
    fn marker_names() {
        assert_eq!("FFEC".parse::<Marker>().unwrap(), Marker::Ffec);
        assert_eq!(Marker::Lfoc.as_str(), "LFOC");
        assert!("XXXX".parse::<Marker>().is_err());
    }

    #[test]
    fn negative_luminance_rejected() {
        assert!(Luminance::new(-1.0, LuminanceUnit::FootLambert).is_err());
        assert!(Luminance::new(14.0, LuminanceUnit::FootLambert).is_ok());
    }

    #[test]
    fn content_kind_scope_elision() {
        assert_eq!(ContentKind::feature().scope(), None);
        assert_eq!(ContentKind::new("feature", Some(CONTENT_KIND_SCOPE)).scope(), None);
        let k = ContentKind::new("dance-recital", Some("http://example.com/kinds"));
        assert_eq!(k.scope(), Some("http://example.com/kinds"));
    }
}
