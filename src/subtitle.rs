//! The in-memory model of timed text: text cues, image cues and fonts, shared by the Interop
//! and SMPTE subtitle assets.

use crate::dcp_time::Time;
use crate::types::Standard;
use crate::xml::Element;
use crate::{Error, Result};

/// Vertical alignment of a subtitle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VAlign {
    Top,
    Center,
    #[default]
    Bottom,
}

impl VAlign {
    pub fn as_str(&self) -> &'static str {
        match self {
            VAlign::Top => "top",
            VAlign::Center => "center",
            VAlign::Bottom => "bottom",
        }
    }

    pub fn from_str_loose(s: &str) -> VAlign {
        match s {
            "top" => VAlign::Top,
            "center" => VAlign::Center,
            _ => VAlign::Bottom,
        }
    }
}

/// One line of timed text.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleText {
    pub text: String,
    pub in_time: Time,
    pub out_time: Time,
    /// Position as a fraction of screen height from the `v_align` edge, 0..1.
    pub v_position: f32,
    pub v_align: VAlign,
    pub font_id: Option<String>,
    pub fade_up: Option<Time>,
    pub fade_down: Option<Time>,
}

/// A bitmap subtitle cue (PNG).
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleImage {
    pub id: String,
    pub in_time: Time,
    pub out_time: Time,
    pub v_position: f32,
    pub v_align: VAlign,
    /// The PNG bytes when embedded (SMPTE), or empty when referenced by URI (Interop).
    pub png: Vec<u8>,
}

/// One cue.
#[derive(Debug, Clone, PartialEq)]
pub enum Subtitle {
    Text(SubtitleText),
    Image(SubtitleImage),
}

impl Subtitle {
    pub fn in_time(&self) -> Time {
        match self {
            Subtitle::Text(t) => t.in_time,
            Subtitle::Image(i) => i.in_time,
        }
    }

    pub fn out_time(&self) -> Time {
        match self {
            Subtitle::Text(t) => t.out_time,
            Subtitle::Image(i) => i.out_time,
        }
    }

    pub fn v_position(&self) -> f32 {
        match self {
            Subtitle::Text(t) => t.v_position,
            Subtitle::Image(i) => i.v_position,
        }
    }

    pub fn v_align(&self) -> VAlign {
        match self {
            Subtitle::Text(t) => t.v_align,
            Subtitle::Image(i) => i.v_align,
        }
    }
}

/// A `<LoadFont>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFontNode {
    pub id: String,
    /// Interop: the sibling file referenced. SMPTE: the URN of an embedded resource.
    pub uri: Option<String>,
}

/// Font data held by a subtitle asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Font {
    pub load_id: String,
    pub uuid: String,
    pub data: Vec<u8>,
}

/// Parse every `<Subtitle>` under `parent` into cues, carrying nested `<Font>` ids down.
pub fn parse_subtitles(
    parent: &Element,
    tcr: Option<i64>,
    font_id: Option<&str>,
    out: &mut Vec<Subtitle>,
) -> Result<()> {
    for child in parent.child_elements() {
        match child.name() {
            "Font" => {
                let id = child.attribute("ID").or_else(|| child.attribute("Id"));
                parse_subtitles(child, tcr, id.or(font_id), out)?;
            }
            "Subtitle" => {
                let in_time = time_attribute(child, "TimeIn", tcr)?;
                let out_time = time_attribute(child, "TimeOut", tcr)?;
                let fade_up = optional_time_attribute(child, "FadeUpTime", tcr)?;
                let fade_down = optional_time_attribute(child, "FadeDownTime", tcr)?;
                parse_cues(child, in_time, out_time, fade_up, fade_down, font_id, out)?;
            }
            _ => parse_subtitles(child, tcr, font_id, out)?,
        }
    }
    Ok(())
}

fn parse_cues(
    subtitle: &Element,
    in_time: Time,
    out_time: Time,
    fade_up: Option<Time>,
    fade_down: Option<Time>,
    font_id: Option<&str>,
    out: &mut Vec<Subtitle>,
) -> Result<()> {
    for node in subtitle.child_elements() {
        match node.name() {
            "Text" => {
                out.push(Subtitle::Text(SubtitleText {
                    text: node.text(),
                    in_time,
                    out_time,
                    v_position: v_position(node),
                    v_align: v_align(node),
                    font_id: font_id.map(|f| f.to_string()),
                    fade_up,
                    fade_down,
                }));
            }
            "Image" => {
                out.push(Subtitle::Image(SubtitleImage {
                    id: crate::util::remove_urn_uuid(node.text().trim()),
                    in_time,
                    out_time,
                    v_position: v_position(node),
                    v_align: v_align(node),
                    png: Vec::new(),
                }));
            }
            "Font" => {
                let id = node.attribute("ID").or_else(|| node.attribute("Id"));
                let inner = id.or(font_id).map(|s| s.to_string());
                // font switch within a subtitle
                for text in node.children_named("Text") {
                    out.push(Subtitle::Text(SubtitleText {
                        text: text.text(),
                        in_time,
                        out_time,
                        v_position: v_position(text),
                        v_align: v_align(text),
                        font_id: inner.clone(),
                        fade_up,
                        fade_down,
                    }));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn v_position(node: &Element) -> f32 {
    node.attribute("VPosition")
        .and_then(|v| v.parse::<f32>().ok())
        .map(|v| v / 100.0)
        .unwrap_or(0.0)
}

fn v_align(node: &Element) -> VAlign {
    node.attribute("VAlign")
        .map(VAlign::from_str_loose)
        .unwrap_or_default()
}

fn time_attribute(node: &Element, name: &str, tcr: Option<i64>) -> Result<Time> {
    let value = node
        .attribute(name)
        .ok_or_else(|| Error::XMLError(format!("<Subtitle> has no {name} attribute")))?;
    Time::from_string(value, tcr)
}

fn optional_time_attribute(node: &Element, name: &str, tcr: Option<i64>) -> Result<Option<Time>> {
    match node.attribute(name) {
        None => Ok(None),
        Some(v) => Time::from_string(v, tcr).map(Some),
    }
}

/// Serialize cues under `parent`, grouping consecutive cues that share a font id beneath one
/// `<Font>` element.
pub fn subtitles_as_xml(parent: &mut Element, subtitles: &[Subtitle], tcr: i64, standard: Standard) {
    let time_string = |t: Time| -> String {
        match standard {
            Standard::Smpte => t.rebase(tcr).as_string(Standard::Smpte),
            Standard::Interop => t.rebase(250).as_string(Standard::Interop),
        }
    };

    let mut spot = 1;
    let mut i = 0;
    while i < subtitles.len() {
        let font_id = match &subtitles[i] {
            Subtitle::Text(t) => t.font_id.clone(),
            Subtitle::Image(_) => None,
        };
        let mut j = i;
        while j < subtitles.len() {
            let next_font = match &subtitles[j] {
                Subtitle::Text(t) => t.font_id.clone(),
                Subtitle::Image(_) => None,
            };
            if next_font != font_id {
                break;
            }
            j += 1;
        }

        let group: &mut Element = if let Some(id) = &font_id {
            let font = parent.add_child("Font");
            font.set_attribute("ID", id);
            font
        } else {
            &mut *parent
        };

        for subtitle in &subtitles[i..j] {
            let node = group.add_child("Subtitle");
            node.set_attribute("SpotNumber", &spot.to_string());
            spot += 1;
            node.set_attribute("TimeIn", &time_string(subtitle.in_time()));
            node.set_attribute("TimeOut", &time_string(subtitle.out_time()));
            match subtitle {
                Subtitle::Text(t) => {
                    if let Some(f) = t.fade_up {
                        node.set_attribute("FadeUpTime", &time_string(f));
                    }
                    if let Some(f) = t.fade_down {
                        node.set_attribute("FadeDownTime", &time_string(f));
                    }
                    let text = node.add_text_child("Text", &t.text);
                    text.set_attribute("VAlign", t.v_align.as_str());
                    text.set_attribute("VPosition", &format!("{}", t.v_position * 100.0));
                }
                Subtitle::Image(image) => {
                    let node = node.add_text_child("Image", &format!("urn:uuid:{}", image.id));
                    node.set_attribute("VAlign", image.v_align.as_str());
                    node.set_attribute("VPosition", &format!("{}", image.v_position * 100.0));
                }
            }
        }
        i = j;
    }
}

/// The end of the last cue.
pub fn latest_subtitle_out(subtitles: &[Subtitle]) -> Option<Time> {
    subtitles.iter().map(|s| s.out_time()).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Document;

    #[test]
    fn parse_text_cues() {
        let doc = Document::read_string(
            "<SubtitleList>\
               <Font ID=\"theFont\">\
                 <Subtitle SpotNumber=\"1\" TimeIn=\"00:00:04:00\" TimeOut=\"00:00:06:00\">\
                   <Text VAlign=\"bottom\" VPosition=\"10\">Hello</Text>\
                   <Text VAlign=\"bottom\" VPosition=\"18\">world</Text>\
                 </Subtitle>\
               </Font>\
             </SubtitleList>",
        )
        .unwrap();
        let mut cues = Vec::new();
        parse_subtitles(doc.root(), Some(24), None, &mut cues).unwrap();
        assert_eq!(cues.len(), 2);
        match &cues[0] {
            Subtitle::Text(t) => {
                assert_eq!(t.text, "Hello");
                assert_eq!(t.font_id.as_deref(), Some("theFont"));
                assert_eq!(t.in_time, Time::new(0, 0, 4, 0, 24));
                assert!((t.v_position - 0.10).abs() < 1e-6);
            }
            _ => panic!("expected text cue"),
        }
    }

    #[test]
    fn serialize_and_reparse() {
        let cues = vec![
            Subtitle::Text(SubtitleText {
                text: "One".to_string(),
                in_time: Time::new(0, 0, 4, 0, 24),
                out_time: Time::new(0, 0, 5, 0, 24),
                v_position: 0.1,
                v_align: VAlign::Bottom,
                font_id: Some("f1".to_string()),
                fade_up: None,
                fade_down: None,
            }),
            Subtitle::Text(SubtitleText {
                text: "Two".to_string(),
                in_time: Time::new(0, 0, 6, 0, 24),
                out_time: Time::new(0, 0, 7, 0, 24),
                v_position: 0.1,
                v_align: VAlign::Bottom,
                font_id: Some("f1".to_string()),
                fade_up: None,
                fade_down: None,
            }),
        ];
        let mut list = Element::new("SubtitleList");
        subtitles_as_xml(&mut list, &cues, 24, Standard::Smpte);
        // both cues share a font, so exactly one Font group
        assert_eq!(list.children_named("Font").len(), 1);

        let doc = Document::read_string(&list.serialize()).unwrap();
        let mut reparsed = Vec::new();
        parse_subtitles(doc.root(), Some(24), None, &mut reparsed).unwrap();
        assert_eq!(reparsed, cues);
    }
}
