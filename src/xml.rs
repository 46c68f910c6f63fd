//! A small namespace-aware XML element tree.
//!
//! The DCP schemas are order-sensitive and carry enveloped signatures, so serialization must
//! be deterministic down to the byte: children are written in the order they are held, with
//! two-space indentation and attributes in insertion order. Parsing (via `quick-xml`) records
//! the prefix and namespace of every element so that a parse/serialize round trip of our own
//! output reproduces it exactly.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::{Error, Result};

/// A child of an element: another element, or character data.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One XML element: local name, optional serialization prefix, resolved namespace (when
/// parsed), attributes in document order and children in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    prefix: Option<String>,
    namespace: Option<String>,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
    line: Option<u64>,
}

impl Element {
    /// A new element. `name` may carry a prefix (`meta:Luminance`).
    pub fn new(name: &str) -> Element {
        let (prefix, local) = match name.split_once(':') {
            Some((p, l)) => (Some(p.to_string()), l.to_string()),
            None => (None, name.to_string()),
        };
        Element {
            name: local,
            prefix,
            namespace: None,
            attributes: Vec::new(),
            children: Vec::new(),
            line: None,
        }
    }

    /// A new root element with a default namespace declaration.
    pub fn with_namespace(name: &str, namespace: &str) -> Element {
        let mut e = Element::new(name);
        e.set_attribute("xmlns", namespace);
        e.namespace = Some(namespace.to_string());
        e
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.name),
            None => self.name.clone(),
        }
    }

    /// The namespace this element was parsed in, if it was parsed.
    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// 1-based source line, if this element was parsed from text.
    pub fn line(&self) -> Option<u64> {
        self.line
    }

    /// Declare a namespace on this element and note it as our own, so that signature
    /// subtrees keep their declarations when serialized.
    pub fn declare_namespace(&mut self, uri: &str, prefix: &str) {
        if prefix.is_empty() {
            self.set_attribute("xmlns", uri);
        } else {
            self.set_attribute(&format!("xmlns:{prefix}"), uri);
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name || k.split(':').next_back() == Some(name))
            .map(|(_, v)| v.as_str())
    }

    /// All attributes as written, in document order (namespace declarations included).
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace the whole attribute list, preserving the given order.
    pub fn replace_attributes(&mut self, attributes: Vec<(String, String)>) {
        self.attributes = attributes;
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value.to_string();
        } else {
            self.attributes.push((name.to_string(), value.to_string()));
        }
    }

    /// Append a child element and return a reference to it.
    pub fn add_child(&mut self, name: &str) -> &mut Element {
        self.children.push(Node::Element(Element::new(name)));
        match self.children.last_mut() {
            Some(Node::Element(e)) => e,
            _ => unreachable!(),
        }
    }

    /// Append a child with text content.
    pub fn add_text_child(&mut self, name: &str, text: &str) -> &mut Element {
        let child = self.add_child(name);
        child.set_text(text);
        child
    }

    pub fn add_element(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    pub fn set_text(&mut self, text: &str) {
        self.children.retain(|c| !matches!(c, Node::Text(_)));
        if !text.is_empty() {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    /// Concatenated character data directly under this element.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for c in &self.children {
            if let Node::Text(t) = c {
                out.push_str(t);
            }
        }
        out
    }

    /// All child elements, in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|c| match c {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// All child elements with the given local name.
    pub fn children_named(&self, name: &str) -> Vec<&Element> {
        self.child_elements().filter(|e| e.name == name).collect()
    }

    /// Remove and return the first child element with the given local name.
    pub fn take_child(&mut self, name: &str) -> Option<Element> {
        let index = self.children.iter().position(
            |c| matches!(c, Node::Element(e) if e.name == name),
        )?;
        match self.children.remove(index) {
            Node::Element(e) => Some(e),
            Node::Text(_) => unreachable!(),
        }
    }

    /// Text of a required child element.
    pub fn string_child(&self, name: &str) -> Result<String> {
        self.child(name)
            .map(|e| e.text())
            .ok_or_else(|| Error::XMLError(format!("missing <{}> in <{}>", name, self.name)))
    }

    /// Text of an optional child element.
    pub fn optional_string_child(&self, name: &str) -> Option<String> {
        self.child(name).map(|e| e.text())
    }

    /// Parsed text of a required child element.
    pub fn number_child<T: FromStr>(&self, name: &str) -> Result<T> {
        let text = self.string_child(name)?;
        text.trim()
            .parse()
            .map_err(|_| Error::XMLError(format!("bad value {} for <{}>", text, name)))
    }

    /// Parsed text of an optional child element.
    pub fn optional_number_child<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.child(name) {
            None => Ok(None),
            Some(e) => {
                let text = e.text();
                text.trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| Error::XMLError(format!("bad value {} for <{}>", text, name)))
            }
        }
    }

    fn serialize_into(&self, out: &mut String, indent: usize) {
        for _ in 0..indent {
            out.push_str("  ");
        }
        out.push('<');
        out.push_str(&self.qualified_name());
        for (k, v) in &self.attributes {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        let has_child_elements = self.children.iter().any(|c| matches!(c, Node::Element(_)));
        out.push('>');
        if has_child_elements {
            for child in &self.children {
                match child {
                    Node::Element(e) => {
                        out.push('\n');
                        e.serialize_into(out, indent + 1);
                    }
                    Node::Text(t) => {
                        out.push('\n');
                        for _ in 0..=indent {
                            out.push_str("  ");
                        }
                        out.push_str(&escape(t.as_str()));
                    }
                }
            }
            out.push('\n');
            for _ in 0..indent {
                out.push_str("  ");
            }
        } else {
            out.push_str(&escape(self.text().as_str()));
        }
        out.push_str("</");
        out.push_str(&self.qualified_name());
        out.push('>');
    }

    /// Serialize this element (and subtree) to a string, starting at indent level zero.
    ///
    /// This form is also the canonical input to signature digests.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.serialize_into(&mut out, 0);
        out
    }
}

/// A parsed or constructed document: an XML declaration plus a root element.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn new(root: Element) -> Document {
        Document { root }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn into_root(self) -> Element {
        self.root
    }

    /// Parse a document from a string.
    pub fn read_string(xml: &str) -> Result<Document> {
        let mut reader = NsReader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        // incremental line tracking from byte offsets
        let mut last_offset = 0usize;
        let mut line: u64 = 1;

        loop {
            let offset = reader.buffer_position() as usize;
            if offset > last_offset && offset <= xml.len() {
                line += xml.as_bytes()[last_offset..offset]
                    .iter()
                    .filter(|b| **b == b'\n')
                    .count() as u64;
                last_offset = offset;
            }
            let (resolve, event) = reader
                .read_resolved_event()
                .map_err(|e| Error::XMLError(format!("{e}")))?;
            match event {
                Event::Start(ref start) | Event::Empty(ref start) => {
                    let empty = matches!(event, Event::Empty(_));
                    let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    let prefix = start
                        .name()
                        .prefix()
                        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
                    let namespace = match resolve {
                        ResolveResult::Bound(ns) => {
                            Some(String::from_utf8_lossy(ns.as_ref()).into_owned())
                        }
                        _ => None,
                    };
                    let mut element = Element {
                        name: local,
                        prefix,
                        namespace,
                        attributes: Vec::new(),
                        children: Vec::new(),
                        line: Some(line),
                    };
                    for attr in start.attributes() {
                        let attr = attr.map_err(|e| Error::XMLError(format!("{e}")))?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = unescape(&String::from_utf8_lossy(&attr.value))
                            .map_err(|e| Error::XMLError(format!("{e}")))?
                            .into_owned();
                        element.attributes.push((key, value));
                    }
                    if empty {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(Node::Element(element)),
                            None if root.is_none() => root = Some(element),
                            None => {
                                return Err(Error::XMLError(
                                    "multiple root elements".to_string(),
                                ))
                            }
                        }
                    } else {
                        stack.push(element);
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::XMLError("unbalanced end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None if root.is_none() => root = Some(element),
                        None => {
                            return Err(Error::XMLError("multiple root elements".to_string()))
                        }
                    }
                }
                Event::Text(ref t) => {
                    let raw = String::from_utf8_lossy(t.as_ref()).into_owned();
                    let text = unescape(&raw)
                        .map_err(|e| Error::XMLError(format!("{e}")))?
                        .into_owned();
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(Node::Text(trimmed.to_string()));
                        }
                    }
                }
                Event::CData(ref t) => {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::GeneralRef(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(Error::XMLError("unexpected end of document".to_string()));
        }
        root.map(Document::new)
            .ok_or_else(|| Error::XMLError("no root element".to_string()))
    }

    /// Parse a document from a file.
    pub fn read_file(path: &Path) -> Result<Document> {
        let xml = fs::read_to_string(path).map_err(|e| Error::FileError(e, path.to_path_buf()))?;
        Document::read_string(&xml)
            .map_err(|e| Error::XMLError(format!("{} in {}", e, path.display())))
    }

    /// Serialize with an XML declaration and trailing newline, as written to disk.
    pub fn serialize(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.root.serialize_into(&mut out, 0);
        out.push('\n');
        out
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.serialize()).map_err(|e| Error::FileError(e, path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_serialize() {
        let mut root = Element::with_namespace("Root", "urn:example");
        root.add_text_child("Id", "urn:uuid:abc");
        let list = root.add_child("List");
        list.add_text_child("Item", "a < b & c");
        assert_eq!(
            Document::new(root).serialize(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Root xmlns=\"urn:example\">\n\
             \x20 <Id>urn:uuid:abc</Id>\n\
             \x20 <List>\n\
             \x20   <Item>a &lt; b &amp; c</Item>\n\
             \x20 </List>\n\
             </Root>\n"
        );
    }

    #[test]
    fn parse_round_trip_is_stable() {
        let mut root = Element::with_namespace("Root", "urn:example");
        root.set_attribute("version", "1");
        let child = root.add_child("meta:Child");
        child.set_attribute("scope", "x");
        child.set_text("hello");
        root.add_child("Empty");
        let first = Document::new(root).serialize();
        let reparsed = Document::read_string(&first).unwrap();
        assert_eq!(reparsed.serialize(), first);
    }

    #[test]
    fn namespace_resolution() {
        let doc = Document::read_string(
            "<A xmlns=\"urn:one\"><b:B xmlns:b=\"urn:two\"/><C/></A>",
        )
        .unwrap();
        assert_eq!(doc.root().namespace_uri(), Some("urn:one"));
        assert_eq!(doc.root().child("B").unwrap().namespace_uri(), Some("urn:two"));
        assert_eq!(doc.root().child("C").unwrap().namespace_uri(), Some("urn:one"));
    }

    #[test]
    fn typed_accessors() {
        let doc =
            Document::read_string("<A><N>42</N><S>hi</S><S>there</S></A>").unwrap();
        let root = doc.root();
        assert_eq!(root.number_child::<i64>("N").unwrap(), 42);
        assert_eq!(root.string_child("S").unwrap(), "hi");
        assert_eq!(root.children_named("S").len(), 2);
        assert!(root.string_child("Missing").is_err());
        assert!(root.optional_string_child("Missing").is_none());
    }

    #[test]
    fn line_numbers() {
        let doc = Document::read_string("<A>\n  <B/>\n  <C></C>\n</A>").unwrap();
        assert_eq!(doc.root().child("B").unwrap().line(), Some(2));
        assert_eq!(doc.root().child("C").unwrap().line(), Some(3));
    }

    #[test]
    fn take_child_removes() {
        let mut doc = Document::read_string("<A><B/><C/></A>").unwrap();
        let taken = doc.root_mut().take_child("B");
        assert!(taken.is_some());
        assert!(doc.root().child("B").is_none());
        assert!(doc.root().child("C").is_some());
    }
}
