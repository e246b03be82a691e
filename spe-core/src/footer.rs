//! XML footer of SPE 3.0 files.
//!
//! Version 3.0 stores all capture metadata as an XML document appended after
//! the frame payload. Its absolute position is a u64 in the binary header.
//! The document is parsed into an owned element tree with path lookups that
//! return `Option`, so callers decide what is required and what is optional.

use crate::decoder::SpeError;
use crate::header::{FOOTER_OFFSET_OFFSET, HEADER_SIZE};
use byteorder::{LittleEndian, ReadBytesExt};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Longest text shown per node by [`FooterTree::write_tree`].
const TREE_TEXT_PREVIEW: usize = 48;

/// One XML element with its attributes, text and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    /// Creates an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Local element name (namespace prefix stripped).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of an attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All attributes in document order.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Concatenated text and CDATA content.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Child elements in document order.
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follows a dotted path of child names from this node.
    ///
    /// Each step takes the first matching child. An empty path returns `self`.
    pub fn descend(&self, path: &str) -> Option<&XmlNode> {
        split_path(path).try_fold(self, |node, step| node.child(step))
    }

    /// Follows a dotted path and returns every sibling matching the last step.
    ///
    /// Intermediate steps take the first matching child. The result is empty
    /// when any step is missing.
    pub fn descend_all<'a>(&'a self, path: &'a str) -> Vec<&'a XmlNode> {
        let (parent_path, last) = match path.rsplit_once('.') {
            Some((parent, last)) => (parent, last),
            None => ("", path),
        };
        match self.descend(parent_path) {
            Some(parent) => parent.children_named(last).collect(),
            None => Vec::new(),
        }
    }

    fn write_outline<W: Write>(&self, writer: &mut W, depth: usize) -> io::Result<()> {
        if depth > 0 {
            write!(writer, "{} ", " -->".repeat(depth))?;
        }
        write!(writer, "{}", self.name)?;
        for (key, value) in &self.attributes {
            write!(writer, " {}=\"{}\"", key, value)?;
        }
        let text = self.text.trim();
        if !text.is_empty() {
            if text.chars().count() > TREE_TEXT_PREVIEW {
                let preview: String = text.chars().take(TREE_TEXT_PREVIEW).collect();
                write!(writer, ": {}...", preview)?;
            } else {
                write!(writer, ": {}", text)?;
            }
        }
        writeln!(writer)?;
        for child in &self.children {
            child.write_outline(writer, depth + 1)?;
        }
        Ok(())
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|step| !step.is_empty())
}

/// A parsed XML footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FooterTree {
    root: XmlNode,
}

impl FooterTree {
    /// Parses footer text into an element tree.
    ///
    /// The document must contain exactly one root element.
    pub fn parse(text: &str) -> Result<Self, SpeError> {
        let text = text.trim_start_matches('\u{feff}');
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => {
                    ensure_single_root(&root)?;
                    stack.push(node_from_start(e)?);
                }
                Event::Empty(ref e) => {
                    ensure_single_root(&root)?;
                    let node = node_from_start(e)?;
                    attach(&mut stack, &mut root, node);
                }
                Event::End(_) => {
                    let node = stack.pop().ok_or_else(|| {
                        SpeError::MalformedFooter("unbalanced closing tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, node);
                }
                Event::Text(ref t) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&t.unescape()?);
                    } else if !t.unescape()?.trim().is_empty() {
                        return Err(SpeError::MalformedFooter(
                            "text outside the root element".to_string(),
                        ));
                    }
                }
                Event::CData(ref c) => {
                    let content = std::str::from_utf8(c).map_err(|e| {
                        SpeError::MalformedFooter(format!("invalid CDATA: {}", e))
                    })?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(content);
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, doctype
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(SpeError::MalformedFooter(format!(
                "unclosed element <{}>",
                open.name
            )));
        }

        root.map(|root| Self { root })
            .ok_or_else(|| SpeError::MalformedFooter("document has no root element".to_string()))
    }

    /// The document root element.
    pub fn root(&self) -> &XmlNode {
        &self.root
    }

    /// Looks up a node by dotted path starting with the root name,
    /// e.g. `"SpeFormat.Calibrations.WavelengthMapping"`.
    pub fn lookup(&self, path: &str) -> Option<&XmlNode> {
        let rest = self.strip_root(path)?;
        self.root.descend(rest)
    }

    /// Looks up every sibling matching the last step of a root-based path.
    pub fn lookup_all<'a>(&'a self, path: &'a str) -> Vec<&'a XmlNode> {
        match self.strip_root(path) {
            Some("") => vec![&self.root],
            Some(rest) => self.root.descend_all(rest),
            None => Vec::new(),
        }
    }

    fn strip_root<'a>(&self, path: &'a str) -> Option<&'a str> {
        let (first, rest) = path.split_once('.').unwrap_or((path, ""));
        (first == self.root.name).then_some(rest)
    }

    /// Writes the tree as an indented outline of names, attributes and text.
    pub fn write_tree<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.root.write_outline(writer, 0)
    }
}

impl fmt::Display for FooterTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        self.write_tree(&mut out).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

fn ensure_single_root(root: &Option<XmlNode>) -> Result<(), SpeError> {
    if root.is_some() {
        return Err(SpeError::MalformedFooter(
            "more than one root element".to_string(),
        ));
    }
    Ok(())
}

/// Adds a finished node to its parent, or makes it the root.
fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

fn node_from_start(e: &BytesStart) -> Result<XmlNode, SpeError> {
    let name = std::str::from_utf8(e.local_name().as_ref())
        .map_err(|err| SpeError::MalformedFooter(format!("invalid element name: {}", err)))?
        .to_string();
    let mut node = XmlNode::new(name);

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|err| SpeError::MalformedFooter(format!("invalid attribute name: {}", err)))?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        node.attributes.push((key, value));
    }

    Ok(node)
}

/// Reads the raw footer text of an SPE file.
///
/// The footer offset is read from the header; the footer runs to end of file
/// and must be valid UTF-8. The file is closed before returning.
pub fn read_footer_text<P: AsRef<Path>>(path: P) -> Result<String, SpeError> {
    let mut file = File::open(path.as_ref())?;
    let file_len = file.metadata()?.len();

    if file_len < (FOOTER_OFFSET_OFFSET + 8) as u64 {
        return Err(SpeError::TruncatedHeader { len: file_len });
    }

    file.seek(SeekFrom::Start(FOOTER_OFFSET_OFFSET as u64))?;
    let offset = file.read_u64::<LittleEndian>()?;

    if offset < HEADER_SIZE as u64 || offset >= file_len {
        return Err(SpeError::FooterOutOfBounds { offset, file_len });
    }

    log::debug!("Footer at byte {} ({} bytes)", offset, file_len - offset);

    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::with_capacity((file_len - offset) as usize);
    file.read_to_end(&mut bytes)?;

    Ok(String::from_utf8(bytes)?)
}

/// Reads and parses the XML footer of an SPE file.
pub fn read_footer<P: AsRef<Path>>(path: P) -> Result<FooterTree, SpeError> {
    let text = read_footer_text(path)?;
    FooterTree::parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SpeFormat version="3.0" xmlns="http://www.princetoninstruments.com/spe/2009">
  <DataFormat>
    <DataBlock type="Frame" count="2" pixelFormat="MonochromeUnsigned16" />
  </DataFormat>
  <Calibrations>
    <WavelengthMapping id="1">
      <Wavelength>500.0,500.5,501.0</Wavelength>
    </WavelengthMapping>
  </Calibrations>
  <Notes><![CDATA[a & b]]></Notes>
</SpeFormat>"#;

    #[test]
    fn test_parse_tree_structure() {
        let tree = FooterTree::parse(SAMPLE).unwrap();
        let root = tree.root();
        assert_eq!(root.name(), "SpeFormat");
        assert_eq!(root.attr("version"), Some("3.0"));
        assert_eq!(root.attr("xmlns"), None);
        assert_eq!(root.children().len(), 3);

        let block = tree.lookup("SpeFormat.DataFormat.DataBlock").unwrap();
        assert_eq!(block.attr("count"), Some("2"));
        assert!(block.children().is_empty());
    }

    #[test]
    fn test_lookup_text_and_cdata() {
        let tree = FooterTree::parse(SAMPLE).unwrap();
        let wl = tree
            .lookup("SpeFormat.Calibrations.WavelengthMapping.Wavelength")
            .unwrap();
        assert_eq!(wl.text(), "500.0,500.5,501.0");
        assert_eq!(tree.lookup("SpeFormat.Notes").unwrap().text(), "a & b");
    }

    #[test]
    fn test_lookup_missing_and_wrong_root() {
        let tree = FooterTree::parse(SAMPLE).unwrap();
        assert!(tree.lookup("SpeFormat.DataHistories").is_none());
        assert!(tree.lookup("Other.DataFormat").is_none());
        assert_eq!(tree.lookup("SpeFormat").unwrap().name(), "SpeFormat");
    }

    #[test]
    fn test_lookup_all_siblings() {
        let xml = r#"<Root><List><Item n="1"/><Other/><Item n="2"/><Item n="3"/></List></Root>"#;
        let tree = FooterTree::parse(xml).unwrap();
        let items = tree.lookup_all("Root.List.Item");
        let ns: Vec<_> = items.iter().map(|i| i.attr("n").unwrap()).collect();
        assert_eq!(ns, vec!["1", "2", "3"]);
        assert!(tree.lookup_all("Root.Missing.Item").is_empty());
    }

    #[test]
    fn test_namespace_prefixes_ignored() {
        let xml = r#"<pi:Root xmlns:pi="urn:x"><pi:Child pi:value="7"/></pi:Root>"#;
        let tree = FooterTree::parse(xml).unwrap();
        assert_eq!(tree.lookup("Root.Child").unwrap().attr("value"), Some("7"));
    }

    #[test]
    fn test_escaped_attribute_values() {
        let xml = r#"<Root label="a &lt; b"/>"#;
        let tree = FooterTree::parse(xml).unwrap();
        assert_eq!(tree.root().attr("label"), Some("a < b"));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(FooterTree::parse("").is_err());
        assert!(FooterTree::parse("<Root><Open></Root>").is_err());
        assert!(FooterTree::parse("<Root>").is_err());
        assert!(FooterTree::parse("<A/><B/>").is_err());
        assert!(FooterTree::parse("not xml at all").is_err());

        let err = FooterTree::parse("<Root><Child></Root>").unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_write_tree_outline() {
        let tree = FooterTree::parse(SAMPLE).unwrap();
        let text = tree.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "SpeFormat version=\"3.0\"");
        assert_eq!(lines[1], " --> DataFormat");
        assert!(lines[2].starts_with(" --> --> DataBlock type=\"Frame\""));
        assert!(text.contains(" --> --> --> Wavelength: 500.0,500.5,501.0"));
    }
}
