//! Minimal XML tree on top of quick-xml events.

use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Writer};

use crate::error::SourceError;

#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub declaration: Option<BytesDecl<'static>>,
    pub doctype: Option<String>,
    /// Comments and processing instructions before the root element.
    pub prolog: Vec<XmlNode>,
    pub root: XmlElement,
    /// Comments and processing instructions after the root element.
    pub epilog: Vec<XmlNode>,
}

/// Attributes keep their document order.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `p:person`.
    pub name: String,
    /// Namespace URI the element name resolves to.
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
    /// Target and content, e.g. `xml-stylesheet href="a.xsl"`.
    ProcessingInstruction(String),
}

impl XmlElement {
    /// Name without its prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: String) {
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// First text child.
    pub fn text(&self) -> Option<&str> {
        self.children.iter().find_map(|child| match child {
            XmlNode::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn set_text(&mut self, value: String) {
        let slot = self.children.iter_mut().find_map(|child| match child {
            XmlNode::Text(text) => Some(text),
            _ => None,
        });
        match slot {
            Some(text) => *text = value,
            None => self.children.push(XmlNode::Text(value)),
        }
    }

    /// Child elements with their index in `children`.
    pub fn elements(&self) -> impl Iterator<Item = (usize, &XmlElement)> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(index, child)| match child {
                XmlNode::Element(element) => Some((index, element)),
                _ => None,
            })
    }

    pub fn element_at(&self, path: &[usize]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |element, &index| match element.children.get(index) {
            Some(XmlNode::Element(child)) => Some(child),
            _ => None,
        })
    }

    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        path.iter()
            .try_fold(self, |element, &index| match element.children.get_mut(index) {
                Some(XmlNode::Element(child)) => Some(child),
                _ => None,
            })
    }
}

pub fn parse_document(data: &[u8]) -> Result<XmlDocument, SourceError> {
    let mut reader = NsReader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut declaration = None;
    let mut doctype = None;
    let mut prolog = Vec::new();
    let mut root = None;
    let mut epilog = Vec::new();
    let mut buf = Vec::new();
    loop {
        let (resolved, event) = reader.read_resolved_event_into(&mut buf).map_err(xml_error)?;
        let namespace = namespace_uri(resolved);
        match event {
            Event::Decl(decl) if root.is_none() => declaration = Some(decl.into_owned()),
            Event::DocType(text) if root.is_none() => {
                doctype = Some(String::from_utf8_lossy(&text).trim().to_string());
            }
            Event::Start(start) if root.is_none() => {
                let mut element = open_element(&start, namespace)?;
                element.children = parse_children(&mut reader)?;
                root = Some(element);
            }
            Event::Empty(start) if root.is_none() => root = Some(open_element(&start, namespace)?),
            Event::Comment(_) | Event::PI(_) => {
                if let Some(node) = markup_node(&event) {
                    match root {
                        None => prolog.push(node),
                        Some(_) => epilog.push(node),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let root = root.ok_or_else(|| SourceError::Xml("document has no root element".to_string()))?;
    Ok(XmlDocument {
        declaration,
        doctype,
        prolog,
        root,
        epilog,
    })
}

fn parse_children(reader: &mut NsReader<&[u8]>) -> Result<Vec<XmlNode>, SourceError> {
    let mut children = Vec::new();
    let mut buf = Vec::new();
    loop {
        let (resolved, event) = reader.read_resolved_event_into(&mut buf).map_err(xml_error)?;
        let namespace = namespace_uri(resolved);
        match event {
            Event::Start(start) => {
                let mut element = open_element(&start, namespace)?;
                element.children = parse_children(reader)?;
                children.push(XmlNode::Element(element));
            }
            Event::Empty(start) => {
                children.push(XmlNode::Element(open_element(&start, namespace)?));
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?;
                if !text.trim().is_empty() {
                    children.push(XmlNode::Text(text.into_owned()));
                }
            }
            Event::CData(data) => {
                children.push(XmlNode::Text(
                    String::from_utf8_lossy(&data.into_inner()).into_owned(),
                ));
            }
            Event::Comment(_) | Event::PI(_) => children.extend(markup_node(&event)),
            Event::End(_) => return Ok(children),
            Event::Eof => {
                return Err(SourceError::Xml("unexpected end of document".to_string()));
            }
            _ => {}
        }
        buf.clear();
    }
}

fn namespace_uri(resolved: ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(namespace) => {
            Some(String::from_utf8_lossy(namespace.into_inner()).into_owned())
        }
        ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
    }
}

fn markup_node(event: &Event<'_>) -> Option<XmlNode> {
    match event {
        Event::Comment(text) => Some(XmlNode::Comment(String::from_utf8_lossy(text).into_owned())),
        Event::PI(pi) => Some(XmlNode::ProcessingInstruction(
            String::from_utf8_lossy(pi).into_owned(),
        )),
        _ => None,
    }
}

fn open_element(
    start: &BytesStart<'_>,
    namespace: Option<String>,
) -> Result<XmlElement, SourceError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(xml_error)?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        namespace,
        attributes,
        children: Vec::new(),
    })
}

/// Serialize with a two-space indent and a trailing newline.
pub fn write_document(document: &XmlDocument) -> Result<Vec<u8>, SourceError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    if let Some(declaration) = &document.declaration {
        writer
            .write_event(Event::Decl(declaration.clone()))
            .map_err(xml_error)?;
    }
    if let Some(doctype) = &document.doctype {
        writer
            .write_event(Event::DocType(BytesText::from_escaped(doctype.as_str())))
            .map_err(xml_error)?;
    }
    for node in &document.prolog {
        write_node(&mut writer, node)?;
    }
    write_element(&mut writer, &document.root)?;
    for node in &document.epilog {
        write_node(&mut writer, node)?;
    }
    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<(), SourceError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(xml_error);
    }
    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_error)
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), SourceError> {
    let event = match node {
        XmlNode::Element(element) => return write_element(writer, element),
        XmlNode::Text(text) => Event::Text(BytesText::new(text)),
        XmlNode::Comment(text) => Event::Comment(BytesText::from_escaped(text.as_str())),
        XmlNode::ProcessingInstruction(content) => Event::PI(BytesPI::new(content.as_str())),
    };
    writer.write_event(event).map_err(xml_error)
}

fn xml_error(err: impl std::fmt::Display) -> SourceError {
    SourceError::Xml(err.to_string())
}
