//! Minimal element tree built from the feed document.
//!
//! The feed nests values several levels deep (`askingPrice/type`,
//! `photo/url`, `agent/name`) and mixes bare values with structured ones, so
//! the parser works on a small owned tree rather than on raw reader events.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{FeedError, FeedResult};

/// Maximum accepted nesting depth.
const MAX_DEPTH: usize = 64;

/// An element with its concatenated text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn new(name: String) -> Self {
        Self {
            name,
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given local name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of this element, `None` when empty.
    pub fn value(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Trimmed, non-empty text of the named child.
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(XmlNode::value)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Parse a document into its root element.
///
/// Fails on malformed markup, on more than one root element, on stray text
/// outside the root and on a document that ends with unclosed elements.
pub(crate) fn parse_document(xml: &str) -> FeedResult<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            FeedError::format(format!(
                "XML parse error at position {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(ref e) => {
                if root.is_some() {
                    return Err(FeedError::format("document has more than one root element"));
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(FeedError::format("document nesting too deep"));
                }
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(XmlNode::new(name));
            }
            Event::Empty(ref e) => {
                let node = XmlNode::new(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| FeedError::format("unexpected closing tag"))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|err| FeedError::format(format!("invalid text content: {err}")))?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(e) => {
                let bytes = e.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&bytes))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(FeedError::format(format!(
            "unexpected end of document inside <{}>",
            stack.last().map_or("", |n| n.name.as_str())
        )));
    }

    root.ok_or_else(|| FeedError::format("document has no root element"))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> FeedResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        Ok(())
    } else if root.is_some() {
        Err(FeedError::format("document has more than one root element"))
    } else {
        *root = Some(node);
        Ok(())
    }
}

fn push_text(stack: &mut [XmlNode], text: &str) -> FeedResult<()> {
    match stack.last_mut() {
        Some(node) => {
            node.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(FeedError::format("text content outside the root element")),
    }
}
