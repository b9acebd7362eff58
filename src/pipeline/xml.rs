//! A small owned element tree built from `quick-xml` events.
//!
//! Slide parts are a few hundred kilobytes at most and the extractor needs
//! random access (a placeholder's geometry lives in a sibling of its text,
//! theme colours are resolved by name), so the pull parser's events are
//! collected into a tree once per part. Element names are stored without
//! their namespace prefix; OOXML producers do not agree on prefixes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Malformed XML, with the parser's message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct XmlError(String);

#[derive(Debug, Clone)]
struct Attr {
    prefixed: bool,
    name: String,
    value: String,
}

/// One element with its attributes, child elements and direct text.
#[derive(Debug, Clone, Default)]
pub struct Element {
    /// Local name, e.g. `sp` for `<p:sp>`.
    pub name: String,
    attrs: Vec<Attr>,
    pub children: Vec<Element>,
    /// Concatenated text nodes directly inside this element.
    pub text: String,
}

impl Element {
    /// Unprefixed attribute by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| !a.prefixed && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Namespaced attribute by local name, e.g. `embed` for `r:embed`.
    pub fn ns_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.prefixed && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Unprefixed attribute parsed as an integer.
    pub fn attr_i64(&self, name: &str) -> Option<i64> {
        self.attr(name).and_then(|v| v.trim().parse().ok())
    }

    /// OOXML boolean attribute (`1`/`true`/`on`).
    pub fn attr_bool(&self, name: &str) -> Option<bool> {
        self.attr(name)
            .map(|v| matches!(v, "1" | "true" | "on"))
    }

    /// First direct child with this local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with this local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a chain of direct children.
    pub fn path(&self, names: &[&str]) -> Option<&Element> {
        names.iter().try_fold(self, |el, name| el.child(name))
    }

    /// First descendant (depth-first, excluding `self`) with this local name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        for c in &self.children {
            if c.name == name {
                return Some(c);
            }
            if let Some(found) = c.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Every descendant with this local name, in document order.
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for c in &self.children {
            if c.name == name {
                out.push(c);
            }
            c.find_all(name, out);
        }
    }
}

/// Parse a complete document and return its root element.
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    // Leading and trailing spaces inside `<a:t>` are significant.
    reader.trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(open_element(e)?),
            Ok(Event::Empty(ref e)) => {
                let el = open_element(e)?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| XmlError("unexpected closing tag".into()))?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| XmlError(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XmlError(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| XmlError("document has no root element".into()))
}

fn open_element(e: &BytesStart<'_>) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError(e.to_string()))?;
        let key = attr.key;
        // Namespace declarations carry no data the extractor needs.
        if key.as_ref() == b"xmlns" || key.as_ref().starts_with(b"xmlns:") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError(e.to_string()))?
            .into_owned();
        attrs.push(Attr {
            prefixed: key.prefix().is_some(),
            name: String::from_utf8_lossy(key.local_name().as_ref()).into_owned(),
            value,
        });
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}
