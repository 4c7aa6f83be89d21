//! Generic markup tree used by the codec and for opaque sub-tree preservation

use std::io::{self, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::DecodeError;

/// A markup element with ordered attributes and children.
///
/// Sub-trees the document model does not understand are carried around as
/// `Element`s and written back untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// `<Name Value="..."/>`, the format's scalar leaf
    pub fn leaf(name: impl Into<String>, value: impl ToString) -> Self {
        Self::new(name).with_attr("Value", value)
    }

    /// `<Name><Manual Value="..."/></Name>`, the format's automatable scalar
    pub fn manual(name: impl Into<String>, value: impl ToString) -> Self {
        Self::new(name).with_child(Self::leaf("Manual", value))
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key, value)),
        }
    }

    /// Remove an attribute, returning its value
    pub fn take_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(k, _)| k == key)?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Remove the first child with this name, returning it
    pub fn take_child(&mut self, name: &str) -> Option<Element> {
        let pos = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(pos))
    }

    /// `Value` attribute of this element
    pub fn value(&self) -> Option<&str> {
        self.attr("Value")
    }

    /// `Value` attribute of the named child
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::value)
    }

    /// `Manual/Value` of this element
    pub fn manual_value(&self) -> Option<&str> {
        self.child_value("Manual")
    }

    /// Follow a chain of child names
    pub fn path(&self, names: &[&str]) -> Option<&Element> {
        names.iter().try_fold(self, |el, name| el.child(name))
    }

    /// Depth-first visit of this element and every descendant
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Element)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

/// Parse markup text into an element tree.
pub fn parse(input: &str) -> Result<Element, DecodeError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event();
        let position = reader.buffer_position() as u64;
        let malformed = |message: String| DecodeError::Malformed { position, message };

        match event.map_err(|e| malformed(e.to_string()))? {
            Event::Start(start) => {
                stack.push(element_from(&start).map_err(|e| malformed(e.to_string()))?);
            }
            Event::Empty(start) => {
                let element = element_from(&start).map_err(|e| malformed(e.to_string()))?;
                attach(&mut stack, &mut root, element).map_err(malformed)?;
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(malformed("unexpected closing tag".into()));
                };
                attach(&mut stack, &mut root, element).map_err(malformed)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| malformed(e.to_string()))?;
                append_text(&mut stack, &text).map_err(malformed)?;
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                append_text(&mut stack, &text).map_err(malformed)?;
            }
            Event::Eof => {
                if let Some(open) = stack.last() {
                    return Err(malformed(format!("unclosed element <{}>", open.name)));
                }
                break;
            }
            _ => {}
        }
    }

    root.ok_or(DecodeError::Malformed {
        position: 0,
        message: "document has no root element".into(),
    })
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, quick_xml::Error> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(format!("second root element <{}>", element.name));
    }
    *root = Some(element);
    Ok(())
}

fn append_text(stack: &mut [Element], text: &str) -> Result<(), String> {
    let Some(top) = stack.last_mut() else {
        return Err("text outside of root element".into());
    };
    top.text.get_or_insert_with(String::new).push_str(text);
    Ok(())
}

/// Serialize an element tree to markup text with an XML declaration.
pub fn write(root: &Element) -> io::Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_element(&mut writer, root)?;
    String::from_utf8(writer.into_inner()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element) -> io::Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_none() {
        return writer.write_event(Event::Empty(start));
    }

    writer.write_event(Event::Start(start))?;
    if let Some(text) = &element.text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_elements() {
        let root = parse(r#"<?xml version="1.0"?><A x="1"><B Value="two"/><C>hi &amp; bye</C></A>"#).unwrap();
        assert_eq!(root.name, "A");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.child_value("B"), Some("two"));
        assert_eq!(root.child("C").unwrap().text.as_deref(), Some("hi & bye"));
    }

    #[test]
    fn test_write_then_parse_is_identity() {
        let tree = Element::new("Root")
            .with_attr("Major", 5)
            .with_child(Element::manual("Volume", 0.5))
            .with_child(Element::leaf("Name", "a \"quoted\" <name>"));
        let text = write(&tree).unwrap();
        assert!(text.starts_with("<?xml"));
        assert_eq!(parse(&text).unwrap(), tree);
    }

    #[test]
    fn test_mismatched_tag_is_malformed() {
        let err = parse("<A><B></A>").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_unclosed_root_is_malformed() {
        let err = parse("<A><B/>").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_path_lookup() {
        let root = parse("<A><B><C Value=\"7\"/></B></A>").unwrap();
        assert_eq!(root.path(&["B", "C"]).and_then(Element::value), Some("7"));
        assert!(root.path(&["B", "D"]).is_none());
    }
}
