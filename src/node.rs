use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// HTML elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

/// A single `name="value"` pair. Valueless attributes carry an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An element node: tag name, ordered attributes, ordered children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag_name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<ParseNode>,
}

/// One node of a parsed markup tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseNode {
    Text(String),
    Comment(String),
    Element(Element),
}

impl ParseNode {
    pub fn text(content: impl Into<String>) -> Self {
        ParseNode::Text(content.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            ParseNode::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Serialize this node back to markup.
    pub fn outer_markup(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out);
        out
    }

    fn write_markup(&self, out: &mut String) {
        match self {
            ParseNode::Text(t) => out.push_str(t),
            ParseNode::Comment(c) => {
                let _ = write!(out, "<!--{}-->", c);
            }
            ParseNode::Element(el) => el.write_markup(out),
        }
    }

    fn write_text(&self, out: &mut String) {
        match self {
            ParseNode::Text(t) => out.push_str(t),
            ParseNode::Comment(_) => {}
            ParseNode::Element(el) => {
                for child in &el.children {
                    child.write_text(out);
                }
            }
        }
    }
}

impl From<Element> for ParseNode {
    fn from(el: Element) -> Self {
        ParseNode::Element(el)
    }
}

impl Element {
    pub fn new(
        tag_name: impl Into<String>,
        attributes: Vec<Attribute>,
        children: Vec<ParseNode>,
    ) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes,
            children,
        }
    }

    /// Build an element carrying a single `class` attribute.
    pub fn with_class(
        tag_name: impl Into<String>,
        class: impl Into<String>,
        children: Vec<ParseNode>,
    ) -> Self {
        Self::new(tag_name, vec![Attribute::new("class", class)], children)
    }

    /// Attribute lookup. Names compare ASCII case-insensitively, as in HTML.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// True when the space-separated `class` attribute contains `token`.
    pub fn has_class(&self, token: &str) -> bool {
        self.attribute("class")
            .map(|classes| classes.split(' ').any(|c| c == token))
            .unwrap_or(false)
    }

    /// Direct children that are elements.
    pub fn element_children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(ParseNode::as_element)
    }

    /// Children serialized back to markup.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_markup(&mut out);
        }
        out
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_text(&mut out);
        }
        out
    }

    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag_name);
        out.push_str(&attributes_markup(&self.attributes));
        out.push('>');
        if is_void_element(&self.tag_name) {
            return;
        }
        for child in &self.children {
            child.write_markup(out);
        }
        let _ = write!(out, "</{}>", self.tag_name);
    }
}

/// ` name="value"` for every attribute, in order, values verbatim.
pub fn attributes_markup(attributes: &[Attribute]) -> String {
    let mut out = String::new();
    for attr in attributes {
        let _ = write!(out, " {}=\"{}\"", attr.name, attr.value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Element {
        Element::new(
            "div",
            vec![Attribute::new("class", "card wide"), Attribute::new("id", "x")],
            vec![
                ParseNode::text("Hello "),
                Element::new("b", vec![], vec![ParseNode::text("world")]).into(),
                ParseNode::Comment(" note ".to_string()),
                Element::new("br", vec![], vec![]).into(),
            ],
        )
    }

    #[test]
    fn inner_markup_round_trips_children() {
        assert_eq!(
            sample().inner_markup(),
            "Hello <b>world</b><!-- note --><br>"
        );
    }

    #[test]
    fn outer_markup_keeps_attribute_order() {
        let node = ParseNode::Element(sample());
        assert!(node
            .outer_markup()
            .starts_with(r#"<div class="card wide" id="x">"#));
        assert!(node.outer_markup().ends_with("</div>"));
    }

    #[test]
    fn text_content_skips_comments() {
        assert_eq!(sample().text_content(), "Hello world");
    }

    #[test]
    fn class_tokens() {
        let el = sample();
        assert!(el.has_class("wide"));
        assert!(!el.has_class("wid"));
        assert_eq!(el.attribute("ID"), Some("x"));
    }
}
