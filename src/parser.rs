use crate::error::MhtmlResult;
use crate::node::{is_void_element, Attribute, Element, ParseNode};

/// Elements whose content is kept as a single raw text child.
const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script", "textarea"];

/// Turns a markup string into an ordered list of top-level nodes.
pub trait TreeProvider: Send + Sync {
    fn parse(&self, markup: &str) -> MhtmlResult<Vec<ParseNode>>;
}

/// Lenient HTML-ish tree builder. Never fails: stray close tags are ignored and
/// unclosed elements are closed at end of input.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupParser;

impl TreeProvider for MarkupParser {
    fn parse(&self, markup: &str) -> MhtmlResult<Vec<ParseNode>> {
        Ok(parse_markup(markup))
    }
}

/// Parse markup with the default [`MarkupParser`] rules.
pub fn parse_markup(markup: &str) -> Vec<ParseNode> {
    let mut cursor = Cursor { src: markup, pos: 0 };
    let mut builder = TreeBuilder::default();

    while !cursor.at_end() {
        let rest = cursor.rest();

        if rest.starts_with("<!--") {
            cursor.advance(4);
            let body = cursor.take_until("-->");
            builder.push(ParseNode::Comment(body.to_string()));
            cursor.advance(3.min(cursor.rest().len()));
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            // doctype / processing instruction
            cursor.take_until(">");
            cursor.advance(1.min(cursor.rest().len()));
            continue;
        }

        if rest.starts_with("</") && starts_tag_name(&rest[2..]) {
            cursor.advance(2);
            let name = cursor.take_while(|c| !c.is_whitespace() && c != '>');
            cursor.take_until(">");
            cursor.advance(1.min(cursor.rest().len()));
            builder.close(name);
            continue;
        }

        if rest.starts_with('<') && starts_tag_name(&rest[1..]) {
            cursor.advance(1);
            let (element, self_closing) = read_open_tag(&mut cursor);
            let tag = element.tag_name.to_ascii_lowercase();

            if self_closing || is_void_element(&tag) {
                builder.push(element.into());
            } else if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                let mut element = element;
                let text = read_raw_text(&mut cursor, &tag);
                if !text.is_empty() {
                    element.children.push(ParseNode::text(text));
                }
                builder.push(element.into());
            } else {
                builder.open(element);
            }
            continue;
        }

        // Text runs to the next '<'; a '<' that starts no tag is literal text.
        let start = cursor.pos;
        cursor.advance(rest.chars().next().map(char::len_utf8).unwrap_or(1));
        cursor.take_until("<");
        builder.push(ParseNode::text(&markup[start..cursor.pos]));
    }

    builder.finish()
}

fn starts_tag_name(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Reads `name attr="v" ...>` after the opening `<`. Returns the element and
/// whether it was written self-closing (`/>`).
fn read_open_tag(cursor: &mut Cursor) -> (Element, bool) {
    let name = cursor
        .take_while(|c| !c.is_whitespace() && c != '/' && c != '>')
        .to_string();
    let mut attributes = Vec::new();
    let mut self_closing = false;

    loop {
        cursor.skip_ws();
        let rest = cursor.rest();
        if rest.is_empty() {
            break;
        }
        if rest.starts_with("/>") {
            cursor.advance(2);
            self_closing = true;
            break;
        }
        if rest.starts_with('>') {
            cursor.advance(1);
            break;
        }
        if rest.starts_with('/') {
            cursor.advance(1);
            continue;
        }

        let attr_name = cursor
            .take_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/')
            .to_string();
        if attr_name.is_empty() {
            // lone '=' or similar junk
            cursor.advance(1);
            continue;
        }
        cursor.skip_ws();
        let mut value = String::new();
        if cursor.rest().starts_with('=') {
            cursor.advance(1);
            cursor.skip_ws();
            value = read_attribute_value(cursor);
        }
        attributes.push(Attribute {
            name: attr_name,
            value,
        });
    }

    (Element::new(name, attributes, Vec::new()), self_closing)
}

fn read_attribute_value(cursor: &mut Cursor) -> String {
    match cursor.rest().chars().next() {
        Some(quote @ ('"' | '\'')) => {
            cursor.advance(1);
            let value = cursor.take_while(|c| c != quote).to_string();
            cursor.advance(1.min(cursor.rest().len()));
            value
        }
        _ => cursor
            .take_while(|c| !c.is_whitespace() && c != '>')
            .to_string(),
    }
}

/// Content of a raw-text element up to its (case-insensitive) close tag.
fn read_raw_text<'a>(cursor: &mut Cursor<'a>, tag: &str) -> &'a str {
    let rest = cursor.rest();
    let needle = format!("</{}", tag);
    let end = rest
        .to_ascii_lowercase()
        .find(&needle)
        .unwrap_or(rest.len());
    let text = &rest[..end];
    cursor.advance(end);
    if !cursor.at_end() {
        cursor.take_until(">");
        cursor.advance(1.min(cursor.rest().len()));
    }
    text
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn advance(&mut self, bytes: usize) {
        self.pos += bytes;
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn take_until(&mut self, needle: &str) -> &'a str {
        let rest = self.rest();
        let end = rest.find(needle).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn skip_ws(&mut self) {
        self.take_while(char::is_whitespace);
    }
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Element>,
    roots: Vec<ParseNode>,
}

impl TreeBuilder {
    fn push(&mut self, node: ParseNode) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }

    fn open(&mut self, element: Element) {
        self.stack.push(element);
    }

    /// Close the innermost open element named `tag`, implicitly closing
    /// anything opened after it. Unmatched close tags are ignored.
    fn close(&mut self, tag: &str) {
        let Some(idx) = self
            .stack
            .iter()
            .rposition(|el| el.tag_name.eq_ignore_ascii_case(tag))
        else {
            return;
        };
        while self.stack.len() > idx {
            if let Some(el) = self.stack.pop() {
                self.push(el.into());
            }
        }
    }

    fn finish(mut self) -> Vec<ParseNode> {
        while let Some(el) = self.stack.pop() {
            self.push(el.into());
        }
        self.roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(node: &ParseNode) -> &Element {
        node.as_element().expect("element node")
    }

    #[test]
    fn nested_elements_and_text() {
        let nodes = parse_markup("<p>Hello <b>you</b></p>tail");
        assert_eq!(nodes.len(), 2);
        let p = el(&nodes[0]);
        assert_eq!(p.tag_name, "p");
        assert_eq!(p.children.len(), 2);
        assert_eq!(nodes[1], ParseNode::text("tail"));
    }

    #[test]
    fn attribute_forms_and_order() {
        let nodes = parse_markup(r#"<input b='2' a="1" c=3 disabled>"#);
        let input = el(&nodes[0]);
        let names: Vec<_> = input.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c", "disabled"]);
        assert_eq!(input.attribute("c"), Some("3"));
        assert_eq!(input.attribute("disabled"), Some(""));
        assert!(input.children.is_empty());
    }

    #[test]
    fn quoted_values_may_contain_angle_brackets() {
        let nodes = parse_markup(r#"<if c="a < b && b > 1">x</if>"#);
        assert_eq!(el(&nodes[0]).attribute("c"), Some("a < b && b > 1"));
    }

    #[test]
    fn self_closing_directive_is_a_leaf() {
        let nodes = parse_markup("<p>A</p><halt/><p>B</p>");
        assert_eq!(nodes.len(), 3);
        assert!(el(&nodes[1]).children.is_empty());
    }

    #[test]
    fn style_content_is_raw() {
        let nodes = parse_markup("<style>each > p { color: red }</style><p>x</p>");
        let style = el(&nodes[0]);
        assert_eq!(style.text_content(), "each > p { color: red }");
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn stray_and_missing_close_tags() {
        let nodes = parse_markup("</nope><div><span>x</div>y");
        assert_eq!(nodes.len(), 2);
        let div = el(&nodes[0]);
        assert_eq!(div.inner_markup(), "<span>x</span>");
        assert_eq!(nodes[1], ParseNode::text("y"));

        let unclosed = parse_markup("<div><p>open");
        assert_eq!(unclosed[0].outer_markup(), "<div><p>open</p></div>");
    }

    #[test]
    fn comments_and_literal_angle_brackets() {
        let nodes = parse_markup("<!-- hi -->1 < 2<!doctype html>");
        assert_eq!(nodes[0], ParseNode::Comment(" hi ".to_string()));
        let text: String = nodes[1..]
            .iter()
            .map(ParseNode::outer_markup)
            .collect();
        assert_eq!(text, "1 < 2");
    }

    #[test]
    fn multibyte_text_survives() {
        let nodes = parse_markup("<p>Olá — mundo</p>");
        assert_eq!(el(&nodes[0]).text_content(), "Olá — mundo");
    }
}
