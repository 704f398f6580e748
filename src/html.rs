//! HTML bridge: html5ever parse into the arena document, and a small
//! serializer back to markup.

use std::path::Path;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use crate::dom::{Document, NodeData, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "noscript"];

#[derive(Debug)]
pub enum HtmlError {
    Io(std::io::Error),
}

impl std::fmt::Display for HtmlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HtmlError::Io(e) => write!(f, "html read error: {e}"),
        }
    }
}

impl std::error::Error for HtmlError {}

impl From<std::io::Error> for HtmlError {
    fn from(e: std::io::Error) -> Self {
        HtmlError::Io(e)
    }
}

/// Parse a full HTML document. Malformed markup is repaired, never rejected.
pub fn parse_html(html: &str) -> Document {
    let dom = parse_document(RcDom::default(), Default::default()).one(html);
    let mut doc = Document::new();
    let root = doc.root();
    for child in dom.document.children.borrow().iter() {
        import(child, &mut doc, root);
    }
    doc
}

pub fn parse_html_file(path: &Path) -> Result<Document, HtmlError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_html(&content))
}

fn import(handle: &Handle, doc: &mut Document, parent: NodeId) {
    let id = match &handle.data {
        RcNodeData::Element { name, attrs, .. } => {
            let element = doc.create_element(&name.local);
            for attr in attrs.borrow().iter() {
                doc.set_attribute(element, &attr.name.local, &attr.value);
            }
            element
        }
        RcNodeData::Text { contents } => doc.create_text(&contents.borrow()),
        RcNodeData::Comment { contents } => doc.create_comment(contents),
        _ => return,
    };
    doc.append_child(parent, id);
    for child in handle.children.borrow().iter() {
        import(child, doc, id);
    }
}

/// Serialize `node` and its subtree. Pass `doc.root()` for the whole page.
pub fn to_html(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, node, false, &mut out);
    out
}

fn write_node(doc: &Document, node: NodeId, raw_text: bool, out: &mut String) {
    match doc.data(node) {
        NodeData::Document => {
            out.push_str("<!DOCTYPE html>");
            for &child in doc.children(node) {
                write_node(doc, child, false, out);
            }
        }
        NodeData::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attribute(value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&tag.as_str());
            for &child in doc.children(node) {
                write_node(doc, child, raw, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeData::Text(text) if raw_text => out.push_str(text),
        NodeData::Text(text) => out.push_str(&escape_text(text)),
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\u{a0}', "&nbsp;")
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('\u{a0}', "&nbsp;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_into_body_with_text() {
        let doc = parse_html("<p class=lead>Breaking <b>News</b></p>");
        let body = doc.first_element_by_tag("body").unwrap();
        assert_eq!(doc.text_content(body), "Breaking News");
        let p = doc.first_element_by_tag("p").unwrap();
        assert_eq!(doc.attribute(p, "class"), Some("lead"));
    }

    #[test]
    fn serializer_escapes_text_but_not_scripts() {
        let doc = parse_html("<p>Tom &amp; Jerry &lt;3</p><script>if (a < b) {}</script>");
        let html = to_html(&doc, doc.root());
        assert!(html.contains("<p>Tom &amp; Jerry &lt;3</p>"));
        assert!(html.contains("<script>if (a < b) {}</script>"));
        assert!(html.starts_with("<!DOCTYPE html><html>"));
    }

    #[test]
    fn void_elements_have_no_closing_tag() {
        let doc = parse_html("<p>a<br>b</p>");
        let p = doc.first_element_by_tag("p").unwrap();
        assert_eq!(to_html(&doc, p), "<p>a<br>b</p>");
    }
}
