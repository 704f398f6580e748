//! DOM Text Scanner.
//!
//! Walks the text nodes under a root in document order, skips excluded
//! regions and trivial fragments, and records each node's original text the
//! first time it is seen. The marker is checked before current text is ever
//! read, so a node already showing a translation never has that translation
//! captured as its original.

use regex::Regex;
use tracing::debug;

use crate::dom::{Document, NodeId};

/// Containers whose text is never page copy.
const NON_CONTENT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Explicit opt-out attribute for legal copy, code samples, stack traces.
pub const NO_TRANSLATE_ATTR: &str = "data-no-translate";
/// Opt-out class understood by common translation tooling.
pub const NO_TRANSLATE_CLASS: &str = "notranslate";

/// One translatable text node found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedText {
    pub node: NodeId,
    pub element: NodeId,
    pub original: String,
}

#[derive(Debug, Clone)]
pub struct TextScanner {
    min_chars: usize,
    /// Matches fragments with nothing to translate: digits, punctuation, symbols.
    non_verbal: Option<Regex>,
}

impl Default for TextScanner {
    fn default() -> Self {
        Self::new(2)
    }
}

impl TextScanner {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars: min_chars.max(1),
            non_verbal: Regex::new(r"^[\p{N}\p{P}\p{S}\s]+$").ok(),
        }
    }

    /// Keep numeric and symbol-only fragments (dates, scores, prices) in scans.
    pub fn including_non_verbal(mut self) -> Self {
        self.non_verbal = None;
        self
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    /// Scan `root`, capturing originals for newly seen nodes.
    pub fn scan(&self, doc: &mut Document, root: NodeId) -> Vec<ScannedText> {
        if !doc.contains(root) || is_excluded(doc, root) {
            return Vec::new();
        }

        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if doc.is_element(node) {
                if opts_out(doc, node) {
                    continue;
                }
                stack.extend(doc.children(node).iter().rev().copied());
                continue;
            }
            if doc.text(node).is_none() {
                stack.extend(doc.children(node).iter().rev().copied());
                continue;
            }
            let Some(element) = doc.nearest_element(node) else {
                continue;
            };

            let markers = doc.markers(node);
            let (recorded, translated) = (markers.original.clone(), markers.translated);
            let original = match recorded {
                Some(original) => original,
                None if translated.is_some() => {
                    debug!(node = node.index(), "translated node without original, skipped");
                    continue;
                }
                None => {
                    let current = doc.text(node).unwrap_or_default().to_string();
                    if !self.qualifies(&current) {
                        continue;
                    }
                    doc.markers_mut(node).original = Some(current.clone());
                    current
                }
            };

            if self.qualifies(&original) {
                found.push(ScannedText {
                    node,
                    element,
                    original,
                });
            }
        }

        debug!(root = root.index(), found = found.len(), "scan complete");
        found
    }

    fn qualifies(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() < self.min_chars {
            return false;
        }
        match &self.non_verbal {
            Some(re) => !re.is_match(trimmed),
            None => true,
        }
    }
}

/// True when `element` itself opts out of translation or never holds page copy.
fn opts_out(doc: &Document, element: NodeId) -> bool {
    if doc
        .tag(element)
        .is_some_and(|tag| NON_CONTENT_TAGS.contains(&tag))
    {
        return true;
    }
    if doc.attribute(element, NO_TRANSLATE_ATTR).is_some() {
        return true;
    }
    if doc
        .attribute(element, "translate")
        .is_some_and(|v| v.eq_ignore_ascii_case("no"))
    {
        return true;
    }
    doc.attribute(element, "class")
        .is_some_and(|classes| classes.split_whitespace().any(|c| c == NO_TRANSLATE_CLASS))
}

/// True when `node` or any element ancestor is excluded from translation.
pub fn is_excluded(doc: &Document, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if doc.is_element(id) && opts_out(doc, id) {
            return true;
        }
        current = doc.parent(id);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_html;

    fn originals(found: &[ScannedText]) -> Vec<&str> {
        found.iter().map(|s| s.original.as_str()).collect()
    }

    #[test]
    fn collects_visible_text_in_document_order() {
        let mut doc = parse_html(
            "<h1>Breaking News</h1><p>Markets <b>rally</b> today</p>\
             <script>var x = 'Hidden';</script><style>p { color: red }</style>",
        );
        let root = doc.root();
        let found = TextScanner::default().scan(&mut doc, root);
        assert_eq!(originals(&found), vec!["Breaking News", "Markets ", "rally", " today"]);

        let bold = doc.first_element_by_tag("b").unwrap();
        assert_eq!(found[2].element, bold);
    }

    #[test]
    fn opt_out_markers_exclude_whole_subtree() {
        let mut doc = parse_html(
            "<p>Visible copy</p>\
             <div data-no-translate><p>Terms and conditions</p></div>\
             <pre class=\"code notranslate\">let x = 1;</pre>\
             <span translate=\"no\">BrandName</span>",
        );
        let root = doc.root();
        let found = TextScanner::default().scan(&mut doc, root);
        assert_eq!(originals(&found), vec!["Visible copy"]);

        let terms = doc.first_element_by_tag("div").unwrap();
        let text = doc.children(doc.children(terms)[0])[0];
        assert!(is_excluded(&doc, text));
        assert_eq!(doc.original_text(text), None);
    }

    #[test]
    fn trivial_fragments_are_skipped() {
        let mut doc = parse_html("<p>A</p><p> | </p><p>2024</p><p>Ok</p><p>\n  </p>");
        let root = doc.root();
        let found = TextScanner::default().scan(&mut doc, root);
        assert_eq!(originals(&found), vec!["Ok"]);

        let found = TextScanner::new(2).including_non_verbal().scan(&mut doc, root);
        assert_eq!(originals(&found), vec!["2024", "Ok"]);
    }

    #[test]
    fn marker_is_captured_once_and_never_from_translated_text() {
        let mut doc = parse_html("<h1>Breaking News</h1>");
        let root = doc.root();
        let scanner = TextScanner::default();
        let first = scanner.scan(&mut doc, root);
        let node = first[0].node;

        doc.write_translation(node, "ताज़ा खबर");
        let second = scanner.scan(&mut doc, root);
        assert_eq!(second[0].original, "Breaking News");
        assert_eq!(doc.original_text(node), Some("Breaking News"));
    }

    #[test]
    fn zero_minimum_still_skips_blank_text() {
        let mut doc = parse_html("<p>\n  </p><p>Hi</p><p>A</p>");
        let root = doc.root();
        let scanner = TextScanner::new(0).including_non_verbal();
        assert_eq!(scanner.min_chars(), 1);
        assert_eq!(originals(&scanner.scan(&mut doc, root)), vec!["Hi", "A"]);
    }

    #[test]
    fn translated_node_without_original_is_not_captured() {
        let mut doc = parse_html("<h1>ताज़ा खबर</h1><p>Live updates</p>");
        let root = doc.root();
        let h1 = doc.first_element_by_tag("h1").unwrap();
        let text = doc.children(h1)[0];
        doc.markers_mut(text).translated = Some(crate::language::LanguageCode::Hi);

        let found = TextScanner::default().scan(&mut doc, root);
        assert_eq!(originals(&found), vec!["Live updates"]);
        assert_eq!(doc.original_text(text), None);
    }

    #[test]
    fn excluded_or_detached_root_yields_nothing() {
        let mut doc = parse_html("<div translate=no><p>Hidden text</p></div>");
        let p = doc.first_element_by_tag("p").unwrap();
        assert!(TextScanner::default().scan(&mut doc, p).is_empty());

        let detached = doc.create_element("p");
        assert!(TextScanner::default().scan(&mut doc, detached).is_empty());
    }
}
