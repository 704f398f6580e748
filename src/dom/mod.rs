//! Arena document model standing in for the live page DOM.
//! Nodes are addressed by `NodeId` and never reused, so an id held across an
//! await either still names the same node or names a detached one.
//! Subtree observers receive every insertion and text change synchronously.

mod mutation;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::language::LanguageCode;

pub use mutation::{MutationKind, MutationRecord, ObserverId};

/// Document shared between the page, the pipeline and the watcher task.
pub type SharedDocument = Arc<Mutex<Document>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

/// Translation bookkeeping carried by a text node.
/// Only the pipeline writes these; they die with the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TextMarkers {
    pub(crate) original: Option<String>,
    pub(crate) translated: Option<LanguageCode>,
}

#[derive(Debug)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    markers: TextMarkers,
}

type ObserverFn = Box<dyn Fn(&Document, &MutationRecord) + Send + Sync>;

struct Observer {
    id: ObserverId,
    root: NodeId,
    callback: ObserverFn,
}

pub struct Document {
    nodes: Vec<Node>,
    observers: Vec<Observer>,
    next_observer: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
                markers: TextMarkers::default(),
            }],
            observers: Vec::new(),
            next_observer: 1,
        }
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
            markers: TextMarkers::default(),
        });
        id
    }

    /// Create a detached element. Tag names are stored lowercase.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Comment(text.to_string()))
    }

    /// Convenience: create `<tag>` holding one text child and append it.
    pub fn append_element_with_text(&mut self, parent: NodeId, tag: &str, text: &str) -> NodeId {
        let element = self.create_element(tag);
        let text_node = self.create_text(text);
        self.attach(element, text_node, None);
        self.append_child(parent, element);
        element
    }

    /// Returns false (and changes nothing) when `child` is `parent` or one of
    /// its ancestors.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.attach(parent, child, None) {
            return false;
        }
        self.notify(MutationRecord::child_list(parent, vec![child]));
        true
    }

    /// Insert `child` before `reference` (appends when `reference` is not a child of `parent`).
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) -> bool {
        if !self.attach(parent, child, Some(reference)) {
            return false;
        }
        self.notify(MutationRecord::child_list(parent, vec![child]));
        true
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) -> bool {
        if self.is_descendant_of(parent, child) {
            warn!(
                parent = parent.index(),
                child = child.index(),
                "refusing to attach a node inside its own subtree"
            );
            return false;
        }
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match before.and_then(|reference| children.iter().position(|&c| c == reference)) {
            Some(index) => children.insert(index, child),
            None => children.push(child),
        }
        true
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    /// Detach `node` (and its subtree) from the tree.
    pub fn remove(&mut self, node: NodeId) {
        if node == self.root() {
            return;
        }
        let parent = self.nodes[node.0].parent;
        self.detach(node);
        if let Some(parent) = parent {
            self.notify(MutationRecord::removal(parent, vec![node]));
        }
    }

    /// Page-authored text change. New content means new source text, so the
    /// node's translation markers are reset.
    pub fn set_text(&mut self, node: NodeId, text: &str) -> bool {
        match &mut self.nodes[node.0].data {
            NodeData::Text(current) => {
                *current = text.to_string();
            }
            _ => return false,
        }
        self.nodes[node.0].markers = TextMarkers::default();
        self.notify(MutationRecord::character_data(node));
        true
    }

    /// Pipeline write: swaps visible text but keeps the original-text marker.
    pub(crate) fn write_translation(&mut self, node: NodeId, text: &str) -> bool {
        match &mut self.nodes[node.0].data {
            NodeData::Text(current) if current != text => {
                *current = text.to_string();
            }
            _ => return false,
        }
        self.notify(MutationRecord::character_data(node));
        true
    }

    pub(crate) fn markers(&self, node: NodeId) -> &TextMarkers {
        &self.nodes[node.0].markers
    }

    pub(crate) fn markers_mut(&mut self, node: NodeId) -> &mut TextMarkers {
        &mut self.nodes[node.0].markers
    }

    /// Recorded untranslated text of a text node, if it was ever scanned.
    pub fn original_text(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0)?.markers.original.as_deref()
    }

    /// Language the node currently shows, if the pipeline translated it.
    pub fn translated_language(&self, node: NodeId) -> Option<LanguageCode> {
        self.nodes.get(node.0)?.markers.translated
    }

    pub fn data(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.0].data
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].data, NodeData::Element { .. })
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    pub fn attributes(&self, node: NodeId) -> &[(String, String)] {
        match &self.nodes[node.0].data {
            NodeData::Element { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[node.0].data {
            let name = name.to_ascii_lowercase();
            match attrs.iter_mut().find(|(key, _)| *key == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => attrs.push((name, value.to_string())),
            }
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// True when `node` is still attached to the document root.
    pub fn contains(&self, node: NodeId) -> bool {
        node.0 < self.nodes.len() && self.is_descendant_of(node, self.root())
    }

    /// True when `node` is `ancestor` or lies beneath it.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes[id.0].parent;
        }
        false
    }

    /// The node itself if it is an element, otherwise its closest element ancestor.
    pub fn nearest_element(&self, node: NodeId) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.is_element(id) {
                return Some(id);
            }
            current = self.nodes[id.0].parent;
        }
        None
    }

    /// Depth-first, document-order walk of `root` and everything beneath it.
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![root],
        }
    }

    /// Concatenated text of all text nodes beneath `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .filter_map(|id| self.text(id))
            .collect()
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|&node| self.attribute(node, "id") == Some(id))
    }

    pub fn first_element_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|&node| self.tag(node).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
    }

    /// Subscribe to mutations at or beneath `root`.
    pub fn observe<F>(&mut self, root: NodeId, callback: F) -> ObserverId
    where
        F: Fn(&Document, &MutationRecord) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push(Observer {
            id,
            root,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns false when the observer was already gone.
    pub fn disconnect(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.id != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn notify(&mut self, record: MutationRecord) {
        if self.observers.is_empty() {
            return;
        }
        // Callbacks get `&Document`, so the list is moved out while they run.
        let observers = std::mem::take(&mut self.observers);
        for observer in &observers {
            if self.is_descendant_of(record.target, observer.root) {
                (observer.callback)(self, &record);
            }
        }
        self.observers = observers;
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(node).iter().rev().copied());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn article() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let body = doc.create_element("BODY");
        let root = doc.root();
        doc.append_child(root, body);
        let h1 = doc.append_element_with_text(body, "h1", "Breaking News");
        (doc, body, h1)
    }

    #[test]
    fn walks_in_document_order() {
        let (mut doc, body, _) = article();
        doc.append_element_with_text(body, "p", "First");
        doc.append_element_with_text(body, "p", "Second");
        let texts: Vec<_> = doc
            .descendants(doc.root())
            .filter_map(|n| doc.text(n).map(str::to_string))
            .collect();
        assert_eq!(texts, vec!["Breaking News", "First", "Second"]);
        assert_eq!(doc.tag(body), Some("body"));
    }

    #[test]
    fn removed_subtree_is_no_longer_contained() {
        let (mut doc, body, h1) = article();
        let text = doc.children(h1)[0];
        assert!(doc.contains(text));
        doc.remove(h1);
        assert!(!doc.contains(text));
        assert!(doc.contains(body));
    }

    #[test]
    fn page_writes_reset_markers_but_pipeline_writes_keep_them() {
        let (mut doc, _, h1) = article();
        let text = doc.children(h1)[0];
        doc.markers_mut(text).original = Some("Breaking News".into());

        assert!(doc.write_translation(text, "ताज़ा खबर"));
        assert_eq!(doc.original_text(text), Some("Breaking News"));
        assert!(!doc.write_translation(text, "ताज़ा खबर"));

        doc.set_text(text, "Live Updates");
        assert_eq!(doc.original_text(text), None);
    }

    #[test]
    fn observers_only_see_their_subtree() {
        let (mut doc, body, h1) = article();
        let aside = doc.create_element("aside");
        let root = doc.root();
        doc.append_child(root, aside);

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = doc.observe(h1, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let text = doc.children(h1)[0];
        doc.set_text(text, "Updated");
        doc.append_element_with_text(aside, "p", "Elsewhere");
        doc.append_element_with_text(body, "p", "Sibling");
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(doc.disconnect(id));
        doc.set_text(text, "Again");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!doc.disconnect(id));
    }

    #[test]
    fn attaching_into_own_subtree_is_refused() {
        let (mut doc, body, h1) = article();
        let text = doc.children(h1)[0];

        assert!(!doc.append_child(h1, body));
        assert!(!doc.append_child(body, body));
        assert!(!doc.insert_before(h1, body, text));
        assert_eq!(doc.parent(body), Some(doc.root()));
        assert_eq!(doc.parent(h1), Some(body));
        assert_eq!(doc.descendants(doc.root()).count(), 4);

        let aside = doc.create_element("aside");
        assert!(doc.append_child(body, aside));
        assert!(doc.insert_before(body, aside, h1));
        assert_eq!(doc.children(body), &[aside, h1]);
    }

    #[test]
    fn attributes_are_case_insensitive() {
        let (mut doc, body, _) = article();
        doc.set_attribute(body, "Translate", "no");
        assert_eq!(doc.attribute(body, "translate"), Some("no"));
        doc.set_attribute(body, "translate", "yes");
        assert_eq!(doc.attributes(body).len(), 1);
    }
}
