//! Mutable page document with mutation watchers
//!
//! `scraper` gives a read-only tree, but the host page re-renders itself and
//! the agent writes controls into it, so the parsed tree is copied into a
//! small arena that supports both. Watchers mirror the browser's mutation
//! observers: a connected watcher collects a record for every mutation
//! inside its subtree, a disconnected one collects nothing.

use scraper::{Html, Node as HtmlNode};
use std::collections::HashMap;
use url::Url;

/// Handle to a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Handle to a watcher registered with [`Document::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Kind of change recorded for watchers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
}

/// Which mutation kinds a watcher collects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchFilter {
    pub child_list: bool,
    pub attributes: bool,
}

impl WatchFilter {
    pub const CHILD_LIST: Self = Self {
        child_list: true,
        attributes: false,
    };
    pub const ALL: Self = Self {
        child_list: true,
        attributes: true,
    };

    fn accepts(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::Attributes => self.attributes,
        }
    }
}

#[derive(Debug)]
struct Watcher {
    root: NodeId,
    filter: WatchFilter,
    connected: bool,
    pending: usize,
}

/// Element predicate: tag, id, classes and attributes, all of which must hold
#[derive(Debug, Clone, Default)]
pub struct Matcher<'a> {
    tag: Option<&'a str>,
    id: Option<&'a str>,
    classes: Vec<&'a str>,
    attrs: Vec<(&'a str, AttrTest<'a>)>,
    first_child: bool,
}

#[derive(Debug, Clone, Copy)]
enum AttrTest<'a> {
    Present,
    Equals(&'a str),
    Contains(&'a str),
}

impl<'a> Matcher<'a> {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn tag(tag: &'a str) -> Self {
        Self {
            tag: Some(tag),
            ..Self::default()
        }
    }

    pub fn id(id: &'a str) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn class(mut self, class: &'a str) -> Self {
        self.classes.push(class);
        self
    }

    pub fn has_attr(mut self, name: &'a str) -> Self {
        self.attrs.push((name, AttrTest::Present));
        self
    }

    pub fn attr(mut self, name: &'a str, value: &'a str) -> Self {
        self.attrs.push((name, AttrTest::Equals(value)));
        self
    }

    pub fn attr_contains(mut self, name: &'a str, needle: &'a str) -> Self {
        self.attrs.push((name, AttrTest::Contains(needle)));
        self
    }

    /// Only the first element among its siblings
    pub fn first_child(mut self) -> Self {
        self.first_child = true;
        self
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        if self.first_child && !doc.is_first_element_child(node) {
            return false;
        }
        if self.tag.is_some_and(|t| !t.eq_ignore_ascii_case(tag)) {
            return false;
        }
        if self.id.is_some_and(|id| doc.attr(node, "id") != Some(id)) {
            return false;
        }
        if !self.classes.iter().all(|c| doc.has_class(node, c)) {
            return false;
        }
        self.attrs.iter().all(|(name, test)| match (doc.attr(node, name), test) {
            (None, _) => false,
            (Some(_), AttrTest::Present) => true,
            (Some(v), AttrTest::Equals(expected)) => v == *expected,
            (Some(v), AttrTest::Contains(needle)) => v.contains(needle),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// Matchers joined by descendant and child combinators, written left to
/// right like a CSS complex selector
#[derive(Debug, Clone)]
pub struct Path<'a> {
    first: Matcher<'a>,
    rest: Vec<(Combinator, Matcher<'a>)>,
}

impl<'a> Path<'a> {
    pub fn new(first: Matcher<'a>) -> Self {
        Self {
            first,
            rest: Vec::new(),
        }
    }

    pub fn descendant(mut self, matcher: Matcher<'a>) -> Self {
        self.rest.push((Combinator::Descendant, matcher));
        self
    }

    pub fn child(mut self, matcher: Matcher<'a>) -> Self {
        self.rest.push((Combinator::Child, matcher));
        self
    }

    /// Whether `node` is the subject (rightmost step) of this path
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.matches_step(doc, node, self.rest.len())
    }

    fn step(&self, index: usize) -> &Matcher<'a> {
        match index {
            0 => &self.first,
            i => &self.rest[i - 1].1,
        }
    }

    fn matches_step(&self, doc: &Document, node: NodeId, index: usize) -> bool {
        if !self.step(index).matches(doc, node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.rest[index - 1].0 {
            Combinator::Child => doc
                .parent(node)
                .is_some_and(|parent| self.matches_step(doc, parent, index - 1)),
            Combinator::Descendant => {
                let mut current = doc.parent(node);
                while let Some(ancestor) = current {
                    if self.matches_step(doc, ancestor, index - 1) {
                        return true;
                    }
                    current = doc.parent(ancestor);
                }
                false
            }
        }
    }
}

/// A page document
#[derive(Debug)]
pub struct Document {
    url: Url,
    nodes: Vec<Node>,
    root: NodeId,
    watchers: Vec<Option<Watcher>>,
    revision: u64,
}

impl Document {
    /// Parse an HTML document loaded from `url`
    pub fn parse(url: Url, html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut doc = Self {
            url,
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
            watchers: Vec::new(),
            revision: 0,
        };

        let mut imported = HashMap::new();
        for node in parsed.tree.root().descendants() {
            let Some(parent) = node.parent() else {
                imported.insert(node.id(), doc.root);
                continue;
            };
            // Children of skipped nodes (doctype, comments) are skipped too
            let Some(&parent) = imported.get(&parent.id()) else {
                continue;
            };
            let data = match node.value() {
                HtmlNode::Element(el) => NodeData::Element {
                    tag: el.name().to_ascii_lowercase(),
                    attrs: el
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
                HtmlNode::Text(text) => NodeData::Text(String::from(&**text)),
                _ => continue,
            };
            let id = doc.push(data);
            doc.nodes[id.0].parent = Some(parent);
            doc.nodes[parent.0].children.push(id);
            imported.insert(node.id(), id);
        }

        doc
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of mutations applied since parsing
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ---- queries ----

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn is_first_element_child(&self, node: NodeId) -> bool {
        self.parent(node).is_some_and(|parent| {
            self.children(parent)
                .iter()
                .find(|&&sibling| self.tag(sibling).is_some())
                == Some(&node)
        })
    }

    /// All nodes below `scope` in document order, `scope` excluded
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    /// First element below `scope` accepted by `matcher`
    pub fn find(&self, scope: NodeId, matcher: &Matcher<'_>) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&n| matcher.matches(self, n))
    }

    pub fn find_all(&self, scope: NodeId, matcher: &Matcher<'_>) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&n| matcher.matches(self, n))
            .collect()
    }

    /// First element below `scope` that is the subject of `path`
    pub fn find_path(&self, scope: NodeId, path: &Path<'_>) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&n| path.matches(self, n))
    }

    /// Nearest ancestor-or-self accepted by `matcher`
    pub fn closest(&self, node: NodeId, matcher: &Matcher<'_>) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(n) = current {
            if matcher.matches(self, n) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// Element with the given id attribute, attached to the document
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.find(self.root, &Matcher::id(id))
    }

    pub fn body(&self) -> Option<NodeId> {
        self.find(self.root, &Matcher::tag("body"))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.find(self.root, &Matcher::tag("head"))
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let own = match &self.nodes[node.0].data {
            NodeData::Text(text) => Some(text.as_str()),
            _ => None,
        };
        own.into_iter()
            .chain(self.descendants(node).into_iter().filter_map(|n| {
                match &self.nodes[n.0].data {
                    NodeData::Text(text) => Some(text.as_str()),
                    _ => None,
                }
            }))
            .collect()
    }

    /// Contents of every script element, in document order
    pub fn script_texts(&self) -> Vec<String> {
        self.find_all(self.root, &Matcher::tag("script"))
            .into_iter()
            .map(|n| self.text_content(n))
            .collect()
    }

    /// Whether the inline style sets `display: none`
    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.attr(node, "style").is_some_and(|style| {
            style_declarations(style)
                .any(|(prop, value)| prop.eq_ignore_ascii_case("display") && value == "none")
        })
    }

    /// Whether the node is still reachable from the document root
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current == self.root
    }

    // ---- mutations ----

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.record(parent, MutationKind::ChildList);
    }

    /// Insert `node` as the next sibling of `anchor`
    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        let Some(parent) = self.parent(anchor) else {
            return;
        };
        self.detach(node);
        let siblings = &mut self.nodes[parent.0].children;
        let index = siblings
            .iter()
            .position(|&n| n == anchor)
            .map_or(siblings.len(), |i| i + 1);
        siblings.insert(index, node);
        self.nodes[node.0].parent = Some(parent);
        self.record(parent, MutationKind::ChildList);
    }

    /// Detach `node` and its subtree from the document
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    /// Detached copy of `node` and its subtree
    pub fn deep_clone(&mut self, node: NodeId) -> NodeId {
        let copy = self.push(self.nodes[node.0].data.clone());
        let children = self.nodes[node.0].children.clone();
        for child in children {
            let child_copy = self.deep_clone(child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let NodeData::Element { attrs, .. } = &mut self.nodes[node.0].data else {
            return;
        };
        match attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
        self.record(node, MutationKind::Attributes);
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        let NodeData::Element { attrs, .. } = &mut self.nodes[node.0].data else {
            return;
        };
        let before = attrs.len();
        attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        if attrs.len() != before {
            self.record(node, MutationKind::Attributes);
        }
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let classes = match self.attr(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(node, "class", &classes);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if !self.has_class(node, class) {
            return;
        }
        let classes = self
            .attr(node, "class")
            .unwrap_or_default()
            .split_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr(node, "class", &classes);
    }

    /// Replace the `display` declaration of the inline style
    pub fn set_display(&mut self, node: NodeId, display: &str) {
        let mut declarations: Vec<String> = self
            .attr(node, "style")
            .map(|style| {
                style_declarations(style)
                    .filter(|(prop, _)| !prop.eq_ignore_ascii_case("display"))
                    .map(|(prop, value)| format!("{}: {}", prop, value))
                    .collect()
            })
            .unwrap_or_default();
        declarations.push(format!("display: {}", display));
        self.set_attr(node, "style", &declarations.join("; "));
    }

    /// Replace all children with a single text node
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        for child in std::mem::take(&mut self.nodes[node.0].children) {
            self.nodes[child.0].parent = None;
        }
        let text_node = self.push(NodeData::Text(text.to_string()));
        self.nodes[text_node.0].parent = Some(node);
        self.nodes[node.0].children.push(text_node);
        self.record(node, MutationKind::ChildList);
    }

    // ---- watchers ----

    /// Start collecting mutation records for the subtree rooted at `root`
    pub fn observe(&mut self, root: NodeId, filter: WatchFilter) -> WatcherId {
        self.watchers.push(Some(Watcher {
            root,
            filter,
            connected: true,
            pending: 0,
        }));
        WatcherId(self.watchers.len() - 1)
    }

    /// Stop collecting records; pending records are discarded
    pub fn disconnect(&mut self, id: WatcherId) {
        if let Some(Some(watcher)) = self.watchers.get_mut(id.0) {
            watcher.connected = false;
            watcher.pending = 0;
        }
    }

    pub fn reconnect(&mut self, id: WatcherId) {
        if let Some(Some(watcher)) = self.watchers.get_mut(id.0) {
            watcher.connected = true;
        }
    }

    /// Drop the watcher for good
    pub fn unobserve(&mut self, id: WatcherId) {
        if let Some(slot) = self.watchers.get_mut(id.0) {
            *slot = None;
        }
    }

    pub fn has_pending(&self, id: WatcherId) -> bool {
        matches!(self.watchers.get(id.0), Some(Some(w)) if w.pending > 0)
    }

    /// Number of records collected since the last call
    pub fn take_records(&mut self, id: WatcherId) -> usize {
        match self.watchers.get_mut(id.0) {
            Some(Some(watcher)) => std::mem::take(&mut watcher.pending),
            _ => 0,
        }
    }

    pub fn is_observing(&self, id: WatcherId) -> bool {
        matches!(self.watchers.get(id.0), Some(Some(w)) if w.connected)
    }

    // ---- internals ----

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.nodes[node.0].parent.take() else {
            return;
        };
        self.nodes[parent.0].children.retain(|&n| n != node);
        self.record(parent, MutationKind::ChildList);
    }

    fn record(&mut self, target: NodeId, kind: MutationKind) {
        self.revision += 1;
        let mut chain = vec![target];
        let mut current = target;
        while let Some(parent) = self.parent(current) {
            chain.push(parent);
            current = parent;
        }
        for watcher in self.watchers.iter_mut().flatten() {
            if watcher.connected && watcher.filter.accepts(kind) && chain.contains(&watcher.root) {
                watcher.pending += 1;
            }
        }
    }
}

fn style_declarations(style: &str) -> impl Iterator<Item = (&str, &str)> {
    style.split(';').filter_map(|decl| {
        let (prop, value) = decl.split_once(':')?;
        Some((prop.trim(), value.trim()))
    })
}
