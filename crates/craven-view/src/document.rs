#![forbid(unsafe_code)]

//! In-memory [`ViewHost`]: an arena of element nodes.
//!
//! Nodes are never freed; a [`NodeId`] stays valid for the life of its
//! [`Document`]. Listeners run in registration order on each node, and
//! [`Document::dispatch`] bubbles from the target up through its ancestors.
//!
//! # Selectors
//!
//! [`ViewHost::matches_selector`] understands comma-separated lists of
//! compound selectors built from a tag name or `*`, `#id` and `.class`
//! parts, e.g. `li.item#first, button`. Combinators are not supported and
//! never match.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::host::{NativeEvent, NativeListener, NodeAttributes, ViewHost};

/// Handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

struct NodeData {
    tag: String,
    attributes: NodeAttributes,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<(String, NativeListener<NodeId>)>,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: NodeAttributes::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Arena {
    nodes: Vec<NodeData>,
    insertions: usize,
}

impl Arena {
    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0)
    }

    fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    fn is_descendant_or_self(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.node(id).and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.node_mut(child).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|&c| c != child);
        }
    }
}

/// Shared handle to an in-memory node tree with a `<body>` root.
#[derive(Clone)]
pub struct Document {
    arena: Rc<RefCell<Arena>>,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document holding only `<body>`.
    #[must_use]
    pub fn new() -> Self {
        let mut arena = Arena::default();
        arena.nodes.push(NodeData::new("body"));
        Self {
            arena: Rc::new(RefCell::new(arena)),
            body: NodeId(0),
        }
    }

    /// The root node.
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Lower-cased tag name of `node`.
    #[must_use]
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.arena.borrow().node(node).map(|n| n.tag.clone())
    }

    /// Value of one attribute.
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.arena
            .borrow()
            .node(node)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    /// Every attribute of `node`.
    #[must_use]
    pub fn attributes(&self, node: NodeId) -> NodeAttributes {
        self.arena
            .borrow()
            .node(node)
            .map(|n| n.attributes.clone())
            .unwrap_or_default()
    }

    /// Replace the text content of `node`.
    pub fn set_text(&self, node: NodeId, text: impl Into<String>) {
        if let Some(n) = self.arena.borrow_mut().node_mut(node) {
            n.text = text.into();
        }
    }

    /// Text content of `node` (its own, not its descendants').
    #[must_use]
    pub fn text(&self, node: NodeId) -> String {
        self.arena
            .borrow()
            .node(node)
            .map(|n| n.text.clone())
            .unwrap_or_default()
    }

    /// Number of tree insertions performed so far. A batched insertion counts
    /// once.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.arena.borrow().insertions
    }

    /// Number of listeners for `event_type` registered on `node`.
    #[must_use]
    pub fn listener_count(&self, node: NodeId, event_type: &str) -> usize {
        self.arena.borrow().node(node).map_or(0, |n| {
            n.listeners.iter().filter(|(t, _)| t == event_type).count()
        })
    }

    /// Fire `event_type` at `target`, bubbling to every ancestor. Returns the
    /// number of listeners invoked.
    pub fn dispatch(&self, target: NodeId, event_type: &str) -> usize {
        let path: Vec<NodeId> = {
            let arena = self.arena.borrow();
            let mut path = Vec::new();
            let mut cursor = arena.contains(target).then_some(target);
            while let Some(id) = cursor {
                path.push(id);
                cursor = arena.node(id).and_then(|n| n.parent);
            }
            path
        };

        let mut invoked = 0;
        for current in path {
            let listeners: Vec<NativeListener<NodeId>> = {
                let arena = self.arena.borrow();
                let Some(node) = arena.node(current) else {
                    continue;
                };
                node.listeners
                    .iter()
                    .filter(|(t, _)| t == event_type)
                    .map(|(_, l)| l.clone())
                    .collect()
            };
            let event = NativeEvent {
                event_type: event_type.to_owned(),
                target,
                current_target: current,
            };
            for listener in &listeners {
                listener.call(&event);
            }
            invoked += listeners.len();
        }
        invoked
    }

    /// Serialize the subtree under `node` as indented `tag#id.class` lines.
    /// Handy in tests.
    #[must_use]
    pub fn outline(&self, node: NodeId) -> String {
        fn walk(arena: &Arena, id: NodeId, depth: usize, out: &mut String) {
            let Some(n) = arena.node(id) else {
                return;
            };
            out.push_str(&"  ".repeat(depth));
            out.push_str(&n.tag);
            if let Some(id) = n.attributes.get("id").filter(|v| !v.is_empty()) {
                out.push('#');
                out.push_str(id);
            }
            if let Some(class) = n.attributes.get("class") {
                for c in class.split_whitespace() {
                    out.push('.');
                    out.push_str(c);
                }
            }
            if !n.text.is_empty() {
                out.push(' ');
                out.push_str(&n.text);
            }
            out.push('\n');
            for &child in &n.children {
                walk(arena, child, depth + 1, out);
            }
        }
        let mut out = String::new();
        walk(&self.arena.borrow(), node, 0, &mut out);
        out
    }
}

impl ViewHost for Document {
    type Node = NodeId;

    fn create_node(&self, tag_name: &str) -> NodeId {
        let mut arena = self.arena.borrow_mut();
        arena.nodes.push(NodeData::new(tag_name));
        NodeId(arena.nodes.len() - 1)
    }

    fn set_attributes(&self, node: &NodeId, attributes: &NodeAttributes) {
        if let Some(n) = self.arena.borrow_mut().node_mut(*node) {
            n.attributes
                .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    fn append_child(&self, parent: &NodeId, child: &NodeId) {
        let index = self
            .arena
            .borrow()
            .node(*parent)
            .map_or(0, |n| n.children.len());
        self.insert_children(parent, index, std::slice::from_ref(child));
    }

    fn insert_children(&self, parent: &NodeId, index: usize, children: &[NodeId]) {
        let mut arena = self.arena.borrow_mut();
        if !arena.contains(*parent) {
            warn!(parent = parent.0, "insert into unknown node");
            return;
        }
        let mut at = index;
        let mut batch = Vec::with_capacity(children.len());
        for &child in children {
            if !arena.contains(child) || arena.is_descendant_or_self(*parent, child) {
                warn!(parent = parent.0, child = child.0, "rejected insertion");
                continue;
            }
            // A child moving within `parent` from ahead of `at` shifts the target left.
            let position = arena
                .node(*parent)
                .and_then(|p| p.children.iter().position(|&c| c == child));
            if position.is_some_and(|position| position < at) {
                at -= 1;
            }
            arena.detach(child);
            batch.push(child);
        }
        if batch.is_empty() {
            return;
        }
        for &child in &batch {
            if let Some(n) = arena.node_mut(child) {
                n.parent = Some(*parent);
            }
        }
        if let Some(p) = arena.node_mut(*parent) {
            let at = at.min(p.children.len());
            p.children.splice(at..at, batch);
        }
        arena.insertions += 1;
    }

    fn remove_child(&self, parent: &NodeId, child: &NodeId) -> bool {
        let mut arena = self.arena.borrow_mut();
        if arena.node(*child).and_then(|n| n.parent) != Some(*parent) {
            warn!(parent = parent.0, child = child.0, "remove_child on a non-child");
            return false;
        }
        arena.detach(*child);
        true
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.arena.borrow().node(*node).and_then(|n| n.parent)
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.arena
            .borrow()
            .node(*node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn add_listener(&self, node: &NodeId, event_type: &str, listener: NativeListener<NodeId>) {
        if let Some(n) = self.arena.borrow_mut().node_mut(*node) {
            n.listeners.push((event_type.to_owned(), listener));
        }
    }

    fn remove_listener(
        &self,
        node: &NodeId,
        event_type: &str,
        listener: &NativeListener<NodeId>,
    ) -> bool {
        let mut arena = self.arena.borrow_mut();
        let Some(n) = arena.node_mut(*node) else {
            return false;
        };
        let Some(pos) = n
            .listeners
            .iter()
            .position(|(t, l)| t == event_type && l.ptr_eq(listener))
        else {
            return false;
        };
        n.listeners.remove(pos);
        true
    }

    fn is_descendant_or_self(&self, node: &NodeId, ancestor: &NodeId) -> bool {
        self.arena.borrow().is_descendant_or_self(*node, *ancestor)
    }

    fn matches_selector(&self, node: &NodeId, selector: &str) -> bool {
        let arena = self.arena.borrow();
        let Some(n) = arena.node(*node) else {
            return false;
        };
        selector
            .split(',')
            .filter_map(Compound::parse)
            .any(|compound| compound.matches(n))
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.arena.borrow();
        f.debug_struct("Document")
            .field("nodes", &arena.nodes.len())
            .field("insertions", &arena.insertions)
            .finish()
    }
}

/// One compound selector: `tag#id.class.class`.
#[derive(Debug, Default, PartialEq)]
struct Compound<'a> {
    tag: Option<&'a str>,
    id: Option<&'a str>,
    classes: Vec<&'a str>,
}

impl<'a> Compound<'a> {
    fn parse(source: &'a str) -> Option<Self> {
        let source = source.trim();
        if source.is_empty() || source.contains(char::is_whitespace) {
            return None;
        }
        let mut compound = Compound::default();
        let head_end = source.find(['#', '.']).unwrap_or(source.len());
        match &source[..head_end] {
            "" | "*" => {}
            tag if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') => {
                compound.tag = Some(tag);
            }
            _ => return None,
        }

        let mut rest = &source[head_end..];
        while let Some(marker) = rest.chars().next() {
            let body = &rest[1..];
            let end = body.find(['#', '.']).unwrap_or(body.len());
            let name = &body[..end];
            if name.is_empty() {
                return None;
            }
            if marker == '#' {
                compound.id = Some(name);
            } else {
                compound.classes.push(name);
            }
            rest = &body[end..];
        }
        Some(compound)
    }

    fn matches(&self, node: &NodeData) -> bool {
        if self.tag.is_some_and(|tag| !tag.eq_ignore_ascii_case(&node.tag)) {
            return false;
        }
        if self
            .id
            .is_some_and(|id| node.attributes.get("id").map(String::as_str) != Some(id))
        {
            return false;
        }
        let classes = node.attributes.get("class").map_or("", String::as_str);
        self.classes
            .iter()
            .all(|wanted| classes.split_whitespace().any(|c| c == *wanted))
    }
}
