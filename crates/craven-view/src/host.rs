#![forbid(unsafe_code)]

//! The host view-tree seam.
//!
//! Controllers never touch a concrete node tree; they go through
//! [`ViewHost`]. A host is a cheap `Clone` handle (a controller keeps one),
//! and its `Node` type is a handle too.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Attribute map assigned to a host node.
pub type NodeAttributes = BTreeMap<String, String>;

/// Operations a node tree must provide to be driven by controllers.
pub trait ViewHost: Clone + 'static {
    /// Node handle.
    type Node: Clone + PartialEq + fmt::Debug + 'static;

    /// Create a detached node.
    fn create_node(&self, tag_name: &str) -> Self::Node;

    /// Assign (merge) attributes onto `node`.
    fn set_attributes(&self, node: &Self::Node, attributes: &NodeAttributes);

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent.
    fn append_child(&self, parent: &Self::Node, child: &Self::Node);

    /// Insert `children`, in order, before the child currently at `index`
    /// (appending when `index` is past the end). One tree mutation for the
    /// whole batch, like inserting a document fragment.
    fn insert_children(&self, parent: &Self::Node, index: usize, children: &[Self::Node]);

    /// Detach `child` from `parent`. Returns `false` if it was not a child.
    fn remove_child(&self, parent: &Self::Node, child: &Self::Node) -> bool;

    /// Current parent of `node`.
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Children of `node`, in order.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    /// Register a native listener for `event_type` on `node`.
    fn add_listener(&self, node: &Self::Node, event_type: &str, listener: NativeListener<Self::Node>);

    /// Unregister a listener by identity. Returns whether one was removed.
    fn remove_listener(
        &self,
        node: &Self::Node,
        event_type: &str,
        listener: &NativeListener<Self::Node>,
    ) -> bool;

    /// Whether `node` is `ancestor` or lies somewhere below it.
    fn is_descendant_or_self(&self, node: &Self::Node, ancestor: &Self::Node) -> bool;

    /// Whether `node` matches a CSS-style `selector`.
    fn matches_selector(&self, node: &Self::Node, selector: &str) -> bool;
}

/// A native event delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent<N> {
    /// Event type, e.g. `"click"`.
    pub event_type: String,
    /// Node the event originated at.
    pub target: N,
    /// Node whose listener is running.
    pub current_target: N,
}

/// Native event callback. Equality is pointer identity.
pub struct NativeListener<N> {
    f: Rc<dyn Fn(&NativeEvent<N>)>,
}

impl<N> NativeListener<N> {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&NativeEvent<N>) + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    /// Invoke the listener.
    pub fn call(&self, event: &NativeEvent<N>) {
        (self.f)(event);
    }

    /// Whether both handles point at the same closure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl<N> Clone for NativeListener<N> {
    fn clone(&self) -> Self {
        Self {
            f: Rc::clone(&self.f),
        }
    }
}

impl<N> PartialEq for NativeListener<N> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<N> fmt::Debug for NativeListener<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeListener")
            .field("ptr", &Rc::as_ptr(&self.f).cast::<()>())
            .finish()
    }
}
