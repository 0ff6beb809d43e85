#![forbid(unsafe_code)]

//! A controller owns one host node and binds a model's events and that
//! node's native events to its own methods.
//!
//! # Design
//!
//! Methods live in a per-instance table keyed by name. Declarative bindings
//! store the *name* and look it up at dispatch time, so replacing a method
//! with [`Controller::set_method`] changes what already-bound events do.
//! `render` (no-op) and `remove` (detach and unbind) are always present.
//!
//! Native events are delegated: one host listener per event type sits on the
//! controller's node and routes each event to every `(selector, method)`
//! pair configured for that type. An empty selector matches only when the
//! target is the node itself; any other selector matches a target at or
//! below the node that satisfies it.
//!
//! # Invariants
//!
//! 1. While bound, every model and native binding is held in the
//!    controller's [`BindingScope`]; after [`Controller::teardown`] it holds
//!    none.
//! 2. `teardown` is idempotent.
//! 3. Every binding names a method that exists; checked at construction.
//! 4. Dropping the last handle releases every binding but does not detach the
//!    node from the tree.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use craven_core::{Attributes, BindingScope, Callback, ContextId, Model, ModelEvent, Subscription};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::host::{NativeEvent, NativeListener, NodeAttributes, ViewHost};

/// Name of the render method.
pub const RENDER: &str = "render";
/// Name of the remove method.
pub const REMOVE: &str = "remove";

/// A configuration value given directly or computed once at creation.
pub enum Resolvable<T> {
    /// A fixed value.
    Value(T),
    /// A zero-argument function evaluated when the view is created.
    Lazy(Rc<dyn Fn() -> T>),
}

impl<T: Clone> Resolvable<T> {
    /// Wrap a function to be evaluated at creation time.
    pub fn lazy(f: impl Fn() -> T + 'static) -> Self {
        Self::Lazy(Rc::new(f))
    }

    /// Produce the value.
    pub fn resolve(&self) -> T {
        match self {
            Self::Value(value) => value.clone(),
            Self::Lazy(f) => f(),
        }
    }
}

impl From<&str> for Resolvable<String> {
    fn from(value: &str) -> Self {
        Self::Value(value.to_owned())
    }
}

impl From<String> for Resolvable<String> {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl From<NodeAttributes> for Resolvable<NodeAttributes> {
    fn from(value: NodeAttributes) -> Self {
        Self::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolvable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// What caused a method to run.
pub enum Invocation<'a, H: ViewHost> {
    /// Called directly (`render()`, `remove()`, [`Controller::call`]).
    Direct,
    /// A bound model event.
    Model {
        event: &'a str,
        args: &'a ModelEvent,
        model: &'a Model,
    },
    /// A delegated native event.
    Native(&'a NativeEvent<H::Node>),
}

impl<H: ViewHost> fmt::Debug for Invocation<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("Direct"),
            Self::Model { event, args, model } => f
                .debug_struct("Model")
                .field("event", event)
                .field("args", args)
                .field("model", model)
                .finish(),
            Self::Native(event) => f.debug_tuple("Native").field(event).finish(),
        }
    }
}

/// A controller method.
pub type Method<H> = Rc<dyn Fn(&Controller<H>, &Invocation<'_, H>)>;

/// Construction options for [`Controller`].
///
/// Defaults: no view, `tag_name` `"div"`, empty `id`, `class_name` and
/// attributes, no model, no bindings.
pub struct ControllerOptions<H: ViewHost> {
    pub(crate) view: Option<H::Node>,
    pub(crate) tag_name: Resolvable<String>,
    pub(crate) id: Resolvable<String>,
    pub(crate) class_name: Resolvable<String>,
    pub(crate) attributes: Resolvable<NodeAttributes>,
    pub(crate) model: Option<Model>,
    pub(crate) model_events: Vec<(String, String)>,
    pub(crate) dom_events: Vec<DomBinding>,
    pub(crate) methods: Vec<(String, Method<H>)>,
    pub(crate) properties: Attributes,
}

#[derive(Debug, Clone)]
pub(crate) struct DomBinding {
    event_type: String,
    selector: String,
    method: String,
}

impl<H: ViewHost> Default for ControllerOptions<H> {
    fn default() -> Self {
        Self {
            view: None,
            tag_name: "div".into(),
            id: "".into(),
            class_name: "".into(),
            attributes: Resolvable::Value(NodeAttributes::new()),
            model: None,
            model_events: Vec::new(),
            dom_events: Vec::new(),
            methods: Vec::new(),
            properties: Attributes::new(),
        }
    }
}

impl<H: ViewHost> ControllerOptions<H> {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing node instead of creating one.
    #[must_use]
    pub fn view(mut self, node: H::Node) -> Self {
        self.view = Some(node);
        self
    }

    /// Tag name of the created node.
    #[must_use]
    pub fn tag_name(mut self, tag_name: impl Into<Resolvable<String>>) -> Self {
        self.tag_name = tag_name.into();
        self
    }

    /// `id` attribute of the created node; empty means none.
    #[must_use]
    pub fn id(mut self, id: impl Into<Resolvable<String>>) -> Self {
        self.id = id.into();
        self
    }

    /// `class` attribute of the created node; empty means none.
    #[must_use]
    pub fn class_name(mut self, class_name: impl Into<Resolvable<String>>) -> Self {
        self.class_name = class_name.into();
        self
    }

    /// Extra attributes of the created node.
    #[must_use]
    pub fn attributes(mut self, attributes: impl Into<Resolvable<NodeAttributes>>) -> Self {
        self.attributes = attributes.into();
        self
    }

    /// The model this controller presents.
    #[must_use]
    pub fn model(mut self, model: &Model) -> Self {
        self.model = Some(model.clone());
        self
    }

    /// Call `method` whenever the model triggers `event`.
    #[must_use]
    pub fn on_model(mut self, event: impl Into<String>, method: impl Into<String>) -> Self {
        self.model_events.push((event.into(), method.into()));
        self
    }

    /// Call `method` for native `event_type` events whose target matches
    /// `selector` (empty: the view itself).
    #[must_use]
    pub fn on_dom(
        mut self,
        event_type: impl Into<String>,
        selector: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        self.dom_events.push(DomBinding {
            event_type: event_type.into(),
            selector: selector.into(),
            method: method.into(),
        });
        self
    }

    /// Add or replace a method.
    #[must_use]
    pub fn method(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Controller<H>, &Invocation<'_, H>) + 'static,
    ) -> Self {
        self.methods.push((name.into(), Rc::new(f)));
        self
    }

    /// Attach a free-form property to the instance.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// The method registered last under `name`, if any.
    pub(crate) fn method_named(&self, name: &str) -> Option<Method<H>> {
        self.methods
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, f)| Rc::clone(f))
    }

    /// Fail if any binding names a method that will not exist.
    pub(crate) fn check(&self) -> Result<()> {
        let known = |name: &str| {
            name == RENDER || name == REMOVE || self.methods.iter().any(|(n, _)| n == name)
        };
        for (event, method) in &self.model_events {
            if !known(method) {
                return Err(Error::unknown_method(method, format!("model event `{event}`")));
            }
        }
        for binding in &self.dom_events {
            if !known(&binding.method) {
                return Err(Error::unknown_method(
                    &binding.method,
                    format!(
                        "dom event `{}` on `{}`",
                        binding.event_type, binding.selector
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl<H: ViewHost> fmt::Debug for ControllerOptions<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerOptions")
            .field("view", &self.view)
            .field("tag_name", &self.tag_name)
            .field("id", &self.id)
            .field("class_name", &self.class_name)
            .field("model", &self.model)
            .field("model_events", &self.model_events)
            .field("dom_events", &self.dom_events)
            .field("methods", &self.methods.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

struct ControllerInner<H: ViewHost> {
    context: ContextId,
    host: H,
    view: H::Node,
    model: Option<Model>,
    methods: RefCell<AHashMap<String, Method<H>>>,
    properties: RefCell<Attributes>,
    bindings: RefCell<BindingScope>,
    removed: Cell<bool>,
}

/// Shared handle to one controller.
pub struct Controller<H: ViewHost> {
    inner: Rc<ControllerInner<H>>,
}

/// Non-owning handle to a controller.
pub struct WeakController<H: ViewHost> {
    inner: Weak<ControllerInner<H>>,
}

impl<H: ViewHost> WeakController<H> {
    /// Get the controller back if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Controller<H>> {
        self.inner.upgrade().map(|inner| Controller { inner })
    }
}

impl<H: ViewHost> Clone for WeakController<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<H: ViewHost> Controller<H> {
    /// Build a controller, creating its node unless one is supplied, and
    /// install its bindings.
    pub fn new(host: &H, options: ControllerOptions<H>) -> Result<Self> {
        options.check()?;
        Ok(Self::build(host, options))
    }

    /// Build without checking bindings. Callers guarantee every bound name
    /// resolves.
    pub(crate) fn build(host: &H, options: ControllerOptions<H>) -> Self {
        let view = match &options.view {
            Some(node) => node.clone(),
            None => create_view(host, &options),
        };

        let mut methods: AHashMap<String, Method<H>> = AHashMap::new();
        methods.insert(RENDER.to_owned(), Rc::new(render_nothing::<H>));
        methods.insert(REMOVE.to_owned(), Rc::new(teardown::<H>));
        methods.extend(options.methods);

        let controller = Self {
            inner: Rc::new(ControllerInner {
                context: ContextId::next(),
                host: host.clone(),
                view,
                model: options.model,
                methods: RefCell::new(methods),
                properties: RefCell::new(options.properties),
                bindings: RefCell::new(BindingScope::new()),
                removed: Cell::new(false),
            }),
        };
        controller.bind_model(&options.model_events);
        controller.bind_dom(&options.dom_events);
        debug!(
            context = controller.inner.context.id(),
            bindings = controller.binding_count(),
            "controller bound"
        );
        controller
    }

    fn bind_model(&self, events: &[(String, String)]) {
        let Some(model) = &self.inner.model else {
            if !events.is_empty() {
                debug!(
                    context = self.inner.context.id(),
                    "model bindings skipped: no model"
                );
            }
            return;
        };
        let mut bindings = self.inner.bindings.borrow_mut();
        for (event, method) in events {
            let weak = self.downgrade();
            let name = event.clone();
            let method = method.clone();
            let callback = Callback::new(move |args: &ModelEvent, model: &Model| {
                if let Some(controller) = weak.upgrade() {
                    controller.dispatch(
                        &method,
                        &Invocation::Model {
                            event: &name,
                            args,
                            model,
                        },
                    );
                }
            });
            bindings.subscribe(model, event, callback, self.inner.context);
        }
    }

    fn bind_dom(&self, events: &[DomBinding]) {
        let mut by_type: Vec<(&str, Vec<(String, String)>)> = Vec::new();
        for binding in events {
            let route = (binding.selector.clone(), binding.method.clone());
            match by_type.iter_mut().find(|(t, _)| *t == binding.event_type) {
                Some((_, routes)) => routes.push(route),
                None => by_type.push((&binding.event_type, vec![route])),
            }
        }

        for (event_type, routes) in by_type {
            let weak = self.downgrade();
            let listener = NativeListener::new(move |event: &NativeEvent<H::Node>| {
                let Some(controller) = weak.upgrade() else {
                    return;
                };
                for (selector, method) in &routes {
                    if controller.delegates(selector, &event.target) {
                        controller.dispatch(method, &Invocation::Native(event));
                    }
                }
            });
            let host = self.inner.host.clone();
            let view = self.inner.view.clone();
            host.add_listener(&view, event_type, listener.clone());
            let event_type = event_type.to_owned();
            self.hold(Subscription::new(move || {
                host.remove_listener(&view, &event_type, &listener);
            }));
        }
    }

    fn delegates(&self, selector: &str, target: &H::Node) -> bool {
        let view = &self.inner.view;
        if selector.is_empty() {
            return target == view;
        }
        let host = &self.inner.host;
        host.is_descendant_or_self(target, view) && host.matches_selector(target, selector)
    }

    /// Run a bound method by name; a missing name is logged and skipped.
    fn dispatch(&self, name: &str, invocation: &Invocation<'_, H>) {
        if let Err(err) = self.invoke(name, invocation) {
            warn!(context = self.inner.context.id(), %err, "dispatch skipped");
        }
    }

    /// Run the method currently registered as `name`.
    pub fn invoke(&self, name: &str, invocation: &Invocation<'_, H>) -> Result<()> {
        let method = self
            .inner
            .methods
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_method(name, "a direct call"))?;
        method(self, invocation);
        Ok(())
    }

    /// Run the method currently registered as `name`, directly.
    pub fn call(&self, name: &str) -> Result<()> {
        self.invoke(name, &Invocation::Direct)
    }

    /// Run the current `render` method.
    pub fn render(&self) {
        self.dispatch(RENDER, &Invocation::Direct);
    }

    /// Run the current `remove` method. Unless replaced, that is
    /// [`teardown`](Self::teardown).
    pub fn remove(&self) {
        self.dispatch(REMOVE, &Invocation::Direct);
    }

    /// Release every binding and detach the node from its parent. Safe to
    /// call repeatedly.
    pub fn teardown(&self) {
        let mut bindings = std::mem::take(&mut *self.inner.bindings.borrow_mut());
        let released = bindings.binding_count();
        bindings.clear();

        let host = &self.inner.host;
        let view = &self.inner.view;
        if let Some(parent) = host.parent(view) {
            host.remove_child(&parent, view);
        }
        if !self.inner.removed.replace(true) {
            debug!(context = self.inner.context.id(), released, "controller removed");
        }
    }

    /// Replace (or add) a method. Bindings pick it up on their next dispatch.
    pub fn set_method(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Controller<H>, &Invocation<'_, H>) + 'static,
    ) {
        self.inner
            .methods
            .borrow_mut()
            .insert(name.into(), Rc::new(f));
    }

    /// Whether a method named `name` exists.
    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.inner.methods.borrow().contains_key(name)
    }

    /// Keep `subscription` alive until this controller is torn down.
    pub fn hold(&self, subscription: Subscription) {
        self.inner.bindings.borrow_mut().hold(subscription);
    }

    /// Number of live bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.inner.bindings.borrow().binding_count()
    }

    /// Whether `teardown` has run.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.inner.removed.get()
    }

    /// The owned node.
    #[must_use]
    pub fn view(&self) -> &H::Node {
        &self.inner.view
    }

    /// The host the node lives in.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.inner.host
    }

    /// The presented model, if any.
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        self.inner.model.as_ref()
    }

    /// Read a free-form property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<Value> {
        self.inner.properties.borrow().get(name).cloned()
    }

    /// Write a free-form property.
    pub fn set_property(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .properties
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    /// Identity used for this controller's subscriptions.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.inner.context
    }

    /// A non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakController<H> {
        WeakController {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

fn render_nothing<H: ViewHost>(_: &Controller<H>, _: &Invocation<'_, H>) {}

fn teardown<H: ViewHost>(controller: &Controller<H>, _: &Invocation<'_, H>) {
    controller.teardown();
}

fn create_view<H: ViewHost>(host: &H, options: &ControllerOptions<H>) -> H::Node {
    let node = host.create_node(&options.tag_name.resolve());
    let mut attributes: BTreeMap<String, String> = options.attributes.resolve();
    let id = options.id.resolve();
    if !id.is_empty() {
        attributes.insert("id".to_owned(), id);
    }
    let class_name = options.class_name.resolve();
    if !class_name.is_empty() {
        attributes.insert("class".to_owned(), class_name);
    }
    if !attributes.is_empty() {
        host.set_attributes(&node, &attributes);
    }
    node
}

impl<H: ViewHost> Clone for Controller<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: ViewHost> PartialEq for Controller<H> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<H: ViewHost> Eq for Controller<H> {}

impl<H: ViewHost> fmt::Debug for Controller<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("context", &self.inner.context.id())
            .field("view", &self.inner.view)
            .field("model", &self.inner.model)
            .field("bindings", &self.binding_count())
            .field("removed", &self.inner.removed.get())
            .finish()
    }
}
