#![forbid(unsafe_code)]

//! Controller that keeps one child controller per collection member.
//!
//! # Invariants
//!
//! 1. `children[i]` renders `collection[i]` after every `add`, `remove` and
//!    `reset`.
//! 2. The children's nodes are the children of this controller's node, in the
//!    same order, so a collection index is also a host child index.
//! 3. Children created together are inserted into the host in one batch.
//! 4. Removing the controller removes every child, after any caller-supplied
//!    `remove` method has run.
//!
//! # Failure Modes
//!
//! A listener that mutates the collection during `add` or `remove` dispatch
//! makes the nested event reach this controller before the outer one, so the
//! event index can be stale. `add` positions follow the member's current
//! collection index, clamped to the child list as `Array.prototype.splice`
//! does. `remove` drains the event range when its children still show the
//! removed models, and otherwise finds the children by model.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use craven_core::names::{ADD, REMOVE as REMOVE_EVENT, RESET};
use craven_core::{Callback, Collection, CollectionEvent, Model, Publisher};
use tracing::debug;

use crate::controller::{Controller, ControllerOptions, Invocation, REMOVE, WeakController};
use crate::error::Result;
use crate::host::ViewHost;
use crate::model_controller::ModelController;

/// Builds the child controller for one member.
pub type ChildFactory<H> = Rc<dyn Fn(&H, &Model) -> Controller<H>>;

struct Children<H: ViewHost> {
    collection: Collection,
    list: RefCell<Vec<Controller<H>>>,
    factory: ChildFactory<H>,
}

impl<H: ViewHost> Children<H> {
    fn spawn(&self, host: &H, models: &[Model]) -> Vec<Controller<H>> {
        models
            .iter()
            .map(|model| {
                let child = (self.factory)(host, model);
                child.render();
                child
            })
            .collect()
    }

    fn insert(&self, parent: &Controller<H>, models: &[Model], index: usize) {
        let spawned = self.spawn(parent.host(), models);
        let nodes: Vec<H::Node> = spawned.iter().map(|c| c.view().clone()).collect();
        let mut list = self.list.borrow_mut();
        let current = models
            .first()
            .and_then(|m| self.collection.index_of(m))
            .unwrap_or(index);
        let at = current.min(list.len());
        if at != index {
            debug!(index, at, tracked = list.len(), "add index adjusted");
        }
        parent.host().insert_children(parent.view(), at, &nodes);
        list.splice(at..at, spawned);
    }

    fn remove(&self, index: usize, models: &[Model]) {
        let removed: Vec<Controller<H>> = {
            let mut list = self.list.borrow_mut();
            let end = index.saturating_add(models.len());
            let in_place = list.get(index..end).is_some_and(|range| {
                range
                    .iter()
                    .zip(models)
                    .all(|(child, model)| child.model().is_none_or(|m| m == model))
            });
            if in_place {
                list.drain(index..end).collect()
            } else {
                debug!(index, count = models.len(), tracked = list.len(), "remove located by model");
                models
                    .iter()
                    .filter_map(|model| {
                        let at = list.iter().position(|c| c.model() == Some(model))?;
                        Some(list.remove(at))
                    })
                    .collect()
            }
        };
        for child in removed {
            child.remove();
        }
    }

    fn clear(&self) {
        let removed = std::mem::take(&mut *self.list.borrow_mut());
        for child in removed {
            child.remove();
        }
    }

    fn on_add(&self, parent: &Controller<H>, event: &CollectionEvent) {
        if let CollectionEvent::Add { models, index } = event {
            self.insert(parent, models, *index);
        }
    }

    fn on_remove(&self, _: &Controller<H>, event: &CollectionEvent) {
        if let CollectionEvent::Remove { models, index } = event {
            self.remove(*index, models);
        }
    }

    fn on_reset(&self, parent: &Controller<H>, _: &CollectionEvent) {
        self.rebuild(parent);
    }

    fn rebuild(&self, parent: &Controller<H>) {
        self.clear();
        let models = self.collection.models();
        if !models.is_empty() {
            self.insert(parent, &models, 0);
        }
    }
}

/// A [`Controller`] mirroring a collection through child controllers.
pub struct CollectionController<H: ViewHost> {
    controller: Controller<H>,
    children: Rc<Children<H>>,
}

impl<H: ViewHost> CollectionController<H> {
    /// Bind `collection`; each member gets a [`ModelController`] with default
    /// options.
    pub fn new(host: &H, collection: &Collection, options: ControllerOptions<H>) -> Result<Self> {
        Self::with_factory(host, collection, options, default_child::<H>)
    }

    /// Bind `collection`, building each member's controller with `factory`.
    ///
    /// The `remove` method installed here runs the caller's `remove` from
    /// `options` (or the base teardown when there is none) and then removes
    /// every child.
    pub fn with_factory(
        host: &H,
        collection: &Collection,
        options: ControllerOptions<H>,
        factory: impl Fn(&H, &Model) -> Controller<H> + 'static,
    ) -> Result<Self> {
        let children = Rc::new(Children {
            collection: collection.clone(),
            list: RefCell::new(Vec::new()),
            factory: Rc::new(factory),
        });

        let cascade = Rc::clone(&children);
        let custom = options.method_named(REMOVE);
        let options = options.method(
            REMOVE,
            move |controller: &Controller<H>, invocation: &Invocation<'_, H>| {
                match &custom {
                    Some(remove) => remove(controller, invocation),
                    None => controller.teardown(),
                }
                cascade.clear();
            },
        );
        options.check()?;
        let controller = Controller::build(host, options);

        children.rebuild(&controller);
        Self::bind(&controller, &children);
        debug!(
            context = controller.context().id(),
            children = children.list.borrow().len(),
            "collection controller bound"
        );
        Ok(Self {
            controller,
            children,
        })
    }

    fn bind(controller: &Controller<H>, children: &Rc<Children<H>>) {
        let handler = |on_event: fn(&Children<H>, &Controller<H>, &CollectionEvent)| {
            let parent: WeakController<H> = controller.downgrade();
            let children: Weak<Children<H>> = Rc::downgrade(children);
            Callback::new(move |event: &CollectionEvent, _: &Collection| {
                if let (Some(parent), Some(children)) = (parent.upgrade(), children.upgrade()) {
                    on_event(&children, &parent, event);
                }
            })
        };

        let collection = &children.collection;
        let context = controller.context();
        controller.hold(collection.subscribe_with(ADD, handler(Children::on_add), context));
        controller.hold(collection.subscribe_with(
            REMOVE_EVENT,
            handler(Children::on_remove),
            context,
        ));
        controller.hold(collection.subscribe_with(RESET, handler(Children::on_reset), context));
    }

    /// The bound collection.
    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.children.collection
    }

    /// Snapshot of the child controllers, in member order.
    #[must_use]
    pub fn children(&self) -> Vec<Controller<H>> {
        self.children.list.borrow().clone()
    }

    /// Child controller at `index`.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<Controller<H>> {
        self.children.list.borrow().get(index).cloned()
    }

    /// Number of child controllers.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.list.borrow().len()
    }

    /// The underlying controller handle.
    #[must_use]
    pub fn controller(&self) -> &Controller<H> {
        &self.controller
    }
}

fn default_child<H: ViewHost>(host: &H, model: &Model) -> Controller<H> {
    ModelController::with_model(host, model).into_controller()
}

impl<H: ViewHost> Deref for CollectionController<H> {
    type Target = Controller<H>;

    fn deref(&self) -> &Controller<H> {
        &self.controller
    }
}

impl<H: ViewHost> Clone for CollectionController<H> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            children: Rc::clone(&self.children),
        }
    }
}

impl<H: ViewHost> fmt::Debug for CollectionController<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionController")
            .field("controller", &self.controller)
            .field("collection", &self.children.collection)
            .field("children", &self.child_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::RENDER;
    use crate::document::{Document, NodeId};
    use craven_core::names::DESTROY;
    use craven_core::{Schema, attrs};

    fn schema() -> Rc<craven_core::Schema> {
        Schema::new("Item", ["a"]).unwrap()
    }

    fn labelled(host: &Document, model: &Model) -> Controller<Document> {
        ModelController::new(
            host,
            model,
            ControllerOptions::new().tag_name("li").method(
                RENDER,
                |c: &Controller<Document>, _: &Invocation<'_, Document>| {
                    let label = c.model().and_then(|m| m.get("a")).map(|v| v.to_string());
                    c.host().set_text(*c.view(), label.unwrap_or_default());
                },
            ),
        )
        .map(ModelController::into_controller)
        .unwrap()
    }

    fn labels(doc: &Document, node: NodeId) -> Vec<String> {
        doc.children(&node).into_iter().map(|n| doc.text(n)).collect()
    }

    fn assert_aligned(doc: &Document, cc: &CollectionController<Document>) {
        let views: Vec<NodeId> = cc.children().iter().map(|c| *c.view()).collect();
        assert_eq!(doc.children(cc.view()), views);
        let models: Vec<Model> = cc.children().iter().filter_map(|c| c.model().cloned()).collect();
        assert_eq!(models, cc.collection().models());
    }

    #[test]
    fn push_and_pop_on_empty_collection() {
        let doc = Document::new();
        let collection = Collection::new(&schema());
        let cc = CollectionController::new(&doc, &collection, ControllerOptions::new()).unwrap();
        assert_eq!(cc.child_count(), 0);

        collection.push([attrs! {"a" => 1}]);
        assert_eq!(cc.child_count(), 1);
        let child = cc.child(0).unwrap();
        assert_eq!(doc.children(cc.view()).first(), Some(child.view()));

        collection.pop();
        assert_eq!(cc.child_count(), 0);
        assert!(doc.children(cc.view()).is_empty());
    }

    #[test]
    fn initial_members_are_rendered_and_inserted_in_one_batch() {
        let doc = Document::new();
        let collection = Collection::from_items(
            &schema(),
            [attrs! {"a" => 1}, attrs! {"a" => 2}, attrs! {"a" => 3}],
        );
        let before = doc.mutation_count();
        let cc = CollectionController::with_factory(
            &doc,
            &collection,
            ControllerOptions::new().tag_name("ul"),
            labelled,
        )
        .unwrap();
        assert_eq!(doc.mutation_count(), before + 1);
        assert_eq!(labels(&doc, *cc.view()), ["1", "2", "3"]);
        assert_aligned(&doc, &cc);
    }

    #[test]
    fn add_batches_at_the_event_index() {
        let doc = Document::new();
        let collection = Collection::from_items(&schema(), [attrs! {"a" => 1}, attrs! {"a" => 4}]);
        let cc =
            CollectionController::with_factory(&doc, &collection, ControllerOptions::new(), labelled)
                .unwrap();

        let before = doc.mutation_count();
        collection.splice(1, 0, [attrs! {"a" => 2}, attrs! {"a" => 3}]);
        assert_eq!(doc.mutation_count(), before + 1);
        assert_eq!(labels(&doc, *cc.view()), ["1", "2", "3", "4"]);
        assert_aligned(&doc, &cc);

        collection.unshift([attrs! {"a" => 0}]);
        assert_eq!(labels(&doc, *cc.view()), ["0", "1", "2", "3", "4"]);
        assert_aligned(&doc, &cc);
    }

    #[test]
    fn remove_drops_the_matching_children() {
        let doc = Document::new();
        let collection = Collection::from_items(
            &schema(),
            [attrs! {"a" => 1}, attrs! {"a" => 2}, attrs! {"a" => 3}],
        );
        let cc =
            CollectionController::with_factory(&doc, &collection, ControllerOptions::new(), labelled)
                .unwrap();
        let middle = cc.child(1).unwrap();

        collection.splice(1, 2, [attrs! {"a" => 9}]);
        assert!(middle.is_removed());
        assert_eq!(labels(&doc, *cc.view()), ["1", "9"]);
        assert_aligned(&doc, &cc);

        collection.shift();
        assert_eq!(labels(&doc, *cc.view()), ["9"]);
        assert_aligned(&doc, &cc);
    }

    #[test]
    fn destroying_a_member_removes_its_child() {
        let doc = Document::new();
        let collection = Collection::from_items(&schema(), [attrs! {"a" => 1}, attrs! {"a" => 2}]);
        let cc = CollectionController::new(&doc, &collection, ControllerOptions::new()).unwrap();
        let first = collection.get(0).unwrap();
        let child = cc.child(0).unwrap();

        first.destroy();
        assert!(child.is_removed());
        assert_eq!(cc.child_count(), 1);
        assert_eq!(first.subscriber_count(DESTROY), 0);
        assert_aligned(&doc, &cc);
    }

    #[test]
    fn reset_rebuilds_children() {
        let doc = Document::new();
        let collection = Collection::from_items(&schema(), [attrs! {"a" => 1}, attrs! {"a" => 2}]);
        let cc =
            CollectionController::with_factory(&doc, &collection, ControllerOptions::new(), labelled)
                .unwrap();
        let old = cc.children();

        collection.reset([attrs! {"a" => 7}, attrs! {"a" => 8}, attrs! {"a" => 9}]);
        assert!(old.iter().all(Controller::is_removed));
        assert_eq!(labels(&doc, *cc.view()), ["7", "8", "9"]);
        assert_aligned(&doc, &cc);
    }

    #[test]
    fn member_changes_rerender_their_child() {
        let doc = Document::new();
        let collection = Collection::from_items(&schema(), [attrs! {"a" => 1}]);
        let cc =
            CollectionController::with_factory(&doc, &collection, ControllerOptions::new(), labelled)
                .unwrap();
        let member = collection.get(0).unwrap();
        member.set("a", 5);
        member.save();
        assert_eq!(labels(&doc, *cc.view()), ["5"]);
    }

    #[test]
    fn push_from_an_add_listener_stays_aligned() {
        let doc = Document::new();
        let collection = Collection::new(&schema());
        let cc = CollectionController::new(&doc, &collection, ControllerOptions::new()).unwrap();
        let once = Rc::new(std::cell::Cell::new(false));
        let o = Rc::clone(&once);
        collection.on(
            ADD,
            Callback::new(move |_: &CollectionEvent, c: &Collection| {
                if !o.replace(true) {
                    c.push([attrs! {"a" => 2}]);
                }
            }),
        );

        collection.push([attrs! {"a" => 1}]);
        assert_eq!(collection.len(), 2);
        assert_eq!(cc.child_count(), 2);
        assert_aligned(&doc, &cc);
    }

    #[test]
    fn unshift_from_an_add_listener_stays_aligned() {
        let doc = Document::new();
        let collection = Collection::from_items(&schema(), [attrs! {"a" => 0}]);
        let cc =
            CollectionController::with_factory(&doc, &collection, ControllerOptions::new(), labelled)
                .unwrap();
        let once = Rc::new(std::cell::Cell::new(false));
        let o = Rc::clone(&once);
        collection.on(
            ADD,
            Callback::new(move |_: &CollectionEvent, c: &Collection| {
                if !o.replace(true) {
                    c.unshift([attrs! {"a" => 9}]);
                }
            }),
        );

        collection.push([attrs! {"a" => 1}]);
        assert_eq!(labels(&doc, *cc.view()), ["9", "0", "1"]);
        assert_aligned(&doc, &cc);
    }

    #[test]
    fn shift_from_a_remove_listener_stays_aligned() {
        let doc = Document::new();
        let collection = Collection::from_items(
            &schema(),
            [attrs! {"a" => 1}, attrs! {"a" => 2}, attrs! {"a" => 3}],
        );
        let cc = CollectionController::new(&doc, &collection, ControllerOptions::new()).unwrap();
        let once = Rc::new(std::cell::Cell::new(false));
        let o = Rc::clone(&once);
        collection.on(
            REMOVE_EVENT,
            Callback::new(move |_: &CollectionEvent, c: &Collection| {
                if !o.replace(true) {
                    c.shift();
                }
            }),
        );

        collection.pop();
        assert_eq!(collection.len(), 1);
        assert_eq!(cc.child_count(), 1);
        assert_aligned(&doc, &cc);
    }

    #[test]
    fn caller_remove_runs_before_the_cascade() {
        let doc = Document::new();
        let collection = Collection::from_items(&schema(), [attrs! {"a" => 1}]);
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let l = Rc::clone(&log);
        let cc = CollectionController::new(
            &doc,
            &collection,
            ControllerOptions::new().method(
                REMOVE,
                move |c: &Controller<Document>, _: &Invocation<'_, Document>| {
                    l.borrow_mut().push(format!("custom with {} bindings", c.binding_count()));
                    c.teardown();
                },
            ),
        )
        .unwrap();
        let child = cc.child(0).unwrap();

        cc.remove();
        assert_eq!(*log.borrow(), ["custom with 3 bindings"]);
        assert!(cc.is_removed());
        assert!(child.is_removed());
        assert_eq!(cc.child_count(), 0);
    }

    #[test]
    fn remove_cascades_and_unbinds() {
        let doc = Document::new();
        let collection = Collection::from_items(&schema(), [attrs! {"a" => 1}, attrs! {"a" => 2}]);
        let cc = CollectionController::new(&doc, &collection, ControllerOptions::new()).unwrap();
        doc.append_child(&doc.body(), cc.view());
        let children = cc.children();
        assert_eq!(collection.subscriber_count(ADD), 1);

        cc.remove();
        assert!(cc.is_removed());
        assert!(children.iter().all(Controller::is_removed));
        assert_eq!(cc.child_count(), 0);
        assert_eq!(collection.subscriber_count(ADD), 0);
        assert_eq!(collection.subscriber_count(REMOVE_EVENT), 0);
        assert_eq!(collection.subscriber_count(RESET), 0);
        assert!(doc.children(&doc.body()).is_empty());
        for model in collection.iter() {
            // Only the collection's own destroy listener is left.
            assert_eq!(model.subscriber_count(DESTROY), 1);
        }

        collection.push([attrs! {"a" => 3}]);
        assert_eq!(cc.child_count(), 0);
        cc.remove();
    }
}
