#![forbid(unsafe_code)]

//! Ordered, observable sequence of models with intercepted mutation.
//!
//! # Design
//!
//! A [`Collection`] wraps a `Vec<Model>` and a schema. Every mutator funnels
//! through two primitives: *insert* (coerce raw items into models of the
//! collection's schema, subscribe to their `destroy`, splice them in, fire
//! `add`) and *remove* (splice out, unsubscribe, fire `remove`). `splice`
//! combines both; `reset` swaps the whole sequence and fires only `reset`.
//!
//! # Invariants
//!
//! 1. Every element is an instance of the collection's schema; raw attribute
//!    maps are converted before anything is mutated.
//! 2. Each member carries exactly one `destroy` subscription owned by this
//!    collection per occurrence, added on insertion and removed on removal.
//! 3. A member's `destroy` removes it, firing `remove` with the member's
//!    position at that moment.
//! 4. `add`/`remove` payloads carry the index where the change happened.
//!    For `splice`, `remove` fires before `add`.
//!
//! # Failure Modes
//!
//! | Call | Situation | Behavior |
//! |------|-----------|----------|
//! | `pop`/`shift` | empty | `None`, no event |
//! | `remove`/`remove_at` | unknown model / index out of range | `None`, no event |
//! | `splice` | `start > len` | panics before mutating |

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::events::names::{ADD, CHANGE, DESTROY, REMOVE, RESET};
use crate::events::{Callback, ContextId, Events, Publisher};
use crate::model::{Model, ModelEvent};
use crate::schema::{Attributes, Schema};

/// Payload of collection events.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent {
    /// `add`: models inserted, in order, starting at `index`.
    Add { models: Vec<Model>, index: usize },
    /// `remove`: models removed, in order, that started at `index`.
    Remove { models: Vec<Model>, index: usize },
    /// `reset`: the sequence held before the reset.
    Reset { previous: Vec<Model> },
    /// `change`: a member's `change`, re-broadcast when propagation is on.
    Change {
        model: Model,
        changed: Attributes,
        previous: Attributes,
    },
    /// Any user-defined event.
    Custom(Value),
}

impl CollectionEvent {
    /// Models carried by the event.
    #[must_use]
    pub fn models(&self) -> &[Model] {
        match self {
            Self::Add { models, .. } | Self::Remove { models, .. } => models,
            Self::Reset { previous } => previous,
            Self::Change { model, .. } => std::slice::from_ref(model),
            Self::Custom(_) => &[],
        }
    }

    /// Index carried by `add`/`remove`.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Add { index, .. } | Self::Remove { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Collection configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Re-broadcast each member's `change` as the collection's own `change`.
    pub propagate_change: bool,
}

impl CollectionConfig {
    /// Enable or disable `change` propagation.
    #[must_use]
    pub fn with_change_propagation(mut self, enabled: bool) -> Self {
        self.propagate_change = enabled;
        self
    }
}

/// Something a collection can store: a model, or raw attributes to convert.
#[derive(Debug, Clone)]
pub enum Item {
    /// An existing model. Kept as-is when it is an instance of the
    /// collection's schema, otherwise its projection is copied into a new one.
    Model(Model),
    /// Raw data, converted into a new model.
    Attributes(Attributes),
}

impl From<Model> for Item {
    fn from(model: Model) -> Self {
        Self::Model(model)
    }
}

impl From<&Model> for Item {
    fn from(model: &Model) -> Self {
        Self::Model(model.clone())
    }
}

impl From<Attributes> for Item {
    fn from(data: Attributes) -> Self {
        Self::Attributes(data)
    }
}

struct CollectionInner {
    context: ContextId,
    schema: Rc<Schema>,
    config: CollectionConfig,
    models: RefCell<Vec<Model>>,
    events: Events<CollectionEvent, Collection>,
    on_destroy: Callback<ModelEvent, Model>,
    on_change: Callback<ModelEvent, Model>,
}

/// Shared handle to one collection.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

impl Collection {
    /// Create an empty collection of `schema` instances.
    #[must_use]
    pub fn new(schema: &Rc<Schema>) -> Self {
        Self::with_config(schema, CollectionConfig::default())
    }

    /// Create an empty collection with explicit configuration.
    #[must_use]
    pub fn with_config(schema: &Rc<Schema>, config: CollectionConfig) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<CollectionInner>| {
            let on_destroy = {
                let weak = weak.clone();
                Callback::new(move |_: &ModelEvent, model: &Model| {
                    if let Some(inner) = weak.upgrade() {
                        Collection { inner }.remove(model);
                    }
                })
            };
            let on_change = {
                let weak = weak.clone();
                Callback::new(move |event: &ModelEvent, model: &Model| {
                    let (Some(inner), ModelEvent::Change { changed, previous }) =
                        (weak.upgrade(), event)
                    else {
                        return;
                    };
                    Collection { inner }.trigger(
                        CHANGE,
                        &CollectionEvent::Change {
                            model: model.clone(),
                            changed: changed.clone(),
                            previous: previous.clone(),
                        },
                    );
                })
            };
            CollectionInner {
                context: ContextId::next(),
                schema: Rc::clone(schema),
                config,
                models: RefCell::new(Vec::new()),
                events: Events::new(),
                on_destroy,
                on_change,
            }
        });
        Self { inner }
    }

    /// Create a collection holding `items`, in order. Fires nothing.
    pub fn from_items<I>(schema: &Rc<Schema>, items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let collection = Self::new(schema);
        let models = collection.objectify(items);
        collection.inner.models.borrow_mut().extend(models);
        collection
    }

    /// The schema members are coerced into.
    #[must_use]
    pub fn schema(&self) -> &Rc<Schema> {
        &self.inner.schema
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> CollectionConfig {
        self.inner.config
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.models.borrow().len()
    }

    /// Whether there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.models.borrow().is_empty()
    }

    /// Member at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Model> {
        self.inner.models.borrow().get(index).cloned()
    }

    /// First member.
    #[must_use]
    pub fn first(&self) -> Option<Model> {
        self.inner.models.borrow().first().cloned()
    }

    /// Last member.
    #[must_use]
    pub fn last(&self) -> Option<Model> {
        self.inner.models.borrow().last().cloned()
    }

    /// Snapshot of the members, in order.
    #[must_use]
    pub fn models(&self) -> Vec<Model> {
        self.inner.models.borrow().clone()
    }

    /// Iterate over a snapshot of the members.
    pub fn iter(&self) -> std::vec::IntoIter<Model> {
        self.models().into_iter()
    }

    /// Position of `model`, by identity.
    #[must_use]
    pub fn index_of(&self, model: &Model) -> Option<usize> {
        self.inner.models.borrow().iter().position(|m| m == model)
    }

    /// Whether `model` is a member.
    #[must_use]
    pub fn contains(&self, model: &Model) -> bool {
        self.index_of(model).is_some()
    }

    /// Projection of every member, in order.
    #[must_use]
    pub fn to_json(&self) -> Vec<Attributes> {
        self.inner.models.borrow().iter().map(Model::to_json).collect()
    }

    /// Append `items`. Fires `add` at the old length; returns the new length.
    pub fn push<I>(&self, items: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let index = self.len();
        self.insert(items, index)
    }

    /// Remove the last member. Fires `remove` at its index.
    pub fn pop(&self) -> Option<Model> {
        let removed = self.inner.models.borrow_mut().pop()?;
        let index = self.len();
        self.finish_removal(vec![removed.clone()], index);
        Some(removed)
    }

    /// Remove the first member. Fires `remove` at index 0.
    pub fn shift(&self) -> Option<Model> {
        self.remove_at(0)
    }

    /// Prepend `items`. Fires `add` at index 0; returns the new length.
    pub fn unshift<I>(&self, items: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        self.insert(items, 0)
    }

    /// Remove up to `delete_count` members starting at `start`, inserting
    /// `items` in their place. Returns the removed members.
    ///
    /// Fires `remove` (if anything was removed) then `add` (if anything was
    /// inserted), both at `start`.
    ///
    /// # Panics
    ///
    /// Panics if `start` is past the end of the collection.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Vec<Model>
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let len = self.len();
        assert!(
            start <= len,
            "splice start {start} is past the end of a collection of length {len}"
        );
        let inserted = self.objectify(items);
        let end = start + delete_count.min(len - start);
        let removed: Vec<Model> = {
            let mut models = self.inner.models.borrow_mut();
            let removed: Vec<Model> = models.splice(start..end, inserted.iter().cloned()).collect();
            removed
        };
        self.unbind(&removed);
        debug!(
            collection = self.inner.schema.name(),
            start,
            removed = removed.len(),
            inserted = inserted.len(),
            "splice"
        );

        if !removed.is_empty() {
            self.trigger(
                REMOVE,
                &CollectionEvent::Remove {
                    models: removed.clone(),
                    index: start,
                },
            );
        }
        if !inserted.is_empty() {
            self.trigger(
                ADD,
                &CollectionEvent::Add {
                    models: inserted,
                    index: start,
                },
            );
        }
        removed
    }

    /// Replace the whole sequence with `items`. Fires only `reset`, with the
    /// previous members; returns them.
    pub fn reset<I>(&self, items: I) -> Vec<Model>
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let models = self.objectify(items);
        let previous = std::mem::replace(&mut *self.inner.models.borrow_mut(), models);
        self.unbind(&previous);
        debug!(
            collection = self.inner.schema.name(),
            previous = previous.len(),
            current = self.len(),
            "reset"
        );
        self.trigger(
            RESET,
            &CollectionEvent::Reset {
                previous: previous.clone(),
            },
        );
        previous
    }

    /// Remove `model` if it is a member.
    pub fn remove(&self, model: &Model) -> Option<Model> {
        let index = self.index_of(model)?;
        self.remove_at(index)
    }

    /// Remove the member at `index`; no-op when out of range.
    pub fn remove_at(&self, index: usize) -> Option<Model> {
        let removed = {
            let mut models = self.inner.models.borrow_mut();
            if index >= models.len() {
                return None;
            }
            models.remove(index)
        };
        self.finish_removal(vec![removed.clone()], index);
        Some(removed)
    }

    fn insert<I>(&self, items: I, index: usize) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let models = self.objectify(items);
        let len = {
            let mut current = self.inner.models.borrow_mut();
            current.splice(index..index, models.iter().cloned());
            current.len()
        };
        debug!(
            collection = self.inner.schema.name(),
            index,
            added = models.len(),
            "insert"
        );
        self.trigger(ADD, &CollectionEvent::Add { models, index });
        len
    }

    fn finish_removal(&self, removed: Vec<Model>, index: usize) {
        self.unbind(&removed);
        debug!(
            collection = self.inner.schema.name(),
            index,
            removed = removed.len(),
            "remove"
        );
        self.trigger(
            REMOVE,
            &CollectionEvent::Remove {
                models: removed,
                index,
            },
        );
    }

    /// Convert items into members and subscribe to their lifecycle.
    fn objectify<I>(&self, items: I) -> Vec<Model>
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let inner = &self.inner;
        items
            .into_iter()
            .map(|item| {
                let model = match item.into() {
                    Item::Model(model) if model.is_instance_of(&inner.schema) => model,
                    Item::Model(other) => Model::with_attributes(&inner.schema, &other.to_json()),
                    Item::Attributes(data) => Model::with_attributes(&inner.schema, &data),
                };
                model.on_with(DESTROY, inner.on_destroy.clone(), inner.context);
                if inner.config.propagate_change {
                    model.on_with(CHANGE, inner.on_change.clone(), inner.context);
                }
                model
            })
            .collect()
    }

    /// Drop this collection's lifecycle subscriptions from `models`.
    fn unbind(&self, models: &[Model]) {
        let inner = &self.inner;
        for model in models.iter().rev() {
            model.off_with(DESTROY, &inner.on_destroy, inner.context);
            if inner.config.propagate_change {
                model.off_with(CHANGE, &inner.on_change, inner.context);
            }
        }
    }
}

impl Publisher for Collection {
    type Args = CollectionEvent;

    fn events(&self) -> &Events<CollectionEvent, Collection> {
        &self.inner.events
    }

    fn context(&self) -> ContextId {
        self.inner.context
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Collection {}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("schema", &self.inner.schema.name())
            .field("len", &self.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let models = self.inner.models.borrow();
        let mut seq = serializer.serialize_seq(Some(models.len()))?;
        for model in models.iter() {
            seq.serialize_element(&model.to_json())?;
        }
        seq.end()
    }
}
