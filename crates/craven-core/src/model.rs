#![forbid(unsafe_code)]

//! Observable attribute container with snapshot-based change detection.
//!
//! # Design
//!
//! A [`Model`] holds two attribute maps:
//!
//! - **live fields**: what `get`/`set`/`update`/`reset` read and write;
//! - **saved snapshot**: the projection captured by the last `reset` or
//!   successful `save`, used only as the diff baseline.
//!
//! `save()` diffs the whitelist projection of the live fields against the
//! snapshot, commits, and triggers `change` with the changed subset and the
//! previous snapshot.
//!
//! # Invariants
//!
//! 1. `to_json()` is always the whitelist projection of the live fields,
//!    never of the snapshot.
//! 2. `update`/`reset` never write a non-whitelisted key.
//! 3. The snapshot changes only in `reset` and in a `save` that passed
//!    validation.
//! 4. `change` fires iff at least one projected key differs from the
//!    snapshot.
//! 5. Cloning a `Model` yields another handle to the same instance; equality
//!    is identity.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::error::ValidationErrors;
use crate::events::names::{CHANGE, DESTROY, INVALID};
use crate::events::{ContextId, Events, Publisher};
use crate::schema::{Attributes, Schema, Validator};

/// Payload of model events.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// `change`: the keys that differ from the previous snapshot, with their
    /// new values, and the previous snapshot itself.
    Change {
        changed: Attributes,
        previous: Attributes,
    },
    /// `destroy`.
    Destroy,
    /// `invalid`: validation blocked a `save`.
    Invalid(ValidationErrors),
    /// Any user-defined event.
    Custom(Value),
}

struct ModelInner {
    context: ContextId,
    schema: Rc<Schema>,
    fields: RefCell<Attributes>,
    saved: RefCell<Attributes>,
    validator: RefCell<Option<Validator>>,
    events: Events<ModelEvent, Model>,
}

/// Shared handle to one model instance.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl Model {
    /// Create an empty instance of `schema`.
    #[must_use]
    pub fn new(schema: &Rc<Schema>) -> Self {
        Self {
            inner: Rc::new(ModelInner {
                context: ContextId::next(),
                schema: Rc::clone(schema),
                fields: RefCell::new(Attributes::new()),
                saved: RefCell::new(Attributes::new()),
                validator: RefCell::new(None),
                events: Events::new(),
            }),
        }
    }

    /// Create an instance and `reset` it from `data`.
    #[must_use]
    pub fn with_attributes(schema: &Rc<Schema>, data: &Attributes) -> Self {
        let model = Self::new(schema);
        model.reset(data);
        model
    }

    /// The variant this model is an instance of.
    #[must_use]
    pub fn schema(&self) -> &Rc<Schema> {
        &self.inner.schema
    }

    /// Whether this model is an instance of `schema`.
    #[must_use]
    pub fn is_instance_of(&self, schema: &Rc<Schema>) -> bool {
        Rc::ptr_eq(&self.inner.schema, schema)
    }

    /// Read a live field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.fields.borrow().get(name).cloned()
    }

    /// Assign a live field directly. Not filtered: a non-whitelisted field is
    /// stored but never appears in `to_json()`.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .fields
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    /// Assign the whitelist projection of `data` onto the live fields and
    /// make it the new saved snapshot. Fires nothing.
    pub fn reset(&self, data: &Attributes) {
        let filtered = self.inner.schema.pick(data);
        self.inner
            .fields
            .borrow_mut()
            .extend(filtered.iter().map(|(k, v)| (k.clone(), v.clone())));
        *self.inner.saved.borrow_mut() = filtered;
    }

    /// Merge the whitelist projection of `data` onto the live fields. The
    /// snapshot is untouched and nothing fires.
    pub fn update(&self, data: &Attributes) {
        let filtered = self.inner.schema.pick(data);
        self.inner.fields.borrow_mut().extend(filtered);
    }

    /// Whitelist projection of the live fields.
    #[must_use]
    pub fn to_json(&self) -> Attributes {
        self.inner.schema.pick(&self.inner.fields.borrow())
    }

    /// Run the instance validator if one is set, otherwise the schema's.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let validator = self
            .inner
            .validator
            .borrow()
            .clone()
            .or_else(|| self.inner.schema.validator().cloned());
        match validator {
            Some(validator) => validator(self),
            None => Ok(()),
        }
    }

    /// Override the schema validator for this instance only.
    pub fn set_validator(
        &self,
        validator: impl Fn(&Model) -> Result<(), ValidationErrors> + 'static,
    ) {
        *self.inner.validator.borrow_mut() = Some(Rc::new(validator));
    }

    /// Drop the instance override, falling back to the schema validator.
    pub fn clear_validator(&self) {
        self.inner.validator.borrow_mut().take();
    }

    /// Commit the live projection as the new snapshot.
    ///
    /// Returns `false`, after triggering `invalid`, when validation fails;
    /// nothing else happens in that case. Otherwise commits, triggers
    /// `change` if any key differs from the previous snapshot, and returns
    /// `true` whether or not anything changed.
    pub fn save(&self) -> bool {
        if let Err(errors) = self.validate() {
            debug!(model = self.inner.schema.name(), %errors, "save blocked by validation");
            self.trigger(INVALID, &ModelEvent::Invalid(errors));
            return false;
        }

        let current = self.to_json();
        let previous = std::mem::replace(&mut *self.inner.saved.borrow_mut(), current.clone());
        let changed: Attributes = current
            .into_iter()
            .filter(|(key, value)| previous.get(key) != Some(value))
            .collect();

        if !changed.is_empty() {
            debug!(model = self.inner.schema.name(), keys = changed.len(), "model changed");
            self.trigger(CHANGE, &ModelEvent::Change { changed, previous });
        }
        true
    }

    /// Whether a `save` right now would report a change.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        let saved = self.inner.saved.borrow();
        self.to_json()
            .iter()
            .any(|(key, value)| saved.get(key) != Some(value))
    }

    /// Announce destruction. Removal from collections is up to listeners.
    pub fn destroy(&self) {
        self.trigger(DESTROY, &ModelEvent::Destroy);
    }

    #[cfg(test)]
    pub(crate) fn saved_snapshot(&self) -> Attributes {
        self.inner.saved.borrow().clone()
    }
}

impl Publisher for Model {
    type Args = ModelEvent;

    fn events(&self) -> &Events<ModelEvent, Model> {
        &self.inner.events
    }

    fn context(&self) -> ContextId {
        self.inner.context
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("schema", &self.inner.schema.name())
            .field("context", &self.inner.context.id())
            .field("fields", &*self.inner.fields.borrow())
            .finish()
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
