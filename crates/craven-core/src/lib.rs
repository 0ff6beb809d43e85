#![forbid(unsafe_code)]

//! Observable models and collections for Craven.
//!
//! This crate holds the data half of the runtime:
//!
//! - [`Events`] / [`Publisher`]: named-event subscription table and the
//!   capability every stateful entity implements.
//! - [`Subscription`] / [`BindingScope`]: RAII guards that undo a
//!   registration, individually or for a whole owner.
//! - [`Schema`]: a model variant (name, attribute whitelist, validator).
//! - [`Model`]: attribute container with snapshot-based change detection.
//! - [`Collection`]: ordered sequence of models that announces every mutation
//!   and drops members when they are destroyed.
//!
//! # Architecture
//!
//! Entities are cheap `Clone` handles over `Rc` state, so callbacks can hold
//! the emitter they are wired to. Dispatch is synchronous and re-entrant:
//! a callback may mutate the emitter, register or unregister callbacks, or
//! trigger further events. Nothing here is `Send`.
//!
//! Every callback receives the event payload and the emitter. Payloads are
//! typed per emitter ([`ModelEvent`], [`CollectionEvent`]); user-defined
//! events travel as `Custom(serde_json::Value)`.
//!
//! # Invariants
//!
//! 1. Dispatch order is newest-registration-first.
//! 2. Each `off` removes exactly one `(callback, context)` pair.
//! 3. Callback identity is pointer identity on the shared closure.
//! 4. A collection only ever holds instances of its own schema.

pub mod collection;
pub mod error;
pub mod events;
pub mod model;
pub mod schema;
pub mod scope;

pub use collection::{Collection, CollectionConfig, CollectionEvent, Item};
pub use error::{Error, Result, ValidationError, ValidationErrors};
pub use events::{Callback, ContextId, Events, Publisher, names};
pub use model::{Model, ModelEvent};
pub use schema::{Attributes, Schema, SchemaBuilder, Validator};
pub use scope::{BindingScope, Subscription};

pub use serde_json;

/// Build an [`Attributes`] map from `key => value` pairs. Values go through
/// [`serde_json::json!`].
///
/// # Examples
///
/// ```
/// use craven_core::attrs;
///
/// let data = attrs! {"title" => "write docs", "done" => false};
/// assert_eq!(data.len(), 2);
/// assert_eq!(data["done"], false);
/// ```
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::Attributes::new()
    };
    ($($key:expr => $value:tt),+ $(,)?) => {{
        let mut map = $crate::Attributes::new();
        $(
            map.insert(::std::string::String::from($key), $crate::serde_json::json!($value));
        )+
        map
    }};
}
