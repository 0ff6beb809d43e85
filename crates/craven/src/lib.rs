#![forbid(unsafe_code)]

//! Craven: a small reactive data-binding runtime.
//!
//! Models and collections publish named events; controllers subscribe to
//! them and keep a node tree in sync. This crate re-exports the pieces:
//!
//! | Crate | Contents |
//! |-------|----------|
//! | [`core`] | events, binding scopes, schemas, models, collections |
//! | [`view`] | view hosts, controllers, the in-memory document |
//! | [`router`] | path-pattern router and session history (feature `router`) |
//!
//! Most applications only need the [`prelude`].
//!
//! ```
//! use craven::prelude::*;
//!
//! let doc = Document::new();
//! let schema = Schema::new("Todo", ["title", "done"]).unwrap();
//! let todos = Collection::new(&schema);
//! let list = CollectionController::new(&doc, &todos, ControllerOptions::new().tag_name("ul")).unwrap();
//!
//! todos.push([attrs! {"title" => "milk", "done" => false}]);
//! todos.first().unwrap().destroy();
//! assert!(todos.is_empty());
//! assert_eq!(list.child_count(), 0);
//! ```

pub use craven_core as core;
#[cfg(feature = "router")]
pub use craven_router as router;
pub use craven_view as view;

pub use craven_core::attrs;

/// The commonly used types, in one import.
pub mod prelude {
    pub use craven_core::names;
    pub use craven_core::{
        Attributes, BindingScope, Callback, Collection, CollectionConfig, CollectionEvent, Item,
        Model, ModelEvent, Publisher, Schema, Subscription, ValidationError, ValidationErrors,
        attrs,
    };
    #[cfg(feature = "router")]
    pub use craven_router::{History, RouteMatch, Router};
    pub use craven_view::{
        CollectionController, Controller, ControllerOptions, Document, Invocation, ModelController,
        NodeId, Resolvable, ViewHost,
    };
}
