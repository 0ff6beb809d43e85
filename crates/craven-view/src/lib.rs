#![forbid(unsafe_code)]

//! View controllers for Craven.
//!
//! - [`ViewHost`]: the node-tree operations a controller needs. Any tree can
//!   be driven by implementing it; [`Document`] is the in-memory one shipped
//!   here.
//! - [`Controller`]: owns one node, binds model events and delegated native
//!   events to named methods.
//! - [`ModelController`]: re-renders on `change`, removes on `destroy`.
//! - [`CollectionController`]: one child controller per collection member,
//!   kept in index lockstep with the collection.
//!
//! # Architecture
//!
//! Controllers are `Rc` handles. Every binding a controller makes is held in
//! its [`BindingScope`](craven_core::BindingScope) and holds only a weak
//! reference back, so an unreferenced controller is freed and unbound even
//! without an explicit `remove()`.
//!
//! # Example
//!
//! ```
//! use craven_core::{Collection, Schema, attrs};
//! use craven_view::{CollectionController, ControllerOptions, Document, ViewHost};
//!
//! let doc = Document::new();
//! let schema = Schema::new("Todo", ["title"]).unwrap();
//! let todos = Collection::new(&schema);
//! let list = CollectionController::new(&doc, &todos, ControllerOptions::new().tag_name("ul")).unwrap();
//! doc.append_child(&doc.body(), list.view());
//!
//! todos.push([attrs! {"title" => "write docs"}]);
//! assert_eq!(list.child_count(), 1);
//! assert_eq!(doc.children(list.view()).len(), 1);
//! ```

pub mod collection_controller;
pub mod controller;
pub mod document;
pub mod error;
pub mod host;
pub mod model_controller;

pub use collection_controller::{ChildFactory, CollectionController};
pub use controller::{
    Controller, ControllerOptions, Invocation, Method, REMOVE, RENDER, Resolvable, WeakController,
};
pub use document::{Document, NodeId};
pub use error::{Error, Result};
pub use host::{NativeEvent, NativeListener, NodeAttributes, ViewHost};
pub use model_controller::ModelController;
