#![forbid(unsafe_code)]

//! Routing for Craven applications.
//!
//! [`Router`] maps path patterns to handlers. [`History`] is an in-memory
//! stand-in for the browser session history; a router activated on it
//! re-routes on every `popstate`.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use craven_router::{History, RouteMatch, Router};
//!
//! let history = History::new("/");
//! let router = Router::new();
//! let shown = Rc::new(RefCell::new(String::new()));
//! let s = Rc::clone(&shown);
//! router
//!     .add("/todos/:id", move |m: &RouteMatch| {
//!         *s.borrow_mut() = m.get("id").unwrap_or_default().to_owned();
//!     })
//!     .unwrap();
//! let _active = router.activate(&history);
//!
//! router.navigate(&history, "/todos/3");
//! assert_eq!(*shown.borrow(), "3");
//! ```

pub mod history;
pub mod router;

pub use history::{History, HistoryEntry};
pub use router::{Result, RouteId, RouteMatch, Router, RouterError};
