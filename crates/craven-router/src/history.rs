#![forbid(unsafe_code)]

//! In-memory session history.
//!
//! Mirrors the browser model: `push_state` and `replace_state` are silent,
//! moving with `back`/`forward`/`go` triggers `popstate` with the entry that
//! became current.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use craven_core::names::POPSTATE;
use craven_core::serde_json::Value;
use craven_core::{ContextId, Events, Publisher};
use tracing::trace;

/// One history entry, also the `popstate` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Path (or URL) of the entry.
    pub path: String,
    /// State object stored with the entry.
    pub state: Value,
}

struct HistoryInner {
    context: ContextId,
    entries: RefCell<Vec<HistoryEntry>>,
    index: Cell<usize>,
    events: Events<HistoryEntry, History>,
}

/// Shared handle to one session history.
#[derive(Clone)]
pub struct History {
    inner: Rc<HistoryInner>,
}

impl History {
    /// Start a history whose only entry is `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(HistoryInner {
                context: ContextId::next(),
                entries: RefCell::new(vec![HistoryEntry {
                    path: path.into(),
                    state: Value::Null,
                }]),
                index: Cell::new(0),
                events: Events::new(),
            }),
        }
    }

    /// Add an entry after the current one, dropping any forward entries.
    pub fn push_state(&self, state: Value, path: impl Into<String>) {
        let mut entries = self.inner.entries.borrow_mut();
        entries.truncate(self.inner.index.get() + 1);
        entries.push(HistoryEntry {
            path: path.into(),
            state,
        });
        self.inner.index.set(entries.len() - 1);
    }

    /// Overwrite the current entry.
    pub fn replace_state(&self, state: Value, path: impl Into<String>) {
        let mut entries = self.inner.entries.borrow_mut();
        let index = self.inner.index.get();
        if let Some(entry) = entries.get_mut(index) {
            *entry = HistoryEntry {
                path: path.into(),
                state,
            };
        }
    }

    /// Move `delta` entries. Returns `false`, without an event, when the
    /// target is out of range or `delta` is zero.
    pub fn go(&self, delta: isize) -> bool {
        let len = self.len();
        let Some(target) = self.inner.index.get().checked_add_signed(delta) else {
            return false;
        };
        if delta == 0 || target >= len {
            return false;
        }
        self.inner.index.set(target);
        let entry = self.current();
        trace!(path = %entry.path, index = target, "popstate");
        self.trigger(POPSTATE, &entry);
        true
    }

    /// Step back one entry.
    pub fn back(&self) -> bool {
        self.go(-1)
    }

    /// Step forward one entry.
    pub fn forward(&self) -> bool {
        self.go(1)
    }

    /// The current entry.
    #[must_use]
    pub fn current(&self) -> HistoryEntry {
        let entries = self.inner.entries.borrow();
        entries[self.inner.index.get()].clone()
    }

    /// Path of the current entry.
    #[must_use]
    pub fn path(&self) -> String {
        self.current().path
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Always `false`: a history has at least one entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Position of the current entry.
    #[must_use]
    pub fn index(&self) -> usize {
        self.inner.index.get()
    }
}

impl Publisher for History {
    type Args = HistoryEntry;

    fn events(&self) -> &Events<HistoryEntry, History> {
        &self.inner.events
    }

    fn context(&self) -> ContextId {
        self.inner.context
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("index", &self.inner.index.get())
            .field("entries", &*self.inner.entries.borrow())
            .finish()
    }
}
