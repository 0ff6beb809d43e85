#![forbid(unsafe_code)]

//! Named-event publish/subscribe table and the [`Publisher`] capability.
//!
//! # Design
//!
//! Every stateful entity (model, collection, history, ...) owns one
//! [`Events`] table mapping an event name to the ordered list of
//! `(callback, context)` pairs registered for it. The table is not a base
//! type: an entity composes it and implements [`Publisher`] to gain
//! `on`/`off`/`trigger`.
//!
//! # Invariants
//!
//! 1. Registration order is preserved per event name; duplicates are allowed.
//! 2. `off` removes exactly one pair: the most recently registered one whose
//!    callback *and* context are identical to the arguments.
//! 3. `trigger` snapshots the subscriber list before invoking anything, so
//!    callbacks may call `on`/`off`/`trigger` on the same emitter without
//!    perturbing the dispatch in flight.
//! 4. Callbacks run in reverse registration order (last registered first).
//! 5. No interior borrow is held while a callback runs.
//!
//! # Failure Modes
//!
//! | Call | Situation | Behavior |
//! |------|-----------|----------|
//! | `off` | no table entry / no matching pair | returns `false`, no-op |
//! | `trigger` | no subscribers | returns `0`, no-op |
//! | callback panics | any | propagates to the caller of `trigger` |

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use tracing::trace;

use crate::scope::Subscription;

/// Well-known event names emitted by the built-in entities.
pub mod names {
    /// A model's saved attributes changed; a collection re-broadcast of it.
    pub const CHANGE: &str = "change";
    /// A model was destroyed.
    pub const DESTROY: &str = "destroy";
    /// A model failed validation during `save`.
    pub const INVALID: &str = "invalid";
    /// Models were inserted into a collection.
    pub const ADD: &str = "add";
    /// Models were removed from a collection.
    pub const REMOVE: &str = "remove";
    /// A collection's whole sequence was replaced.
    pub const RESET: &str = "reset";
    /// The session history moved to another entry.
    pub const POPSTATE: &str = "popstate";
}

/// Global counter for context identities.
static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity token used to tell subscribers apart when the same callback is
/// registered on behalf of different owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a fresh, process-unique context.
    #[must_use]
    pub fn next() -> Self {
        Self(CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// A subscriber callback: receives the trigger payload followed by the
/// emitting entity.
///
/// Equality is pointer identity, so keep the `Callback` (or a clone of it)
/// around if it has to be passed to `off` later.
pub struct Callback<A, S> {
    f: Rc<dyn Fn(&A, &S)>,
}

impl<A, S> Clone for Callback<A, S> {
    fn clone(&self) -> Self {
        Self {
            f: Rc::clone(&self.f),
        }
    }
}

impl<A, S> Callback<A, S> {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&A, &S) + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    /// Invoke the callback.
    pub fn call(&self, args: &A, source: &S) {
        (self.f)(args, source);
    }

    /// Whether both handles point at the same closure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl<A, S> PartialEq for Callback<A, S> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<A, S> fmt::Debug for Callback<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("ptr", &Rc::as_ptr(&self.f).cast::<()>())
            .finish()
    }
}

struct Handler<A, S> {
    callback: Callback<A, S>,
    context: ContextId,
}

/// Per-emitter subscription table.
///
/// `A` is the payload type of the emitter, `S` the emitter handle that every
/// callback receives as its trailing argument.
pub struct Events<A, S> {
    table: RefCell<AHashMap<String, Vec<Handler<A, S>>>>,
}

impl<A, S> Default for Events<A, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S> fmt::Debug for Events<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.borrow();
        let mut names: Vec<_> = table.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        names.sort_unstable();
        f.debug_struct("Events").field("subscribers", &names).finish()
    }
}

impl<A, S> Events<A, S> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: RefCell::new(AHashMap::new()),
        }
    }

    /// Append `(callback, context)` to the subscribers of `event`.
    pub fn on(&self, event: &str, callback: Callback<A, S>, context: ContextId) {
        self.table
            .borrow_mut()
            .entry(event.to_owned())
            .or_default()
            .push(Handler { callback, context });
    }

    /// Remove the most recently registered pair matching both `callback` and
    /// `context`. Returns whether a pair was removed.
    pub fn off(&self, event: &str, callback: &Callback<A, S>, context: ContextId) -> bool {
        let mut table = self.table.borrow_mut();
        let Some(handlers) = table.get_mut(event) else {
            return false;
        };
        let Some(pos) = handlers
            .iter()
            .rposition(|h| h.callback.ptr_eq(callback) && h.context == context)
        else {
            return false;
        };
        handlers.remove(pos);
        if handlers.is_empty() {
            table.remove(event);
        }
        true
    }

    /// Invoke every subscriber of `event`, newest first, with `args` and the
    /// emitting `source`. Returns the number of callbacks invoked.
    pub fn trigger(&self, event: &str, args: &A, source: &S) -> usize {
        // Copy the list: handlers may unregister themselves during the loop.
        let snapshot: Vec<Callback<A, S>> = {
            let table = self.table.borrow();
            let Some(handlers) = table.get(event) else {
                return 0;
            };
            handlers.iter().map(|h| h.callback.clone()).collect()
        };
        trace!(event, subscribers = snapshot.len(), "trigger");
        for callback in snapshot.iter().rev() {
            callback.call(args, source);
        }
        snapshot.len()
    }

    /// Number of pairs currently registered for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.table.borrow().get(event).map_or(0, Vec::len)
    }

    /// Whether no event has any subscriber.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.borrow().is_empty()
    }
}

/// Capability interface for entities that own an [`Events`] table.
///
/// Implementors provide the table and their own [`ContextId`]; every other
/// method has a default. The `*_with` variants take an explicit context,
/// the plain ones use the emitter's own ("context = self").
pub trait Publisher: Clone + Sized + 'static {
    /// Payload passed to subscribers.
    type Args: 'static;

    /// The subscription table.
    fn events(&self) -> &Events<Self::Args, Self>;

    /// This emitter's own identity.
    fn context(&self) -> ContextId;

    /// Subscribe with the emitter as context.
    fn on(&self, event: &str, callback: Callback<Self::Args, Self>) {
        self.on_with(event, callback, self.context());
    }

    /// Subscribe with an explicit context.
    fn on_with(&self, event: &str, callback: Callback<Self::Args, Self>, context: ContextId) {
        self.events().on(event, callback, context);
    }

    /// Unsubscribe a pair registered with the emitter as context.
    fn off(&self, event: &str, callback: &Callback<Self::Args, Self>) -> bool {
        self.off_with(event, callback, self.context())
    }

    /// Unsubscribe a pair registered with an explicit context.
    fn off_with(
        &self,
        event: &str,
        callback: &Callback<Self::Args, Self>,
        context: ContextId,
    ) -> bool {
        self.events().off(event, callback, context)
    }

    /// Broadcast `event` to its current subscribers.
    fn trigger(&self, event: &str, args: &Self::Args) -> usize {
        self.events().trigger(event, args, self)
    }

    /// Subscribe and get a guard that unsubscribes when released or dropped.
    fn subscribe(&self, event: &str, callback: Callback<Self::Args, Self>) -> Subscription {
        self.subscribe_with(event, callback, self.context())
    }

    /// [`subscribe`](Self::subscribe) with an explicit context.
    fn subscribe_with(
        &self,
        event: &str,
        callback: Callback<Self::Args, Self>,
        context: ContextId,
    ) -> Subscription {
        self.on_with(event, callback.clone(), context);
        let source = self.clone();
        let event = event.to_owned();
        Subscription::new(move || {
            source.off_with(&event, &callback, context);
        })
    }

    /// Number of subscribers for `event`.
    fn subscriber_count(&self, event: &str) -> usize {
        self.events().subscriber_count(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Clone)]
    struct Emitter {
        id: ContextId,
        events: Rc<Events<u32, Emitter>>,
    }

    impl Emitter {
        fn new() -> Self {
            Self {
                id: ContextId::next(),
                events: Rc::new(Events::new()),
            }
        }
    }

    impl Publisher for Emitter {
        type Args = u32;

        fn events(&self) -> &Events<u32, Emitter> {
            &self.events
        }

        fn context(&self) -> ContextId {
            self.id
        }
    }

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Callback<u32, Emitter> {
        let log = Rc::clone(log);
        Callback::new(move |_, _| log.borrow_mut().push(tag))
    }

    #[test]
    fn trigger_without_subscribers_is_noop() {
        let emitter = Emitter::new();
        assert_eq!(emitter.trigger("nothing", &1), 0);
    }

    #[test]
    fn callbacks_receive_args_and_source() {
        let emitter = Emitter::new();
        let seen = Rc::new(Cell::new((0, 0)));
        let s = Rc::clone(&seen);
        emitter.on(
            "event",
            Callback::new(move |n: &u32, src: &Emitter| s.set((*n, src.context().id()))),
        );
        emitter.trigger("event", &7);
        assert_eq!(seen.get(), (7, emitter.context().id()));
    }

    #[test]
    fn dispatch_runs_newest_first() {
        let emitter = Emitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        emitter.on("event", recorder(&log, "a"));
        emitter.on("event", recorder(&log, "b"));
        emitter.on("event", recorder(&log, "c"));
        assert_eq!(emitter.trigger("event", &0), 3);
        assert_eq!(*log.borrow(), ["c", "b", "a"]);
    }

    #[test]
    fn off_requires_matching_context() {
        let emitter = Emitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let cb = recorder(&log, "a");
        let other = ContextId::next();
        emitter.on_with("event", cb.clone(), other);

        assert!(!emitter.off("event", &cb), "own context does not match");
        assert!(emitter.off_with("event", &cb, other));
        emitter.trigger("event", &0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn off_removes_one_duplicate_at_a_time() {
        let emitter = Emitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let cb = recorder(&log, "dup");
        emitter.on("event", cb.clone());
        emitter.on("event", cb.clone());
        assert_eq!(emitter.subscriber_count("event"), 2);

        assert!(emitter.off("event", &cb));
        emitter.trigger("event", &0);
        assert_eq!(log.borrow().len(), 1);

        assert!(emitter.off("event", &cb));
        assert!(!emitter.off("event", &cb));
        assert!(emitter.events().is_empty());
    }

    #[test]
    fn off_on_unknown_event_is_noop() {
        let emitter = Emitter::new();
        let cb = Callback::new(|_: &u32, _: &Emitter| {});
        assert!(!emitter.off("missing", &cb));
    }

    #[test]
    fn handler_removing_itself_does_not_skip_siblings() {
        let emitter = Emitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        emitter.on("event", recorder(&log, "first"));

        let slot: Rc<RefCell<Option<Callback<u32, Emitter>>>> = Rc::new(RefCell::new(None));
        let me = Rc::clone(&slot);
        let l = Rc::clone(&log);
        let selfish = Callback::new(move |_: &u32, src: &Emitter| {
            l.borrow_mut().push("selfish");
            if let Some(cb) = me.borrow().as_ref() {
                src.off("event", cb);
            }
        });
        *slot.borrow_mut() = Some(selfish.clone());
        emitter.on("event", selfish);
        emitter.on("event", recorder(&log, "last"));

        emitter.trigger("event", &0);
        assert_eq!(*log.borrow(), ["last", "selfish", "first"]);

        log.borrow_mut().clear();
        emitter.trigger("event", &0);
        assert_eq!(*log.borrow(), ["last", "first"]);
    }

    #[test]
    fn handler_added_during_dispatch_waits_for_next_trigger() {
        let emitter = Emitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let late = recorder(&log, "late");
        let l = Rc::clone(&log);
        emitter.on(
            "event",
            Callback::new(move |_: &u32, src: &Emitter| {
                l.borrow_mut().push("adder");
                src.on("event", late.clone());
            }),
        );

        emitter.trigger("event", &0);
        assert_eq!(*log.borrow(), ["adder"]);

        log.borrow_mut().clear();
        emitter.trigger("event", &0);
        assert_eq!(*log.borrow(), ["late", "adder"]);
    }

    #[test]
    fn nested_trigger_from_callback() {
        let emitter = Emitter::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        emitter.on(
            "outer",
            Callback::new(move |_: &u32, src: &Emitter| {
                src.trigger("inner", &0);
            }),
        );
        emitter.on(
            "inner",
            Callback::new(move |_: &u32, _: &Emitter| c.set(c.get() + 1)),
        );
        emitter.trigger("outer", &0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn subscription_guard_unsubscribes_on_drop() {
        let emitter = Emitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let _sub = emitter.subscribe("event", recorder(&log, "guarded"));
            emitter.trigger("event", &0);
        }
        emitter.trigger("event", &0);
        assert_eq!(*log.borrow(), ["guarded"]);
        assert_eq!(emitter.subscriber_count("event"), 0);
    }

    #[test]
    fn context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(b.id() > a.id());
    }

    #[test]
    fn debug_lists_subscriber_counts() {
        let emitter = Emitter::new();
        emitter.on("x", Callback::new(|_: &u32, _: &Emitter| {}));
        let debug = format!("{:?}", emitter.events());
        assert!(debug.contains("(\"x\", 1)"));
    }
}
