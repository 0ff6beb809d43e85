#![forbid(unsafe_code)]

//! Subscription guards and lifecycle scopes.
//!
//! A [`Subscription`] is the handle returned by
//! [`Publisher::subscribe`](crate::Publisher::subscribe): releasing it (or
//! dropping it) performs the matching `off`. A [`BindingScope`] collects the
//! subscriptions of one logical owner, such as a controller, so that they can
//! be torn down together.
//!
//! # Invariants
//!
//! 1. A subscription releases at most once; later releases are no-ops.
//! 2. Scopes release in reverse registration order, on `clear()` and on drop.
//! 3. After `clear()` the scope is empty and reusable.
//! 4. `binding_count()` is the number of guards held and not yet released.

use std::fmt;

use crate::events::{Callback, ContextId, Publisher};

/// RAII guard for one registered callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Create a guard that runs `release` exactly once.
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unsubscribe now.
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Forget the guard, leaving the callback registered for good.
    pub fn detach(mut self) {
        self.release = None;
    }

    /// Whether the callback is still registered through this guard.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Collects subscriptions for one owner (e.g., a controller).
///
/// When the scope is cleared or dropped, every held subscription is
/// released, newest first.
#[derive(Default)]
pub struct BindingScope {
    subscriptions: Vec<Subscription>,
}

impl BindingScope {
    /// Create an empty binding scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold an existing subscription until the scope is cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    /// Subscribe to `source` on behalf of `context` and hold the guard.
    /// Returns `self`, so several subscriptions can be made in one expression.
    pub fn subscribe<P: Publisher>(
        &mut self,
        source: &P,
        event: &str,
        callback: Callback<P::Args, P>,
        context: ContextId,
    ) -> &mut Self {
        let sub = source.subscribe_with(event, callback, context);
        self.subscriptions.push(sub);
        self
    }

    /// Number of held subscriptions.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the scope holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release everything now, newest first. The scope stays usable.
    pub fn clear(&mut self) {
        while let Some(sub) = self.subscriptions.pop() {
            sub.release();
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn release_runs_once() {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let sub = Subscription::new(move || c.set(c.get() + 1));
        assert!(sub.is_active());
        sub.release();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn drop_releases() {
        let count = Rc::new(Cell::new(0));
        {
            let c = Rc::clone(&count);
            let _sub = Subscription::new(move || c.set(c.get() + 1));
        }
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn detach_never_releases() {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        Subscription::new(move || c.set(c.get() + 1)).detach();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn scope_releases_newest_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut scope = BindingScope::new();
        for n in 0..3 {
            let o = Rc::clone(&order);
            scope.hold(Subscription::new(move || o.borrow_mut().push(n)));
        }
        assert_eq!(scope.binding_count(), 3);

        scope.clear();
        assert!(scope.is_empty());
        assert_eq!(*order.borrow(), [2, 1, 0]);
    }

    #[test]
    fn scope_drop_releases() {
        let count = Rc::new(Cell::new(0));
        {
            let mut scope = BindingScope::new();
            for _ in 0..4 {
                let c = Rc::clone(&count);
                scope.hold(Subscription::new(move || c.set(c.get() + 1)));
            }
        }
        assert_eq!(count.get(), 4);
    }

    #[test]
    fn scope_reusable_after_clear() {
        let count = Rc::new(Cell::new(0));
        let mut scope = BindingScope::new();
        scope.clear();
        let c = Rc::clone(&count);
        scope.hold(Subscription::new(move || c.set(c.get() + 1)));
        assert_eq!(scope.binding_count(), 1);
        scope.clear();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn scope_debug_format() {
        let mut scope = BindingScope::new();
        scope.hold(Subscription::new(|| {}));
        scope.hold(Subscription::new(|| {}));
        let debug = format!("{scope:?}");
        assert!(debug.contains("binding_count: 2"));
    }
}
