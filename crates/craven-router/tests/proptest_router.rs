//! Property-based invariant tests for `Router` and `History`.
//!
//! 1. A `:name` placeholder captures exactly one non-empty segment.
//! 2. Paths with extra or missing segments never match a placeholder route.
//! 3. `go` keeps the index in range and fires once per successful move.

use std::cell::RefCell;
use std::rc::Rc;

use craven_core::names::POPSTATE;
use craven_core::serde_json::Value;
use craven_core::{Callback, Publisher};
use craven_router::{History, HistoryEntry, RouteMatch, Router};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_-]{1,8}"
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Placeholders
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn placeholders_capture_segments(user in segment(), post in segment()) {
        let router = Router::new();
        let seen: Rc<RefCell<Vec<RouteMatch>>> = Rc::default();
        let s = Rc::clone(&seen);
        router
            .add("/users/:user/posts/:post", move |m: &RouteMatch| s.borrow_mut().push(m.clone()))
            .unwrap();

        prop_assert_eq!(router.route(&format!("/users/{user}/posts/{post}")), 1);
        let m = seen.borrow()[0].clone();
        prop_assert_eq!(m.get("user"), Some(user.as_str()));
        prop_assert_eq!(m.get("post"), Some(post.as_str()));
        prop_assert_eq!(m.params, vec![user, post]);
    }

    #[test]
    fn segment_count_must_agree(segments in proptest::collection::vec(segment(), 0..5)) {
        let router = Router::new();
        router.add("/item/:id", |_: &RouteMatch| {}).unwrap();
        let path = format!("/item/{}", segments.join("/"));
        let expected = usize::from(segments.len() == 1);
        prop_assert_eq!(router.route(&path), expected, "path {}", path);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. History navigation
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn go_stays_in_range(
        pushes in 0usize..6,
        moves in proptest::collection::vec(-4isize..=4, 0..20),
    ) {
        let history = History::new("/0");
        for i in 1..=pushes {
            history.push_state(Value::Null, format!("/{i}"));
        }
        let pops = Rc::new(RefCell::new(0usize));
        let p = Rc::clone(&pops);
        history.on(
            POPSTATE,
            Callback::new(move |_: &HistoryEntry, _: &History| *p.borrow_mut() += 1),
        );

        let mut expected_pops = 0;
        for delta in moves {
            let before = history.index();
            let moved = history.go(delta);
            let target = before as isize + delta;
            let in_range = delta != 0 && target >= 0 && (target as usize) < history.len();
            prop_assert_eq!(moved, in_range);
            if moved {
                expected_pops += 1;
                prop_assert_eq!(history.path(), format!("/{target}"));
            } else {
                prop_assert_eq!(history.index(), before);
            }
        }
        prop_assert_eq!(*pops.borrow(), expected_pops);
        prop_assert_eq!(history.len(), pushes + 1);
    }
}
