#![forbid(unsafe_code)]

//! Path-pattern router.
//!
//! A pattern is a regular expression matched against the whole path, in
//! which any segment of the form `:name` captures one path segment
//! (`[^/]+`). Routing runs *every* matching route, most recently added
//! first.
//!
//! Patterns match the whole path, not a prefix or substring: `/todos` does
//! not match `/todos/3` or `/app/todos`. Spell out `/todos(/.*)?` or
//! `.*/todos` to match more.
//!
//! # Failure Modes
//!
//! | Call | Situation | Behavior |
//! |------|-----------|----------|
//! | `add` | pattern does not compile | `Err(RouterError::Pattern)` |
//! | `add` | two placeholders share a name | `Err(RouterError::DuplicateParam)` |
//! | `route` | nothing matches | returns `0` |

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use craven_core::names::POPSTATE;
use craven_core::serde_json::Value;
use craven_core::{Callback, Publisher, Subscription};
use regex_lite::Regex;
use tracing::debug;

use crate::history::{History, HistoryEntry};

/// Errors from registering routes.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The compiled pattern is not a valid regular expression.
    #[error("invalid route pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },
    /// A placeholder name is used twice.
    #[error("route pattern `{pattern}` repeats placeholder `:{name}`")]
    DuplicateParam { pattern: String, name: String },
}

/// Result alias for this crate.
pub type Result<T, E = RouterError> = std::result::Result<T, E>;

/// Handle to a registered route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(u64);

/// What a handler receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// The routed path.
    pub path: String,
    /// Every capture group, in order; unmatched optional groups are empty.
    pub params: Vec<String>,
    /// `:name` placeholders with their values, in pattern order.
    pub named: Vec<(String, String)>,
}

impl RouteMatch {
    /// Value of the `:name` placeholder.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

type Handler = Rc<dyn Fn(&RouteMatch)>;

struct Route {
    id: RouteId,
    pattern: String,
    regex: Regex,
    names: Vec<String>,
    handler: Handler,
}

impl Route {
    fn matches(&self, path: &str) -> Option<RouteMatch> {
        let caps = self.regex.captures(path)?;
        let params = caps
            .iter()
            .skip(1)
            .map(|m| m.map_or_else(String::new, |m| m.as_str().to_owned()))
            .collect();
        let named = self
            .names
            .iter()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.clone(), m.as_str().to_owned()))
            })
            .collect();
        Some(RouteMatch {
            path: path.to_owned(),
            params,
            named,
        })
    }
}

#[derive(Default)]
struct RouterInner {
    routes: Vec<Route>,
    next_id: u64,
}

/// Shared handle to one route table.
#[derive(Clone, Default)]
pub struct Router {
    inner: Rc<RefCell<RouterInner>>,
}

impl Router {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`.
    pub fn add(
        &self,
        pattern: impl Into<String>,
        handler: impl Fn(&RouteMatch) + 'static,
    ) -> Result<RouteId> {
        let pattern = pattern.into();
        let (regex, names) = compile(&pattern)?;
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = RouteId(inner.next_id);
        debug!(pattern = %pattern, regex = regex.as_str(), "route added");
        inner.routes.push(Route {
            id,
            pattern,
            regex,
            names,
            handler: Rc::new(handler),
        });
        Ok(id)
    }

    /// Unregister a route. Returns whether it existed.
    pub fn remove(&self, id: RouteId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.routes.len();
        inner.routes.retain(|r| r.id != id);
        inner.routes.len() != before
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().routes.len()
    }

    /// Whether no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().routes.is_empty()
    }

    /// Patterns in registration order.
    #[must_use]
    pub fn patterns(&self) -> Vec<String> {
        self.inner
            .borrow()
            .routes
            .iter()
            .map(|r| r.pattern.clone())
            .collect()
    }

    /// Run every route matching `path`, newest first. Returns how many ran.
    pub fn route(&self, path: &str) -> usize {
        let matched: Vec<(Handler, RouteMatch)> = {
            let inner = self.inner.borrow();
            inner
                .routes
                .iter()
                .rev()
                .filter_map(|r| r.matches(path).map(|m| (Rc::clone(&r.handler), m)))
                .collect()
        };
        debug!(path, matched = matched.len(), "route");
        for (handler, route_match) in &matched {
            handler(route_match);
        }
        matched.len()
    }

    /// Push `url` onto `history` and route it.
    pub fn navigate(&self, history: &History, url: &str) -> usize {
        history.push_state(Value::Null, url);
        self.route(url)
    }

    /// Route the current path whenever `history` pops. Dropping the returned
    /// guard deactivates.
    pub fn activate(&self, history: &History) -> Subscription {
        let router = self.clone();
        history.subscribe(
            POPSTATE,
            Callback::new(move |entry: &HistoryEntry, _: &History| {
                router.route(&entry.path);
            }),
        )
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("patterns", &self.patterns())
            .finish()
    }
}

/// Turn `:name` segments into named groups and anchor the whole pattern.
fn compile(pattern: &str) -> Result<(Regex, Vec<String>)> {
    let mut names: Vec<String> = Vec::new();
    let mut segments = Vec::new();
    for segment in pattern.split('/') {
        match segment.strip_prefix(':') {
            Some(name)
                if !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
            {
                if names.iter().any(|n| n == name) {
                    return Err(RouterError::DuplicateParam {
                        pattern: pattern.to_owned(),
                        name: name.to_owned(),
                    });
                }
                names.push(name.to_owned());
                segments.push(format!("(?P<{name}>[^/]+)"));
            }
            _ => segments.push(segment.to_owned()),
        }
    }
    let source = format!("^(?:{})$", segments.join("/"));
    let regex = Regex::new(&source).map_err(|source| RouterError::Pattern {
        pattern: pattern.to_owned(),
        source,
    })?;
    Ok((regex, names))
}
