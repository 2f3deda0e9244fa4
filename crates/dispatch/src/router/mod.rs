//! Path-based routing.
//!
//! A [`Router`] maps a request path to a [`Handler`] plus the variables extracted from the
//! winning pattern. Lookup goes, in order:
//!
//! 1. the exact-match table of literal patterns
//! 2. every glob pattern matching the path, ranked by specificity
//! 3. the root handler (`"/"`), for the path `/` only
//! 4. the default handler (`"/*"`)
//!
//! The route table is immutable once published. Readers load it without locking; late
//! registrations build a new table and swap it in.

mod pattern;

pub use pattern::PathPattern;

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::{debug, info};

use crate::handler::Handler;
use crate::request::PathParams;

const ROOT_PATTERN: &str = "/";
const DEFAULT_PATTERN: &str = "/*";

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("cannot map handler '{new}' to '{pattern}': already mapped to handler '{existing}'")]
    RouteConflict { pattern: String, existing: String, new: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl RouterError {
    pub fn invalid_pattern<P: ToString, R: ToString>(pattern: P, reason: R) -> Self {
        Self::InvalidPattern { pattern: pattern.to_string(), reason: reason.to_string() }
    }

    fn conflict(pattern: &str, existing: &Handler, new: &Handler) -> Self {
        Self::RouteConflict {
            pattern: pattern.to_owned(),
            existing: existing.name().to_owned(),
            new: new.name().to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
struct RouteEntry {
    pattern: PathPattern,
    handler: Arc<Handler>,
}

#[derive(Debug, Clone, Default)]
struct RouteTable {
    literals: HashMap<String, Arc<Handler>>,
    patterns: Vec<RouteEntry>,
    root: Option<Arc<Handler>>,
    default: Option<Arc<Handler>>,
    trailing_slash_match: bool,
}

impl RouteTable {
    fn insert(&mut self, pattern: &PathPattern, handler: &Arc<Handler>) -> Result<(), RouterError> {
        let raw = pattern.as_str();
        let slot = match raw {
            ROOT_PATTERN => Some(&mut self.root),
            DEFAULT_PATTERN => Some(&mut self.default),
            _ => None,
        };
        if let Some(slot) = slot {
            return bind(slot, raw, handler);
        }

        if let Some(existing) = self.patterns.iter().find(|entry| entry.pattern.as_str() == raw) {
            if Arc::ptr_eq(&existing.handler, handler) {
                return Ok(());
            }
            return Err(RouterError::conflict(raw, &existing.handler, handler));
        }

        if pattern.is_literal() {
            self.literals.insert(raw.to_owned(), Arc::clone(handler));
        }
        self.patterns.push(RouteEntry { pattern: pattern.clone(), handler: Arc::clone(handler) });
        Ok(())
    }

    fn lookup(&self, path: &str) -> Option<RouteMatch> {
        if let Some(handler) = self.literals.get(path) {
            return Some(RouteMatch {
                handler: Arc::clone(handler),
                pattern: path.to_owned(),
                params: PathParams::empty(),
            });
        }

        let mut best: Option<(&RouteEntry, PathParams)> = None;
        for entry in &self.patterns {
            let Some(params) = entry.pattern.matches(path, self.trailing_slash_match) else {
                continue;
            };
            // strictly more specific only, so the first registered wins a tie
            let better = match &best {
                None => true,
                Some((current, _)) => entry.pattern.compare_specificity(&current.pattern, path).is_lt(),
            };
            if better {
                best = Some((entry, params));
            }
        }

        if let Some((entry, params)) = best {
            return Some(RouteMatch {
                handler: Arc::clone(&entry.handler),
                pattern: entry.pattern.as_str().to_owned(),
                params,
            });
        }

        let (fallback, pattern) = match &self.root {
            Some(root) if path == ROOT_PATTERN => (Some(root), ROOT_PATTERN),
            _ => (self.default.as_ref(), DEFAULT_PATTERN),
        };
        fallback.map(|handler| RouteMatch {
            handler: Arc::clone(handler),
            pattern: pattern.to_owned(),
            params: PathParams::empty(),
        })
    }
}

fn bind(slot: &mut Option<Arc<Handler>>, pattern: &str, handler: &Arc<Handler>) -> Result<(), RouterError> {
    match slot {
        Some(existing) if Arc::ptr_eq(existing, handler) => Ok(()),
        Some(existing) => Err(RouterError::conflict(pattern, existing, handler)),
        None => {
            *slot = Some(Arc::clone(handler));
            Ok(())
        }
    }
}

/// The result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    handler: Arc<Handler>,
    pattern: String,
    params: PathParams,
}

impl RouteMatch {
    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    /// The pattern that won the lookup.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn into_parts(self) -> (Arc<Handler>, PathParams) {
        (self.handler, self.params)
    }
}

/// Main router structure that handles request routing
#[derive(Debug)]
pub struct Router {
    table: ArcSwap<RouteTable>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Matches a path against the router's routes.
    ///
    /// Returns `None` when nothing matches and no default handler is registered; the
    /// not-found policy is up to the caller.
    pub fn at(&self, path: &str) -> Option<RouteMatch> {
        let route = self.table.load().lookup(path);
        debug!(path, pattern = route.as_ref().map(RouteMatch::pattern), "route lookup");
        route
    }

    /// Registers a route on a live router by swapping in an updated copy of the table.
    pub fn register(&self, pattern: &str, handler: Arc<Handler>) -> Result<(), RouterError> {
        let parsed = PathPattern::parse(pattern)?;
        let mut outcome = Ok(());
        self.table.rcu(|current| {
            let mut next = RouteTable::clone(current);
            outcome = next.insert(&parsed, &handler);
            next
        });
        outcome?;
        info!(pattern, handler = handler.name(), "mapped route");
        Ok(())
    }

    /// Number of registered patterns, including root and default.
    pub fn len(&self) -> usize {
        let table = self.table.load();
        table.patterns.len() + usize::from(table.root.is_some()) + usize::from(table.default.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Router {
    fn default() -> Self {
        Self { table: ArcSwap::from_pointee(RouteTable::default()) }
    }
}

#[derive(Debug)]
pub struct RouterBuilder {
    routes: Vec<(String, Arc<Handler>)>,
    trailing_slash_match: bool,
}

impl RouterBuilder {
    fn new() -> Self {
        Self { routes: Vec::new(), trailing_slash_match: false }
    }

    #[must_use]
    pub fn route(mut self, pattern: impl Into<String>, handler: impl Into<Arc<Handler>>) -> Self {
        self.routes.push((pattern.into(), handler.into()));
        self
    }

    /// Lets `/users` also match `/users/`.
    #[must_use]
    pub fn trailing_slash_match(mut self, enabled: bool) -> Self {
        self.trailing_slash_match = enabled;
        self
    }

    /// Builds the router, failing on the first invalid or conflicting registration.
    pub fn build(self) -> Result<Router, RouterError> {
        let mut table = RouteTable { trailing_slash_match: self.trailing_slash_match, ..RouteTable::default() };
        for (pattern, handler) in &self.routes {
            let parsed = PathPattern::parse(pattern)?;
            table.insert(&parsed, handler)?;
            info!(pattern = %pattern, handler = handler.name(), "mapped route");
        }
        Ok(Router { table: ArcSwap::from_pointee(table) })
    }
}
