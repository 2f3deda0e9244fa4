//! Cross-cutting callbacks around handler execution.
//!
//! An [`Interceptor`] sees every request its mapping accepts, at three points:
//!
//! - `pre_handle`, in registration order; returning `false` aborts the request
//! - `post_handle`, in reverse order, only after the handler succeeded
//! - `after_completion`, in reverse order, for every interceptor whose `pre_handle`
//!   returned `true`, whatever the outcome
//!
//! [`Interceptors`] keeps the ordered registrations and selects the ones mapped to a path
//! when the [`ExecutionChain`] of a request is built.

mod chain;

pub use chain::ChainState;
pub use chain::ExecutionChain;

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use micro_dispatch_http::protocol::ResponseUnit;

use crate::error::{BoxError, DispatchError};
use crate::handler::Handler;
use crate::request::Exchange;
use crate::router::{PathPattern, RouterError};

#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Returns `false` to stop the request; the interceptor may then leave a response in
    /// the exchange.
    async fn pre_handle(&self, _exchange: &mut Exchange, _handler: &Handler) -> Result<bool, BoxError> {
        Ok(true)
    }

    async fn post_handle(
        &self,
        _exchange: &mut Exchange,
        _handler: &Handler,
        _response: &mut ResponseUnit,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// `error` is the failure the request ended with, if any.
    async fn after_completion(
        &self,
        _exchange: &Exchange,
        _handler: &Handler,
        _error: Option<&DispatchError>,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

/// An interceptor restricted to paths by include and exclude patterns.
///
/// Excludes win over includes; no includes means every path not excluded.
pub struct MappedInterceptor {
    interceptor: Arc<dyn Interceptor>,
    includes: Vec<PathPattern>,
    excludes: Vec<PathPattern>,
}

impl Debug for MappedInterceptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let includes = self.includes.iter().map(PathPattern::as_str).collect::<Vec<_>>();
        let excludes = self.excludes.iter().map(PathPattern::as_str).collect::<Vec<_>>();
        f.debug_struct("MappedInterceptor").field("includes", &includes).field("excludes", &excludes).finish()
    }
}

impl MappedInterceptor {
    pub fn new<I: Interceptor + 'static>(
        interceptor: I,
        includes: &[&str],
        excludes: &[&str],
    ) -> Result<Self, RouterError> {
        Ok(Self {
            interceptor: Arc::new(interceptor),
            includes: includes.iter().map(|p| PathPattern::parse(p)).collect::<Result<_, _>>()?,
            excludes: excludes.iter().map(|p| PathPattern::parse(p)).collect::<Result<_, _>>()?,
        })
    }

    fn global(interceptor: Arc<dyn Interceptor>) -> Self {
        Self { interceptor, includes: Vec::new(), excludes: Vec::new() }
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.excludes.iter().any(|pattern| pattern.matches(path, false).is_some()) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|pattern| pattern.matches(path, false).is_some())
    }
}

/// The ordered interceptor registrations of a dispatcher.
#[derive(Debug, Default)]
pub struct Interceptors {
    entries: Vec<MappedInterceptor>,
}

impl Interceptors {
    pub fn builder() -> InterceptorsBuilder {
        InterceptorsBuilder::default()
    }

    /// The interceptors mapped to `path`, in registration order.
    pub fn for_path(&self, path: &str) -> Vec<Arc<dyn Interceptor>> {
        self.entries.iter().filter(|entry| entry.matches(path)).map(|entry| Arc::clone(&entry.interceptor)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct InterceptorsBuilder {
    entries: Vec<MappedInterceptor>,
}

impl InterceptorsBuilder {
    /// Adds an interceptor applied to every path.
    #[must_use]
    pub fn add_last<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.entries.push(MappedInterceptor::global(Arc::new(interceptor)));
        self
    }

    #[must_use]
    pub fn add_first<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.entries.insert(0, MappedInterceptor::global(Arc::new(interceptor)));
        self
    }

    #[must_use]
    pub fn add_mapped(mut self, interceptor: MappedInterceptor) -> Self {
        self.entries.push(interceptor);
        self
    }

    pub fn build(self) -> Interceptors {
        Interceptors { entries: self.entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Interceptor for Noop {}

    #[test]
    fn mapped_paths() {
        let mapped = MappedInterceptor::new(Noop, &["/api/**"], &["/api/health"]).unwrap();
        assert!(mapped.matches("/api/users"));
        assert!(mapped.matches("/api"));
        assert!(!mapped.matches("/api/health"));
        assert!(!mapped.matches("/static/site.css"));

        let excludes_only = MappedInterceptor::new(Noop, &[], &["/static/**"]).unwrap();
        assert!(excludes_only.matches("/users"));
        assert!(!excludes_only.matches("/static/a.js"));

        assert!(MappedInterceptor::new(Noop, &["api"], &[]).is_err());
    }

    #[test]
    fn selection_keeps_order() {
        let interceptors = Interceptors::builder()
            .add_last(Noop)
            .add_mapped(MappedInterceptor::new(Noop, &["/admin/**"], &[]).unwrap())
            .add_first(Noop)
            .build();

        assert_eq!(interceptors.len(), 3);
        assert_eq!(interceptors.for_path("/users").len(), 2);
        assert_eq!(interceptors.for_path("/admin/users").len(), 3);
    }
}
