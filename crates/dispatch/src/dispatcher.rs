//! The request pipeline.
//!
//! [`Dispatcher::submit`] admits a request into the worker pool and returns immediately. On
//! a worker, each request then goes through, in order:
//!
//! 1. sampling and request id assignment
//! 2. routing, applying the not-found policy when nothing matches
//! 3. `pre_handle` of the interceptors mapped to the path
//! 4. the handler, invoked through the adapter supporting it
//! 5. `post_handle`
//! 6. the resolver chain, when any of steps 2 to 5 failed
//! 7. `after_completion`
//! 8. default headers, keep-alive decision and the write
//! 9. release of the request body
//!
//! Fatal failures skip step 6: a fixed error body is written, the connection is closed and
//! the error is returned from the dispatch task.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use http::header::{CONNECTION, CONTENT_LENGTH, DATE};
use http::{HeaderName, HeaderValue, StatusCode, Version};
use micro_dispatch_http::connection::{BoxWriter, ResponseWriter};
use micro_dispatch_http::protocol::{RequestHeader, RequestUnit, ResponseUnit};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::adapter::{AdapterResolver, HandlerAdapter};
use crate::config::{ConfigError, DispatcherConfig, NotFoundPolicy};
use crate::converter::ConverterRegistry;
use crate::date::DateService;
use crate::error::{DispatchError, DispatchRejected};
use crate::handler::Handler;
use crate::interceptor::{ExecutionChain, Interceptors};
use crate::pool::WorkerPool;
use crate::request::{Exchange, PathParams, RequestContext};
use crate::resolver::{DefaultExceptionResolver, ExceptionResolver, ResolverChain, fatal_response};
use crate::router::{Router, RouterBuilder, RouterError};
use crate::sampling::SamplingGate;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Error, Debug)]
pub enum DispatcherBuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] io::Error),

    #[error("failed to build router: {0}")]
    Router(#[from] RouterError),
}

/// Lock-free dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
}

impl DispatchStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Dispatches that ended with a fatal error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

struct InFlight<'a>(&'a DispatchStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a DispatchStats) -> Self {
        stats.in_flight.fetch_add(1, Ordering::Relaxed);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// What the final write needs to know about the request.
struct Session {
    request_id: String,
    sampled: bool,
    keep_alive: bool,
    version: Version,
    started: Instant,
}

struct Inner {
    config: DispatcherConfig,
    router: Router,
    interceptors: Interceptors,
    adapters: AdapterResolver,
    resolvers: ResolverChain,
    sampling: SamplingGate,
    date: DateService,
    stats: DispatchStats,
    sequence: AtomicU64,
}

pub struct Dispatcher {
    inner: Arc<Inner>,
    pool: WorkerPool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("router", &self.inner.router)
            .field("stats", &self.inner.stats)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// The live router; routes registered here apply to subsequent requests.
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.inner.stats
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Admits a request into the worker pool.
    ///
    /// The returned task resolves to the fatal error the dispatch ended with, if any. When
    /// the pool is saturated the body is released, a 503 is written, the connection is
    /// closed and the request is rejected.
    pub async fn submit(
        &self,
        mut unit: RequestUnit,
        mut writer: BoxWriter,
    ) -> Result<JoinHandle<Result<(), DispatchError>>, DispatchRejected> {
        self.inner.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let permit = match self.pool.try_admit() {
            Ok(permit) => permit,
            Err(rejected) => {
                self.inner.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    path = unit.header().path(),
                    capacity = rejected.capacity,
                    "worker pool saturated, rejecting request"
                );
                unit.body_mut().release();

                let mut response = ResponseUnit::with_body(
                    StatusCode::SERVICE_UNAVAILABLE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                    "server busy",
                );
                self.inner.finalize(&mut response, false, unit.header().version());
                if let Err(e) = writer.write(response).await {
                    error!(cause = %e, "failed to write rejection");
                }
                writer.close().await;
                return Err(rejected);
            }
        };

        let inner = Arc::clone(&self.inner);
        Ok(self.pool.spawn(permit, async move { inner.dispatch(unit, writer).await }))
    }
}

#[async_trait]
impl micro_dispatch_http::handler::Handler for Dispatcher {
    type Error = DispatchRejected;

    async fn call(&self, unit: RequestUnit, writer: BoxWriter) -> Result<(), Self::Error> {
        self.submit(unit, writer).await.map(|_task| ())
    }
}

impl Inner {
    async fn dispatch(&self, unit: RequestUnit, mut writer: BoxWriter) -> Result<(), DispatchError> {
        let _in_flight = InFlight::enter(&self.stats);
        let (header, mut body) = unit.into_parts();

        let outcome = self.process(header, body.content(), &mut writer).await;
        body.release();

        match &outcome {
            Ok(()) => self.stats.completed.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.failed.fetch_add(1, Ordering::Relaxed),
        };
        outcome
    }

    async fn process(
        &self,
        header: RequestHeader,
        content: bytes::Bytes,
        writer: &mut BoxWriter,
    ) -> Result<(), DispatchError> {
        let sampled = self.sampling.next();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let request_id = header
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .map_or_else(|| format!("req-{sequence}"), str::to_owned);
        let mut session = Session {
            request_id,
            sampled,
            keep_alive: header.is_keep_alive(),
            version: header.version(),
            started: Instant::now(),
        };

        if sampled {
            debug!(
                request_id = %session.request_id,
                sequence,
                method = %header.method(),
                uri = %header.uri(),
                version = ?header.version(),
                headers = ?header.headers(),
                "dispatching request"
            );
        }

        if content.len() > self.config.max_body_size {
            warn!(
                request_id = %session.request_id,
                size = content.len(),
                max_size = self.config.max_body_size,
                "request body too large"
            );
            session.keep_alive = false;
            let response = ResponseUnit::with_body(
                StatusCode::PAYLOAD_TOO_LARGE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
                "request body too large",
            );
            return self.finish(response, &session, writer).await;
        }

        let Some(route) = self.router.at(header.path()) else {
            warn!(request_id = %session.request_id, path = header.path(), "no route found");
            let response = match self.config.not_found {
                NotFoundPolicy::FixedResponse => {
                    session.keep_alive = false;
                    ResponseUnit::new(StatusCode::NOT_FOUND)
                }
                NotFoundPolicy::Raise => {
                    let req = self.context(header, content, PathParams::empty(), &session);
                    let err = DispatchError::route_not_found(req.path());
                    self.resolvers.resolve(&req, None, &err)
                }
            };
            return self.finish(response, &session, writer).await;
        };

        let (handler, params) = route.into_parts();
        let req = Arc::new(self.context(header, content, params, &session));
        let mut exchange = Exchange::new(Arc::clone(&req));
        let mut chain = ExecutionChain::new(Arc::clone(&handler), self.interceptors.for_path(req.path()));

        let (response, failure) = match self.run_chain(&req, &mut chain, &mut exchange).await {
            Ok(response) => (response, None),
            Err(e) if e.is_fatal() => {
                error!(
                    request_id = %session.request_id,
                    handler = handler.name(),
                    cause = %e,
                    "fatal dispatch failure"
                );
                chain.trigger_after_completion(&exchange, Some(&e)).await;

                session.keep_alive = false;
                let response = fatal_response(self.config.error_code, &e);
                if let Err(write_error) = self.finish(response, &session, writer).await {
                    error!(request_id = %session.request_id, cause = %write_error, "failed to write fatal response");
                }
                return Err(e);
            }
            Err(e) => {
                let response = self.resolvers.resolve(&req, Some(&handler), &e);
                (response, Some(e))
            }
        };

        chain.trigger_after_completion(&exchange, failure.as_ref()).await;
        self.finish(response, &session, writer).await
    }

    fn context(
        &self,
        header: RequestHeader,
        content: bytes::Bytes,
        params: PathParams,
        session: &Session,
    ) -> RequestContext {
        RequestContext::new(header, content, params)
            .with_request_id(session.request_id.clone())
            .with_sampled(session.sampled)
    }

    async fn run_chain(
        &self,
        req: &Arc<RequestContext>,
        chain: &mut ExecutionChain,
        exchange: &mut Exchange,
    ) -> Result<ResponseUnit, DispatchError> {
        if !chain.apply_pre_handle(exchange).await? {
            debug!(request_id = req.request_id(), "request aborted by interceptor");
            return Ok(exchange.take_response().unwrap_or_else(|| ResponseUnit::new(StatusCode::OK)));
        }

        let handler = Arc::clone(chain.handler());
        let adapter = self.adapters.resolve(&handler)?;
        let mut response = adapter.handle(req, &handler).await?;
        chain.apply_post_handle(exchange, &mut response).await?;
        Ok(response)
    }

    /// Adds default headers and writes, closing the connection when not keeping it alive.
    async fn finish(
        &self,
        mut response: ResponseUnit,
        session: &Session,
        writer: &mut BoxWriter,
    ) -> Result<(), DispatchError> {
        let keep_alive = session.keep_alive && !response.wants_close();
        self.finalize(&mut response, keep_alive, session.version);

        let status = response.status();
        let size = response.body().len();
        let written = writer.write(response).await;
        if !keep_alive || written.is_err() {
            writer.close().await;
        }

        if session.sampled {
            debug!(
                request_id = %session.request_id,
                status = status.as_u16(),
                body_size = size,
                keep_alive,
                elapsed_us = session.started.elapsed().as_micros(),
                "request completed"
            );
        }

        written.map_err(|e| {
            error!(request_id = %session.request_id, cause = %e, "failed to write response");
            DispatchError::from(e)
        })
    }

    fn finalize(&self, response: &mut ResponseUnit, keep_alive: bool, version: Version) {
        *response.version_mut() = version;
        let length = response.body().len();
        let headers = response.headers_mut();
        if !headers.contains_key(CONTENT_LENGTH) && !headers.contains_key(http::header::TRANSFER_ENCODING) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }
        if !headers.contains_key(DATE)
            && let Some(date) = self.date.http_date()
        {
            headers.insert(DATE, date);
        }
        let connection = if keep_alive { "keep-alive" } else { "close" };
        headers.insert(CONNECTION, HeaderValue::from_static(connection));
    }
}

pub struct DispatcherBuilder {
    config: DispatcherConfig,
    routes: RouterBuilder,
    interceptors: Interceptors,
    converters: Option<ConverterRegistry>,
    adapters: Vec<Arc<dyn HandlerAdapter>>,
    resolvers: Vec<Arc<dyn ExceptionResolver>>,
    pool: Option<WorkerPool>,
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("config", &self.config)
            .field("routes", &self.routes)
            .field("interceptors", &self.interceptors)
            .field("adapters", &self.adapters.len())
            .field("resolvers", &self.resolvers.len())
            .finish_non_exhaustive()
    }
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            config: DispatcherConfig::default(),
            routes: Router::builder(),
            interceptors: Interceptors::default(),
            converters: None,
            adapters: Vec::new(),
            resolvers: Vec::new(),
            pool: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the routes registered so far.
    #[must_use]
    pub fn router(mut self, routes: RouterBuilder) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn route(mut self, pattern: impl Into<String>, handler: impl Into<Arc<Handler>>) -> Self {
        self.routes = self.routes.route(pattern, handler);
        self
    }

    #[must_use]
    pub fn interceptors(mut self, interceptors: Interceptors) -> Self {
        self.interceptors = interceptors;
        self
    }

    #[must_use]
    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = Some(converters);
        self
    }

    /// Adds an adapter, consulted before the default ones.
    #[must_use]
    pub fn adapter<A: HandlerAdapter + 'static>(mut self, adapter: A) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    /// Adds an exception resolver, consulted before the default one.
    #[must_use]
    pub fn resolver<R: ExceptionResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Runs requests on an existing pool instead of starting one from the configuration.
    #[must_use]
    pub fn pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> Result<Dispatcher, DispatcherBuildError> {
        self.config.validate()?;
        let router = self.routes.trailing_slash_match(self.config.use_trailing_slash_match).build()?;
        let pool = match self.pool {
            Some(pool) => pool,
            None => WorkerPool::new(&self.config.execution)?,
        };

        let registry = Arc::new(self.converters.unwrap_or_default());
        let adapters = AdapterResolver::with_adapters(self.adapters, Arc::clone(&registry));
        let resolvers =
            ResolverChain::new(self.resolvers, DefaultExceptionResolver::new(self.config.error_code), registry);
        let date = DateService::new(pool.handle());

        let inner = Inner {
            sampling: SamplingGate::from_config(&self.config.sampling),
            config: self.config,
            router,
            interceptors: self.interceptors,
            adapters,
            resolvers,
            date,
            stats: DispatchStats::default(),
            sequence: AtomicU64::new(1),
        };
        Ok(Dispatcher { inner: Arc::new(inner), pool })
    }

    /// Builds on the current runtime with room for `capacity` concurrent requests.
    pub fn build_on_current(self, capacity: usize) -> Result<Dispatcher, DispatcherBuildError> {
        self.pool(WorkerPool::with_handle(Handle::current(), capacity)).build()
    }
}
