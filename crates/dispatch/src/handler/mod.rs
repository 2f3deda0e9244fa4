//! Handlers and what they return.
//!
//! A [`Handler`] is a named, tagged variant. The tag tells the adapter resolver how to
//! invoke it:
//!
//! - [`HandlerKind::Typed`]: one [`RequestHandler`] with a declared input [`PayloadKind`];
//!   the body is read and the result written through the converter registry
//! - [`HandlerKind::Rest`]: a [`RestHandler`] split per HTTP method
//! - [`HandlerKind::Raw`]: a [`RawHandler`] that builds its own [`ResponseUnit`]
//! - [`HandlerKind::Custom`]: an opaque object for user-provided adapters
//!
//! Handler identity is the `Arc<Handler>` the router holds; registering the same `Arc`
//! twice under one pattern is a no-op.

mod raw;
mod rest;

pub use raw::RawFnHandler;
pub use raw::RawHandler;
pub use raw::raw_fn;
pub use rest::RestHandler;
pub(crate) use rest::dispatch_rest;
pub(crate) use rest::takes_input;

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use micro_dispatch_http::protocol::ResponseUnit;

use crate::converter::{Payload, PayloadKind};
use crate::error::BoxError;
use crate::media::MediaType;
use crate::request::RequestContext;

/// The closed set of things a handler may return.
#[derive(Debug)]
pub enum HandlerResult {
    /// A fully formed response, written as is.
    Raw(ResponseUnit),
    /// A value converted through content negotiation and answered with 200.
    Typed(Option<Payload>),
    /// A value plus the status and headers to answer with.
    Entity(ResponseEntity),
}

impl HandlerResult {
    /// An empty 200.
    pub fn empty() -> Self {
        HandlerResult::Typed(None)
    }
}

impl From<Payload> for HandlerResult {
    fn from(payload: Payload) -> Self {
        HandlerResult::Typed(Some(payload))
    }
}

impl From<Option<Payload>> for HandlerResult {
    fn from(payload: Option<Payload>) -> Self {
        HandlerResult::Typed(payload)
    }
}

impl From<ResponseUnit> for HandlerResult {
    fn from(unit: ResponseUnit) -> Self {
        HandlerResult::Raw(unit)
    }
}

impl From<ResponseEntity> for HandlerResult {
    fn from(entity: ResponseEntity) -> Self {
        HandlerResult::Entity(entity)
    }
}

/// A payload with an explicit status and extra headers.
#[derive(Debug)]
pub struct ResponseEntity {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Payload>,
}

impl ResponseEntity {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: None }
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Payload>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Option<Payload>) {
        (self.status, self.headers, self.body)
    }
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, req: Arc<RequestContext>, input: Option<Payload>) -> Result<HandlerResult, BoxError>;
}

/// Wraps an async closure as a [`RequestHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> Debug for FnHandler<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

pub fn handler_fn<F, Fut, R, E>(f: F) -> FnHandler<F>
where
    F: Fn(Arc<RequestContext>, Option<Payload>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send,
    R: Into<HandlerResult>,
    E: Into<BoxError>,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut, R, E> RequestHandler for FnHandler<F>
where
    F: Fn(Arc<RequestContext>, Option<Payload>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send,
    R: Into<HandlerResult>,
    E: Into<BoxError>,
{
    async fn handle(&self, req: Arc<RequestContext>, input: Option<Payload>) -> Result<HandlerResult, BoxError> {
        (self.f)(req, input).await.map(Into::into).map_err(Into::into)
    }
}

/// A typed handler and what it declares about its payloads.
pub struct TypedHandler {
    input: Option<PayloadKind>,
    produces: Vec<MediaType>,
    inner: Box<dyn RequestHandler>,
}

impl TypedHandler {
    /// The payload kind the body is read as; `None` skips reading.
    pub fn input(&self) -> Option<PayloadKind> {
        self.input
    }

    /// Media types the handler may produce; empty means whatever the converters produce.
    pub fn produces(&self) -> &[MediaType] {
        &self.produces
    }

    pub fn inner(&self) -> &dyn RequestHandler {
        self.inner.as_ref()
    }
}

pub enum HandlerKind {
    Typed(TypedHandler),
    Rest(Box<dyn RestHandler>),
    Raw(Box<dyn RawHandler>),
    Custom(Arc<dyn Any + Send + Sync>),
}

pub struct Handler {
    name: String,
    kind: HandlerKind,
}

impl Debug for Handler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            HandlerKind::Typed(_) => "typed",
            HandlerKind::Rest(_) => "rest",
            HandlerKind::Raw(_) => "raw",
            HandlerKind::Custom(_) => "custom",
        };
        f.debug_struct("Handler").field("name", &self.name).field("kind", &kind).finish()
    }
}

impl Handler {
    /// Starts a typed handler declaration.
    pub fn typed(name: impl Into<String>) -> TypedHandlerBuilder {
        TypedHandlerBuilder { name: name.into(), input: None, produces: Vec::new() }
    }

    pub fn rest<H: RestHandler + 'static>(name: impl Into<String>, handler: H) -> Self {
        Self { name: name.into(), kind: HandlerKind::Rest(Box::new(handler)) }
    }

    pub fn raw<H: RawHandler + 'static>(name: impl Into<String>, handler: H) -> Self {
        Self { name: name.into(), kind: HandlerKind::Raw(Box::new(handler)) }
    }

    /// A handler only a user-provided adapter knows how to invoke.
    pub fn custom(name: impl Into<String>, handler: Arc<dyn Any + Send + Sync>) -> Self {
        Self { name: name.into(), kind: HandlerKind::Custom(handler) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }
}

#[derive(Debug)]
pub struct TypedHandlerBuilder {
    name: String,
    input: Option<PayloadKind>,
    produces: Vec<MediaType>,
}

impl TypedHandlerBuilder {
    #[must_use]
    pub fn input(mut self, kind: PayloadKind) -> Self {
        self.input = Some(kind);
        self
    }

    /// Restricts the producible media types; unparsable entries are ignored.
    #[must_use]
    pub fn produces(mut self, media_type: &str) -> Self {
        self.produces.extend(MediaType::parse(media_type));
        self
    }

    pub fn build<H: RequestHandler + 'static>(self, handler: H) -> Handler {
        let typed = TypedHandler { input: self.input, produces: self.produces, inner: Box::new(handler) };
        Handler { name: self.name, kind: HandlerKind::Typed(typed) }
    }
}
