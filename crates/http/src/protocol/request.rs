//! Inbound request units.
//!
//! The transport aggregates a full request before handing it over, so a request is
//! represented as a [`RequestHeader`] plus a fully-buffered [`ReqBody`]. The header wraps
//! `http::Request<()>` to provide the accessors the dispatch pipeline needs:
//! - method, target, version and header access
//! - body-carrying method detection
//! - keep-alive decision per protocol version
//! - declared content type

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};
use mime::Mime;

use crate::ensure;
use crate::protocol::ParseError;
use crate::protocol::body::{BodyLease, ReqBody};

/// Represents an HTTP request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request path without the query string.
    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    /// Returns the raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.inner.uri().query()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the method carries a request body: POST, PUT and PATCH.
    pub fn carries_body(&self) -> bool {
        matches!(self.method(), &Method::POST | &Method::PUT | &Method::PATCH)
    }

    /// Parses the `Content-Type` header.
    ///
    /// Returns `None` when the header is absent or is not a valid media type.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers().get(http::header::CONTENT_TYPE)?.to_str().ok()?.parse().ok()
    }

    /// Decides whether the connection should stay open after the response is flushed.
    ///
    /// HTTP/1.1 keeps alive unless the client sent `Connection: close`; HTTP/1.0 closes
    /// unless the client sent `Connection: keep-alive`. Older versions never keep alive.
    pub fn is_keep_alive(&self) -> bool {
        let connection = self.headers().get(http::header::CONNECTION).and_then(|v| v.to_str().ok());
        let has_token = |token: &str| {
            connection.is_some_and(|value| value.split(',').any(|item| item.trim().eq_ignore_ascii_case(token)))
        };

        match self.version() {
            Version::HTTP_11 | Version::HTTP_2 | Version::HTTP_3 => !has_token("close"),
            Version::HTTP_10 => has_token("keep-alive"),
            _ => false,
        }
    }
}

/// Converts request parts into a RequestHeader.
impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

/// Converts a bodyless request into a RequestHeader.
impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

/// One fully-aggregated inbound request, as delivered by the transport.
///
/// The unit owns its body buffer; whoever holds the unit is responsible for the single
/// release of its [`BodyLease`], see [`ReqBody::release`].
#[derive(Debug)]
pub struct RequestUnit {
    header: RequestHeader,
    body: ReqBody,
}

impl RequestUnit {
    pub fn new(header: RequestHeader, body: ReqBody) -> Self {
        Self { header, body }
    }

    /// Builds a unit from an aggregated request, rejecting bodies above `max_body_size`.
    pub fn with_limit(request: Request<Bytes>, max_body_size: usize) -> Result<Self, ParseError> {
        let body_size = request.body().len();
        ensure!(body_size <= max_body_size, ParseError::too_large_body(body_size, max_body_size));
        Ok(request.into())
    }

    /// Attaches a lease so the transport can observe when the buffer is given back.
    #[must_use]
    pub fn leased(mut self, lease: BodyLease) -> Self {
        self.body = ReqBody::leased(self.body.content(), lease);
        self
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn body(&self) -> &ReqBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut ReqBody {
        &mut self.body
    }

    pub fn into_parts(self) -> (RequestHeader, ReqBody) {
        (self.header, self.body)
    }
}

impl From<Request<Bytes>> for RequestUnit {
    fn from(request: Request<Bytes>) -> Self {
        let (parts, content) = request.into_parts();
        Self { header: parts.into(), body: ReqBody::new(content) }
    }
}
