//! Outbound response units.
//!
//! A [`ResponseUnit`] wraps `http::Response<Bytes>`: the dispatch pipeline always produces a
//! fully-buffered body, so the transport only has to encode and flush it.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Response, StatusCode, Version};

/// Represents one complete HTTP response.
#[derive(Debug, Clone)]
pub struct ResponseUnit {
    inner: Response<Bytes>,
}

impl ResponseUnit {
    /// Creates an empty-bodied response with the given status.
    pub fn new(status: StatusCode) -> Self {
        let mut inner = Response::new(Bytes::new());
        *inner.status_mut() = status;
        Self { inner }
    }

    /// Creates a response with a body and its content type.
    pub fn with_body(status: StatusCode, content_type: HeaderValue, body: impl Into<Bytes>) -> Self {
        let mut unit = Self::new(status);
        unit.headers_mut().insert(http::header::CONTENT_TYPE, content_type);
        unit.set_body(body.into());
        unit
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn status_mut(&mut self) -> &mut StatusCode {
        self.inner.status_mut()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn version_mut(&mut self) -> &mut Version {
        self.inner.version_mut()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    pub fn body(&self) -> &Bytes {
        self.inner.body()
    }

    pub fn set_body(&mut self, body: Bytes) {
        *self.inner.body_mut() = body;
    }

    /// Whether the response itself asks for the connection to be closed.
    pub fn wants_close(&self) -> bool {
        self.headers()
            .get_all(http::header::CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("close"))
    }

    /// Whether the body is framed by chunked transfer encoding instead of a length.
    pub fn is_chunked(&self) -> bool {
        self.headers().contains_key(http::header::TRANSFER_ENCODING)
    }

    pub fn into_inner(self) -> Response<Bytes> {
        self.inner
    }
}

impl From<Response<Bytes>> for ResponseUnit {
    fn from(inner: Response<Bytes>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_and_content_type() {
        let unit = ResponseUnit::with_body(StatusCode::CREATED, HeaderValue::from_static("text/plain"), "hi");
        assert_eq!(unit.status(), StatusCode::CREATED);
        assert_eq!(unit.body(), &Bytes::from_static(b"hi"));
        assert_eq!(unit.headers().get(http::header::CONTENT_TYPE).unwrap(), "text/plain");
        assert!(!unit.wants_close());
        assert!(!unit.is_chunked());
    }

    #[test]
    fn close_token() {
        let mut unit = ResponseUnit::new(StatusCode::OK);
        unit.headers_mut().insert(http::header::CONNECTION, HeaderValue::from_static("upgrade, Close"));
        assert!(unit.wants_close());
    }
}
