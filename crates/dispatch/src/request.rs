//! Per-request state shared with handlers and interceptors.
//!
//! - [`RequestContext`]: the immutable view of one request, shared as `Arc<RequestContext>`
//! - [`PathParams`]: variables extracted from the winning route pattern
//! - [`Exchange`]: mutable per-dispatch state handed to interceptors
//!
//! Parameter lookup follows servlet conventions: the first query value wins, and values
//! parsed from a form-encoded body are consulted only when the query has no entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri, Version};
use micro_dispatch_http::protocol::{RequestHeader, ResponseUnit};
use serde::de::DeserializeOwned;
use tracing::debug;

/// The immutable view of one dispatched request.
#[derive(Debug)]
pub struct RequestContext {
    header: RequestHeader,
    content: Bytes,
    path_params: PathParams,
    query_params: Vec<(String, String)>,
    form_params: Vec<(String, String)>,
    request_id: String,
    sampled: bool,
}

impl RequestContext {
    pub fn new(header: RequestHeader, content: Bytes, path_params: PathParams) -> Self {
        let query_params = header.query().map(decode_pairs).unwrap_or_default();
        let form_params = match header.content_type() {
            Some(content_type) if content_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() => {
                std::str::from_utf8(&content).map(decode_pairs).unwrap_or_default()
            }
            _ => Vec::new(),
        };

        Self { header, content, path_params, query_params, form_params, request_id: String::new(), sampled: false }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    #[must_use]
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = sampled;
        self
    }

    /// Returns a reference to the underlying RequestHeader
    pub fn request_header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    pub fn path(&self) -> &str {
        self.header.path()
    }

    pub fn version(&self) -> Version {
        self.header.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    /// The raw request body.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// The `x-request-id` of the request, or a generated sequence id.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Whether diagnostic logging is enabled for this request.
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_params.get(name)
    }

    /// First query value for `name`, falling back to the form body.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        first(&self.query_params, name).or_else(|| first(&self.form_params, name))
    }

    /// All query values for `name`, or all form body values if the query has none.
    pub fn parameter_values(&self, name: &str) -> Vec<&str> {
        let values = all(&self.query_params, name);
        if values.is_empty() { all(&self.form_params, name) } else { values }
    }

    /// First value of every parameter name, query values taking precedence.
    pub fn parameter_map(&self) -> BTreeMap<&str, &str> {
        let mut map = BTreeMap::new();
        for (name, value) in self.query_params.iter().chain(&self.form_params) {
            map.entry(name.as_str()).or_insert(value.as_str());
        }
        map
    }

    /// Parameters whose name starts with `prefix`, keyed by the rest of the name.
    pub fn parameters_with_prefix(&self, prefix: &str) -> BTreeMap<&str, &str> {
        self.parameter_map()
            .into_iter()
            .filter_map(|(name, value)| name.strip_prefix(prefix).map(|rest| (rest, value)))
            .collect()
    }

    /// Deserializes the query string into `T`.
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, serde_qs::Error> {
        serde_qs::from_str(self.header.query().unwrap_or_default())
    }
}

fn decode_pairs(raw: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(raw).unwrap_or_else(|e| {
        debug!(cause = %e, "skip undecodable parameters");
        Vec::new()
    })
}

fn first<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
}

fn all<'a>(pairs: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    pairs.iter().filter(|(key, _)| key == name).map(|(_, value)| value.as_str()).collect()
}

/// Represents path parameters extracted from the URL path of an HTTP request.
///
/// For example, in the pattern "/users/{id}", "id" is a path parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    /// Creates an empty PathParams instance with no parameters
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: &str, value: &str) {
        self.params.push((name.to_owned(), value.to_owned()));
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.params.truncate(len);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Gets the value of a path parameter by its name
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.params.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<const N: usize> From<[(&str, &str); N]> for PathParams {
    fn from(params: [(&str, &str); N]) -> Self {
        Self { params: params.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect() }
    }
}

/// Mutable state of one dispatch, shared by the interceptors of its chain.
///
/// Interceptors can stash typed values in [`Exchange::attributes_mut`] for later callbacks.
/// An interceptor that aborts the chain may leave the response to write in
/// [`Exchange::set_response`]; without one an empty 200 is written.
#[derive(Debug)]
pub struct Exchange {
    request: Arc<RequestContext>,
    attributes: Extensions,
    response: Option<ResponseUnit>,
}

impl Exchange {
    pub fn new(request: Arc<RequestContext>) -> Self {
        Self { request, attributes: Extensions::new(), response: None }
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn attributes(&self) -> &Extensions {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Extensions {
        &mut self.attributes
    }

    pub fn set_response(&mut self, response: ResponseUnit) {
        self.response = Some(response);
    }

    pub fn response(&self) -> Option<&ResponseUnit> {
        self.response.as_ref()
    }

    pub fn take_response(&mut self) -> Option<ResponseUnit> {
        self.response.take()
    }
}
