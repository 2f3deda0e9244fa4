use bytes::Bytes;
use http::HeaderValue;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use micro_dispatch_http::protocol::{RequestHeader, ResponseUnit};
use tracing::{debug, trace};

use super::{BytesConverter, Converter, FormConverter, JsonConverter, Payload, PayloadKind, TextConverter};
use crate::error::{ConversionStage, DispatchError};
use crate::media::{self, MediaType};

/// An ordered list of converters; earlier entries win.
pub struct ConverterRegistry {
    converters: Vec<Box<dyn Converter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.converters.iter().map(|c| c.name())).finish()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::builder()
            .add_last(BytesConverter::new())
            .add_last(TextConverter::new())
            .add_last(JsonConverter::new())
            .add_last(FormConverter::new())
            .build()
    }
}

impl ConverterRegistry {
    pub fn builder() -> ConverterRegistryBuilder {
        ConverterRegistryBuilder { inner: vec![] }
    }

    pub fn converters(&self) -> impl Iterator<Item = &dyn Converter> {
        self.converters.iter().map(AsRef::as_ref)
    }

    /// Reads the request body as `kind`.
    ///
    /// A missing `Content-Type` is read as `application/octet-stream`. Returns `Ok(None)` when
    /// there is no value to read: an empty body, or no capable converter on a method that
    /// does not carry a body. An unparsable `Content-Type` has no capable converter.
    pub fn read(
        &self,
        kind: PayloadKind,
        header: &RequestHeader,
        body: &Bytes,
    ) -> Result<Option<Payload>, DispatchError> {
        let raw = header.headers().get(CONTENT_TYPE);
        let content_type = match raw {
            None => Some(MediaType::new(mime::APPLICATION_OCTET_STREAM)),
            Some(value) => value.to_str().ok().and_then(MediaType::parse),
        };

        let converter = content_type.as_ref().and_then(|ct| self.converters().find(|c| c.can_read(kind, ct)));
        let (Some(converter), Some(content_type)) = (converter, &content_type) else {
            if !header.carries_body() || body.is_empty() {
                return Ok(None);
            }
            return Err(match (&content_type, raw) {
                (Some(content_type), _) => DispatchError::unsupported_media_type(content_type),
                (None, raw) => DispatchError::unsupported_media_type(
                    raw.map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned()).unwrap_or_default(),
                ),
            });
        };

        if body.is_empty() {
            return Ok(None);
        }

        trace!(converter = converter.name(), content_type = %content_type, "reading request body");
        converter
            .read(body, content_type)
            .map(Some)
            .map_err(|e| DispatchError::conversion(ConversionStage::Read, e))
    }

    /// Writes `payload` into `response` using content negotiation.
    ///
    /// `produces` restricts the producible types when non-empty. A `None` payload leaves the
    /// body empty and skips negotiation entirely.
    pub fn write(
        &self,
        payload: Option<Payload>,
        accepted: &[MediaType],
        produces: Option<&[MediaType]>,
        response: &mut ResponseUnit,
    ) -> Result<(), DispatchError> {
        let Some(payload) = payload else {
            return Ok(());
        };
        let kind = payload.kind();

        let producible = self.producible(kind, produces);
        let selected = select_media_type(accepted, &producible)?;

        let converter = self.converters().find(|c| c.can_write(kind, Some(&selected))).ok_or_else(|| {
            DispatchError::conversion(ConversionStage::Write, format!("no converter writes {kind} as {selected}"))
        })?;

        debug!(converter = converter.name(), content_type = %selected, "writing response body");
        let body = converter.write(payload).map_err(|e| DispatchError::conversion(ConversionStage::Write, e))?;
        add_default_headers(response, &selected, converter.default_charset(), body.len())?;
        response.set_body(body);
        Ok(())
    }

    fn producible(&self, kind: PayloadKind, produces: Option<&[MediaType]>) -> Vec<MediaType> {
        if let Some(produces) = produces.filter(|p| !p.is_empty()) {
            return produces.to_vec();
        }
        let producible = self
            .converters()
            .filter(|c| c.can_write(kind, None))
            .flat_map(|c| c.supported_media_types().iter().cloned())
            .collect::<Vec<_>>();
        if producible.is_empty() { vec![MediaType::new(mime::STAR_STAR)] } else { producible }
    }
}

/// Intersects accepted and producible types and picks the best concrete one.
fn select_media_type(accepted: &[MediaType], producible: &[MediaType]) -> Result<MediaType, DispatchError> {
    let mut compatible = accepted
        .iter()
        .flat_map(|a| producible.iter().filter(|p| a.is_compatible_with(p)).map(|p| MediaType::most_specific(a, p)))
        .collect::<Vec<_>>();

    if compatible.is_empty() {
        return Err(DispatchError::not_acceptable(media::join(producible)));
    }

    compatible.sort_by(MediaType::compare_specificity);

    for media_type in compatible {
        if media_type.is_concrete() {
            return Ok(media_type);
        }
        let essence = media_type.mime().essence_str();
        if essence == "*/*" || essence == "application/*" {
            return Ok(MediaType::new(mime::APPLICATION_OCTET_STREAM));
        }
    }
    Err(DispatchError::not_acceptable(media::join(producible)))
}

fn add_default_headers(
    response: &mut ResponseUnit,
    selected: &MediaType,
    charset: Option<&str>,
    length: usize,
) -> Result<(), DispatchError> {
    if !response.headers().contains_key(CONTENT_TYPE) {
        let mut content_type = selected.mime().to_string();
        if let Some(charset) = charset
            && selected.mime().get_param(mime::CHARSET).is_none()
        {
            content_type.push_str("; charset=");
            content_type.push_str(charset);
        }
        let value =
            HeaderValue::from_str(&content_type).map_err(|e| DispatchError::conversion(ConversionStage::Write, e))?;
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    if !response.headers().contains_key(CONTENT_LENGTH) && !response.is_chunked() {
        response.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(())
}

pub struct ConverterRegistryBuilder {
    inner: Vec<Box<dyn Converter>>,
}

impl std::fmt::Debug for ConverterRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.inner.iter().map(|c| c.name())).finish()
    }
}

impl ConverterRegistryBuilder {
    #[must_use]
    pub fn add_last<C: Converter + 'static>(mut self, converter: C) -> Self {
        self.inner.push(Box::new(converter));
        self
    }

    #[must_use]
    pub fn add_first<C: Converter + 'static>(mut self, converter: C) -> Self {
        self.inner.insert(0, Box::new(converter));
        self
    }

    pub fn build(self) -> ConverterRegistry {
        ConverterRegistry { converters: self.inner }
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Request, StatusCode};
    use serde_json::json;

    use super::*;

    fn header(method: Method, content_type: Option<&str>) -> RequestHeader {
        let mut builder = Request::builder().method(method).uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(()).unwrap().into()
    }

    fn accept(s: &str) -> Vec<MediaType> {
        s.split(',').filter_map(MediaType::parse).collect()
    }

    #[test]
    fn read_json() {
        let registry = ConverterRegistry::default();
        let payload = registry
            .read(PayloadKind::Json, &header(Method::POST, Some("application/json")), &Bytes::from_static(b"[1,2]"))
            .unwrap();
        assert_eq!(payload, Some(Payload::Json(json!([1, 2]))));
    }

    #[test]
    fn read_defaults_to_octet_stream() {
        let registry = ConverterRegistry::default();
        let body = Bytes::from_static(b"raw");
        let payload = registry.read(PayloadKind::Bytes, &header(Method::POST, None), &body).unwrap();
        assert_eq!(payload, Some(Payload::Bytes(body)));
    }

    #[test]
    fn read_unsupported_media_type() {
        let registry = ConverterRegistry::default();
        let err = registry
            .read(PayloadKind::Json, &header(Method::POST, Some("text/xml")), &Bytes::from_static(b"<a/>"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedMediaType { .. }));

        let err = registry
            .read(PayloadKind::Json, &header(Method::PUT, Some("definitely not a type")), &Bytes::from_static(b"x"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn read_without_value() {
        let registry = ConverterRegistry::default();
        let json_header = header(Method::POST, Some("application/json"));
        assert_eq!(registry.read(PayloadKind::Json, &json_header, &Bytes::new()).unwrap(), None);

        let get = header(Method::GET, Some("text/xml"));
        assert_eq!(registry.read(PayloadKind::Json, &get, &Bytes::from_static(b"<a/>")).unwrap(), None);

        let empty_post = header(Method::POST, Some("text/xml"));
        assert_eq!(registry.read(PayloadKind::Json, &empty_post, &Bytes::new()).unwrap(), None);

        let garbage_get = header(Method::GET, Some("garbage"));
        assert_eq!(registry.read(PayloadKind::Json, &garbage_get, &Bytes::new()).unwrap(), None);
        assert_eq!(registry.read(PayloadKind::Json, &garbage_get, &Bytes::from_static(b"{}")).unwrap(), None);

        let garbage_post = header(Method::POST, Some("garbage"));
        assert_eq!(registry.read(PayloadKind::Json, &garbage_post, &Bytes::new()).unwrap(), None);
        let err = registry.read(PayloadKind::Json, &garbage_post, &Bytes::from_static(b"{}")).unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedMediaType { ref content_type } if content_type == "garbage"));
    }

    #[test]
    fn read_conversion_failure() {
        let registry = ConverterRegistry::default();
        let err = registry
            .read(PayloadKind::Json, &header(Method::POST, Some("application/json")), &Bytes::from_static(b"{"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conversion { stage: ConversionStage::Read, .. }));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn write_text_with_charset() {
        let registry = ConverterRegistry::default();
        let mut response = ResponseUnit::new(StatusCode::OK);
        registry.write(Some(Payload::from("hello")), &accept("*/*"), None, &mut response).unwrap();

        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "5");
        assert_eq!(response.body(), &Bytes::from_static(b"hello"));
    }

    #[test]
    fn write_json_prefers_concrete_type() {
        let registry = ConverterRegistry::default();
        let mut response = ResponseUnit::new(StatusCode::OK);
        registry
            .write(Some(Payload::Json(json!({"a": 1}))), &accept("text/html;q=0.9, application/*"), None, &mut response)
            .unwrap();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(response.body(), &Bytes::from_static(br#"{"a":1}"#));
    }

    #[test]
    fn write_bytes_under_wildcard_falls_back_to_octet_stream() {
        let registry = ConverterRegistry::default();
        let mut response = ResponseUnit::new(StatusCode::OK);
        let payload = Payload::Bytes(Bytes::from_static(b"\x00\x01"));
        registry.write(Some(payload), &accept("*/*"), None, &mut response).unwrap();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/octet-stream");
    }

    #[test]
    fn write_not_acceptable_leaves_body_empty() {
        let registry = ConverterRegistry::default();
        let mut response = ResponseUnit::new(StatusCode::OK);
        let err = registry
            .write(Some(Payload::Json(json!({"a": 1}))), &accept("text/html"), None, &mut response)
            .unwrap_err();

        assert!(matches!(err, DispatchError::NotAcceptable { .. }));
        assert!(response.body().is_empty());
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn write_none_skips_negotiation() {
        let registry = ConverterRegistry::default();
        let mut response = ResponseUnit::new(StatusCode::OK);
        registry.write(None, &accept("text/html"), None, &mut response).unwrap();
        assert!(response.body().is_empty());
    }

    #[test]
    fn produces_restricts_types() {
        let registry = ConverterRegistry::default();
        let produces = [MediaType::parse("application/vnd.api+json").unwrap()];

        let mut response = ResponseUnit::new(StatusCode::OK);
        registry.write(Some(Payload::Json(json!(1))), &accept("*/*"), Some(&produces), &mut response).unwrap();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/vnd.api+json");

        let mut response = ResponseUnit::new(StatusCode::OK);
        let err = registry
            .write(Some(Payload::Json(json!(1))), &accept("application/xml"), Some(&produces), &mut response)
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotAcceptable { .. }));
    }

    #[test]
    fn keeps_explicit_headers() {
        let registry = ConverterRegistry::default();
        let mut response = ResponseUnit::new(StatusCode::OK);
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/markdown"));
        response.headers_mut().insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        registry.write(Some(Payload::from("# hi")), &accept("*/*"), None, &mut response).unwrap();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/markdown");
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn registration_order_is_priority() {
        struct Shouting;

        impl Converter for Shouting {
            fn name(&self) -> &'static str {
                "shouting"
            }

            fn payload_kind(&self) -> PayloadKind {
                PayloadKind::Text
            }

            fn supported_media_types(&self) -> &[MediaType] {
                std::slice::from_ref(&*SHOUT)
            }

            fn read(&self, body: &Bytes, _content_type: &MediaType) -> Result<Payload, crate::error::BoxError> {
                Ok(Payload::Text(String::from_utf8_lossy(body).to_uppercase()))
            }

            fn write(&self, payload: Payload) -> Result<Bytes, crate::error::BoxError> {
                Ok(Bytes::from(payload.as_text().unwrap_or_default().to_uppercase()))
            }
        }

        static SHOUT: std::sync::LazyLock<MediaType> = std::sync::LazyLock::new(|| MediaType::new(mime::TEXT_PLAIN));

        let registry = ConverterRegistry::builder().add_last(TextConverter::new()).add_first(Shouting).build();
        let payload = registry
            .read(PayloadKind::Text, &header(Method::POST, Some("text/plain")), &Bytes::from_static(b"hi"))
            .unwrap();
        assert_eq!(payload, Some(Payload::from("HI")));
    }
}
