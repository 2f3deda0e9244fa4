//! Bidirectional codecs between body bytes and typed payloads.
//!
//! A [`Converter`] handles one [`PayloadKind`] for a set of media types. Converters are
//! kept in an ordered [`ConverterRegistry`]; the first structurally capable converter wins,
//! so registration order is priority. The default registry holds, in order:
//!
//! | converter         | payload | media types                                         |
//! |-------------------|---------|-----------------------------------------------------|
//! | [`BytesConverter`] | bytes   | `application/octet-stream`, `*/*`                   |
//! | [`TextConverter`]  | text    | `text/plain`, `*/*`                                 |
//! | [`JsonConverter`]  | json    | `application/json`, `application/*+json`            |
//! | [`FormConverter`]  | form    | `application/x-www-form-urlencoded` (read only)     |

mod byte_array;
mod form;
mod json;
mod registry;
mod text;

pub use byte_array::BytesConverter;
pub use form::FormConverter;
pub use json::JsonConverter;
pub use registry::ConverterRegistry;
pub use registry::ConverterRegistryBuilder;
pub use text::TextConverter;

use std::fmt::{Display, Formatter};

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BoxError;
use crate::media::MediaType;

/// A typed request or response value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
    Form(FormData),
}

/// The tag of a [`Payload`], declared by handlers as their input type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Bytes,
    Text,
    Json,
    Form,
}

impl Display for PayloadKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PayloadKind::Bytes => "bytes",
            PayloadKind::Text => "text",
            PayloadKind::Json => "json",
            PayloadKind::Form => "form",
        })
    }
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Bytes(_) => PayloadKind::Bytes,
            Payload::Text(_) => PayloadKind::Text,
            Payload::Json(_) => PayloadKind::Json,
            Payload::Form(_) => PayloadKind::Form,
        }
    }

    /// Serializes any value into a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Payload::Json)
    }

    /// Deserializes a JSON payload into `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, BoxError> {
        match self {
            Payload::Json(value) => Ok(serde_json::from_value(value)?),
            other => Err(format!("expected a json payload, found {}", other.kind()).into()),
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&FormData> {
        match self {
            Payload::Form(form) => Some(form),
            _ => None,
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

/// Decoded `application/x-www-form-urlencoded` pairs, in body order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pairs: Vec<(String, String)>,
}

impl FormData {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs.iter().filter(move |(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A codec between bytes and one payload kind.
pub trait Converter: Send + Sync {
    fn name(&self) -> &'static str;

    fn payload_kind(&self) -> PayloadKind;

    fn supported_media_types(&self) -> &[MediaType];

    fn readable(&self) -> bool {
        true
    }

    fn writable(&self) -> bool {
        true
    }

    /// Charset appended to a written `Content-Type` that does not name one.
    fn default_charset(&self) -> Option<&'static str> {
        None
    }

    fn can_read(&self, kind: PayloadKind, content_type: &MediaType) -> bool {
        self.readable()
            && kind == self.payload_kind()
            && self.supported_media_types().iter().any(|supported| supported.includes(content_type))
    }

    /// `media_type` is `None` when collecting producible types.
    fn can_write(&self, kind: PayloadKind, media_type: Option<&MediaType>) -> bool {
        if !self.writable() || kind != self.payload_kind() {
            return false;
        }
        match media_type {
            None => true,
            Some(media_type) if media_type.is_wildcard_type() => true,
            Some(media_type) => self.supported_media_types().iter().any(|s| s.is_compatible_with(media_type)),
        }
    }

    fn read(&self, body: &Bytes, content_type: &MediaType) -> Result<Payload, BoxError>;

    fn write(&self, payload: Payload) -> Result<Bytes, BoxError>;
}

pub(crate) fn mismatch(converter: &str, payload: &Payload) -> BoxError {
    format!("{converter} converter cannot handle a {} payload", payload.kind()).into()
}
