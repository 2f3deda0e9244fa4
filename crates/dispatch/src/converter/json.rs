use bytes::Bytes;

use super::{Converter, Payload, PayloadKind, mismatch};
use crate::error::BoxError;
use crate::media::MediaType;

/// Reads and writes JSON documents through `serde_json`.
#[derive(Debug)]
pub struct JsonConverter {
    media_types: Vec<MediaType>,
}

impl JsonConverter {
    pub fn new() -> Self {
        let mut media_types = vec![MediaType::new(mime::APPLICATION_JSON)];
        media_types.extend(MediaType::parse("application/*+json"));
        Self { media_types }
    }
}

impl Default for JsonConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for JsonConverter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Json
    }

    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn read(&self, body: &Bytes, _content_type: &MediaType) -> Result<Payload, BoxError> {
        Ok(Payload::Json(serde_json::from_slice(body)?))
    }

    fn write(&self, payload: Payload) -> Result<Bytes, BoxError> {
        match payload {
            Payload::Json(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
            other => Err(mismatch(self.name(), &other)),
        }
    }
}
