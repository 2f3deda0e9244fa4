use bytes::Bytes;

use super::{Converter, FormData, Payload, PayloadKind};
use crate::error::BoxError;
use crate::media::MediaType;

/// Decodes `application/x-www-form-urlencoded` bodies. Read only.
#[derive(Debug)]
pub struct FormConverter {
    media_types: [MediaType; 1],
}

impl FormConverter {
    pub fn new() -> Self {
        Self { media_types: [MediaType::new(mime::APPLICATION_WWW_FORM_URLENCODED)] }
    }
}

impl Default for FormConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for FormConverter {
    fn name(&self) -> &'static str {
        "form"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Form
    }

    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn writable(&self) -> bool {
        false
    }

    fn read(&self, body: &Bytes, _content_type: &MediaType) -> Result<Payload, BoxError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)?;
        Ok(Payload::Form(FormData::new(pairs)))
    }

    fn write(&self, _payload: Payload) -> Result<Bytes, BoxError> {
        Err("form converter is read only".into())
    }
}
