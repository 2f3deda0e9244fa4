use bytes::Bytes;

use super::{Converter, Payload, PayloadKind, mismatch};
use crate::error::BoxError;
use crate::media::MediaType;

/// Passes raw bytes through untouched.
#[derive(Debug)]
pub struct BytesConverter {
    media_types: [MediaType; 2],
}

impl BytesConverter {
    pub fn new() -> Self {
        Self { media_types: [MediaType::new(mime::APPLICATION_OCTET_STREAM), MediaType::new(mime::STAR_STAR)] }
    }
}

impl Default for BytesConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for BytesConverter {
    fn name(&self) -> &'static str {
        "bytes"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Bytes
    }

    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn read(&self, body: &Bytes, _content_type: &MediaType) -> Result<Payload, BoxError> {
        Ok(Payload::Bytes(body.clone()))
    }

    fn write(&self, payload: Payload) -> Result<Bytes, BoxError> {
        match payload {
            Payload::Bytes(bytes) => Ok(bytes),
            other => Err(mismatch(self.name(), &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_any_content_type() {
        let converter = BytesConverter::new();
        let json = MediaType::new(mime::APPLICATION_JSON);
        assert!(converter.can_read(PayloadKind::Bytes, &json));
        assert!(!converter.can_read(PayloadKind::Text, &json));

        let body = Bytes::from_static(&[0, 159, 146, 150]);
        assert_eq!(converter.read(&body, &json).unwrap(), Payload::Bytes(body.clone()));
        assert_eq!(converter.write(Payload::Bytes(body.clone())).unwrap(), body);
        assert!(converter.write(Payload::from("text")).is_err());
    }
}
