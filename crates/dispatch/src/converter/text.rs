use bytes::Bytes;

use super::{Converter, Payload, PayloadKind, mismatch};
use crate::error::BoxError;
use crate::media::MediaType;

/// Reads and writes UTF-8 text.
#[derive(Debug)]
pub struct TextConverter {
    media_types: [MediaType; 2],
}

impl TextConverter {
    pub fn new() -> Self {
        Self { media_types: [MediaType::new(mime::TEXT_PLAIN), MediaType::new(mime::STAR_STAR)] }
    }
}

impl Default for TextConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for TextConverter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Text
    }

    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn default_charset(&self) -> Option<&'static str> {
        Some("utf-8")
    }

    fn read(&self, body: &Bytes, content_type: &MediaType) -> Result<Payload, BoxError> {
        if let Some(charset) = content_type.mime().get_param(mime::CHARSET)
            && !["utf-8", "utf8", "us-ascii"].iter().any(|name| charset.as_str().eq_ignore_ascii_case(name))
        {
            return Err(format!("unsupported charset '{charset}'").into());
        }
        let text = std::str::from_utf8(body)?;
        Ok(Payload::Text(text.to_owned()))
    }

    fn write(&self, payload: Payload) -> Result<Bytes, BoxError> {
        match payload {
            Payload::Text(text) => Ok(Bytes::from(text)),
            other => Err(mismatch(self.name(), &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_roundtrip() {
        let converter = TextConverter::new();
        let content_type = MediaType::parse("text/plain; charset=UTF-8").unwrap();

        let payload = converter.read(&Bytes::from("héllo"), &content_type).unwrap();
        assert_eq!(payload.as_text(), Some("héllo"));
        assert_eq!(converter.write(payload).unwrap(), Bytes::from("héllo"));
    }

    #[test]
    fn rejects_invalid_input() {
        let converter = TextConverter::new();
        let plain = MediaType::new(mime::TEXT_PLAIN);
        assert!(converter.read(&Bytes::from_static(&[0xff, 0xfe]), &plain).is_err());

        let latin1 = MediaType::parse("text/plain; charset=iso-8859-1").unwrap();
        assert!(converter.read(&Bytes::from_static(b"abc"), &latin1).is_err());
    }

    #[test]
    fn write_compatibility() {
        let converter = TextConverter::new();
        assert!(converter.can_write(PayloadKind::Text, None));
        assert!(converter.can_write(PayloadKind::Text, Some(&MediaType::new(mime::TEXT_HTML))));
        assert!(!converter.can_write(PayloadKind::Json, None));
        assert_eq!(converter.default_charset(), Some("utf-8"));
    }
}
