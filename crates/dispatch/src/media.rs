//! Media types with quality weights, built on the `mime` crate.
//!
//! Content negotiation needs more than parsing: wildcard inclusion, compatibility of
//! structured-syntax suffixes like `application/*+json`, and a specificity order that puts
//! concrete types ahead of wildcards.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use http::HeaderMap;
use http::header::ACCEPT;
use mime::Mime;
use tracing::debug;

/// A media type plus the quality weight a client attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    mime: Mime,
    quality: f32,
}

impl MediaType {
    pub fn new(mime: Mime) -> Self {
        Self { mime, quality: 1.0 }
    }

    /// Parses one media range, reading and stripping its `q` parameter.
    ///
    /// Returns `None` for unparsable input or an unparsable quality.
    pub fn parse(s: &str) -> Option<Self> {
        let parsed: Mime = s.trim().parse().ok()?;
        let Some(q) = parsed.get_param("q") else {
            return Some(Self::new(parsed));
        };

        let quality = q.as_str().parse::<f32>().ok().filter(|q| (0.0..=1.0).contains(q))?;
        let mut rebuilt = format!("{}/{}", parsed.type_(), parsed.subtype());
        if let Some(suffix) = parsed.suffix() {
            rebuilt.push('+');
            rebuilt.push_str(suffix.as_str());
        }
        for (name, value) in parsed.params().filter(|(name, _)| *name != "q") {
            rebuilt.push_str(&format!("; {name}={value}"));
        }
        let mime = rebuilt.parse().ok()?;
        Some(Self { mime, quality })
    }

    #[must_use]
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    fn subtype_str(&self) -> String {
        match self.mime.suffix() {
            Some(suffix) => format!("{}+{}", self.mime.subtype(), suffix),
            None => self.mime.subtype().as_str().to_owned(),
        }
    }

    fn suffix_str(&self) -> Option<&str> {
        self.mime.suffix().map(|suffix| suffix.as_str())
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.mime.type_() == mime::STAR
    }

    /// `*` and `*+suffix` are both wildcard subtypes.
    pub fn is_wildcard_subtype(&self) -> bool {
        self.mime.subtype() == mime::STAR
    }

    pub fn is_concrete(&self) -> bool {
        !self.is_wildcard_type() && !self.is_wildcard_subtype()
    }

    /// 0 for concrete types, 1 for wildcard subtypes, 2 for `*/*`.
    pub fn specificity_rank(&self) -> u8 {
        if self.is_wildcard_type() {
            2
        } else if self.is_wildcard_subtype() {
            1
        } else {
            0
        }
    }

    /// Whether every type matched by `other` is matched by `self`.
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() {
            return true;
        }
        if self.mime.type_() != other.mime.type_() {
            return false;
        }
        if self.subtype_str() == other.subtype_str() {
            return true;
        }
        if !self.is_wildcard_subtype() {
            return false;
        }
        match self.suffix_str() {
            None => true,
            Some(suffix) => other.suffix_str() == Some(suffix),
        }
    }

    /// Whether `self` and `other` have at least one concrete type in common.
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() || other.is_wildcard_type() {
            return true;
        }
        if self.mime.type_() != other.mime.type_() {
            return false;
        }

        let this_subtype = self.subtype_str();
        let other_subtype = other.subtype_str();
        if this_subtype == other_subtype {
            return true;
        }
        if this_subtype == "*" || other_subtype == "*" {
            return true;
        }
        if self.is_wildcard_subtype()
            && let Some(suffix) = self.suffix_str()
        {
            return suffix == other_subtype || Some(suffix) == other.suffix_str();
        }
        if other.is_wildcard_subtype()
            && let Some(suffix) = other.suffix_str()
        {
            return suffix == this_subtype || Some(suffix) == self.suffix_str();
        }
        false
    }

    /// Orders more specific types first, then higher quality first.
    pub fn compare_specificity(&self, other: &MediaType) -> Ordering {
        self.specificity_rank()
            .cmp(&other.specificity_rank())
            .then_with(|| other.quality.partial_cmp(&self.quality).unwrap_or(Ordering::Equal))
    }

    /// Picks the more specific of an accepted and a producible type, keeping the quality the
    /// client gave to the accepted one.
    pub fn most_specific(accepted: &MediaType, producible: &MediaType) -> MediaType {
        let producible = producible.clone().with_quality(accepted.quality);
        if accepted.specificity_rank() <= producible.specificity_rank() {
            accepted.clone()
        } else {
            producible
        }
    }
}

impl From<Mime> for MediaType {
    fn from(mime: Mime) -> Self {
        Self::new(mime)
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.mime, f)
    }
}

/// Parses every `Accept` header of a request.
///
/// Entries with `q=0` are dropped and unparsable entries are skipped. A request without any
/// usable entry accepts `*/*`.
pub fn parse_accept(headers: &HeaderMap) -> Vec<MediaType> {
    let mut accepted = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let parsed = MediaType::parse(entry);
            if parsed.is_none() {
                debug!(entry, "skip unparsable accept entry");
            }
            parsed
        })
        .filter(|media_type| media_type.quality > 0.0)
        .collect::<Vec<_>>();

    if accepted.is_empty() {
        accepted.push(MediaType::new(mime::STAR_STAR));
    }
    accepted
}

/// Renders a list of media types for error messages.
pub fn join(media_types: &[MediaType]) -> String {
    media_types.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn media(s: &str) -> MediaType {
        MediaType::parse(s).unwrap()
    }

    #[test]
    fn parse_quality() {
        let media_type = media("application/json;q=0.5");
        assert_eq!(media_type.quality(), 0.5);
        assert_eq!(media_type.mime().essence_str(), "application/json");
        assert!(media_type.mime().get_param("q").is_none());

        let media_type = media("text/plain; charset=utf-8; q=0.2");
        assert_eq!(media_type.quality(), 0.2);
        assert_eq!(media_type.mime().get_param(mime::CHARSET), Some(mime::UTF_8));

        assert!(MediaType::parse("text/plain;q=abc").is_none());
        assert!(MediaType::parse("not-a-type").is_none());
    }

    #[test]
    fn wildcards() {
        assert!(media("*/*").is_wildcard_type());
        assert!(media("text/*").is_wildcard_subtype());
        assert!(media("application/*+json").is_wildcard_subtype());
        assert!(media("application/json").is_concrete());
        assert_eq!(media("*/*").specificity_rank(), 2);
        assert_eq!(media("text/*").specificity_rank(), 1);
        assert_eq!(media("text/html").specificity_rank(), 0);
    }

    #[test]
    fn includes() {
        assert!(media("*/*").includes(&media("text/plain")));
        assert!(media("text/*").includes(&media("text/plain")));
        assert!(!media("text/plain").includes(&media("text/*")));
        assert!(media("application/*+json").includes(&media("application/vnd.api+json")));
        assert!(!media("application/*+json").includes(&media("application/json")));
        assert!(!media("text/*").includes(&media("application/json")));
    }

    #[test]
    fn compatibility() {
        assert!(media("text/plain").is_compatible_with(&media("*/*")));
        assert!(media("text/*").is_compatible_with(&media("text/plain")));
        assert!(media("application/*+json").is_compatible_with(&media("application/json")));
        assert!(media("application/json").is_compatible_with(&media("application/*+json")));
        assert!(media("application/*+json").is_compatible_with(&media("application/vnd.api+json")));
        assert!(!media("application/json").is_compatible_with(&media("text/plain")));
        assert!(!media("application/xml").is_compatible_with(&media("application/json")));
    }

    #[test]
    fn most_specific_keeps_accept_quality() {
        let chosen = MediaType::most_specific(&media("text/*;q=0.3"), &media("text/plain"));
        assert_eq!(chosen.mime().essence_str(), "text/plain");
        assert_eq!(chosen.quality(), 0.3);

        let chosen = MediaType::most_specific(&media("application/json"), &media("*/*"));
        assert_eq!(chosen.mime().essence_str(), "application/json");
    }

    #[test]
    fn specificity_order() {
        let mut types = vec![media("*/*"), media("text/*"), media("text/html;q=0.4"), media("application/json")];
        types.sort_by(MediaType::compare_specificity);
        let rendered = types.iter().map(|t| t.mime().essence_str().to_owned()).collect::<Vec<_>>();
        assert_eq!(rendered, ["application/json", "text/html", "text/*", "*/*"]);
    }

    #[test]
    fn accept_header() {
        let mut headers = HeaderMap::new();
        headers.append(ACCEPT, HeaderValue::from_static("text/html, application/json;q=0, bogus"));
        headers.append(ACCEPT, HeaderValue::from_static("*/*;q=0.1"));

        let accepted = parse_accept(&headers);
        let rendered = accepted.iter().map(|t| t.mime().essence_str().to_owned()).collect::<Vec<_>>();
        assert_eq!(rendered, ["text/html", "*/*"]);

        let accepted = parse_accept(&HeaderMap::new());
        assert_eq!(accepted, vec![MediaType::new(mime::STAR_STAR)]);
    }
}
