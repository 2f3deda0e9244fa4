//! Glob-style path patterns.
//!
//! Patterns are split on `/`. Each segment is either `**` (zero or more whole segments) or
//! a mix of literal text, `*` (zero or more characters), `?` (exactly one character) and
//! `{name}` (captures zero or more characters as a path variable).

use std::cmp::Ordering;

use crate::request::PathParams;

use super::RouterError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Star,
    Question,
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    DoubleStar,
    Parts(Vec<Part>),
}

#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
    vars: usize,
    single_wildcards: usize,
    double_wildcards: usize,
    length: usize,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, RouterError> {
        if !raw.starts_with('/') {
            return Err(RouterError::invalid_pattern(raw, "pattern must start with '/'"));
        }

        let mut segments = Vec::new();
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            if segment == "**" {
                segments.push(Segment::DoubleStar);
            } else {
                segments.push(Segment::Parts(parse_segment(raw, segment)?));
            }
        }

        let mut pattern = Self {
            raw: raw.to_owned(),
            trailing_slash: raw.len() > 1 && raw.ends_with('/'),
            segments,
            vars: 0,
            single_wildcards: 0,
            double_wildcards: 0,
            length: 0,
        };
        pattern.count();
        Ok(pattern)
    }

    fn count(&mut self) {
        let mut length = self.raw.len();
        for segment in &self.segments {
            match segment {
                Segment::DoubleStar => self.double_wildcards += 1,
                Segment::Parts(parts) => {
                    for part in parts {
                        match part {
                            Part::Star => self.single_wildcards += 1,
                            Part::Var(name) => {
                                self.vars += 1;
                                // "{name}" counts as a single character
                                length -= name.len() + 1;
                            }
                            Part::Literal(_) | Part::Question => {}
                        }
                    }
                }
            }
        }
        self.length = length;
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains no wildcard and no variable.
    pub fn is_literal(&self) -> bool {
        self.vars == 0
            && self.double_wildcards == 0
            && self.segments.iter().all(|segment| match segment {
                Segment::DoubleStar => false,
                Segment::Parts(parts) => parts.iter().all(|part| matches!(part, Part::Literal(_))),
            })
    }

    /// `/**` matches everything and ranks last.
    fn is_catch_all(&self) -> bool {
        self.raw == "/**"
    }

    fn is_prefix_pattern(&self) -> bool {
        self.raw.ends_with("/**")
    }

    fn total_count(&self) -> usize {
        self.vars + self.single_wildcards + 2 * self.double_wildcards
    }

    /// Matches `path`, returning the captured variables.
    ///
    /// With `trailing_slash` enabled, a pattern without a trailing slash also matches the
    /// path with one.
    pub fn matches(&self, path: &str, trailing_slash: bool) -> Option<PathParams> {
        if !path.starts_with('/') {
            return None;
        }
        let path_segments = path.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();
        let path_trailing = path.len() > 1 && path.ends_with('/');

        let ends_with_double_star = matches!(self.segments.last(), Some(Segment::DoubleStar));
        if !ends_with_double_star && path_trailing != self.trailing_slash {
            let tolerated = trailing_slash && path_trailing && !self.trailing_slash;
            if !tolerated {
                return None;
            }
        }

        let mut params = PathParams::empty();
        match_segments(&self.segments, &path_segments, &mut params).then_some(params)
    }

    /// Orders more specific patterns first for `path`.
    ///
    /// A pattern equal to the path wins, `/**` loses, patterns without `**` beat prefix
    /// patterns, then fewer wildcards, longer literal text, fewer `*` and fewer variables.
    pub fn compare_specificity(&self, other: &PathPattern, path: &str) -> Ordering {
        match (self.is_catch_all(), other.is_catch_all()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        match (self.raw == path, other.raw == path) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        if self.is_prefix_pattern() && other.double_wildcards == 0 {
            return Ordering::Greater;
        }
        if other.is_prefix_pattern() && self.double_wildcards == 0 {
            return Ordering::Less;
        }

        self.total_count()
            .cmp(&other.total_count())
            .then_with(|| other.length.cmp(&self.length))
            .then_with(|| self.single_wildcards.cmp(&other.single_wildcards))
            .then_with(|| self.vars.cmp(&other.vars))
    }
}

fn parse_segment(raw: &str, segment: &str) -> Result<Vec<Part>, RouterError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = segment.chars();

    while let Some(c) = chars.next() {
        match c {
            '*' | '?' | '{' if !literal.is_empty() => {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            _ => {}
        }
        match c {
            '*' => {
                if chars.clone().next() == Some('*') {
                    return Err(RouterError::invalid_pattern(raw, "'**' must be a whole segment"));
                }
                parts.push(Part::Star);
            }
            '?' => parts.push(Part::Question),
            '{' => {
                let name = chars.by_ref().take_while(|c| *c != '}').collect::<String>();
                if name.is_empty() || name.contains(['{', '/']) {
                    return Err(RouterError::invalid_pattern(raw, "malformed path variable"));
                }
                if !segment.contains('}') {
                    return Err(RouterError::invalid_pattern(raw, "unclosed path variable"));
                }
                parts.push(Part::Var(name));
            }
            '}' => return Err(RouterError::invalid_pattern(raw, "unopened path variable")),
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    Ok(parts)
}

fn match_segments(pattern: &[Segment], path: &[&str], params: &mut PathParams) -> bool {
    let Some((first, rest)) = pattern.split_first() else {
        return path.is_empty();
    };

    match first {
        Segment::DoubleStar => (0..=path.len()).any(|skip| {
            let mark = params.len();
            let matched = match_segments(rest, &path[skip..], params);
            if !matched {
                params.truncate(mark);
            }
            matched
        }),
        Segment::Parts(parts) => {
            let Some((segment, path_rest)) = path.split_first() else {
                return false;
            };
            let mark = params.len();
            if match_parts(parts, segment, params) && match_segments(rest, path_rest, params) {
                return true;
            }
            params.truncate(mark);
            false
        }
    }
}

fn match_parts(parts: &[Part], text: &str, params: &mut PathParams) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return text.is_empty();
    };

    match first {
        Part::Literal(literal) => {
            text.strip_prefix(literal.as_str()).is_some_and(|left| match_parts(rest, left, params))
        }
        Part::Question => {
            let mut chars = text.chars();
            chars.next().is_some() && match_parts(rest, chars.as_str(), params)
        }
        Part::Star | Part::Var(_) => {
            let boundaries = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()));
            for end in boundaries {
                let mark = params.len();
                if let Part::Var(name) = first {
                    params.push(name, &text[..end]);
                }
                if match_parts(rest, &text[end..], params) {
                    return true;
                }
                params.truncate(mark);
            }
            false
        }
    }
}
