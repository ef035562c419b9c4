//! Route pattern parsing.
//!
//! A pattern is split on `/` into segments, each classified by its first
//! character:
//!
//! ```text
//! /users/:id/files/*path
//!  ^^^^^ ^^^ ^^^^^ ^^^^^
//!  |     |   |     wildcard: binds the remaining segments joined by `/`
//!  |     |   static
//!  |     parameter: binds exactly one non-empty segment
//!  static
//! ```
//!
//! Empty segments from leading, trailing, or doubled slashes are dropped. With
//! strict routing a trailing slash is significant and is kept as one trailing
//! empty static segment, so `/foo` and `/foo/` land on different trie nodes.

use std::borrow::Cow;

use crate::encoding::hex_digit;
use crate::error::Error;

/// One classified piece of a route pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    Static(String),
    Param(String),
    Wildcard(String),
}

impl Segment {
    fn classify(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix(':') {
            Self::Param(name.to_owned())
        } else if let Some(name) = raw.strip_prefix('*') {
            Self::Wildcard(name.to_owned())
        } else {
            Self::Static(raw.to_owned())
        }
    }
}

/// A compiled route pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compiles `raw` into segments, rejecting anything outside the grammar:
    ///
    /// ```text
    /// path     := "/" | ("/" segment)+ ["/"]
    /// segment  := literal | ":" name | "*" name     ; "*" only as last segment
    /// name     := [A-Za-z_][A-Za-z0-9_]*
    /// ```
    pub fn parse(raw: &str, strict: bool) -> Result<Self, Error> {
        if !raw.starts_with('/') {
            return Err(Error::pattern(raw, "must start with `/`"));
        }

        let pieces = split(raw, strict);
        let mut segments = Vec::with_capacity(pieces.len());
        let mut names: Vec<&str> = Vec::new();

        for (i, piece) in pieces.iter().enumerate() {
            let segment = Segment::classify(piece);
            match &segment {
                Segment::Static(_) => {}
                Segment::Param(name) | Segment::Wildcard(name) => {
                    if !is_valid_name(name) {
                        return Err(Error::pattern(raw, format!("invalid placeholder name in `{piece}`")));
                    }
                    if names.contains(&&piece[1..]) {
                        return Err(Error::pattern(raw, format!("placeholder `{name}` appears twice")));
                    }
                    names.push(&piece[1..]);
                    if matches!(segment, Segment::Wildcard(_)) && i + 1 != pieces.len() {
                        return Err(Error::pattern(raw, "a wildcard must be the last segment"));
                    }
                }
            }
            segments.push(segment);
        }

        Ok(Self { raw: raw.to_owned(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of parameter and wildcard segments, in declaration order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) | Segment::Wildcard(name) => Some(name.as_str()),
            Segment::Static(_) => None,
        })
    }
}

/// Splits a pattern or request path into non-empty segments.
///
/// Under `strict` a trailing slash after at least one segment yields a final
/// empty segment.
pub fn split(path: &str, strict: bool) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if strict && path.len() > 1 && path.ends_with('/') && !parts.is_empty() {
        parts.push("");
    }
    parts
}

/// Percent-decodes one path segment.
///
/// `+` stays literal, as it does in paths. A malformed escape or a result that
/// is not UTF-8 leaves the segment as it arrived.
pub(crate) fn decode_segment(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3).and_then(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?));
            match escape {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                None => return Cow::Borrowed(raw),
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).map_or(Cow::Borrowed(raw), Cow::Owned)
}

/// Joins a prefix and a path without doubling or losing the separator.
pub(crate) fn join(prefix: &str, path: &str) -> String {
    match (prefix.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{prefix}{}", &path[1..]),
        (false, false) if !path.is_empty() => format!("{prefix}/{path}"),
        _ => format!("{prefix}{path}"),
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
