//! HTTP method as a typed enum.
//!
//! Covers RFC 9110 standard methods, WebDAV extensions (RFC 4918 / 4791 / 3253 / 5323),
//! and `PURGE` used by nginx and Varnish for cache invalidation.
//!
//! Routes register against a [`RouteMethod`]: either one concrete method or
//! [`RouteMethod::All`], the fallback tree consulted when the method's own tree
//! has no match. Requests carrying a method outside this list can only ever
//! reach `ALL` routes.

use std::fmt;
use std::str::FromStr;

/// A known HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    // RFC 9110 ─────────────────────────────────────────────────────────────────
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
    // WebDAV RFC 4918 ──────────────────────────────────────────────────────────
    Copy,
    Lock,
    Mkcol,
    Move,
    Propfind,
    Proppatch,
    Unlock,
    // WebDAV extensions ────────────────────────────────────────────────────────
    Mkcalendar, // RFC 4791, CalDAV
    Report,     // RFC 3253
    Search,     // RFC 5323
    // Cache invalidation ───────────────────────────────────────────────────────
    Purge, // nginx / Varnish
}

/// Wire names, in the order routing trees are listed.
const NAMES: [(Method, &str); 20] = [
    (Method::Get, "GET"),
    (Method::Head, "HEAD"),
    (Method::Post, "POST"),
    (Method::Put, "PUT"),
    (Method::Delete, "DELETE"),
    (Method::Patch, "PATCH"),
    (Method::Options, "OPTIONS"),
    (Method::Connect, "CONNECT"),
    (Method::Trace, "TRACE"),
    (Method::Copy, "COPY"),
    (Method::Lock, "LOCK"),
    (Method::Mkcol, "MKCOL"),
    (Method::Move, "MOVE"),
    (Method::Propfind, "PROPFIND"),
    (Method::Proppatch, "PROPPATCH"),
    (Method::Unlock, "UNLOCK"),
    (Method::Mkcalendar, "MKCALENDAR"),
    (Method::Report, "REPORT"),
    (Method::Search, "SEARCH"),
    (Method::Purge, "PURGE"),
];

impl Method {
    pub fn as_str(self) -> &'static str {
        NAMES.iter().find(|(m, _)| *m == self).map_or("", |(_, name)| name)
    }

    /// Maps a request method onto the enum. `None` for extension methods.
    pub fn from_http(method: &http::Method) -> Option<Self> {
        method.as_str().parse().ok()
    }
}

/// Case-sensitive, as method tokens are (RFC 9110 section 9.1).
impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NAMES.iter().find(|(_, name)| *name == s).map(|(m, _)| *m).ok_or(UnknownMethod)
    }
}

/// Returned when a string names no [`Method`] variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnknownMethod;

impl fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown method")
    }
}

impl std::error::Error for UnknownMethod {}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The method a route is registered under.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RouteMethod {
    Exact(Method),
    /// Matches any request method whose own tree produced no match.
    All,
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        Self::Exact(method)
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(method) => f.write_str(method.as_str()),
            Self::All => f.write_str("ALL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods_case_sensitively() {
        assert_eq!("GET".parse::<Method>(), Ok(Method::Get));
        assert_eq!("PURGE".parse::<Method>(), Ok(Method::Purge));
        assert!("get".parse::<Method>().is_err());
    }

    #[test]
    fn every_variant_round_trips_its_name() {
        for (method, name) in NAMES {
            assert_eq!(method.as_str(), name);
            assert_eq!(name.parse::<Method>(), Ok(method));
        }
    }

    #[test]
    fn extension_methods_have_no_tree() {
        let custom = http::Method::from_bytes(b"BREW").unwrap();
        assert_eq!(Method::from_http(&custom), None);
        assert_eq!(Method::from_http(&http::Method::PATCH), Some(Method::Patch));
    }

    #[test]
    fn all_sentinel_displays_uppercase() {
        assert_eq!(RouteMethod::All.to_string(), "ALL");
        assert_eq!(RouteMethod::from(Method::Delete).to_string(), "DELETE");
    }
}
