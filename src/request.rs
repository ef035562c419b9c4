//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Version};

/// An incoming HTTP request with its body fully read.
///
/// The path is stored apart from the query so a mounted sub-application can
/// see its own view of the path while the query stays untouched.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) tls: bool,
}

impl Request {
    /// Builds a request from `http` parts and an already-collected body.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let path = match parts.uri.path() {
            "" => "/".to_owned(),
            p => p.to_owned(),
        };
        Self {
            method: parts.method,
            path,
            query: parts.uri.query().map(str::to_owned),
            version: parts.version,
            headers: parts.headers,
            body,
            remote_addr: None,
            tls: parts.uri.scheme() == Some(&http::uri::Scheme::HTTPS),
        }
    }

    /// Convenience for tests and embedding: `http::Request<Bytes>` in, `Request` out.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Marks the request as having arrived over TLS.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query_string(&self) -> Option<&str> { self.query.as_deref() }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn is_tls(&self) -> bool { self.tls }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Path plus query string, as it appeared on the request line.
    pub fn request_uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    /// Swaps the routed path, returning the previous one.
    pub(crate) fn replace_path(&mut self, path: String) -> String {
        std::mem::replace(&mut self.path, path)
    }
}
