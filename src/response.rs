//! The response-writing interface and the base writer behind every request.
//!
//! Handlers never build a response value. They write through the
//! [`ResponseWriter`] held by their [`Context`](crate::Context): set headers,
//! commit a status with [`write_header`](ResponseWriter::write_header), then
//! stream body bytes with [`write`](ResponseWriter::write). Middlewares that
//! need to observe or buffer output install a decorator over the current
//! writer (see [`crate::writer`]); everything speaks this one trait.
//!
//! The base writer, [`ResponseBuffer`], accumulates the whole response in
//! memory and is turned into an `http::Response` once the pipeline returns.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use tracing::warn;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Css,          // text/css; charset=utf-8
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Gif,          // image/gif
    Html,         // text/html; charset=utf-8
    Icon,         // image/x-icon
    JavaScript,   // text/javascript; charset=utf-8
    Jpeg,         // image/jpeg
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Png,          // image/png
    Svg,          // image/svg+xml
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css; charset=utf-8",
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Gif         => "image/gif",
            Self::Html        => "text/html; charset=utf-8",
            Self::Icon        => "image/x-icon",
            Self::JavaScript  => "text/javascript; charset=utf-8",
            Self::Jpeg        => "image/jpeg",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Png         => "image/png",
            Self::Svg         => "image/svg+xml",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }

    /// Looks up a file extension, with or without the leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Some(match ext.as_str() {
            "css"          => Self::Css,
            "csv"          => Self::Csv,
            "gif"          => Self::Gif,
            "htm" | "html" => Self::Html,
            "ico"          => Self::Icon,
            "js" | "mjs"   => Self::JavaScript,
            "jpg" | "jpeg" => Self::Jpeg,
            "json"         => Self::Json,
            "bin"          => Self::OctetStream,
            "pdf"          => Self::Pdf,
            "png"          => Self::Png,
            "svg"          => Self::Svg,
            "txt" | "text" => Self::Text,
            "xml"          => Self::Xml,
            _              => return None,
        })
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The interface handlers and middlewares write responses through.
///
/// Implemented by the base [`ResponseBuffer`] and by every decorator. A
/// decorator owns the writer it wraps and hands it back from
/// [`unwrap_layer`](ResponseWriter::unwrap_layer).
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the status line. Only the first call takes effect.
    fn write_header(&mut self, status: StatusCode);

    /// Appends body bytes, committing `200 OK` first if no status was set.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// The committed status, `None` until `write_header` or the first `write`.
    fn status(&self) -> Option<StatusCode>;

    fn header_written(&self) -> bool {
        self.status().is_some()
    }

    /// Body bytes accepted so far.
    fn bytes_written(&self) -> usize;

    /// Peels this decorator off. The base writer has nothing beneath it and
    /// returns itself as `Err`.
    fn unwrap_layer(self: Box<Self>) -> Result<Box<dyn ResponseWriter>, Box<dyn ResponseWriter>>;

    /// Consumes the writer stack and produces the final response.
    fn finish(self: Box<Self>) -> http::Response<Bytes>;
}

// ── ResponseBuffer ────────────────────────────────────────────────────────────

/// The base writer: collects status, headers, and body in memory.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl ResponseWriter for ResponseBuffer {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(committed) => {
                warn!(%committed, ignored = %status, "superfluous write_header call");
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn bytes_written(&self) -> usize {
        self.body.len()
    }

    fn unwrap_layer(self: Box<Self>) -> Result<Box<dyn ResponseWriter>, Box<dyn ResponseWriter>> {
        Err(self)
    }

    fn finish(self: Box<Self>) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body.freeze());
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

/// Placeholder that occupies a context's writer slot while layers are swapped.
#[derive(Debug, Default)]
pub(crate) struct Detached {
    headers: HeaderMap,
}

impl ResponseWriter for Detached {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, _status: StatusCode) {}

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "response writer detached"))
    }

    fn status(&self) -> Option<StatusCode> {
        None
    }

    fn bytes_written(&self) -> usize {
        0
    }

    fn unwrap_layer(self: Box<Self>) -> Result<Box<dyn ResponseWriter>, Box<dyn ResponseWriter>> {
        Err(self)
    }

    fn finish(self: Box<Self>) -> http::Response<Bytes> {
        let mut response = http::Response::new(Bytes::new());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_defaults_status_to_ok() {
        let mut w = Box::new(ResponseBuffer::new());
        w.write(b"hello").unwrap();
        assert_eq!(w.status(), Some(StatusCode::OK));
        let response = w.finish();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"hello");
    }

    #[test]
    fn first_write_header_wins() {
        let mut w = ResponseBuffer::new();
        w.write_header(StatusCode::CREATED);
        w.write_header(StatusCode::BAD_REQUEST);
        assert_eq!(w.status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn headers_set_before_commit_survive() {
        let mut w = Box::new(ResponseBuffer::new());
        w.headers_mut().insert("x-a", "1".parse().unwrap());
        w.write_header(StatusCode::ACCEPTED);
        let response = w.finish();
        assert_eq!(response.headers()["x-a"], "1");
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(ContentType::from_extension(".PNG"), Some(ContentType::Png));
        assert_eq!(ContentType::from_extension("json"), Some(ContentType::Json));
        assert_eq!(ContentType::from_extension("weird"), None);
    }
}
