//! Per-request state handed to every handler and middleware.
//!
//! A [`Context`] bundles the [`Request`], the current [`ResponseWriter`], the
//! path parameters captured by the router, and a string-keyed store that
//! middlewares use to pass values downstream (a request id, an error message
//! for the access log, an authenticated user).
//!
//! It is created on dispatch and dropped when the response is finished. It is
//! not shared between threads; a middleware that spawns background work must
//! copy out what it needs.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue, IntoHeaderName};
use http::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use crate::cookie::Cookie;
use crate::error::Error;
use crate::request::Request;
use crate::response::{ContentType, Detached, ResponseWriter};
use crate::writer::WriterScope;

/// Key under which handlers record an error message for the access log.
pub const ERROR_KEY: &str = "error";

pub struct Context {
    pub(crate) request: Request,
    pub(crate) writer: Box<dyn ResponseWriter>,
    pub(crate) params: HashMap<String, String>,
    keys: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new(request: Request, writer: Box<dyn ResponseWriter>) -> Self {
        Self { request, writer, params: HashMap::new(), keys: HashMap::new() }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn writer(&self) -> &dyn ResponseWriter {
        self.writer.as_ref()
    }

    pub fn writer_mut(&mut self) -> &mut dyn ResponseWriter {
        self.writer.as_mut()
    }

    /// Installs a decorator over the current writer for the lifetime of the
    /// returned scope. Dropping the scope, including during unwinding, peels
    /// the decorator off again.
    pub fn wrap_writer<F>(&mut self, wrap: F) -> WriterScope<'_>
    where
        F: FnOnce(Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>,
    {
        let inner = std::mem::replace(&mut self.writer, Box::new(Detached::default()));
        self.writer = wrap(inner);
        WriterScope::new(self)
    }

    pub(crate) fn pop_writer(&mut self) {
        let current = std::mem::replace(&mut self.writer, Box::new(Detached::default()));
        self.writer = match current.unwrap_layer() {
            Ok(inner) => inner,
            Err(base) => {
                warn!("attempted to unwrap the base response writer");
                base
            }
        };
    }

    /// Consumes the context and produces the final response.
    pub fn finish(self) -> http::Response<Bytes> {
        self.writer.finish()
    }

    // ── Request side ──────────────────────────────────────────────────────────

    pub fn method(&self) -> &http::Method {
        &self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `c.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// First value of a query-string parameter.
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.request.query_string()?;
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .ok()?
            .into_iter()
            .find_map(|(k, v)| (k == name).then_some(v))
    }

    /// Deserializes the query string into `T`.
    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_urlencoded::from_str(self.request.query_string().unwrap_or(""))?)
    }

    /// A form value: the urlencoded body is consulted first, then the query.
    pub fn form(&self, name: &str) -> Option<String> {
        if self.is("application/x-www-form-urlencoded") {
            let found = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&self.request.body)
                .ok()
                .and_then(|pairs| pairs.into_iter().find_map(|(k, v)| (k == name).then_some(v)));
            if found.is_some() {
                return found;
            }
        }
        self.query(name)
    }

    /// Deserializes an `application/x-www-form-urlencoded` body into `T`.
    pub fn bind_form<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.is("application/x-www-form-urlencoded") {
            return Err(Error::UnsupportedMediaType { expected: "application/x-www-form-urlencoded" });
        }
        Ok(serde_urlencoded::from_bytes(&self.request.body)?)
    }

    /// Deserializes an `application/json` body into `T`.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.is("application/json") {
            return Err(Error::UnsupportedMediaType { expected: "application/json" });
        }
        Ok(serde_json::from_slice(&self.request.body)?)
    }

    pub fn body(&self) -> &Bytes {
        &self.request.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    /// The client address.
    ///
    /// Trusts `X-Forwarded-For` and `X-Real-IP`. Only meaningful behind a
    /// proxy that sets them; otherwise clients can spoof their address.
    pub fn remote_ip(&self) -> String {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').next().map(str::trim).filter(|s| !s.is_empty()) {
                return first.to_owned();
            }
        }
        if let Some(real) = self.header("x-real-ip").filter(|s| !s.is_empty()) {
            return real.to_owned();
        }
        self.request.remote_addr.map(|a| a.ip().to_string()).unwrap_or_default()
    }

    /// `http` or `https`.
    pub fn protocol(&self) -> &'static str {
        if self.request.tls { "https" } else { "http" }
    }

    /// The `Host` the client addressed.
    pub fn hostname(&self) -> &str {
        self.header("host").unwrap_or("")
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol(), self.hostname())
    }

    /// Protocol version as it appears on the request line, e.g. `HTTP/1.1`.
    pub fn proto(&self) -> String {
        format!("{:?}", self.request.version)
    }

    /// Whether the request's `Content-Type` matches `ext`, which may be a file
    /// extension (`json`, `.html`) or a full MIME type.
    pub fn is(&self, ext: &str) -> bool {
        let Some(content_type) = self.header("content-type") else {
            return false;
        };
        let Ok(actual) = content_type.parse::<mime::Mime>() else {
            return false;
        };
        let wanted = match ContentType::from_extension(ext) {
            Some(known) => known.as_str(),
            None => ext.trim_start_matches('.'),
        };
        match wanted.parse::<mime::Mime>() {
            Ok(wanted) => actual.essence_str() == wanted.essence_str(),
            Err(_) => false,
        }
    }

    /// Value of the named request cookie.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.request
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find_map(|(k, v)| (k == name).then_some(v))
    }

    // ── User store ────────────────────────────────────────────────────────────

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.keys.insert(key.into(), Box::new(value));
    }

    /// Typed read from the user store. `None` if absent or of another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.keys.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.keys.remove(key).is_some()
    }

    /// Records a message under [`ERROR_KEY`] for the access log.
    pub fn set_error(&mut self, err: impl fmt::Display) {
        self.set(ERROR_KEY, err.to_string());
    }

    pub fn error_message(&self) -> Option<&str> {
        self.get::<String>(ERROR_KEY).map(String::as_str)
    }

    // ── Response side ─────────────────────────────────────────────────────────

    /// Sets a response header, replacing earlier values.
    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.writer.headers_mut().insert(name, value);
            }
            Err(_) => warn!(value, "dropping response header with an invalid value"),
        }
    }

    /// Adds a response header value alongside existing ones.
    pub fn append_header<K: IntoHeaderName>(&mut self, name: K, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.writer.headers_mut().append(name, value);
            }
            Err(_) => warn!(value, "dropping response header with an invalid value"),
        }
    }

    /// Commits the status line without a body.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.writer.write_header(status);
        self
    }

    /// Writes raw body bytes, logging rather than returning write failures.
    pub fn write(&mut self, body: &[u8]) {
        if let Err(e) = self.writer.write(body) {
            error!(path = %self.request.path, "could not write response body: {e}");
        }
    }

    /// `text/plain` response.
    pub fn text(&mut self, status: StatusCode, body: &str) {
        self.data(status, ContentType::Text.as_str(), body.as_bytes());
    }

    /// `text/html` response.
    pub fn html(&mut self, status: StatusCode, body: &str) {
        self.data(status, ContentType::Html.as_str(), body.as_bytes());
    }

    /// `application/json` response, newline-terminated.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> Result<(), Error> {
        let mut body = serde_json::to_vec(value)?;
        body.push(b'\n');
        self.data(status, ContentType::Json.as_str(), &body);
        Ok(())
    }

    /// Response with an explicit content type.
    pub fn data(&mut self, status: StatusCode, content_type: &str, body: &[u8]) {
        self.set_header(header::CONTENT_TYPE, content_type);
        self.writer.write_header(status);
        self.write(body);
    }

    pub fn redirect(&mut self, status: StatusCode, location: &str) {
        self.set_header(header::LOCATION, location);
        self.writer.write_header(status);
    }

    pub fn location(&mut self, path: &str) {
        self.set_header(header::LOCATION, path);
    }

    pub fn set_cookie(&mut self, cookie: &Cookie) {
        self.append_header(header::SET_COOKIE, &cookie.to_string());
    }

    /// Instructs the client to drop the named cookie.
    pub fn clear_cookie(&mut self, name: &str) {
        self.set_cookie(&Cookie::new(name, "").path("/").max_age(0));
    }

    /// Marks the response as a download, optionally naming the file.
    pub fn attachment(&mut self, filename: Option<&str>) {
        let disposition = match filename {
            // Only the final path component, so callers cannot leak directory names.
            Some(name) => {
                let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
                format!("attachment; filename=\"{base}\"")
            }
            None => "attachment".to_owned(),
        };
        self.set_header(header::CONTENT_DISPOSITION, &disposition);
    }

    /// Sets `Content-Type` from a file extension. Unknown extensions are ignored.
    pub fn content_type(&mut self, ext: &str) -> &mut Self {
        if let Some(ct) = ContentType::from_extension(ext) {
            self.set_header(header::CONTENT_TYPE, ct.as_str());
        }
        self
    }

    pub fn vary(&mut self, fields: &[&str]) {
        for field in fields {
            self.append_header(header::VARY, field);
        }
    }

    /// Logs `err`, records it for the access log, and answers `500`.
    pub fn error(&mut self, err: impl fmt::Display) {
        error!(path = %self.request.path, "handler error: {err}");
        self.set_error(&err);
        self.text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    }

    /// Parses a header name known only at runtime (from configuration).
    pub(crate) fn header_name(name: &str) -> Option<HeaderName> {
        HeaderName::from_bytes(name.as_bytes()).ok()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("params", &self.params)
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
