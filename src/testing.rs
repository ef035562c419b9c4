//! Fixtures shared by the unit tests.

use bytes::Bytes;

use crate::context::Context;
use crate::request::Request;
use crate::response::ResponseBuffer;

pub(crate) fn request(method: &str, uri: &str) -> http::request::Builder {
    http::Request::builder().method(method).uri(uri)
}

pub(crate) fn get(uri: &str) -> http::Request<Bytes> {
    http::Request::get(uri).body(Bytes::new()).unwrap()
}

pub(crate) fn context(req: http::Request<Bytes>) -> Context {
    Context::new(Request::from_http(req), Box::new(ResponseBuffer::new()))
}

pub(crate) fn body_text(response: &http::Response<Bytes>) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}
