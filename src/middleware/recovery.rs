//! Panic recovery.
//!
//! Catches a panic unwinding out of the downstream handler, logs it, and
//! answers `500` with `{"error":"Internal Server Error"}` unless a status was
//! already committed. The panic does not propagate further, so the connection
//! stays usable.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{AssertUnwindSafe, catch_unwind};

use http::StatusCode;
use http::header::CONTENT_TYPE;
use tracing::error;

use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;
use crate::response::ContentType;

const BODY: &[u8] = b"{\"error\":\"Internal Server Error\"}\n";

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    /// Capture and log a backtrace with each recovered panic.
    pub stack_trace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { skip: None, stack_trace: true }
    }
}

pub fn new(config: Config) -> Middleware {
    middleware_fn(move |next| {
        let config = config.clone();
        handler_fn(move |c| {
            if skipped(&config.skip, c) {
                return next(c);
            }

            // The context is only inspected after a panic to decide whether a
            // 500 can still be written; a half-written response is acceptable.
            let Err(payload) = catch_unwind(AssertUnwindSafe(|| next(c))) else {
                return;
            };

            let message = panic_message(payload.as_ref());
            if config.stack_trace {
                let backtrace = Backtrace::force_capture();
                error!(method = %c.method(), path = %c.path(), "panic recovered: {message}\n{backtrace}");
            } else {
                error!(method = %c.method(), path = %c.path(), "panic recovered: {message}");
            }
            c.set_error(format!("panic: {message}"));

            if !c.writer().header_written() {
                c.set_header(CONTENT_TYPE, ContentType::Json.as_str());
                c.status(StatusCode::INTERNAL_SERVER_ERROR).write(BODY);
            }
        })
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{compose, handler_fn};
    use crate::testing::{body_text, context, get};

    #[test]
    fn converts_panic_into_500_json() {
        let handler = compose(&[new(Config { stack_trace: false, ..Config::default() })], handler_fn(|_| panic!("kaboom")));
        let mut c = context(get("/boom"));
        handler(&mut c);

        assert_eq!(c.error_message(), Some("panic: kaboom"));
        let response = c.finish();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(body_text(&response), "{\"error\":\"Internal Server Error\"}\n");
    }

    #[test]
    fn committed_response_is_left_alone() {
        let handler = compose(
            &[new(Config::default())],
            handler_fn(|c| {
                c.text(StatusCode::ACCEPTED, "partial");
                panic!("late failure");
            }),
        );
        let mut c = context(get("/"));
        handler(&mut c);
        let response = c.finish();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_text(&response), "partial");
    }

    #[test]
    fn non_panicking_requests_pass_through() {
        let handler = compose(&[new(Config::default())], handler_fn(|c| c.text(StatusCode::OK, "fine")));
        let mut c = context(get("/"));
        handler(&mut c);
        assert_eq!(body_text(&c.finish()), "fine");
    }

    #[test]
    fn formats_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "non-string panic payload");
    }
}
