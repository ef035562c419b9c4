//! Redirects plain-HTTP requests to their `https://` equivalent.
//!
//! Behind a TLS-terminating proxy the `X-Forwarded-Proto` header decides;
//! without one the connection itself must be TLS.

use http::StatusCode;

use crate::context::Context;
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    pub status: StatusCode,
}

impl Default for Config {
    fn default() -> Self {
        Self { skip: None, status: StatusCode::MOVED_PERMANENTLY }
    }
}

fn is_insecure(c: &Context) -> bool {
    match c.header("x-forwarded-proto") {
        Some(proto) => proto.eq_ignore_ascii_case("http"),
        None => !c.request().is_tls(),
    }
}

pub fn new(config: Config) -> Middleware {
    middleware_fn(move |next| {
        let config = config.clone();
        handler_fn(move |c| {
            if skipped(&config.skip, c) || !is_insecure(c) {
                return next(c);
            }
            let target = format!("https://{}{}", c.hostname(), c.request().request_uri());
            c.redirect(config.status, &target);
        })
    })
}
