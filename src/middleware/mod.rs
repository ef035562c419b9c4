//! Built-in middlewares.
//!
//! Each middleware lives in its own module with a `Config` struct (whose
//! `Default` carries the documented defaults) and a `new` constructor that
//! returns a [`Middleware`](crate::Middleware). Every config has an optional
//! `skip` predicate; when it returns `true` the request bypasses the
//! middleware untouched.
//!
//! | Module | Does |
//! |---|---|
//! | [`recovery`] | turns handler panics into `500` responses |
//! | [`logger`] | one access-log line per request |
//! | [`cache`] | replays `GET` responses for a TTL |
//! | [`limiter`] | fixed-window rate limiting per client |
//! | [`cors`] | CORS headers and preflight answers |
//! | [`request_id`] | ensures every request carries an id |
//! | [`secure`] | common security headers |
//! | [`basic_auth`] | HTTP Basic authentication |
//! | [`csrf`] | double-submit CSRF tokens |
//! | [`health`] | liveness and readiness probes |
//! | [`tls_redirect`] | redirects plain HTTP to HTTPS |
//! | [`favicon`] | serves `/favicon.ico` |
//! | [`envvar`] | exposes selected environment variables as JSON |
//! | [`secure_cookie`] | AES-256-GCM encrypted session cookies |
//! | [`expvar`] | runtime variables and request counters as JSON |
//!
//! Register recovery first so it wraps everything else:
//!
//! ```
//! use kite::App;
//! use kite::middleware::{logger, recovery, request_id};
//!
//! let mut app = App::new();
//! app.use_middleware(recovery::new(recovery::Config::default()))
//!     .use_middleware(request_id::new(request_id::Config::default()))
//!     .use_middleware(logger::new(logger::Config::default()));
//! ```

pub mod basic_auth;
pub mod cache;
pub mod cors;
pub mod csrf;
pub mod envvar;
pub mod expvar;
pub mod favicon;
pub mod health;
pub mod limiter;
pub mod logger;
pub mod recovery;
pub mod request_id;
pub mod secure;
pub mod secure_cookie;
pub mod tls_redirect;

use crate::context::Context;
use crate::handler::Skipper;

/// Whether `skip` asks to bypass the middleware for this request.
pub(crate) fn skipped(skip: &Option<Skipper>, c: &Context) -> bool {
    skip.as_ref().is_some_and(|skip| skip(c))
}
