//! Double-submit CSRF protection.
//!
//! Safe methods (`GET`, `HEAD`, `OPTIONS`) receive a fresh token both as a
//! cookie and as a response header. Any other method must send the token back
//! in the header, and it must match the cookie.

use http::{Method, StatusCode};
use tracing::warn;

use crate::context::Context;
use crate::cookie::{Cookie, SameSite};
use crate::encoding::{base64_encode, constant_time_eq, random_bytes};
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

pub const TOKEN_HEADER: &str = "x-csrf-token";
pub const TOKEN_COOKIE: &str = "csrf-token";

const TOKEN_BYTES: usize = 32;

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    pub cookie_name: String,
    pub header_name: String,
    /// Cookie lifetime in seconds.
    pub max_age: i64,
    /// Only disable outside production.
    pub secure_cookie: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip: None,
            cookie_name: TOKEN_COOKIE.to_owned(),
            header_name: TOKEN_HEADER.to_owned(),
            max_age: 12 * 60 * 60,
            secure_cookie: true,
        }
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Why an unsafe request was refused. The text is sent as the `403` body.
fn rejection(config: &Config, c: &Context) -> Option<&'static str> {
    let Some(sent) = c.header(&config.header_name).filter(|t| !t.is_empty()) else {
        return Some("missing CSRF token in request header");
    };
    let Some(expected) = c.cookie(&config.cookie_name) else {
        return Some("Missing CSRF cookie");
    };
    if !constant_time_eq(sent.as_bytes(), expected.as_bytes()) {
        return Some("Invalid CSRF token");
    }
    None
}

pub fn new(config: Config) -> Middleware {
    middleware_fn(move |next| {
        let config = config.clone();
        handler_fn(move |c| {
            if skipped(&config.skip, c) {
                return next(c);
            }

            if is_safe(c.method()) {
                let token = base64_encode(&random_bytes(TOKEN_BYTES));
                let cookie = Cookie::new(&config.cookie_name, &token)
                    .path("/")
                    .max_age(config.max_age)
                    .secure(config.secure_cookie)
                    .http_only(true)
                    .same_site(SameSite::Strict);
                c.set_cookie(&cookie);
                match Context::header_name(&config.header_name) {
                    Some(name) => c.set_header(name, &token),
                    None => warn!(header = %config.header_name, "invalid CSRF header name"),
                }
                return next(c);
            }

            if let Some(reason) = rejection(&config, c) {
                warn!(method = %c.method(), path = %c.path(), "CSRF validation failed: {reason}");
                c.text(StatusCode::FORBIDDEN, reason);
                return;
            }
            next(c);
        })
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::handler::compose;
    use crate::testing::{body_text, context, get, request};

    fn run(req: http::Request<Bytes>) -> http::Response<Bytes> {
        let mut c = context(req);
        compose(&[new(Config::default())], handler_fn(|c| c.text(StatusCode::OK, "done")))(&mut c);
        c.finish()
    }

    fn post(header: Option<&str>, cookie: Option<&str>) -> http::Request<Bytes> {
        let mut builder = request("POST", "/submit");
        if let Some(token) = header {
            builder = builder.header("x-csrf-token", token);
        }
        if let Some(token) = cookie {
            builder = builder.header("cookie", format!("theme=dark; csrf-token={token}"));
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[test]
    fn safe_methods_receive_a_token() {
        let response = run(get("/form"));
        assert_eq!(response.status(), StatusCode::OK);
        let token = response.headers()["x-csrf-token"].to_str().unwrap().to_owned();
        assert_eq!(token.len(), 44);

        let cookie = response.headers()["set-cookie"].to_str().unwrap();
        assert!(cookie.starts_with(&format!("csrf-token={token}; Path=/; Max-Age=43200")));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
    }

    #[test]
    fn tokens_are_fresh_per_request() {
        let a = run(get("/"));
        let b = run(get("/"));
        assert_ne!(a.headers()["x-csrf-token"], b.headers()["x-csrf-token"]);
    }

    #[test]
    fn matching_token_passes() {
        let response = run(post(Some("abc+/="), Some("abc+/=")));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(&response), "done");
    }

    #[test]
    fn unsafe_requests_are_refused_with_a_reason() {
        let cases = [
            (post(None, Some("abc")), "missing CSRF token in request header"),
            (post(Some("abc"), None), "Missing CSRF cookie"),
            (post(Some("abc"), Some("abd")), "Invalid CSRF token"),
        ];
        for (req, reason) in cases {
            let response = run(req);
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(body_text(&response), reason);
        }
    }
}
