//! Security response headers.
//!
//! `Strict-Transport-Security` is only sent over TLS and only when
//! `hsts_max_age` is positive. An empty string disables the other headers.

use http::header::{STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION};

use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    pub xss_protection: String,
    pub content_type_nosniff: String,
    pub frame_options: String,
    /// Seconds. Zero disables HSTS.
    pub hsts_max_age: u64,
    pub hsts_include_subdomains: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip: None,
            xss_protection: "1; mode=block".to_owned(),
            content_type_nosniff: "nosniff".to_owned(),
            frame_options: "SAMEORIGIN".to_owned(),
            hsts_max_age: 0,
            hsts_include_subdomains: false,
        }
    }
}

pub fn new(config: Config) -> Middleware {
    let hsts = (config.hsts_max_age > 0).then(|| {
        let subdomains = if config.hsts_include_subdomains { "; includeSubdomains" } else { "" };
        format!("max-age={}{subdomains}", config.hsts_max_age)
    });

    middleware_fn(move |next| {
        let config = config.clone();
        let hsts = hsts.clone();
        handler_fn(move |c| {
            if skipped(&config.skip, c) {
                return next(c);
            }
            if !config.xss_protection.is_empty() {
                c.set_header(X_XSS_PROTECTION, &config.xss_protection);
            }
            if !config.content_type_nosniff.is_empty() {
                c.set_header(X_CONTENT_TYPE_OPTIONS, &config.content_type_nosniff);
            }
            if !config.frame_options.is_empty() {
                c.set_header(X_FRAME_OPTIONS, &config.frame_options);
            }
            if let Some(hsts) = hsts.as_deref().filter(|_| c.request().is_tls()) {
                c.set_header(STRICT_TRANSPORT_SECURITY, hsts);
            }
            next(c);
        })
    })
}
