//! Cross-origin resource sharing.
//!
//! Requests without an `Origin` header pass straight through. For an allowed
//! origin the response echoes it in `Access-Control-Allow-Origin`. An
//! `OPTIONS` request with an `Origin` is treated as a preflight: it is answered
//! here with `204` and never reaches the route.

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, ORIGIN,
};
use http::{Method, StatusCode};

use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    /// `["*"]` allows every origin.
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    pub expose_headers: Vec<String>,
    /// Preflight cache lifetime in seconds. Zero omits the header.
    pub max_age: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip: None,
            allow_origins: vec!["*".to_owned()],
            allow_methods: ["GET", "POST", "HEAD", "PUT", "DELETE", "PATCH"].map(str::to_owned).to_vec(),
            allow_headers: Vec::new(),
            allow_credentials: false,
            expose_headers: Vec::new(),
            max_age: 0,
        }
    }
}

/// Header values joined once at construction.
#[derive(Clone)]
struct Prepared {
    skip: Option<Skipper>,
    any_origin: bool,
    origins: Vec<String>,
    credentials: bool,
    methods: String,
    headers: String,
    expose: String,
    max_age: Option<String>,
}

impl Prepared {
    fn allows(&self, origin: &str) -> bool {
        self.any_origin || self.origins.iter().any(|o| o == origin)
    }
}

pub fn new(config: Config) -> Middleware {
    let prepared = Prepared {
        any_origin: config.allow_origins.is_empty() || config.allow_origins.iter().any(|o| o == "*"),
        origins: config.allow_origins,
        credentials: config.allow_credentials,
        methods: config.allow_methods.join(","),
        headers: config.allow_headers.join(","),
        expose: config.expose_headers.join(","),
        max_age: (config.max_age > 0).then(|| config.max_age.to_string()),
        skip: config.skip,
    };

    middleware_fn(move |next| {
        let cfg = prepared.clone();
        handler_fn(move |c| {
            if skipped(&cfg.skip, c) {
                return next(c);
            }
            let Some(origin) = c.request().headers().get(ORIGIN).and_then(|v| v.to_str().ok()).map(str::to_owned)
            else {
                return next(c);
            };

            let allowed = cfg.allows(&origin);
            if allowed {
                c.vary(&["Origin"]);
                c.set_header(ACCESS_CONTROL_ALLOW_ORIGIN, &origin);
                if cfg.credentials {
                    c.set_header(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
                }
            }

            if *c.method() != Method::OPTIONS {
                return next(c);
            }

            c.vary(&["Access-Control-Request-Method", "Access-Control-Request-Headers"]);
            if allowed {
                c.set_header(ACCESS_CONTROL_ALLOW_METHODS, &cfg.methods);
                if !cfg.headers.is_empty() {
                    c.set_header(ACCESS_CONTROL_ALLOW_HEADERS, &cfg.headers);
                }
                if !cfg.expose.is_empty() {
                    c.set_header(ACCESS_CONTROL_EXPOSE_HEADERS, &cfg.expose);
                }
                if let Some(max_age) = &cfg.max_age {
                    c.set_header(ACCESS_CONTROL_MAX_AGE, max_age);
                }
            }
            c.status(StatusCode::NO_CONTENT);
        })
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::handler::compose;
    use crate::testing::{context, get, request};

    fn run(config: Config, req: http::Request<Bytes>) -> (bool, http::Response<Bytes>) {
        let reached = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&reached);
        let handler = handler_fn(move |c| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            c.text(StatusCode::OK, "route");
        });
        let mut c = context(req);
        compose(&[new(config)], handler)(&mut c);
        (reached.load(std::sync::atomic::Ordering::SeqCst), c.finish())
    }

    fn only_a() -> Config {
        Config { allow_origins: vec!["https://a".to_owned()], max_age: 600, ..Config::default() }
    }

    #[test]
    fn preflight_short_circuits_with_204() {
        let req = request("OPTIONS", "/").header("origin", "https://a").body(Bytes::new()).unwrap();
        let (reached, response) = run(only_a(), req);
        assert!(!reached);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["access-control-allow-origin"], "https://a");
        assert_eq!(response.headers()["access-control-allow-methods"], "GET,POST,HEAD,PUT,DELETE,PATCH");
        assert_eq!(response.headers()["access-control-max-age"], "600");
        assert!(response.body().is_empty());
    }

    #[test]
    fn simple_request_gets_origin_echo() {
        let req = request("GET", "/").header("origin", "https://a").body(Bytes::new()).unwrap();
        let (reached, response) = run(Config { allow_credentials: true, ..only_a() }, req);
        assert!(reached);
        assert_eq!(response.headers()["access-control-allow-origin"], "https://a");
        assert_eq!(response.headers()["access-control-allow-credentials"], "true");
        assert_eq!(response.headers()["vary"], "Origin");
    }

    #[test]
    fn disallowed_origin_gets_no_grant() {
        let req = request("GET", "/").header("origin", "https://evil").body(Bytes::new()).unwrap();
        let (reached, response) = run(only_a(), req);
        assert!(reached);
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn requests_without_origin_pass_through() {
        let (reached, response) = run(only_a(), get("/"));
        assert!(reached);
        assert!(response.headers().get("vary").is_none());
    }

    #[test]
    fn wildcard_echoes_any_origin() {
        let req = request("GET", "/").header("origin", "https://anywhere").body(Bytes::new()).unwrap();
        let (_, response) = run(Config::default(), req);
        assert_eq!(response.headers()["access-control-allow-origin"], "https://anywhere");
    }
}
