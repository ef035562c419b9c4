//! Request ids.
//!
//! Reuses the id from the request header when present, otherwise generates
//! one. The id is stored in the context for downstream handlers (and the
//! access log) and echoed in the response header.

use std::sync::Arc;

use http::HeaderName;

use crate::encoding::{hex, random_bytes};
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

pub const DEFAULT_HEADER: &str = "x-request-id";
pub const DEFAULT_CONTEXT_KEY: &str = "requestid";

pub type Generator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    pub header: HeaderName,
    pub generator: Generator,
    pub context_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip: None,
            header: HeaderName::from_static(DEFAULT_HEADER),
            generator: Arc::new(|| hex(&random_bytes(16))),
            context_key: DEFAULT_CONTEXT_KEY.to_owned(),
        }
    }
}

pub fn new(config: Config) -> Middleware {
    middleware_fn(move |next| {
        let config = config.clone();
        handler_fn(move |c| {
            if skipped(&config.skip, c) {
                return next(c);
            }

            let id = match c.request().headers().get(&config.header).and_then(|v| v.to_str().ok()) {
                Some(id) if !id.is_empty() => id.to_owned(),
                _ => (config.generator)(),
            };
            c.set_header(config.header.clone(), &id);
            c.set(config.context_key.clone(), id);
            next(c);
        })
    })
}
