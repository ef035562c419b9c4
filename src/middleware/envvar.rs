//! Serves a JSON snapshot of process environment variables.
//!
//! The snapshot is taken once, when the middleware is built. Only variables
//! with UTF-8 names and values are included.

use std::collections::{BTreeMap, HashSet};

use bytes::Bytes;
use http::StatusCode;

use crate::error::Error;
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;
use crate::response::ContentType;

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    pub path: String,
    /// Allow-list. Empty exposes everything not excluded.
    pub expose: Vec<String>,
    /// Deny-list, applied before `expose`.
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self { skip: None, path: "/envvars".to_owned(), expose: Vec::new(), exclude: Vec::new() }
    }
}

fn snapshot(vars: impl IntoIterator<Item = (String, String)>, expose: &[String], exclude: &[String]) -> BTreeMap<String, String> {
    let expose: HashSet<&str> = expose.iter().map(String::as_str).collect();
    let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
    vars.into_iter()
        .filter(|(key, _)| !exclude.contains(key.as_str()))
        .filter(|(key, _)| expose.is_empty() || expose.contains(key.as_str()))
        .collect()
}

pub fn new(config: Config) -> Result<Middleware, Error> {
    let vars = std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    let vars = snapshot(vars, &config.expose, &config.exclude);
    let body = Bytes::from(serde_json::to_vec(&vars)?);
    let path = format!("/{}", config.path.trim_matches('/'));
    let skip = config.skip;

    Ok(middleware_fn(move |next| {
        let body = body.clone();
        let path = path.clone();
        let skip = skip.clone();
        handler_fn(move |c| {
            if skipped(&skip, c) || c.path() != path {
                return next(c);
            }
            c.data(StatusCode::OK, ContentType::Json.as_str(), &body);
        })
    }))
}
