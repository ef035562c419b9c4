//! Runtime variables as JSON, served at `/debug/vars` by default.
//!
//! The report always holds `cmdline`, `uptime_secs`, and `requests` (total,
//! in flight, and completed counts by status class, for requests that passed
//! through this middleware). Values registered with [`Config::publish`] are
//! evaluated on every hit and added under their own names.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use http::StatusCode;
use serde_json::{Map, Value, json};

use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

pub type Var = Arc<dyn Fn() -> Value + Send + Sync>;

const CLASSES: [&str; 5] = ["1xx", "2xx", "3xx", "4xx", "5xx"];

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    pub path: String,
    pub vars: BTreeMap<String, Var>,
}

impl Default for Config {
    fn default() -> Self {
        Self { skip: None, path: "/debug/vars".to_owned(), vars: BTreeMap::new() }
    }
}

impl Config {
    /// Adds a variable. A name that collides with a built-in replaces it.
    pub fn publish<F>(mut self, name: impl Into<String>, var: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.vars.insert(name.into(), Arc::new(var));
        self
    }
}

struct Counters {
    started: Instant,
    total: AtomicU64,
    in_flight: AtomicU64,
    by_class: [AtomicU64; 5],
}

impl Counters {
    fn report(&self, vars: &BTreeMap<String, Var>) -> Value {
        let by_class: Map<String, Value> = CLASSES
            .iter()
            .zip(&self.by_class)
            .map(|(class, count)| ((*class).to_owned(), json!(count.load(Ordering::Relaxed))))
            .collect();
        let mut report = Map::new();
        let cmdline: Vec<String> = std::env::args_os().map(|a| a.to_string_lossy().into_owned()).collect();
        report.insert("cmdline".to_owned(), json!(cmdline));
        report.insert("uptime_secs".to_owned(), json!(self.started.elapsed().as_secs_f64()));
        report.insert(
            "requests".to_owned(),
            json!({
                "total": self.total.load(Ordering::Relaxed),
                "in_flight": self.in_flight.load(Ordering::Relaxed),
                "by_class": by_class,
            }),
        );
        for (name, var) in vars {
            report.insert(name.clone(), var());
        }
        Value::Object(report)
    }
}

/// Keeps the in-flight gauge right when downstream panics.
struct InFlight<'a>(&'a AtomicU64);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub fn new(config: Config) -> Middleware {
    let path = format!("/{}", config.path.trim_matches('/'));
    let counters = Arc::new(Counters {
        started: Instant::now(),
        total: AtomicU64::new(0),
        in_flight: AtomicU64::new(0),
        by_class: Default::default(),
    });
    let vars = Arc::new(config.vars);
    let skip = config.skip;

    middleware_fn(move |next| {
        let counters = Arc::clone(&counters);
        let vars = Arc::clone(&vars);
        let path = path.clone();
        let skip = skip.clone();
        handler_fn(move |c| {
            if skipped(&skip, c) {
                return next(c);
            }
            if c.path() == path {
                if let Err(e) = c.json(StatusCode::OK, &counters.report(&vars)) {
                    c.error(e);
                }
                return;
            }

            counters.total.fetch_add(1, Ordering::Relaxed);
            counters.in_flight.fetch_add(1, Ordering::Relaxed);
            let _in_flight = InFlight(&counters.in_flight);
            next(c);
            let status = c.writer().status().unwrap_or(StatusCode::OK);
            if let Some(count) = counters.by_class.get(usize::from(status.as_u16() / 100).wrapping_sub(1)) {
                count.fetch_add(1, Ordering::Relaxed);
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::handler::{BoxedHandler, compose};
    use crate::testing::{context, get};

    fn report(handler: &BoxedHandler, path: &str) -> Value {
        let mut c = context(get(path));
        handler(&mut c);
        let response = c.finish();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_slice(response.body()).unwrap()
    }

    fn fetch(handler: &BoxedHandler, path: &str) -> http::Response<Bytes> {
        let mut c = context(get(path));
        handler(&mut c);
        c.finish()
    }

    #[test]
    fn serves_published_and_builtin_vars() {
        let config = Config { path: "debug/metrics/".to_owned(), ..Config::default() }.publish("test_requests", || json!(42));
        let handler = compose(&[new(config)], handler_fn(|c| c.text(StatusCode::NOT_FOUND, "Not a debug path")));

        let vars = report(&handler, "/debug/metrics");
        assert_eq!(vars["test_requests"], 42);
        assert!(vars["cmdline"].is_array());
        assert!(vars["uptime_secs"].is_number());
        assert_eq!(vars["requests"]["total"], 0);
    }

    #[test]
    fn other_paths_pass_through_and_are_counted() {
        let handler = compose(&[new(Config::default())], handler_fn(|c| c.text(StatusCode::NOT_FOUND, "Not a debug path")));

        let response = fetch(&handler, "/some/other/path");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"Not a debug path");
        fetch(&handler, "/again");

        let vars = report(&handler, "/debug/vars");
        assert_eq!(vars["requests"]["total"], 2);
        assert_eq!(vars["requests"]["in_flight"], 0);
        assert_eq!(vars["requests"]["by_class"]["4xx"], 2);
        assert_eq!(vars["requests"]["by_class"]["2xx"], 0);
    }

    #[test]
    fn panics_leave_the_gauge_balanced() {
        let handler = compose(&[new(Config::default())], handler_fn(|_| panic!("gone")));
        let mut c = context(get("/boom"));
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&mut c)));

        let vars = report(&handler, "/debug/vars");
        assert_eq!(vars["requests"]["total"], 1);
        assert_eq!(vars["requests"]["in_flight"], 0);
    }
}
