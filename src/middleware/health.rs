//! Kubernetes-style health checks.
//!
//! | Probe | Default path | Question |
//! |---|---|---|
//! | **Liveness** | `/live` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/ready` | Can it serve traffic? Failure → pulled from the load balancer. |
//!
//! The middleware answers both paths by running every registered probe for
//! that kind concurrently, each bounded by a shared deadline. A probe that
//! misses the deadline is abandoned and reported as `"deadline exceeded"`.
//!
//! ```rust,no_run
//! use kite::App;
//! use kite::middleware::health::{self, Config};
//!
//! let mut app = App::new();
//! app.use_middleware(health::new(Config::default().readiness_check("database", || async {
//!     Ok(()) // ping the pool here
//! })));
//! ```
//!
//! Probes are async. Under the server they run on its runtime, waited for
//! from the blocking thread the handler runs on. Calling the app directly from
//! async code is also fine: on a current-thread runtime the probes move to a
//! private runtime on a helper thread.
//!
//! For a process with no dependencies the plain [`liveness`] and
//! [`readiness`] handlers are enough:
//!
//! ```rust,no_run
//! use kite::App;
//! use kite::middleware::health;
//!
//! let mut app = App::new();
//! app.get("/healthz", health::liveness).unwrap();
//! app.get("/readyz", health::readiness).unwrap();
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use serde::Serialize;
use tokio::runtime::{self, Handle, RuntimeFlavor};
use tokio::task::{self, JoinSet};
use tracing::{error, warn};

use crate::context::Context;
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

pub type ProbeFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type Probe = Arc<dyn Fn() -> ProbeFuture + Send + Sync>;

/// Liveness handler: always `200 ok`. If the process can answer at all it is alive.
pub fn liveness(c: &mut Context) {
    c.text(StatusCode::OK, "ok");
}

/// Readiness handler: always `200 ready`. Replace it, or register readiness
/// probes on the middleware, when the app needs a warm-up period.
pub fn readiness(c: &mut Context) {
    c.text(StatusCode::OK, "ready");
}

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    pub live_path: String,
    pub ready_path: String,
    /// Deadline shared by all probes of one check.
    pub timeout: Duration,
    pub liveness: BTreeMap<String, Probe>,
    pub readiness: BTreeMap<String, Probe>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip: None,
            live_path: "/live".to_owned(),
            ready_path: "/ready".to_owned(),
            timeout: Duration::from_secs(5),
            liveness: BTreeMap::new(),
            readiness: BTreeMap::new(),
        }
    }
}

fn probe<F, Fut>(f: F) -> Probe
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as ProbeFuture)
}

impl Config {
    pub fn liveness_check<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.liveness.insert(name.into(), probe(f));
        self
    }

    pub fn readiness_check<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.readiness.insert(name.into(), probe(f));
        self
    }
}

#[derive(Serialize)]
struct Report<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<String, String>,
}

/// Runs `probes` concurrently and collects the failures by name.
async fn run_probes(probes: &BTreeMap<String, Probe>, timeout: Duration) -> BTreeMap<String, String> {
    let mut set = JoinSet::new();
    for (name, probe) in probes {
        let name = name.clone();
        let task = tokio::spawn(probe());
        set.spawn(async move {
            let abort = task.abort_handle();
            let outcome = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => result.err(),
                Ok(Err(e)) => Some(format!("probe failed: {e}")),
                Err(_) => {
                    abort.abort();
                    Some("deadline exceeded".to_owned())
                }
            };
            (name, outcome)
        });
    }

    let mut failures = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, Some(reason))) => {
                failures.insert(name, reason);
            }
            Ok((_, None)) => {}
            Err(e) => error!("health probe task failed: {e}"),
        }
    }
    failures
}

/// Drives `run_probes` to completion from synchronous handler code.
///
/// Inside a multi-thread runtime the probes run on it, with the calling worker
/// (if it is one) handed off through `block_in_place`. A current-thread
/// runtime cannot be blocked on from its own thread, so the probes then get a
/// private runtime on a scoped thread, as they do when no runtime is present.
fn check(probes: &BTreeMap<String, Probe>, timeout: Duration) -> BTreeMap<String, String> {
    if probes.is_empty() {
        return BTreeMap::new();
    }
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(|| handle.block_on(run_probes(probes, timeout)))
        }
        Ok(_) => std::thread::scope(|s| s.spawn(|| on_private_runtime(probes, timeout)).join())
            .unwrap_or_else(|_| not_run(probes)),
        Err(_) => on_private_runtime(probes, timeout),
    }
}

fn on_private_runtime(probes: &BTreeMap<String, Probe>, timeout: Duration) -> BTreeMap<String, String> {
    match runtime::Builder::new_current_thread().enable_time().build() {
        Ok(rt) => rt.block_on(run_probes(probes, timeout)),
        Err(e) => {
            error!("could not start a runtime for health probes: {e}");
            not_run(probes)
        }
    }
}

fn not_run(probes: &BTreeMap<String, Probe>) -> BTreeMap<String, String> {
    probes.keys().map(|name| (name.clone(), "probe not run".to_owned())).collect()
}

fn respond(c: &mut Context, failures: BTreeMap<String, String>) {
    let (status, report) = if failures.is_empty() {
        (StatusCode::OK, Report { status: "UP", errors: failures })
    } else {
        warn!(path = %c.path(), failed = ?failures.keys().collect::<Vec<_>>(), "health check failed");
        (StatusCode::SERVICE_UNAVAILABLE, Report { status: "DOWN", errors: failures })
    };
    if let Err(e) = c.json(status, &report) {
        c.error(e);
    }
}

pub fn new(config: Config) -> Middleware {
    let config = Arc::new(config);
    middleware_fn(move |next| {
        let config = Arc::clone(&config);
        handler_fn(move |c| {
            if skipped(&config.skip, c) {
                return next(c);
            }
            let probes = if c.path() == config.live_path {
                &config.liveness
            } else if c.path() == config.ready_path {
                &config.readiness
            } else {
                return next(c);
            };
            let failures = check(probes, config.timeout);
            respond(c, failures);
        })
    })
}
