//! The application shell.
//!
//! An [`App`] owns a [`Router`], the application-wide middlewares, and the
//! shutdown handle of the server that will run it. Application middlewares
//! wrap every dispatch, including the 404 fallback, so access logging, CORS
//! preflight, and rate limiting also see requests that match no route.

use std::collections::HashMap;
use std::fmt::Display;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http::HeaderValue;
use http::header::SERVER;
use tokio::net::TcpListener;

use crate::config::AppConfig;
use crate::context::Context;
use crate::error::Error;
use crate::group::Group;
use crate::handler::{BoxedHandler, Middleware, compose, handler_fn};
use crate::method::RouteMethod;
use crate::path::{self, Pattern};
use crate::request::Request;
use crate::response::ResponseBuffer;
use crate::router::{RouteRef, Router, method_helpers, not_found};
use crate::server::{self, Server, ShutdownHandle};

/// Parameter name of the tail a mount point captures.
const MOUNT_TAIL: &str = "subpath";

pub struct App {
    config: AppConfig,
    router: Router,
    middlewares: Vec<Middleware>,
    not_found: OnceLock<BoxedHandler>,
    shutdown: ShutdownHandle,
}

impl App {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            router: Router::with_options(config.case_sensitive, config.strict_routing),
            config,
            middlewares: Vec::new(),
            not_found: OnceLock::new(),
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Appends an application middleware. The first one registered runs outermost.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self.not_found = OnceLock::new();
        self.router.reset_chains();
        self
    }

    method_helpers!();

    pub fn on_with<H>(
        &mut self,
        method: impl Into<RouteMethod>,
        path: &str,
        route_middlewares: &[Middleware],
        handler: H,
    ) -> Result<RouteRef<'_>, Error>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.router.on_with(method, path, route_middlewares, handler)
    }

    pub fn group(&mut self, prefix: &str, middlewares: &[Middleware]) -> Group<'_> {
        self.router.group(prefix, middlewares)
    }

    /// Serves `sub` under `prefix`.
    ///
    /// The sub-application sees paths with the prefix removed (`/api/users`
    /// under `/api` arrives as `/users`) and runs its own middlewares. The
    /// original path and parameters are restored when it returns, also when
    /// it panics.
    pub fn mount(&mut self, prefix: &str, sub: App) -> Result<&mut Self, Error> {
        let depth = Pattern::parse(prefix, false)?.segments().len();
        let sub = Arc::new(sub);
        let handler = handler_fn(move |c| {
            let mut scope = PathScope::strip(c, depth);
            sub.serve_context(&mut scope);
        });
        self.router.add(RouteMethod::All, prefix, handler.clone())?;
        self.router.add(RouteMethod::All, &path::join(prefix, &format!("*{MOUNT_TAIL}")), handler)?;
        Ok(self)
    }

    pub fn reverse(&self, name: &str, args: &[&dyn Display]) -> Option<String> {
        self.router.reverse(name, args)
    }

    /// Runs the full pipeline for a request already wrapped in a [`Context`].
    pub fn serve_context(&self, c: &mut Context) {
        let handler = match self.router.resolve(c.method(), c.path()) {
            Some(resolved) => {
                c.params.extend(resolved.params);
                resolved.route.composed(&self.middlewares)
            }
            None => self
                .not_found
                .get_or_init(|| compose(&self.middlewares, handler_fn(not_found)))
                .clone(),
        };
        handler(c);
    }

    /// Handles one request synchronously and returns the finished response.
    pub fn handle_request(&self, request: Request) -> http::Response<Bytes> {
        let mut c = Context::new(request, Box::new(ResponseBuffer::new()));
        self.serve_context(&mut c);
        let mut response = c.finish();
        if !self.config.server_header.is_empty() && !response.headers().contains_key(SERVER) {
            if let Ok(value) = HeaderValue::from_str(&self.config.server_header) {
                response.headers_mut().insert(SERVER, value);
            }
        }
        response
    }

    /// [`handle_request`](Self::handle_request) for a plain `http::Request`.
    ///
    /// ```
    /// # use kite::{App, StatusCode};
    /// # use bytes::Bytes;
    /// let mut app = App::new();
    /// app.get("/ping", |c| c.text(StatusCode::OK, "pong")).unwrap();
    /// let response = app.handle(http::Request::get("/ping").body(Bytes::new()).unwrap());
    /// assert_eq!(response.body().as_ref(), b"pong");
    /// ```
    pub fn handle(&self, request: http::Request<Bytes>) -> http::Response<Bytes> {
        self.handle_request(Request::from_http(request))
    }

    /// A handle that stops the server running this app.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Asks the server to stop accepting connections.
    pub fn shutdown(&self) -> Result<(), Error> {
        self.shutdown.shutdown()
    }

    /// Asks the server to stop and waits for in-flight connections to drain.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), Error> {
        self.shutdown.shutdown_with_timeout(timeout).await
    }

    /// Binds `addr` and serves until shutdown.
    pub async fn listen(self, addr: &str) -> Result<(), Error> {
        Server::bind(addr)?.serve(self).await
    }

    /// Serves on an already-bound listener until shutdown.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Error> {
        server::run(listener, self).await
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Presents a shortened path to a mounted app and restores the original on drop.
struct PathScope<'c> {
    ctx: &'c mut Context,
    path: Option<String>,
    params: HashMap<String, String>,
}

impl<'c> PathScope<'c> {
    fn strip(ctx: &'c mut Context, depth: usize) -> Self {
        let stripped = strip_segments(ctx.path(), depth);
        let path = ctx.request.replace_path(stripped);
        let params = ctx.params.clone();
        ctx.params.remove(MOUNT_TAIL);
        Self { ctx, path: Some(path), params }
    }
}

impl Deref for PathScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for PathScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for PathScope<'_> {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            self.ctx.request.replace_path(path);
        }
        self.ctx.params = std::mem::take(&mut self.params);
    }
}

/// Drops the first `depth` segments of `path`, keeping what follows verbatim.
fn strip_segments(path: &str, depth: usize) -> String {
    let mut rest = path;
    for _ in 0..depth {
        rest = rest.trim_start_matches('/');
        rest = rest.find('/').map_or("", |i| &rest[i..]);
    }
    if rest.is_empty() { "/".to_owned() } else { rest.to_owned() }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;

    use super::*;
    use crate::handler::middleware_fn;
    use crate::testing::{body_text, get};

    #[test]
    fn strips_whole_segments() {
        assert_eq!(strip_segments("/api/users/7", 1), "/users/7");
        assert_eq!(strip_segments("/api", 1), "/");
        assert_eq!(strip_segments("/api/", 1), "/");
        assert_eq!(strip_segments("/a/b/c/", 2), "/c/");
        assert_eq!(strip_segments("/x", 0), "/x");
    }

    #[test]
    fn app_middlewares_wrap_unmatched_requests() {
        let mut app = App::new();
        app.use_middleware(middleware_fn(|next| {
            handler_fn(move |c| {
                c.set_header("x-seen", "1");
                next(c);
            })
        }));
        let response = app.handle(get("/missing"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-seen"], "1");
    }

    #[test]
    fn late_middleware_applies_to_existing_routes() {
        let mut app = App::new();
        app.get("/", |c| c.text(StatusCode::OK, "root")).unwrap();
        assert!(app.handle(get("/")).headers().get("x-late").is_none());

        app.use_middleware(middleware_fn(|next| {
            handler_fn(move |c| {
                c.set_header("x-late", "1");
                next(c);
            })
        }));
        assert_eq!(app.handle(get("/")).headers()["x-late"], "1");
    }

    #[test]
    fn server_header_is_set_when_configured() {
        let app = App::with_config(AppConfig { server_header: "kite".into(), ..AppConfig::default() });
        assert_eq!(app.handle(get("/")).headers()["server"], "kite");
        assert!(App::new().handle(get("/")).headers().get("server").is_none());
    }

    #[test]
    fn mount_strips_and_restores_path() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sub = App::new();
        {
            let seen = Arc::clone(&seen);
            sub.get("/users/:id", move |c| {
                seen.lock().unwrap().push(c.path().to_owned());
                let reply = format!("user {}", c.param("id").unwrap_or_default());
                c.text(StatusCode::OK, &reply);
            })
            .unwrap();
        }
        sub.get("/", |c| c.text(StatusCode::OK, "sub root")).unwrap();

        let mut app = App::new();
        let outer_seen = Arc::clone(&seen);
        app.use_middleware(middleware_fn(move |next| {
            let seen = Arc::clone(&outer_seen);
            handler_fn(move |c| {
                next(c);
                seen.lock().unwrap().push(c.path().to_owned());
            })
        }));
        app.mount("/api", sub).unwrap();

        let response = app.handle(get("/api/users/7"));
        assert_eq!(body_text(&response), "user 7");
        assert_eq!(*seen.lock().unwrap(), ["/users/7", "/api/users/7"]);

        assert_eq!(body_text(&app.handle(get("/api"))), "sub root");
        assert_eq!(app.handle(get("/api/nope")).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn mount_restores_path_after_panic() {
        let mut sub = App::new();
        sub.get("/boom", |_| panic!("sub-app fault")).unwrap();
        let mut app = App::new();
        app.mount("/sub", sub).unwrap();

        let mut c = Context::new(Request::from_http(get("/sub/boom")), Box::new(ResponseBuffer::new()));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| app.serve_context(&mut c)));
        assert!(result.is_err());
        assert_eq!(c.path(), "/sub/boom");
    }
}
