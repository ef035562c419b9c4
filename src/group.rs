//! Route groups: a shared prefix and middleware stack.

use crate::context::Context;
use crate::error::Error;
use crate::handler::Middleware;
use crate::method::RouteMethod;
use crate::path;
use crate::router::{RouteRef, Router, method_helpers};

/// Registers routes on a [`Router`] under a common prefix.
///
/// Handlers registered through a group are wrapped in the group's
/// middlewares, outer groups first, then any route-specific middlewares.
///
/// ```
/// # use kite::{Router, StatusCode};
/// let mut router = Router::new();
/// let mut api = router.group("/api", &[]);
/// let mut v1 = api.group("/v1", &[]);
/// v1.get("/users", |c| c.text(StatusCode::OK, "users")).unwrap();
/// # drop(api);
/// assert!(router.resolve(&http::Method::GET, "/api/v1/users").is_some());
/// ```
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    middlewares: Vec<Middleware>,
}

impl<'r> Group<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: &str, middlewares: &[Middleware]) -> Self {
        Self { router, prefix: prefix.to_owned(), middlewares: middlewares.to_vec() }
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
        let stack: Vec<Middleware> = self.middlewares.iter().chain(route_middlewares).cloned().collect();
        let full = path::join(&self.prefix, path);
        self.router.on_with(method, &full, &stack, handler)
    }

    /// A nested group extending this one's prefix and middlewares.
    pub fn group(&mut self, prefix: &str, middlewares: &[Middleware]) -> Group<'_> {
        let mut stack = self.middlewares.clone();
        stack.extend_from_slice(middlewares);
        Group { router: &mut *self.router, prefix: path::join(&self.prefix, prefix), middlewares: stack }
    }

    /// Adds a middleware for routes registered after this call.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
