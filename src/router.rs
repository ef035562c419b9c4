//! Trie-based request router.
//!
//! One segment trie per HTTP method plus a separate trie for routes registered
//! with [`RouteMethod::All`]. Lookup tries the request's method first and falls
//! back to the `ALL` trie, so a method-specific route always shadows an `ALL`
//! route with the same pattern.
//!
//! Routes live in a flat table; trie terminals and the named-route map both
//! hold indices into it. Registration must finish before serving starts.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::OnceLock;

use http::StatusCode;
use tracing::warn;

use crate::context::Context;
use crate::error::Error;
use crate::group::Group;
use crate::handler::{BoxedHandler, Middleware, compose, handler_fn};
use crate::method::{Method, RouteMethod};
use crate::path::{Pattern, Segment, decode_segment, split};
use crate::tree::{Inserted, Node};

/// Generates the per-method registration helpers on any type that provides
/// `on_with(method, path, route_middlewares, handler)`.
macro_rules! route_helpers {
    ($($name:ident => $method:expr),* $(,)?) => {
        $(
            #[doc = concat!("Registers `handler` for `", stringify!($name), "` requests matching `path`.")]
            pub fn $name<H>(&mut self, path: &str, handler: H) -> Result<$crate::router::RouteRef<'_>, $crate::Error>
            where
                H: Fn(&mut $crate::Context) + Send + Sync + 'static,
            {
                self.on_with($method, path, &[], handler)
            }
        )*

        /// Registers `handler` for an arbitrary method.
        pub fn on<H>(
            &mut self,
            method: impl Into<$crate::method::RouteMethod>,
            path: &str,
            handler: H,
        ) -> Result<$crate::router::RouteRef<'_>, $crate::Error>
        where
            H: Fn(&mut $crate::Context) + Send + Sync + 'static,
        {
            self.on_with(method, path, &[], handler)
        }
    };
}

macro_rules! method_helpers {
    () => {
        $crate::router::route_helpers! {
            get => $crate::Method::Get,
            post => $crate::Method::Post,
            put => $crate::Method::Put,
            delete => $crate::Method::Delete,
            patch => $crate::Method::Patch,
            head => $crate::Method::Head,
            options => $crate::Method::Options,
            all => $crate::method::RouteMethod::All,
        }
    };
}

pub(crate) use {method_helpers, route_helpers};

/// A registered route.
pub struct Route {
    method: RouteMethod,
    pattern: Pattern,
    handler: BoxedHandler,
    name: Option<String>,
    /// The handler wrapped in the application middlewares, built on first use.
    chain: OnceLock<BoxedHandler>,
}

impl Route {
    pub fn method(&self) -> RouteMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The handler with group and route middlewares, without the application layer.
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    pub(crate) fn composed(&self, middlewares: &[Middleware]) -> BoxedHandler {
        self.chain.get_or_init(|| compose(middlewares, self.handler.clone())).clone()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.pattern.as_str())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A successful lookup.
pub struct Resolved<'r> {
    pub route: &'r Route,
    pub params: HashMap<String, String>,
}

/// Handle to a just-registered route, used to name it.
pub struct RouteRef<'r> {
    router: &'r mut Router,
    index: usize,
}

impl<'r> RouteRef<'r> {
    /// Names the route for [`Router::reverse`]. Names are unique per router.
    pub fn set_name(self, name: impl Into<String>) -> Result<RouteRef<'r>, Error> {
        let name = name.into();
        match self.router.named.get(&name) {
            Some(&index) if index != self.index => return Err(Error::DuplicateRouteName(name)),
            _ => {}
        }
        let route = &mut self.router.routes[self.index];
        if let Some(previous) = route.name.replace(name.clone()) {
            self.router.named.remove(&previous);
        }
        self.router.named.insert(name, self.index);
        Ok(self)
    }

    pub fn route(&self) -> &Route {
        &self.router.routes[self.index]
    }
}

#[derive(Default)]
pub struct Router {
    trees: HashMap<Method, Node>,
    all: Node,
    routes: Vec<Route>,
    named: HashMap<String, usize>,
    case_sensitive: bool,
    strict_routing: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// A router with explicit matching flags. Both default to `false`: static
    /// segments compare case-insensitively and a trailing slash is ignored.
    pub fn with_options(case_sensitive: bool, strict_routing: bool) -> Self {
        Self { case_sensitive, strict_routing, ..Self::default() }
    }

    method_helpers!();

    /// Registers `handler` wrapped in `route_middlewares`, first one outermost.
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
        self.add(method.into(), path, compose(route_middlewares, handler_fn(handler)))
    }

    /// Registers an already-erased handler.
    ///
    /// Registering the same method and pattern again replaces the earlier
    /// route, dropping its name.
    pub fn add(&mut self, method: RouteMethod, path: &str, handler: BoxedHandler) -> Result<RouteRef<'_>, Error> {
        let (case_sensitive, strict) = (self.case_sensitive, self.strict_routing);
        let pattern = Pattern::parse(path, strict)?;
        let index = self.routes.len();
        let tree = match method {
            RouteMethod::Exact(m) => self.trees.entry(m).or_default(),
            RouteMethod::All => &mut self.all,
        };

        let inserted = tree.insert(&pattern, index, case_sensitive)?;
        let route = Route { method, pattern, handler, name: None, chain: OnceLock::new() };
        let index = match inserted {
            Inserted::New => {
                self.routes.push(route);
                index
            }
            Inserted::Replaced(previous) => {
                tree.insert(&route.pattern, previous, case_sensitive)?;
                warn!(%method, path, "route registered twice, replacing the earlier handler");
                let old = std::mem::replace(&mut self.routes[previous], route);
                if let Some(name) = old.name {
                    self.named.remove(&name);
                }
                previous
            }
        };
        Ok(RouteRef { router: self, index })
    }

    /// A registration scope that prefixes paths and wraps handlers.
    pub fn group(&mut self, prefix: &str, middlewares: &[Middleware]) -> Group<'_> {
        Group::new(self, prefix, middlewares)
    }

    /// Finds the route for `method` and `path`, falling back to `ALL` routes.
    ///
    /// `path` is split first and each segment is percent-decoded afterwards, so
    /// matching and captured values see decoded text while `%2F` never adds a
    /// segment.
    pub fn resolve(&self, method: &http::Method, path: &str) -> Option<Resolved<'_>> {
        let decoded: Vec<Cow<'_, str>> = split(path, self.strict_routing).into_iter().map(decode_segment).collect();
        let segments: Vec<&str> = decoded.iter().map(|s| &**s).collect();
        let mut params = Vec::new();

        let mut found = Method::from_http(method)
            .and_then(|m| self.trees.get(&m))
            .and_then(|tree| tree.find(&segments, self.case_sensitive, &mut params));
        if found.is_none() {
            params.clear();
            found = self.all.find(&segments, self.case_sensitive, &mut params);
        }

        let route = &self.routes[found?];
        let params = params.into_iter().map(|(name, value)| (name.to_owned(), value)).collect();
        Some(Resolved { route, params })
    }

    /// Dispatches `c` to its route, or answers 404.
    pub fn handle(&self, c: &mut Context) {
        match self.resolve(c.method(), c.path()) {
            Some(resolved) => {
                let handler = resolved.route.handler.clone();
                c.params = resolved.params;
                handler(c);
            }
            None => not_found(c),
        }
    }

    /// Builds the path of a named route.
    ///
    /// Parameters take the positional `args` in declaration order, a trailing
    /// wildcard takes the next one verbatim. Returns `None` for an unknown name
    /// or too few arguments.
    ///
    /// ```
    /// # use kite::Router;
    /// let mut router = Router::new();
    /// router.get("/users/:id/posts/:post", |_| {}).unwrap().set_name("post").unwrap();
    /// assert_eq!(router.reverse("post", &[&7, &"intro"]).as_deref(), Some("/users/7/posts/intro"));
    /// ```
    pub fn reverse(&self, name: &str, args: &[&dyn Display]) -> Option<String> {
        let route = &self.routes[*self.named.get(name)?];
        let mut args = args.iter();
        let mut path = String::new();
        for segment in route.pattern.segments() {
            path.push('/');
            match segment {
                Segment::Static(literal) => path.push_str(literal),
                Segment::Param(_) | Segment::Wildcard(_) => path.push_str(&args.next()?.to_string()),
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Some(path)
    }

    pub fn route_by_name(&self, name: &str) -> Option<&Route> {
        self.named.get(name).map(|&i| &self.routes[i])
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn strict_routing(&self) -> bool {
        self.strict_routing
    }

    pub(crate) fn reset_chains(&mut self) {
        for route in &mut self.routes {
            route.chain = OnceLock::new();
        }
    }
}

/// The default 404 handler.
pub fn not_found(c: &mut Context) {
    c.text(StatusCode::NOT_FOUND, "404 page not found\n");
}
