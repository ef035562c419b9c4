//! Handlers, middlewares, and how they compose.
//!
//! # How handlers are stored
//!
//! The router keeps handlers of *different* closure types side by side, so
//! each one is erased behind a trait object and shared through an `Arc`:
//!
//! ```text
//! |c: &mut Context| c.text(StatusCode::OK, "hi")   ← user writes this
//!        ↓ app.get("/", …)
//! handler_fn(closure)                              ← Arc::new, once, at registration
//!        ↓  stored as BoxedHandler = Arc<dyn Fn(&mut Context) + Send + Sync>
//! handler(&mut ctx)  at request time               ← one virtual call
//! ```
//!
//! # Middlewares
//!
//! A [`Middleware`] maps one handler to another. It may run code before the
//! downstream handler, after it, around it, or instead of it:
//!
//! ```text
//! compose([A, B, C], H)  =  A(B(C(H)))
//!
//! request  →  A → B → C → H
//! response ←  A ← B ← C ← H
//! ```
//!
//! A middleware must either call `next` exactly once or write a response
//! itself and return without calling it (a short-circuit). Per-instance state
//! (caches, counters) lives in whatever the middleware closure captures.

use std::sync::Arc;

use crate::context::Context;

/// A type-erased request handler, shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Fn(&mut Context) + Send + Sync + 'static>;

/// A type-erased `handler ⇒ handler` transformer.
pub type Middleware = Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static>;

/// Predicate that lets a request bypass a middleware entirely.
pub type Skipper = Arc<dyn Fn(&Context) -> bool + Send + Sync + 'static>;

/// Erases a closure into a [`BoxedHandler`].
///
/// Going through this function (rather than `Arc::new` directly) lets the
/// compiler infer the closure's higher-ranked `&mut Context` argument.
pub fn handler_fn<F>(f: F) -> BoxedHandler
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Erases a closure into a [`Middleware`].
pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Erases a closure into a [`Skipper`].
pub fn skip_fn<F>(f: F) -> Skipper
where
    F: Fn(&Context) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps `handler` so the first middleware in the slice runs outermost.
pub fn compose(middlewares: &[Middleware], handler: BoxedHandler) -> BoxedHandler {
    middlewares.iter().rev().fold(handler, |inner, middleware| middleware(inner))
}

/// An ordered middleware stack that can be extended and applied.
#[derive(Clone, Default)]
pub struct Chain {
    middlewares: Vec<Middleware>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` as the new innermost layer.
    pub fn then(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Appends every middleware of `other`, innermost-last.
    pub fn extend(mut self, other: impl IntoIterator<Item = Middleware>) -> Self {
        self.middlewares.extend(other);
        self
    }

    pub fn apply(&self, handler: BoxedHandler) -> BoxedHandler {
        compose(&self.middlewares, handler)
    }

    pub fn as_slice(&self) -> &[Middleware] {
        &self.middlewares
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl FromIterator<Middleware> for Chain {
    fn from_iter<I: IntoIterator<Item = Middleware>>(iter: I) -> Self {
        Self { middlewares: iter.into_iter().collect() }
    }
}
