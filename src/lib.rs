//! # kite
//!
//! A lightweight HTTP application framework: a trie router, a per-request
//! [`Context`], and middleware composed as plain function wrappers.
//!
//! ## The pieces
//!
//! - **Routing.** Patterns mix static segments, `:name` parameters and a
//!   trailing `*name` wildcard. Static beats parameter beats wildcard at each
//!   segment. Routes can be named and turned back into URLs with
//!   [`Router::reverse`].
//! - **Context.** Handlers get `&mut Context`: request accessors (params,
//!   query, form, JSON binding, cookies) and response helpers (`text`, `json`,
//!   `redirect`, cookies) writing through a [`ResponseWriter`].
//! - **Middleware.** A [`Middleware`] takes the next handler and returns a
//!   new one. App middlewares wrap everything (the 404 handler included),
//!   group middlewares wrap the group's routes, and route middlewares wrap one
//!   route. See [`middleware`] for the built-in set.
//! - **Serving.** [`App::listen`] serves HTTP/1 and HTTP/2 on tokio with
//!   graceful shutdown on SIGTERM, Ctrl-C, or [`App::shutdown`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kite::middleware::{logger, recovery};
//! use kite::{App, Context, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kite::Error> {
//!     let mut app = App::new();
//!     app.use_middleware(recovery::new(recovery::Config::default()))
//!         .use_middleware(logger::new(logger::Config::default()));
//!
//!     app.get("/users/:id", get_user)?.set_name("user")?;
//!     app.post("/users", create_user)?;
//!
//!     let mut api = app.group("/api/v1", &[]);
//!     api.get("/ping", |c: &mut Context| c.text(StatusCode::OK, "pong"))?;
//!
//!     app.listen("0.0.0.0:3000").await
//! }
//!
//! fn get_user(c: &mut Context) {
//!     let id = c.param("id").unwrap_or("unknown").to_owned();
//!     if let Err(e) = c.json(StatusCode::OK, &serde_json::json!({ "id": id })) {
//!         c.error(e);
//!     }
//! }
//!
//! fn create_user(c: &mut Context) {
//!     if c.body().is_empty() {
//!         return c.text(StatusCode::BAD_REQUEST, "empty body");
//!     }
//!     c.location("/users/99");
//!     c.status(StatusCode::CREATED);
//! }
//! ```

mod app;
mod config;
mod context;
mod cookie;
mod encoding;
mod error;
mod group;
mod handler;
mod method;
mod path;
mod request;
mod response;
mod router;
mod server;
mod tree;
pub mod writer;

pub mod middleware;

#[cfg(test)]
mod testing;

pub use app::App;
pub use config::AppConfig;
pub use context::{Context, ERROR_KEY};
pub use cookie::{Cookie, SameSite};
pub use error::Error;
pub use group::Group;
pub use handler::{BoxedHandler, Chain, Middleware, Skipper, compose, handler_fn, middleware_fn, skip_fn};
pub use http::StatusCode;
pub use method::{Method, RouteMethod, UnknownMethod};
pub use path::{Pattern, Segment};
pub use request::Request;
pub use response::{ContentType, ResponseBuffer, ResponseWriter};
pub use router::{Resolved, Route, RouteRef, Router, not_found};
pub use server::{Server, ShutdownHandle};
