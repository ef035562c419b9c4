//! Minimal kite example: JSON endpoints, a route group, and the common middlewares.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/users/42
//!   curl -u admin:admin http://localhost:3000/admin/stats
//!   curl http://localhost:3000/live
//!   curl http://localhost:3000/debug/vars

use std::collections::HashMap;
use std::time::Duration;

use kite::middleware::{basic_auth, cache, expvar, health, logger, recovery, request_id, secure};
use kite::{App, AppConfig, Context, StatusCode};
use serde::Deserialize;

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), kite::Error> {
    tracing_subscriber::fmt::init();

    let mut app = App::with_config(AppConfig { app_name: "kite-demo".into(), ..AppConfig::default() });
    app.use_middleware(recovery::new(recovery::Config::default()))
        .use_middleware(request_id::new(request_id::Config::default()))
        .use_middleware(logger::new(logger::Config { output: logger::LogOutput::Tracing, ..logger::Config::default() }))
        .use_middleware(secure::new(secure::Config::default()))
        .use_middleware(health::new(health::Config::default()))
        .use_middleware(expvar::new(expvar::Config::default()));

    app.get("/users/:id", get_user)?.set_name("user")?;
    app.post("/users", create_user)?;
    app.delete("/users/:id", |c: &mut Context| {
        c.status(StatusCode::NO_CONTENT);
    })?;

    let auth = basic_auth::new(basic_auth::Config {
        users: HashMap::from([("admin".to_owned(), "admin".to_owned())]),
        ..basic_auth::Config::default()
    })?;
    let stats_cache = cache::new(cache::Config { expiration: Duration::from_secs(10), ..cache::Config::default() });
    let mut admin = app.group("/admin", &[auth]);
    admin.on_with(kite::Method::Get, "/stats", &[stats_cache], |c: &mut Context| {
        let user = c.get::<String>(basic_auth::USER_KEY).cloned().unwrap_or_default();
        c.text(StatusCode::OK, &format!("stats for {user}"));
    })?;

    app.listen("0.0.0.0:3000").await
}

// GET /users/:id
fn get_user(c: &mut Context) {
    let id = c.param("id").unwrap_or("unknown").to_owned();
    if let Err(e) = c.json(StatusCode::OK, &serde_json::json!({ "id": id, "name": "alice" })) {
        c.error(e);
    }
}

// POST /users
fn create_user(c: &mut Context) {
    let input: CreateUser = match c.bind_json() {
        Ok(input) => input,
        Err(e) => return c.text(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    c.location("/users/99");
    if let Err(e) = c.json(StatusCode::CREATED, &serde_json::json!({ "id": "99", "name": input.name })) {
        c.error(e);
    }
}
