//! End-to-end behavior through `App::handle`, no sockets involved.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use kite::middleware::{cache, cors, limiter, recovery};
use kite::{App, Context, Middleware, Router, StatusCode, handler_fn, middleware_fn};

fn get(uri: &str) -> http::Request<Bytes> {
    http::Request::get(uri).body(Bytes::new()).unwrap()
}

fn body(response: &http::Response<Bytes>) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}

#[test]
fn greets_by_path_parameter() {
    let mut app = App::new();
    app.get("/hello/:name", |c: &mut Context| {
        let reply = format!("Hi, {}", c.param("name").unwrap_or_default());
        c.text(StatusCode::OK, &reply);
    })
    .unwrap();

    let response = app.handle(get("/hello/world"));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(&response), "Hi, world");
}

#[test]
fn encoded_parameter_is_decoded() {
    let mut app = App::new();
    app.get("/hello/:name", |c: &mut Context| {
        let reply = format!("Hi, {}", c.param("name").unwrap_or_default());
        c.text(StatusCode::OK, &reply);
    })
    .unwrap();

    assert_eq!(body(&app.handle(get("/hello/John%20Doe"))), "Hi, John Doe");
    assert_eq!(body(&app.handle(get("/hello/a%2Fb"))), "Hi, a/b");
    assert_eq!(body(&app.handle(get("/hello/100%25"))), "Hi, 100%");
}

#[test]
fn encoded_static_segment_matches() {
    let mut app = App::new();
    app.get("/café", |c: &mut Context| c.text(StatusCode::OK, "coffee")).unwrap();

    let response = app.handle(get("/caf%C3%A9"));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(&response), "coffee");
}

#[test]
fn static_segment_beats_parameter() {
    let mut app = App::new();
    app.get("/a/:x", |c: &mut Context| c.text(StatusCode::OK, "param")).unwrap();
    app.get("/a/b", |c: &mut Context| c.text(StatusCode::OK, "static")).unwrap();

    assert_eq!(body(&app.handle(get("/a/b"))), "static");
    assert_eq!(body(&app.handle(get("/a/c"))), "param");
}

#[test]
fn precedence_holds_in_any_registration_order() {
    let routes: [(&str, &'static str); 3] = [("/p/*rest", "wild"), ("/p/:id", "param"), ("/p/static", "static")];
    let register = |app: &mut App, (pattern, tag): (&str, &'static str)| {
        app.get(pattern, move |c: &mut Context| c.text(StatusCode::OK, tag)).unwrap();
    };
    let orders: [[usize; 3]; 3] = [[0, 1, 2], [2, 1, 0], [1, 0, 2]];

    for order in orders {
        let mut app = App::new();
        for i in order {
            register(&mut app, routes[i]);
        }
        assert_eq!(body(&app.handle(get("/p/static"))), "static");
        assert_eq!(body(&app.handle(get("/p/42"))), "param");
        assert_eq!(body(&app.handle(get("/p/a/b"))), "wild");
    }
}

#[test]
fn wildcard_captures_the_remainder() {
    let mut app = App::new();
    app.get("/files/*path", |c: &mut Context| {
        let path = c.param("path").unwrap_or_default().to_owned();
        c.text(StatusCode::OK, &path);
    })
    .unwrap();

    let response = app.handle(get("/files/a/b/c.txt"));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(&response), "a/b/c.txt");
}

#[test]
fn reverse_named_route() {
    let mut app = App::new();
    app.get("/r", |c: &mut Context| c.text(StatusCode::OK, "r")).unwrap().set_name("home").unwrap();
    assert_eq!(app.reverse("home", &[]).as_deref(), Some("/r"));
}

#[test]
fn reverse_round_trips_through_resolve() {
    let mut router = Router::new();
    router.get("/orgs/:org/repos/:repo", |_: &mut Context| {}).unwrap().set_name("repo").unwrap();

    let path = router.reverse("repo", &[&"rust-lang", &42]).unwrap();
    let resolved = router.resolve(&http::Method::GET, &path).unwrap();
    assert_eq!(resolved.route.name(), Some("repo"));
    assert_eq!(resolved.params["org"], "rust-lang");
    assert_eq!(resolved.params["repo"], "42");
}

#[test]
fn rate_limit_rejects_second_request() {
    let mut app = App::new();
    app.use_middleware(limiter::new(limiter::Config {
        max: 1,
        expiration: Duration::from_secs(1),
        ..limiter::Config::default()
    }));
    app.get("/x", |c: &mut Context| c.text(StatusCode::OK, "x")).unwrap();

    let from_client = || http::Request::get("/x").header("x-real-ip", "10.0.0.1").body(Bytes::new()).unwrap();
    assert_eq!(app.handle(from_client()).status(), StatusCode::OK);
    assert_eq!(app.handle(from_client()).status(), StatusCode::TOO_MANY_REQUESTS);
}

#[test]
fn recovered_panic_does_not_poison_later_requests() {
    let mut app = App::new();
    app.use_middleware(recovery::new(recovery::Config { stack_trace: false, ..recovery::Config::default() }));
    app.get("/boom", |_: &mut Context| panic!("boom")).unwrap();
    app.get("/fine", |c: &mut Context| c.text(StatusCode::OK, "fine")).unwrap();

    let crashed = app.handle(get("/boom"));
    assert_eq!(crashed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body(&crashed).contains("Internal Server Error"));

    let fine = app.handle(get("/fine"));
    assert_eq!(fine.status(), StatusCode::OK);
    assert_eq!(body(&fine), "fine");
}

#[test]
fn cors_preflight() {
    let mut app = App::new();
    app.use_middleware(cors::new(cors::Config {
        allow_origins: vec!["https://a".to_owned()],
        ..cors::Config::default()
    }));

    let preflight = http::Request::builder()
        .method("OPTIONS")
        .uri("/")
        .header("origin", "https://a")
        .body(Bytes::new())
        .unwrap();
    let response = app.handle(preflight);
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["access-control-allow-origin"], "https://a");
}

fn tracer(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Middleware {
    let log = Arc::clone(log);
    middleware_fn(move |next| {
        let log = Arc::clone(&log);
        handler_fn(move |c| {
            log.lock().unwrap().push(format!("{name}>"));
            next(c);
            log.lock().unwrap().push(format!("<{name}"));
        })
    })
}

#[test]
fn middlewares_nest_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut app = App::new();
    app.use_middleware(tracer("A", &log)).use_middleware(tracer("B", &log)).use_middleware(tracer("C", &log));
    let seen = Arc::clone(&log);
    app.get("/", move |c: &mut Context| {
        seen.lock().unwrap().push("handler".to_owned());
        c.text(StatusCode::OK, "ok");
    })
    .unwrap();

    app.handle(get("/"));
    assert_eq!(*log.lock().unwrap(), ["A>", "B>", "C>", "handler", "<C", "<B", "<A"]);
}

#[test]
fn app_group_and_route_layers_stack() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut app = App::new();
    app.use_middleware(tracer("app", &log));
    let mut api = app.group("/api", &[tracer("group", &log)]);
    api.on_with(kite::Method::Get, "/users", &[tracer("route", &log)], |c: &mut Context| {
        c.text(StatusCode::OK, "users")
    })
    .unwrap();

    let response = app.handle(get("/api/users"));
    assert_eq!(body(&response), "users");
    assert_eq!(*log.lock().unwrap(), ["app>", "group>", "route>", "<route", "<group", "<app"]);
}

#[test]
fn short_circuit_skips_the_rest_of_the_chain() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let gate = middleware_fn(|_next| handler_fn(|c| c.text(StatusCode::FORBIDDEN, "denied")));

    let mut app = App::new();
    app.use_middleware(tracer("A", &log)).use_middleware(gate).use_middleware(tracer("C", &log));
    let seen = Arc::clone(&log);
    app.get("/", move |c: &mut Context| {
        seen.lock().unwrap().push("handler".to_owned());
        c.text(StatusCode::OK, "handler output");
    })
    .unwrap();

    let response = app.handle(get("/"));
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body(&response), "denied");
    assert_eq!(*log.lock().unwrap(), ["A>", "<A"]);
}

#[test]
fn cached_get_is_byte_identical() {
    let mut app = App::new();
    app.use_middleware(cache::new(cache::Config::default()));
    let counter = Arc::new(Mutex::new(0));
    let calls = Arc::clone(&counter);
    app.get("/time", move |c: &mut Context| {
        let mut n = calls.lock().unwrap();
        *n += 1;
        let reply = format!("generated #{n}");
        drop(n);
        c.text(StatusCode::OK, &reply);
    })
    .unwrap();

    let first = app.handle(get("/time"));
    let second = app.handle(get("/time"));
    assert_eq!(first.body(), second.body());
    assert_eq!(body(&second), "generated #1");
    assert_eq!(*counter.lock().unwrap(), 1);
}

#[test]
fn unmatched_requests_get_404_through_app_middlewares() {
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
    assert_eq!(body(&response), "404 page not found\n");
}

#[test]
fn mounted_app_sees_stripped_path() {
    let mut api = App::new();
    api.get("/users/:id", |c: &mut Context| {
        let reply = format!("{} {}", c.path(), c.param("id").unwrap_or_default());
        c.text(StatusCode::OK, &reply);
    })
    .unwrap();
    api.get("/", |c: &mut Context| c.text(StatusCode::OK, "api root")).unwrap();

    let mut app = App::new();
    app.mount("/api", api).unwrap();
    app.get("/", |c: &mut Context| c.text(StatusCode::OK, "main root")).unwrap();

    assert_eq!(body(&app.handle(get("/api/users/7"))), "/users/7 7");
    assert_eq!(body(&app.handle(get("/api"))), "api root");
    assert_eq!(body(&app.handle(get("/"))), "main root");
}
