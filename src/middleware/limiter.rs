//! Fixed-window rate limiting.
//!
//! Each key (by default the client address) may make `max` requests. The
//! window restarts once `expiration` has passed since that key's *last*
//! request, so a client that keeps knocking while limited stays limited.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use http::StatusCode;

use crate::context::Context;
use crate::handler::{BoxedHandler, Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

pub type KeyGenerator = Arc<dyn Fn(&Context) -> String + Send + Sync>;

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    /// Requests allowed per window. `0` means unset and falls back to 60.
    pub max: u32,
    /// Window length. Zero falls back to one minute.
    pub expiration: Duration,
    pub key_generator: KeyGenerator,
    /// Answers a limited request. Defaults to `429 Too Many Requests`.
    pub limit_reached: BoxedHandler,
    /// Idle clients are swept once this many keys are tracked.
    pub sweep_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip: None,
            max: DEFAULT_MAX,
            expiration: Duration::from_secs(60),
            key_generator: Arc::new(|c: &Context| c.remote_ip()),
            limit_reached: handler_fn(|c| c.text(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests")),
            sweep_threshold: 4096,
        }
    }
}

#[derive(Debug)]
struct Client {
    count: u32,
    last_access: Instant,
}

struct Window {
    max: u32,
    expiration: Duration,
    sweep_threshold: usize,
    clients: Mutex<HashMap<String, Client>>,
}

impl Window {
    /// Counts a request for `key` and reports whether it is within the limit.
    fn admit(&self, key: String, now: Instant) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if clients.len() >= self.sweep_threshold && !clients.contains_key(&key) {
            let expiration = self.expiration;
            clients.retain(|_, client| now.duration_since(client.last_access) <= expiration);
        }

        let client = clients.entry(key).or_insert(Client { count: 0, last_access: now });
        if now.duration_since(client.last_access) > self.expiration {
            client.count = 0;
        }
        client.count = client.count.saturating_add(1);
        client.last_access = now;
        client.count <= self.max
    }
}

const DEFAULT_MAX: u32 = 60;

pub fn new(config: Config) -> Middleware {
    let window = Arc::new(Window {
        max: if config.max == 0 { DEFAULT_MAX } else { config.max },
        expiration: if config.expiration.is_zero() { Duration::from_secs(60) } else { config.expiration },
        sweep_threshold: config.sweep_threshold.max(1),
        clients: Mutex::new(HashMap::new()),
    });

    middleware_fn(move |next| {
        let window = Arc::clone(&window);
        let config = config.clone();
        handler_fn(move |c| {
            if skipped(&config.skip, c) {
                return next(c);
            }
            // The lock is released before downstream runs.
            if window.admit((config.key_generator)(c), Instant::now()) {
                next(c);
            } else {
                (config.limit_reached)(c);
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::handler::compose;
    use crate::testing::{context, request};

    fn window(max: u32, expiration: Duration) -> Window {
        Window { max, expiration, sweep_threshold: 4096, clients: Mutex::new(HashMap::new()) }
    }

    #[test]
    fn limits_per_key() {
        let w = window(2, Duration::from_secs(1));
        let t = Instant::now();
        assert!(w.admit("a".into(), t));
        assert!(w.admit("a".into(), t));
        assert!(!w.admit("a".into(), t));
        assert!(w.admit("b".into(), t));
    }

    #[test]
    fn window_runs_from_last_request() {
        let w = window(1, Duration::from_secs(1));
        let t = Instant::now();
        assert!(w.admit("a".into(), t));
        assert!(!w.admit("a".into(), t + Duration::from_millis(900)));
        // Still within a second of the previous (rejected) request.
        assert!(!w.admit("a".into(), t + Duration::from_millis(1800)));
        assert!(w.admit("a".into(), t + Duration::from_millis(2900)));
    }

    #[test]
    fn sweeps_idle_clients() {
        let w = Window { sweep_threshold: 2, ..window(5, Duration::from_secs(1)) };
        let t = Instant::now();
        w.admit("a".into(), t);
        w.admit("b".into(), t);
        w.admit("c".into(), t + Duration::from_secs(5));
        let clients = w.clients.lock().unwrap();
        assert_eq!(clients.len(), 1);
        assert!(clients.contains_key("c"));
    }

    #[test]
    fn second_request_gets_429() {
        let mw = new(Config { max: 1, expiration: Duration::from_secs(1), ..Config::default() });
        let handler = compose(&[mw], handler_fn(|c| c.text(StatusCode::OK, "ok")));
        let req = || request("GET", "/x").header("x-real-ip", "1.1.1.1").body(Bytes::new()).unwrap();

        let mut first = context(req());
        handler(&mut first);
        assert_eq!(first.finish().status(), StatusCode::OK);

        let mut second = context(req());
        handler(&mut second);
        let response = second.finish();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.body().as_ref(), b"Too Many Requests");
    }

    #[test]
    fn zero_max_falls_back_to_default() {
        let mw = new(Config { max: 0, ..Config::default() });
        let handler = compose(&[mw], handler_fn(|c| c.text(StatusCode::OK, "ok")));
        let status = || {
            let mut c = context(request("GET", "/x").header("x-real-ip", "2.2.2.2").body(Bytes::new()).unwrap());
            handler(&mut c);
            c.finish().status()
        };
        for _ in 0..DEFAULT_MAX {
            assert_eq!(status(), StatusCode::OK);
        }
        assert_eq!(status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
