//! In-memory response cache for `GET` requests.
//!
//! On a miss the downstream response is captured with a [`BufferWriter`],
//! stored, and then replayed onto the live writer. On a hit within the TTL the
//! stored snapshot is replayed without calling downstream. Entries past their
//! TTL are dropped when read. Concurrent misses for the same key may each run
//! the handler; the last one to finish wins the slot.
//!
//! Responses from a panicking handler are never stored: the capture is
//! discarded while the panic unwinds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use http::Method;
use tracing::error;

use crate::context::Context;
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;
use crate::writer::{BufferWriter, CaptureSlot, Captured};

pub type KeyGenerator = Arc<dyn Fn(&Context) -> String + Send + Sync>;

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    pub expiration: Duration,
    /// Defaults to method followed by path, e.g. `GET/users`.
    pub key_generator: KeyGenerator,
    /// Upper bound on stored responses.
    pub max_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip: None,
            expiration: Duration::from_secs(5 * 60),
            key_generator: Arc::new(|c: &Context| format!("{}{}", c.method(), c.path())),
            max_entries: 1024,
        }
    }
}

struct Entry {
    response: Captured,
    created_at: Instant,
}

struct Store {
    expiration: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Store {
    fn get(&self, key: &str, now: Instant) -> Option<Captured> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if now.duration_since(entry.created_at) < self.expiration => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: String, response: Captured, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let expiration = self.expiration;
            entries.retain(|_, e| now.duration_since(e.created_at) < expiration);
            if entries.len() >= self.max_entries {
                let oldest = entries.iter().min_by_key(|(_, e)| e.created_at).map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key, Entry { response, created_at: now });
    }
}

pub fn new(config: Config) -> Middleware {
    let store = Arc::new(Store {
        expiration: config.expiration,
        max_entries: config.max_entries.max(1),
        entries: Mutex::new(HashMap::new()),
    });

    middleware_fn(move |next| {
        let store = Arc::clone(&store);
        let config = config.clone();
        handler_fn(move |c| {
            if skipped(&config.skip, c) || *c.method() != Method::GET {
                return next(c);
            }

            let key = (config.key_generator)(c);
            let captured = match store.get(&key, Instant::now()) {
                Some(hit) => hit,
                None => {
                    let slot = CaptureSlot::default();
                    {
                        let mut scope = c.wrap_writer(|inner| Box::new(BufferWriter::new(inner, Arc::clone(&slot))));
                        next(&mut scope);
                    }
                    let Some(captured) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() else {
                        return;
                    };
                    store.put(key, captured.clone(), Instant::now());
                    captured
                }
            };

            if let Err(e) = captured.replay(c.writer_mut()) {
                error!(path = %c.path(), "could not replay cached response: {e}");
            }
        })
    })
}
