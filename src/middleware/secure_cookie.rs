//! Encrypted session cookies.
//!
//! The cookie carries a string map sealed with AES-256-GCM: a fresh 12-byte
//! nonce, then the ciphertext of the map's JSON, URL-safe base64 encoded. The
//! middleware opens the cookie on the way in and exposes the map through
//! [`get`]; handlers store a new map with [`set`] and drop it with [`clear`].
//! A cookie that fails to open (tampered, truncated, or sealed under another
//! key) is logged, expired on the client, and treated as absent.
//!
//! ```
//! use std::collections::HashMap;
//!
//! use kite::middleware::secure_cookie::{self, Config};
//! use kite::{App, Context, StatusCode};
//!
//! let mut app = App::new();
//! app.use_middleware(secure_cookie::new(Config::new("00".repeat(32))).unwrap());
//! app.post("/login", |c: &mut Context| {
//!     let session = HashMap::from([("user".to_owned(), "alice".to_owned())]);
//!     if let Err(e) = secure_cookie::set(c, &session) {
//!         return c.error(e);
//!     }
//!     c.status(StatusCode::NO_CONTENT);
//! })
//! .unwrap();
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use tracing::warn;

use crate::context::Context;
use crate::cookie::{Cookie, SameSite};
use crate::encoding::{base64_url_decode, base64_url_encode, hex_decode, random_bytes};
use crate::error::Error;
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

const NONCE_LEN: usize = 12;
const VALUES_KEY: &str = "secure-cookie-data";
const SEALER_KEY: &str = "secure-cookie-instance";

pub type Values = HashMap<String, String>;

#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    /// 64 hex digits: the 32-byte AES-256 key.
    pub key: String,
    pub cookie_name: String,
    pub path: String,
    pub ttl: Duration,
    pub same_site: SameSite,
}

impl Config {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(), ..Self::default() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip: None,
            key: String::new(),
            cookie_name: "session".to_owned(),
            path: "/".to_owned(),
            ttl: Duration::from_secs(12 * 60 * 60),
            same_site: SameSite::Lax,
        }
    }
}

struct Sealer {
    cipher: Aes256Gcm,
    cookie_name: String,
    path: String,
    ttl: Duration,
    same_site: SameSite,
}

impl Sealer {
    fn seal(&self, values: &Values) -> Result<String, Error> {
        let plaintext = serde_json::to_vec(values)?;
        let mut sealed = random_bytes(NONCE_LEN);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&sealed), plaintext.as_slice())
            .map_err(|_| Error::SecureCookie("encryption failed"))?;
        sealed.extend_from_slice(&ciphertext);
        Ok(base64_url_encode(&sealed))
    }

    fn open(&self, encoded: &str) -> Option<Values> {
        let sealed = base64_url_decode(encoded)?;
        if sealed.len() < NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?;
        serde_json::from_slice(&plaintext).ok()
    }

    fn cookie(&self, value: String, max_age: i64) -> Cookie {
        Cookie::new(&self.cookie_name, value)
            .path(&self.path)
            .max_age(max_age)
            .http_only(true)
            .secure(true)
            .same_site(self.same_site)
    }

    fn expired(&self) -> Cookie {
        self.cookie(String::new(), -1)
    }
}

/// Fails with [`Error::InvalidConfig`] unless `key` is 64 hex digits.
pub fn new(config: Config) -> Result<Middleware, Error> {
    let key = hex_decode(&config.key).ok_or_else(|| Error::InvalidConfig("secure cookie key must be hex".into()))?;
    if key.len() != 32 {
        return Err(Error::InvalidConfig("secure cookie key must be 32 bytes (AES-256)".into()));
    }
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    let sealer = Arc::new(Sealer {
        cipher,
        cookie_name: config.cookie_name,
        path: config.path,
        ttl: config.ttl,
        same_site: config.same_site,
    });
    let skip = config.skip;

    Ok(middleware_fn(move |next| {
        let sealer = Arc::clone(&sealer);
        let skip = skip.clone();
        handler_fn(move |c| {
            if skipped(&skip, c) {
                return next(c);
            }
            if let Some(raw) = c.cookie(&sealer.cookie_name).map(str::to_owned) {
                match sealer.open(&raw) {
                    Some(values) => c.set(VALUES_KEY, values),
                    None => {
                        warn!(cookie = %sealer.cookie_name, "failed to decrypt cookie");
                        c.set_cookie(&sealer.expired());
                    }
                }
            }
            c.set(SEALER_KEY, Arc::clone(&sealer));
            next(c);
        })
    }))
}

/// The map carried by the request's cookie, if it opened.
pub fn get(c: &Context) -> Option<&Values> {
    c.get::<Values>(VALUES_KEY)
}

/// Seals `values` into the response cookie.
pub fn set(c: &mut Context, values: &Values) -> Result<(), Error> {
    let sealer = installed(c)?;
    let sealed = sealer.seal(values)?;
    let max_age = i64::try_from(sealer.ttl.as_secs()).unwrap_or(i64::MAX);
    c.set_cookie(&sealer.cookie(sealed, max_age));
    c.set(VALUES_KEY, values.clone());
    Ok(())
}

/// Expires the cookie on the client.
pub fn clear(c: &mut Context) -> Result<(), Error> {
    let sealer = installed(c)?;
    c.set_cookie(&sealer.expired());
    c.remove(VALUES_KEY);
    Ok(())
}

fn installed(c: &Context) -> Result<Arc<Sealer>, Error> {
    c.get::<Arc<Sealer>>(SEALER_KEY).cloned().ok_or(Error::SecureCookie("middleware not installed"))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::handler::{BoxedHandler, compose};
    use crate::testing::{context, get as get_request, request};

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn login() -> BoxedHandler {
        handler_fn(|c| {
            let values = HashMap::from([("user".to_owned(), "alice".to_owned())]);
            set(c, &values).unwrap();
            c.status(StatusCode::NO_CONTENT);
        })
    }

    fn whoami() -> BoxedHandler {
        handler_fn(|c| {
            let user = get(c).and_then(|v| v.get("user")).cloned().unwrap_or_else(|| "nobody".to_owned());
            c.text(StatusCode::OK, &user);
        })
    }

    fn session_cookie(response: &http::Response<Bytes>) -> String {
        let header = response.headers()["set-cookie"].to_str().unwrap();
        header.split(';').next().unwrap().to_owned()
    }

    fn with_cookie(cookie: &str) -> http::Request<Bytes> {
        request("GET", "/me").header("cookie", cookie).body(Bytes::new()).unwrap()
    }

    #[test]
    fn sealed_values_come_back() {
        let mw = new(Config::new(KEY)).unwrap();
        let mut c = context(get_request("/login"));
        compose(&[mw.clone()], login())(&mut c);
        let response = c.finish();
        let header = response.headers()["set-cookie"].to_str().unwrap();
        assert!(header.starts_with("session="));
        assert!(header.ends_with("; Path=/; Max-Age=43200; Secure; HttpOnly; SameSite=Lax"));
        assert!(!header.contains("alice"));

        let mut c = context(with_cookie(&session_cookie(&response)));
        compose(&[mw], whoami())(&mut c);
        assert_eq!(c.finish().body().as_ref(), b"alice");
    }

    #[test]
    fn tampered_cookie_is_expired_and_ignored() {
        let mw = new(Config::new(KEY)).unwrap();
        let mut c = context(get_request("/login"));
        compose(&[mw.clone()], login())(&mut c);
        let cookie = session_cookie(&c.finish());
        let tampered = format!("{}A", &cookie[..cookie.len() - 1]);
        let tampered = if tampered == cookie { format!("{}B", &cookie[..cookie.len() - 1]) } else { tampered };

        let mut c = context(with_cookie(&tampered));
        compose(&[mw], whoami())(&mut c);
        let response = c.finish();
        assert_eq!(response.body().as_ref(), b"nobody");
        assert_eq!(
            response.headers()["set-cookie"],
            "session=; Path=/; Max-Age=0; Secure; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn other_key_cannot_open() {
        let mut c = context(get_request("/login"));
        compose(&[new(Config::new(KEY)).unwrap()], login())(&mut c);
        let cookie = session_cookie(&c.finish());

        let other = new(Config::new("ff".repeat(32))).unwrap();
        let mut c = context(with_cookie(&cookie));
        compose(&[other], whoami())(&mut c);
        assert_eq!(c.finish().body().as_ref(), b"nobody");
    }

    #[test]
    fn clear_expires_the_cookie() {
        let mw = new(Config::new(KEY)).unwrap();
        let mut c = context(get_request("/logout"));
        compose(&[mw], handler_fn(|c| clear(c).unwrap()))(&mut c);
        assert!(c.finish().headers()["set-cookie"].to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn helpers_need_the_middleware() {
        let mut c = context(get_request("/"));
        assert!(matches!(set(&mut c, &Values::new()), Err(Error::SecureCookie(_))));
        assert!(matches!(clear(&mut c), Err(Error::SecureCookie(_))));
        assert!(get(&c).is_none());
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(matches!(new(Config::new("abcd")), Err(Error::InvalidConfig(_))));
        assert!(matches!(new(Config::new("zz".repeat(32))), Err(Error::InvalidConfig(_))));
        assert!(matches!(new(Config::default()), Err(Error::InvalidConfig(_))));
    }
}
