//! HTTP Basic authentication.

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};

use crate::context::Context;
use crate::encoding::{base64_decode, constant_time_eq};
use crate::error::Error;
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

/// Context key holding the authenticated user name.
pub const USER_KEY: &str = "user";

pub type Validator = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Either `users` or `validator` must be provided; the validator wins when both are.
#[derive(Clone)]
pub struct Config {
    pub skip: Option<Skipper>,
    pub users: HashMap<String, String>,
    pub validator: Option<Validator>,
    pub realm: String,
}

impl Default for Config {
    fn default() -> Self {
        Self { skip: None, users: HashMap::new(), validator: None, realm: "Restricted".to_owned() }
    }
}

impl Config {
    fn accepts(&self, user: &str, password: &str) -> bool {
        match &self.validator {
            Some(validator) => validator(user, password),
            None => self
                .users
                .get(user)
                .is_some_and(|expected| constant_time_eq(expected.as_bytes(), password.as_bytes())),
        }
    }
}

/// Fails with [`Error::InvalidConfig`] when no credentials source is configured.
pub fn new(config: Config) -> Result<Middleware, Error> {
    if config.users.is_empty() && config.validator.is_none() {
        return Err(Error::InvalidConfig("basic auth needs `users` or a `validator`".to_owned()));
    }
    let challenge = format!("Basic realm=\"{}\"", config.realm);

    Ok(middleware_fn(move |next| {
        let config = config.clone();
        let challenge = challenge.clone();
        handler_fn(move |c| {
            if skipped(&config.skip, c) {
                return next(c);
            }
            match credentials(c) {
                Some((user, password)) if config.accepts(&user, &password) => {
                    c.set(USER_KEY, user);
                    next(c);
                }
                _ => {
                    c.set_header(WWW_AUTHENTICATE, &challenge);
                    c.text(StatusCode::UNAUTHORIZED, "Unauthorized");
                }
            }
        })
    }))
}

fn credentials(c: &Context) -> Option<(String, String)> {
    let header = c.request().headers().get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(base64_decode(encoded)?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_owned(), password.to_owned()))
}
