//! Answers `/favicon.ico` so browsers' automatic requests never reach routing.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::StatusCode;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::skipped;

pub const FAVICON_PATH: &str = "/favicon.ico";

#[derive(Clone, Default)]
pub struct Config {
    pub skip: Option<Skipper>,
    /// Icon served directly. Takes precedence over `file`.
    pub data: Option<Bytes>,
    pub file: Option<PathBuf>,
    /// Read `file` once at construction instead of on every request.
    pub cache: bool,
    /// Sent as `Cache-Control` when non-empty.
    pub cache_control: String,
}

#[derive(Clone)]
enum Source {
    Empty,
    Memory { content_type: &'static str, body: Bytes },
    Disk { content_type: &'static str, path: PathBuf },
}

/// `image/png` and `image/svg+xml` by extension, `image/x-icon` otherwise.
fn sniff(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        _ => "image/x-icon",
    }
}

/// Fails when `cache` is set and `file` cannot be read.
pub fn new(config: Config) -> Result<Middleware, Error> {
    let source = match (&config.data, &config.file) {
        (Some(body), _) => Source::Memory { content_type: "image/x-icon", body: body.clone() },
        (None, Some(path)) if config.cache => {
            let body = std::fs::read(path)?;
            Source::Memory { content_type: sniff(path), body: Bytes::from(body) }
        }
        (None, Some(path)) => Source::Disk { content_type: sniff(path), path: path.clone() },
        (None, None) => Source::Empty,
    };
    let skip = config.skip;
    let cache_control = config.cache_control;

    Ok(middleware_fn(move |next| {
        let source = source.clone();
        let skip = skip.clone();
        let cache_control = cache_control.clone();
        handler_fn(move |c| {
            if skipped(&skip, c) || c.path() != FAVICON_PATH {
                return next(c);
            }
            serve(c, &source, &cache_control);
        })
    }))
}

fn serve(c: &mut Context, source: &Source, cache_control: &str) {
    let (content_type, body) = match source {
        Source::Empty => {
            c.status(StatusCode::NO_CONTENT);
            return;
        }
        Source::Memory { content_type, body } => (*content_type, body.clone()),
        Source::Disk { content_type, path } => match std::fs::read(path) {
            Ok(body) => (*content_type, Bytes::from(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                c.text(StatusCode::NOT_FOUND, "Not Found");
                return;
            }
            Err(e) => {
                c.error(format!("could not read favicon {}: {e}", path.display()));
                return;
            }
        },
    };
    if !cache_control.is_empty() {
        c.set_header(CACHE_CONTROL, cache_control);
    }
    c.set_header(CONTENT_TYPE, content_type);
    c.write(&body);
}
