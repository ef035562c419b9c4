//! Access logging.
//!
//! Observes the response through a [`StatsWriter`], then renders one line per
//! request from a template. Recognised tags:
//!
//! | Tag | Value |
//! |---|---|
//! | `${time}` | completion time as an HTTP date |
//! | `${request_id}` | id from the request-id middleware, the `X-Request-ID` header, or freshly generated |
//! | `${status}` | response status code |
//! | `${latency}` | time spent downstream |
//! | `${ip}` | client address |
//! | `${method}` | request method |
//! | `${path}` | request path |
//! | `${proto}` | protocol version, e.g. `HTTP/1.1` |
//! | `${size}` | response body bytes |
//! | `${user_agent}` | `User-Agent` header |
//! | `${error}` | message recorded under the context's `"error"` key |
//!
//! Unknown tags are printed verbatim. Lines from concurrent requests never
//! interleave: each middleware instance serializes its writes. A request whose
//! handler panics is still logged, with status `500` unless one was already
//! sent, before the panic continues outward.

use std::io::{self, Write};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use http::StatusCode;
use tracing::{error, info};

use crate::context::Context;
use crate::encoding::{hex, random_bytes};
use crate::handler::{Middleware, Skipper, handler_fn, middleware_fn};
use crate::middleware::{recovery, request_id, skipped};
use crate::writer::{ResponseStats, StatsWriter};

pub const DEFAULT_FORMAT: &str = "[KITE] ${time} | ${status} | ${latency} | ${ip} | ${method} ${path}\n";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const PURPLE: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Where rendered lines go.
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Emitted as `tracing` events with target `kite::access`. Colors are never applied.
    Tracing,
    Writer(Box<dyn Write + Send>),
}

impl LogOutput {
    pub fn writer(w: impl Write + Send + 'static) -> Self {
        Self::Writer(Box::new(w))
    }

    fn emit(&mut self, line: &str) -> io::Result<()> {
        match self {
            Self::Stdout => io::stdout().lock().write_all(line.as_bytes()),
            Self::Stderr => io::stderr().lock().write_all(line.as_bytes()),
            Self::Tracing => {
                info!(target: "kite::access", "{}", line.trim_end());
                Ok(())
            }
            Self::Writer(w) => {
                w.write_all(line.as_bytes())?;
                w.flush()
            }
        }
    }
}

pub struct Config {
    pub skip: Option<Skipper>,
    pub format: String,
    pub output: LogOutput,
    pub disable_colors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { skip: None, format: DEFAULT_FORMAT.to_owned(), output: LogOutput::Stdout, disable_colors: false }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Tag {
    Time,
    RequestId,
    Status,
    Latency,
    Ip,
    Method,
    Path,
    Proto,
    Size,
    UserAgent,
    Error,
}

impl Tag {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "time" => Self::Time,
            "request_id" => Self::RequestId,
            "status" => Self::Status,
            "latency" => Self::Latency,
            "ip" => Self::Ip,
            "method" => Self::Method,
            "path" => Self::Path,
            "proto" => Self::Proto,
            "size" => Self::Size,
            "user_agent" => Self::UserAgent,
            "error" => Self::Error,
            _ => return None,
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
enum Piece {
    Literal(String),
    Tag(Tag),
}

/// Splits a template into literals and tags once, at construction.
fn compile(format: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut rest = format;
    while let Some(start) = rest.find("${") {
        literal.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}').and_then(|end| Some((end, Tag::parse(&after[..end])?))) {
            Some((end, tag)) => {
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Tag(tag));
                rest = &after[end + 1..];
            }
            None => {
                literal.push_str("${");
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    pieces
}

struct Logger {
    pieces: Vec<Piece>,
    colors: bool,
    output: Mutex<LogOutput>,
}

/// Values of one request, gathered after the handler returns.
struct Entry<'a> {
    c: &'a Context,
    request_id: String,
    status: StatusCode,
    latency: std::time::Duration,
    size: usize,
}

impl Logger {
    fn render(&self, entry: &Entry<'_>) -> String {
        let mut line = String::with_capacity(128);
        let reset = if self.colors { RESET } else { "" };
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => line.push_str(text),
                Piece::Tag(tag) => match tag {
                    Tag::Time => {
                        let mut buf = faf_http_date::get_date_buff_no_key();
                        faf_http_date::get_date_no_key(&mut buf);
                        line.push_str(&String::from_utf8_lossy(&buf));
                    }
                    Tag::RequestId => line.push_str(&entry.request_id),
                    Tag::Status => {
                        let color = if self.colors { status_color(entry.status) } else { "" };
                        line.push_str(&format!("{color}{}{reset}", entry.status.as_u16()));
                    }
                    Tag::Latency => line.push_str(&format!("{:?}", entry.latency)),
                    Tag::Ip => line.push_str(&entry.c.remote_ip()),
                    Tag::Method => {
                        let method = entry.c.method().as_str();
                        let color = if self.colors { method_color(method) } else { "" };
                        line.push_str(&format!("{color}{method}{reset}"));
                    }
                    Tag::Path => line.push_str(entry.c.path()),
                    Tag::Proto => line.push_str(&entry.c.proto()),
                    Tag::Size => line.push_str(&entry.size.to_string()),
                    Tag::UserAgent => line.push_str(entry.c.user_agent()),
                    Tag::Error => line.push_str(entry.c.error_message().unwrap_or("")),
                },
            }
        }
        line
    }

    fn emit(&self, line: &str) {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = output.emit(line) {
            error!("access log write failed: {e}");
        }
    }
}

pub fn new(config: Config) -> Middleware {
    let colors = !config.disable_colors && !matches!(config.output, LogOutput::Tracing);
    let logger = Arc::new(Logger { pieces: compile(&config.format), colors, output: Mutex::new(config.output) });
    let skip = config.skip;

    middleware_fn(move |next| {
        let logger = Arc::clone(&logger);
        let skip = skip.clone();
        handler_fn(move |c| {
            if skipped(&skip, c) {
                return next(c);
            }

            let start = Instant::now();
            let stats = ResponseStats::new();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let mut scope = c.wrap_writer(|inner| Box::new(StatsWriter::new(inner, Arc::clone(&stats))));
                next(&mut scope);
            }));
            let latency = start.elapsed();

            // A panic is logged as the 500 an outer recovery will answer, then
            // keeps unwinding.
            let mut status = stats.status();
            if let Err(payload) = &outcome {
                if !c.writer().header_written() {
                    status = StatusCode::INTERNAL_SERVER_ERROR;
                }
                c.set_error(format!("panic: {}", recovery::panic_message(payload.as_ref())));
            }

            let request_id = c
                .get::<String>(request_id::DEFAULT_CONTEXT_KEY)
                .cloned()
                .or_else(|| c.header(request_id::DEFAULT_HEADER).map(str::to_owned))
                .unwrap_or_else(|| hex(&random_bytes(16)));

            let entry = Entry { c, request_id, status, latency, size: stats.size() };
            let line = logger.render(&entry);
            logger.emit(&line);

            if let Err(payload) = outcome {
                resume_unwind(payload);
            }
        })
    })
}

fn status_color(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => GREEN,
        300..=399 => BLUE,
        400..=499 => YELLOW,
        _ => RED,
    }
}

fn method_color(method: &str) -> &'static str {
    match method {
        "GET" => BLUE,
        "POST" => CYAN,
        "PUT" => YELLOW,
        "DELETE" => RED,
        "PATCH" => PURPLE,
        _ => RESET,
    }
}
