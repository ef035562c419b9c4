//! Response-writer decorators.
//!
//! A decorator is installed with [`Context::wrap_writer`], which owns the
//! previous writer inside the new one and returns a [`WriterScope`]. While the
//! scope lives, everything written through the context passes through the
//! decorator. When the scope drops (normally or while a panic unwinds) the
//! decorator is peeled off and the inner writer is put back.
//!
//! Decorators are dropped at that point, so anything a middleware wants to
//! read afterwards is shared through an `Arc`:
//!
//! - [`StatsWriter`] forwards everything and records status and size into
//!   [`ResponseStats`].
//! - [`BufferWriter`] forwards nothing. It keeps status, header changes, and
//!   body and hands them over as a [`Captured`] snapshot that can be replayed
//!   later.

use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::context::Context;
use crate::response::ResponseWriter;

/// Keeps a decorator installed on a [`Context`] until dropped.
///
/// Derefs to the context, so it can be passed straight to the next handler.
pub struct WriterScope<'a> {
    ctx: &'a mut Context,
}

impl<'a> WriterScope<'a> {
    pub(crate) fn new(ctx: &'a mut Context) -> Self {
        Self { ctx }
    }
}

impl Deref for WriterScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for WriterScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for WriterScope<'_> {
    fn drop(&mut self) {
        self.ctx.pop_writer();
    }
}

// ── Status and size ───────────────────────────────────────────────────────────

/// Status and body size observed by a [`StatsWriter`].
#[derive(Debug, Default)]
pub struct ResponseStats {
    status: AtomicU16,
    size: AtomicUsize,
}

impl ResponseStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The first status written, `200` if the handler never set one.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status.load(Ordering::Relaxed)).unwrap_or(StatusCode::OK)
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    fn record_status(&self, status: StatusCode) {
        // First call wins.
        let _ = self.status.compare_exchange(0, status.as_u16(), Ordering::Relaxed, Ordering::Relaxed);
    }
}

pub struct StatsWriter {
    inner: Box<dyn ResponseWriter>,
    stats: Arc<ResponseStats>,
}

impl StatsWriter {
    pub fn new(inner: Box<dyn ResponseWriter>, stats: Arc<ResponseStats>) -> Self {
        Self { inner, stats }
    }
}

impl ResponseWriter for StatsWriter {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.stats.record_status(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stats.record_status(StatusCode::OK);
        let n = self.inner.write(buf)?;
        self.stats.size.fetch_add(n, Ordering::Relaxed);
        Ok(n)
    }

    fn status(&self) -> Option<StatusCode> {
        self.inner.status()
    }

    fn bytes_written(&self) -> usize {
        self.inner.bytes_written()
    }

    fn unwrap_layer(self: Box<Self>) -> Result<Box<dyn ResponseWriter>, Box<dyn ResponseWriter>> {
        Ok(self.inner)
    }

    fn finish(self: Box<Self>) -> http::Response<Bytes> {
        self.inner.finish()
    }
}

// ── Buffering ─────────────────────────────────────────────────────────────────

/// A complete response held in memory.
///
/// Only header changes made behind the buffer are kept: `headers` replaces
/// whole names, `appended` adds values after whatever the target writer
/// already holds, and `removed` lists names that were deleted.
#[derive(Clone, Debug, Default)]
pub struct Captured {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub appended: HeaderMap,
    pub removed: Vec<HeaderName>,
    pub body: Bytes,
}

impl Captured {
    /// Diffs the headers a buffer ended with against those it started from.
    fn diff(status: StatusCode, seed: &HeaderMap, current: &HeaderMap, body: Bytes) -> Self {
        let mut captured = Self { status, body, ..Self::default() };
        for name in current.keys() {
            let before: Vec<&HeaderValue> = seed.get_all(name).iter().collect();
            let after: Vec<&HeaderValue> = current.get_all(name).iter().collect();
            if before == after {
                continue;
            }
            let (target, added) = if after.starts_with(&before) {
                (&mut captured.appended, &after[before.len()..])
            } else {
                (&mut captured.headers, &after[..])
            };
            for value in added {
                target.append(name.clone(), (*value).clone());
            }
        }
        captured.removed = seed.keys().filter(|name| !current.contains_key(*name)).cloned().collect();
        captured
    }

    /// Writes the snapshot onto `writer` in one burst.
    pub fn replay(&self, writer: &mut dyn ResponseWriter) -> io::Result<()> {
        let live = writer.headers_mut();
        for name in self.removed.iter().chain(self.headers.keys()) {
            live.remove(name);
        }
        for (name, value) in self.headers.iter().chain(&self.appended) {
            live.append(name.clone(), value.clone());
        }
        writer.write_header(self.status);
        if !self.body.is_empty() {
            writer.write(&self.body)?;
        }
        Ok(())
    }
}

/// Slot a [`BufferWriter`] deposits its snapshot into when peeled off.
pub type CaptureSlot = Arc<Mutex<Option<Captured>>>;

pub struct BufferWriter {
    inner: Box<dyn ResponseWriter>,
    status: Option<StatusCode>,
    seed: HeaderMap,
    headers: HeaderMap,
    body: BytesMut,
    slot: CaptureSlot,
}

impl BufferWriter {
    /// Starts from a copy of `inner`'s headers, so handlers behind the buffer
    /// see what outer layers already set.
    pub fn new(inner: Box<dyn ResponseWriter>, slot: CaptureSlot) -> Self {
        let seed = inner.headers().clone();
        Self { inner, status: None, headers: seed.clone(), seed, body: BytesMut::new(), slot }
    }

    fn snapshot(&mut self) -> Captured {
        let body = std::mem::take(&mut self.body).freeze();
        Captured::diff(self.status.unwrap_or(StatusCode::OK), &self.seed, &self.headers, body)
    }
}

impl ResponseWriter for BufferWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn bytes_written(&self) -> usize {
        self.body.len()
    }

    fn unwrap_layer(mut self: Box<Self>) -> Result<Box<dyn ResponseWriter>, Box<dyn ResponseWriter>> {
        let captured = self.snapshot();
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(captured);
        Ok(self.inner)
    }

    fn finish(mut self: Box<Self>) -> http::Response<Bytes> {
        let captured = self.snapshot();
        let mut inner = self.inner;
        if let Err(e) = captured.replay(inner.as_mut()) {
            tracing::error!("could not flush buffered response: {e}");
        }
        inner.finish()
    }
}
