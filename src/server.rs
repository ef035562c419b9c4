//! HTTP server and graceful shutdown.
//!
//! # Execution model
//!
//! Each connection runs on its own tokio task, served by `hyper_util`'s auto
//! builder (HTTP/1.1 or HTTP/2, whatever the client negotiates). For every
//! request the body is collected first, then the whole handler pipeline runs
//! on a blocking-pool thread so handlers may block freely.
//!
//! A panic that escapes the pipeline (no recovery middleware installed)
//! becomes a service error, and hyper closes that connection.
//!
//! # Graceful shutdown
//!
//! The server stops on SIGTERM, Ctrl-C, or [`ShutdownHandle::shutdown`]:
//! 1. It stops accepting new connections.
//! 2. Open connections are told to finish their in-flight request and close.
//! 3. [`Server::serve`] returns once every connection task is done.
//!
//! When running under Kubernetes, set `terminationGracePeriodSeconds` longer
//! than your slowest request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info};

use crate::app::App;
use crate::error::Error;
use crate::request::Request;

/// Binds an address and serves an [`App`] on it.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Parses `addr` as `host:port`.
    ///
    /// ```rust,no_run
    /// # async fn run(app: kite::App) -> Result<(), kite::Error> {
    /// kite::Server::bind("0.0.0.0:3000")?.serve(app).await
    /// # }
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse().map_err(|_| Error::InvalidAddress(addr.to_owned()))?;
        Ok(Self { addr })
    }

    /// Serves `app` until a shutdown signal arrives and in-flight connections drain.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        run(listener, app).await
    }
}

// ── Shutdown handle ───────────────────────────────────────────────────────────

/// Stops a running server from elsewhere in the program.
///
/// Obtained from [`App::shutdown_handle`] before the app is moved into the
/// server. Cloning is cheap; all clones control the same server.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<ShutdownState>,
}

struct ShutdownState {
    requested: Notify,
    running: AtomicBool,
    stopped: watch::Sender<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            inner: Arc::new(ShutdownState { requested: Notify::new(), running: AtomicBool::new(false), stopped }),
        }
    }
}

impl ShutdownHandle {
    /// Asks the server to stop. Returns without waiting for the drain.
    pub fn shutdown(&self) -> Result<(), Error> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        self.inner.requested.notify_one();
        Ok(())
    }

    /// Asks the server to stop and waits up to `timeout` for it to finish.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), Error> {
        let mut stopped = self.inner.stopped.subscribe();
        self.shutdown()?;
        match tokio::time::timeout(timeout, stopped.wait_for(|&done| done)).await {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::ShutdownTimeout(timeout)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Resolves once a server using this handle has fully stopped.
    pub async fn stopped(&self) {
        let mut stopped = self.inner.stopped.subscribe();
        let _ = stopped.wait_for(|&done| done).await;
    }

    fn start(&self) {
        self.inner.stopped.send_replace(false);
        self.inner.running.store(true, Ordering::Release);
    }

    fn finish(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.stopped.send_replace(true);
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

pub(crate) async fn run(listener: TcpListener, app: App) -> Result<(), Error> {
    let local_addr = listener.local_addr()?;
    let handle = app.shutdown_handle();

    if !app.config().disable_startup_message {
        let name = if app.config().app_name.is_empty() { "kite" } else { app.config().app_name.as_str() };
        info!(addr = %local_addr, app = name, routes = app.router().routes().count(), "listening");
    }

    let app = Arc::new(app);
    let mut tasks = tokio::task::JoinSet::new();
    // Flipped to true once; every connection task watches it.
    let (draining, _) = watch::channel(false);

    let signal = shutdown_signal();
    tokio::pin!(signal);
    let requested = handle.inner.requested.notified();
    tokio::pin!(requested);
    handle.start();

    loop {
        tokio::select! {
            biased;

            () = &mut signal => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            () = &mut requested => {
                info!(in_flight = tasks.len(), "shutdown requested, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let app = Arc::clone(&app);
                let mut draining = draining.subscribe();
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    let svc = service_fn(move |req| dispatch(Arc::clone(&app), req, remote_addr));
                    let builder = ConnBuilder::new(TokioExecutor::new());
                    let conn = builder.serve_connection(io, svc);
                    tokio::pin!(conn);

                    let result = tokio::select! {
                        res = conn.as_mut() => res,
                        _ = draining.changed() => {
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                    };
                    if let Err(e) = result {
                        debug!(peer = %remote_addr, "connection closed with error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    draining.send_replace(true);
    while tasks.join_next().await.is_some() {}

    handle.finish();
    info!("server stopped");
    Ok(())
}

// ── Request dispatch ──────────────────────────────────────────────────────────

async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    let request = Request::from_parts(parts, body).with_remote_addr(remote_addr);

    let response = tokio::task::spawn_blocking(move || app.handle_request(request))
        .await
        .map_err(|e| {
            error!(peer = %remote_addr, "unrecovered handler fault: {e}");
            Error::HandlerFault(e.to_string())
        })?;

    Ok(response.map(Full::new))
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. If a handler cannot be installed
/// the failure is logged and that signal is never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
