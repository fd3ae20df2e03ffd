//! HTTPS server, routing, and middleware.
//!
//! # Responsibilities
//! - Build and bind the TLS listener.
//! - Define the Axum router with all routes and the request pipeline.
//! - Inject shared application state ([`state::AppState`]) into handlers.
//! - Stop accepting on `SIGINT`/`SIGTERM` or [`ServerHandle::shutdown`] and
//!   drain in-flight connections within a bounded grace period.
//!
//! # Lifecycle
//!
//! ```text
//! Constructed ──start──▶ Listening ──signal/shutdown──▶ Draining ──▶ Stopped
//! ```
//!
//! The first trigger wins: it fixes the grace period and cancels the shared
//! [`CancellationToken`]. Every later trigger only waits for `Stopped`.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
pub mod tls;

use std::{
    future::Future,
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    service::TowerToHyperService,
};
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream},
    signal,
    sync::watch,
    task::JoinSet,
};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use middleware::{PolicyError, PolicyLinks};
use state::AppState;
use tls::TlsError;

/// Time allowed for a client to complete the TLS handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for a client to send a complete request head.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after the first failed accept; doubled per consecutive failure.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Failures that stop the server from starting or draining cleanly.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connections were still open when the grace period elapsed")]
    DrainTimedOut,
}

/// Observable server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Constructed,
    Listening(SocketAddr),
    Draining,
    /// `clean` is false when the grace period cut connections short.
    Stopped { clean: bool },
}

/// A TLS-terminating HTTP/1.1 server, started exactly once.
pub struct Server {
    /// `host:port`; the host may be a name, resolved at bind time.
    addr: String,
    acceptor: TlsAcceptor,
    router: Router,
    grace: Duration,
    token: CancellationToken,
    deadline: Arc<OnceLock<Duration>>,
    phase: watch::Sender<Phase>,
}

/// Cloneable control surface for a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    token: CancellationToken,
    deadline: Arc<OnceLock<Duration>>,
    phase: watch::Receiver<Phase>,
}

impl Server {
    pub fn new(
        addr: impl Into<String>,
        tls: Arc<rustls::ServerConfig>,
        router: Router,
        grace: Duration,
    ) -> Self {
        let (phase, _) = watch::channel(Phase::Constructed);
        Self {
            addr: addr.into(),
            acceptor: TlsAcceptor::from(tls),
            router,
            grace,
            token: CancellationToken::new(),
            deadline: Arc::new(OnceLock::new()),
            phase,
        }
    }

    /// Load TLS material, validate the policy links, and build the routes.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the TLS material or a policy link is invalid.
    pub fn from_config(cfg: &Config, state: AppState) -> Result<Self, ServerError> {
        let tls = tls::load(&cfg.server.tls)?;
        let links = PolicyLinks::new(&cfg.privacy_policy, &cfg.terms_of_service)?;
        Ok(Self::new(
            cfg.listen_address(),
            tls,
            router::build(state, &links),
            cfg.shutdown_grace(),
        ))
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            token: self.token.clone(),
            deadline: Arc::clone(&self.deadline),
            phase: self.phase.subscribe(),
        }
    }

    /// Bind, serve until `SIGINT`/`SIGTERM` or [`ServerHandle::shutdown`],
    /// then drain.
    ///
    /// Returns once the server has reached [`Phase::Stopped`]. A drain cut
    /// short by the grace period is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be bound.
    pub async fn start(self) -> Result<(), ServerError> {
        self.serve_until(shutdown_signal()).await
    }

    /// [`Server::start`] with `trigger` standing in for the OS signals.
    pub(crate) async fn serve_until<F>(self, trigger: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_err = |source| ServerError::Bind {
            addr: self.addr.clone(),
            source,
        };
        let listener = TcpListener::bind(self.addr.as_str())
            .await
            .map_err(bind_err)?;
        let local = listener.local_addr().map_err(bind_err)?;
        info!(addr = %local, "listening");
        self.phase.send_replace(Phase::Listening(local));

        let watcher = tokio::spawn(watch_signals(
            trigger,
            self.token.clone(),
            Arc::clone(&self.deadline),
            self.grace,
        ));

        let mut connections = JoinSet::new();
        let mut backoff = None;
        loop {
            tokio::select! {
                () = self.token.cancelled() => break,
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "connection task failed");
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        backoff = None;
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            self.acceptor.clone(),
                            self.router.clone(),
                            self.token.clone(),
                        ));
                    }
                    Err(e) => {
                        let delay = next_backoff(backoff);
                        backoff = Some(delay);
                        warn!(
                            error = %e,
                            retry_ms = delay.as_millis() as u64,
                            "failed to accept connection"
                        );
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            () = self.token.cancelled() => {}
                        }
                    }
                },
            }
        }

        watcher.abort();
        drop(listener);

        let grace = *self.deadline.get_or_init(|| self.grace);
        self.phase.send_replace(Phase::Draining);
        info!(
            open_connections = connections.len(),
            grace_ms = grace.as_millis() as u64,
            "draining"
        );

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = connections.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "connection task failed");
                }
            }
        })
        .await;

        let clean = drained.is_ok();
        if !clean {
            warn!(
                open_connections = connections.len(),
                "grace period elapsed; closing remaining connections"
            );
            connections.shutdown().await;
        }

        self.phase.send_replace(Phase::Stopped { clean });
        info!(clean, "server stopped");
        Ok(())
    }
}

impl ServerHandle {
    /// Stop accepting and drain within `deadline`, unless an earlier trigger
    /// already fixed the grace period.
    ///
    /// Returns immediately if the server is no longer running.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DrainTimedOut`] if connections had to be cut.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ServerError> {
        if self.deadline.set(deadline).is_ok() {
            info!(deadline_ms = deadline.as_millis() as u64, "shutdown requested");
        }
        self.token.cancel();

        let mut phase = self.phase.clone();
        let Ok(stopped) = phase
            .wait_for(|p| matches!(p, Phase::Stopped { .. }))
            .await
        else {
            return Ok(());
        };
        match *stopped {
            Phase::Stopped { clean: false } => Err(ServerError::DrainTimedOut),
            _ => Ok(()),
        }
    }

    /// Wait until the server has bound its listener.
    ///
    /// Returns `None` if the server stopped or was dropped without listening.
    pub async fn listening(&self) -> Option<SocketAddr> {
        let mut phase = self.phase.clone();
        let current = phase
            .wait_for(|p| !matches!(p, Phase::Constructed))
            .await
            .ok()?;
        match *current {
            Phase::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }
}

/// Terminate TLS and serve HTTP/1.1 on one accepted connection.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    router: Router,
    token: CancellationToken,
) {
    let tls = match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            debug!(%peer, "TLS handshake timed out");
            return;
        }
    };

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT)
        .serve_connection(TokioIo::new(tls), TowerToHyperService::new(router));
    let mut conn = std::pin::pin!(conn);

    let served = tokio::select! {
        served = conn.as_mut() => served,
        () = token.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };
    if let Err(e) = served {
        debug!(%peer, error = %e, "connection closed with error");
    }
}

fn next_backoff(previous: Option<Duration>) -> Duration {
    previous.map_or(ACCEPT_BACKOFF_MIN, |d| (d * 2).min(ACCEPT_BACKOFF_MAX))
}

/// Cancel `token` once `trigger` completes, fixing the default grace period.
async fn watch_signals<F>(
    trigger: F,
    token: CancellationToken,
    deadline: Arc<OnceLock<Duration>>,
    grace: Duration,
) where
    F: Future<Output = ()>,
{
    tokio::select! {
        () = trigger => {
            deadline.get_or_init(|| grace);
            token.cancel();
        }
        () = token.cancelled() => {}
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }
}
