//! TCP gateway server.

use crate::error::GatewayError;
use crate::session::{Session, SessionOptions};
use crate::Result;
use linebox_core::{Config, SessionIds};
use linebox_sandbox::ModuleHost;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 1997;

/// Pause after the process runs out of file descriptors, before accepting again.
const FD_EXHAUSTION_BACKOFF: Duration = Duration::from_millis(100);

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to listen on.
    pub bind: SocketAddr,

    /// Maximum concurrently served connections.
    pub max_sessions: usize,

    /// Per-connection behavior.
    pub session: SessionOptions,

    /// How long shutdown waits for in-flight sessions.
    pub shutdown_grace: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            max_sessions: 256,
            session: SessionOptions::default(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    /// Build the gateway configuration from the server section of `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let bind = config
            .bind_addr()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        if config.server.max_sessions == 0 {
            return Err(GatewayError::Config(
                "server.max_sessions must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind,
            max_sessions: config.server.max_sessions,
            session: SessionOptions::from(&config.server),
            shutdown_grace: Duration::from_secs(config.server.shutdown_grace_secs),
        })
    }
}

/// Gateway server state.
struct GatewayState {
    /// Compiled module shared by every session.
    host: Arc<ModuleHost>,

    /// Configuration.
    config: GatewayConfig,

    /// Session id allocator.
    session_ids: SessionIds,

    /// One permit per served connection.
    permits: Arc<Semaphore>,

    /// Sessions currently running.
    active: AtomicUsize,
}

/// A running session's admission permit.
struct SessionSlot {
    state: Arc<GatewayState>,
    _permit: OwnedSemaphorePermit,
}

impl SessionSlot {
    fn new(state: Arc<GatewayState>, permit: OwnedSemaphorePermit) -> Self {
        state.active.fetch_add(1, Ordering::SeqCst);
        Self {
            state,
            _permit: permit,
        }
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accepts connections and serves each in its own task.
#[derive(Clone)]
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a new gateway around a compiled module.
    pub fn new(config: GatewayConfig, host: Arc<ModuleHost>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_sessions.max(1)));
        Self {
            state: Arc::new(GatewayState {
                host,
                config,
                session_ids: SessionIds::new(),
                permits,
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.state.config.bind;

        if !addr.ip().is_loopback() {
            warn!("========================================");
            warn!("  Gateway binding to {}", addr);
            warn!("  Any host that can reach it may run the module.");
            warn!("========================================");
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;

        let local = listener.local_addr().unwrap_or(addr);
        info!("Listening on {}", local);
        Ok(listener)
    }

    /// Bind and serve until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve an already bound listener until it fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then wait for in-flight sessions.
    ///
    /// A connection is only accepted once a session slot is free, so excess
    /// clients wait in the listen backlog instead of being dropped.
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.state.permits.clone().acquire_owned() => permit
                    .map_err(|_| GatewayError::Internal("Session gate closed".to_string()))?,
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) if is_transient(&e) => {
                        warn!(error = %e, "Accept failed, continuing");
                        if is_fd_exhaustion(&e) {
                            tokio::time::sleep(FD_EXHAUSTION_BACKOFF).await;
                        }
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "Listener failed");
                        return Err(GatewayError::Listener(e));
                    }
                },
            };

            self.dispatch(stream, peer, permit);
        }

        drop(listener);
        info!("Shutting down, no longer accepting connections");
        self.drain().await;
        Ok(())
    }

    /// Number of sessions currently being served.
    pub fn active_sessions(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Module host shared by every session.
    pub fn host(&self) -> &Arc<ModuleHost> {
        &self.state.host
    }

    /// Gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    fn max_sessions(&self) -> usize {
        self.state.config.max_sessions.max(1)
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr, permit: OwnedSemaphorePermit) {
        let id = self.state.session_ids.next_id();
        let slot = SessionSlot::new(self.state.clone(), permit);
        let span = info_span!("session", session = %id, %peer);

        tokio::spawn(
            async move {
                debug!("Session opened");

                let state = &slot.state;
                let session = Session::new(id, peer, stream);
                match session.run(&state.host, &state.config.session).await {
                    Ok(summary) => info!(units = summary.units, "Session closed"),
                    Err(e) if e.is_client_fault() => warn!(error = %e, "Session closed early"),
                    Err(e) if e.is_guest_fault() => warn!(error = %e, "Unit failed"),
                    Err(e) => error!(error = %e, "Session failed"),
                }
            }
            .instrument(span),
        );
    }

    async fn drain(&self) {
        let active = self.active_sessions();
        if active == 0 {
            return;
        }

        let grace = self.state.config.shutdown_grace;
        info!(active, grace_secs = grace.as_secs(), "Waiting for in-flight sessions");

        let all = u32::try_from(self.max_sessions()).unwrap_or(u32::MAX);
        match tokio::time::timeout(grace, self.state.permits.acquire_many(all)).await {
            Ok(_) => info!("All sessions finished"),
            Err(_) => warn!(
                remaining = self.active_sessions(),
                "Grace period elapsed with sessions still running"
            ),
        }
    }
}

/// Accept errors that concern a single connection or a passing resource shortage.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || is_fd_exhaustion(err)
}

#[cfg(unix)]
fn is_fd_exhaustion(err: &io::Error) -> bool {
    // ENFILE, EMFILE
    matches!(err.raw_os_error(), Some(23) | Some(24))
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_err: &io::Error) -> bool {
    false
}
