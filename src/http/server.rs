//! HTTP server and admission dispatcher.
//!
//! # Responsibilities
//! - Run the accept loop, paced by the admission limiter
//! - Serve HTTP/1.1 on each accepted connection
//! - Apply admission decisions before any handler runs
//! - Dispatch admitted requests to the handler chain, one slot per request
//! - Spawn the sweeper and apply live policy reloads
//! - Drain connections on shutdown
//!
//! # Exit Paths
//! ```text
//! slot free     → accept fails        → logged, loop continues
//! request admitted → slot acquired    → slot dropped once the handler returns
//!                    (response, handler error/panic, limiter closed)
//! request rejected                    → answered without a slot
//! ```
//!
//! An idle connection, keep-alive or not, holds no slot.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::FutureExt;
use http_body_util::Limited;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use crate::clients::{ClientRegistry, Sweeper};
use crate::config::policy::shared_policy;
use crate::config::{GateConfig, GatePolicy, SharedPolicy};
use crate::http::request::RequestContext;
use crate::http::response;
use crate::net::{accept_any, AdmissionLimiter, ConnectionGuard, ConnectionId, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::routing::{HandlerChain, HandlerProvider};
use crate::security::{Admission, AdmissionGate, DeclaredLength};

/// How long shutdown waits for in-flight connections.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept, so a persistent fault (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("No listeners to serve")]
    NoListeners,
    #[error("Failed to prepare temp directory {path}: {source}")]
    TempDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Live view of a server's state, for reporting.
#[derive(Debug, Clone)]
pub struct GateStatus {
    pub registry: Arc<ClientRegistry>,
    pub limiter: AdmissionLimiter,
    pub tracker: ConnectionTracker,
    pub started_at: Instant,
}

/// Everything a connection task needs, shared across connections.
struct Dispatcher {
    gate: AdmissionGate,
    limiter: AdmissionLimiter,
    tracker: ConnectionTracker,
    handlers: HandlerChain,
    temp_dir: Arc<Path>,
    keep_alive: bool,
    header_timeout: Duration,
}

/// An admission-controlled HTTP server.
///
/// Owns its client registry, live policy and handler chain; nothing is
/// process-global, so several servers can run side by side.
pub struct GateServer {
    config: GateConfig,
    policy: SharedPolicy,
    registry: Arc<ClientRegistry>,
    limiter: AdmissionLimiter,
    tracker: ConnectionTracker,
    handlers: HandlerChain,
    started_at: Instant,
}

impl GateServer {
    /// Create a server with an empty handler chain.
    pub fn new(config: GateConfig) -> Self {
        let policy = shared_policy(&config);
        let limiter = AdmissionLimiter::new(config.server.max_concurrency);

        Self {
            config,
            policy,
            registry: Arc::new(ClientRegistry::new()),
            limiter,
            tracker: ConnectionTracker::new(),
            handlers: HandlerChain::new(),
            started_at: Instant::now(),
        }
    }

    /// Append a handler provider. Providers are consulted in order.
    pub fn with_provider(mut self, provider: impl HandlerProvider + 'static) -> Self {
        self.handlers.push(Arc::new(provider));
        self
    }

    /// Append a shared handler provider.
    pub fn with_shared_provider(mut self, provider: Arc<dyn HandlerProvider>) -> Self {
        self.handlers.push(provider);
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn handlers(&self) -> &HandlerChain {
        &self.handlers
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn policy(&self) -> SharedPolicy {
        Arc::clone(&self.policy)
    }

    pub fn limiter(&self) -> AdmissionLimiter {
        self.limiter.clone()
    }

    pub fn status(&self) -> GateStatus {
        GateStatus {
            registry: self.registry(),
            limiter: self.limiter(),
            tracker: self.tracker.clone(),
            started_at: self.started_at,
        }
    }

    /// Bind every configured listen endpoint.
    pub async fn bind(&self) -> Result<Vec<Listener>, ListenerError> {
        let mut listeners = Vec::with_capacity(self.config.server.listen.len());
        for address in &self.config.server.listen {
            listeners.push(Listener::bind(address).await?);
        }
        Ok(listeners)
    }

    /// Run the accept loop until a shutdown signal arrives.
    pub async fn run(
        self,
        listeners: Vec<Listener>,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        if listeners.is_empty() {
            return Err(ServerError::NoListeners);
        }

        let temp_dir = temp_dir_path(&self.config.server.temp_dir);
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .map_err(|source| ServerError::TempDir {
                path: temp_dir.clone(),
                source,
            })?;

        for listener in &listeners {
            tracing::info!(
                address = %listener.local_addr(),
                max_concurrency = self.limiter.capacity(),
                "HTTP server starting"
            );
        }

        let sweeper = Sweeper::new(self.registry(), self.policy());
        let sweeper_task = tokio::spawn(sweeper.run(shutdown.resubscribe()));

        let dispatcher = Arc::new(Dispatcher {
            gate: AdmissionGate::new(self.registry(), self.policy()),
            limiter: self.limiter.clone(),
            tracker: self.tracker.clone(),
            handlers: self.handlers.clone(),
            temp_dir: Arc::from(temp_dir.as_path()),
            keep_alive: self.config.server.keep_alive,
            header_timeout: Duration::from_secs(self.config.server.request_timeout_secs),
        });

        loop {
            // While every slot is busy the loop stops accepting.
            let ready = tokio::select! {
                ready = self.limiter.ready() => ready,
                Some(config) = config_updates.recv() => {
                    self.apply_config(config);
                    continue;
                }
                _ = shutdown.recv() => break,
            };
            if let Err(e) = ready {
                tracing::error!(error = %e, "Admission limiter unavailable, stopping accept loop");
                break;
            }

            let accepted = tokio::select! {
                accepted = accept_any(&listeners) => accepted,
                Some(config) = config_updates.recv() => {
                    self.apply_config(config);
                    continue;
                }
                _ = shutdown.recv() => break,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let guard = self.tracker.track();
                    metrics::record_slots(self.tracker.active_count(), self.limiter.available());
                    tracing::debug!(
                        peer_addr = %peer,
                        connection_id = %guard.id(),
                        available_slots = self.limiter.available(),
                        "Connection accepted"
                    );

                    let dispatcher = Arc::clone(&dispatcher);
                    let shutdown = shutdown.resubscribe();
                    tokio::spawn(async move {
                        serve_connection(Arc::clone(&dispatcher), stream, peer, guard, shutdown).await;
                        dispatcher.record_slots();
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Accept loop stopped, draining connections"
        );
        self.limiter.close();
        drop(listeners);

        if !self.tracker.wait_idle(DRAIN_TIMEOUT).await {
            tracing::warn!(
                active_connections = self.tracker.active_count(),
                "Drain deadline passed with connections still open"
            );
        }
        if let Err(e) = sweeper_task.await {
            tracing::error!(error = %e, "Sweeper task failed");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Swap in the reloadable part of a new configuration.
    fn apply_config(&self, config: GateConfig) {
        if config.server.listen != self.config.server.listen
            || config.server.max_concurrency != self.config.server.max_concurrency
        {
            tracing::warn!("Listen endpoints and max_concurrency only change on restart");
        }

        let policy = GatePolicy::from_config(&config);
        tracing::info!(
            max_request_bytes = policy.max_request_bytes,
            visits_minimum = policy.throttle.visits_minimum,
            visits_maximum = policy.throttle.visits_maximum,
            block_time_secs = policy.throttle.block_time_secs,
            "Admission policy reloaded"
        );
        self.policy.store(Arc::new(policy));
    }
}

/// Resolve the configured temp directory; empty means the working directory.
fn temp_dir_path(configured: &str) -> PathBuf {
    if configured.trim().is_empty() {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        PathBuf::from(configured)
    }
}

/// Serve HTTP/1.1 on one connection until it closes.
async fn serve_connection(
    dispatcher: Arc<Dispatcher>,
    stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    mut shutdown: broadcast::Receiver<()>,
) {
    let connection_id = guard.id();
    let service_dispatcher = Arc::clone(&dispatcher);
    let service = service_fn(move |request: Request<Incoming>| {
        let dispatcher = Arc::clone(&service_dispatcher);
        async move {
            Ok::<_, Infallible>(dispatcher.dispatch(request, peer, connection_id).await)
        }
    });

    let mut builder = http1::Builder::new();
    builder
        .keep_alive(dispatcher.keep_alive)
        .timer(TokioTimer::new())
        .header_read_timeout(dispatcher.header_timeout);
    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.recv() => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(
            connection_id = %connection_id,
            peer_addr = %peer,
            error = %e,
            "Connection ended with error"
        );
    }
    drop(guard);
}

impl Dispatcher {
    /// Admit or reject one request and produce its response.
    async fn dispatch(
        &self,
        request: Request<Incoming>,
        peer: SocketAddr,
        connection_id: ConnectionId,
    ) -> Response {
        let start = Instant::now();
        let ctx = RequestContext::new(peer, connection_id, Arc::clone(&self.temp_dir));
        let request_id = ctx.request_id;
        let client = ctx.client_key();

        let declared = DeclaredLength::from_headers(request.headers());
        let decision = self.gate.admit(&client, declared, ctx.received_at);

        let response = match decision {
            Admission::RejectOversized => {
                tracing::warn!(
                    request_id = %request_id,
                    client = %client,
                    declared = ?declared,
                    "Request too large"
                );
                response::payload_too_large()
            }
            Admission::RejectBlocked => {
                tracing::warn!(request_id = %request_id, client = %client, "Blocked client tried to access");
                response::client_blocked()
            }
            Admission::Admit => match self.limiter.acquire().await {
                Ok(slot) => {
                    self.record_slots();
                    let response = self.forward(ctx, request).await;
                    drop(slot);
                    self.record_slots();
                    response
                }
                Err(_) => {
                    tracing::debug!(request_id = %request_id, client = %client, "Limiter closed, request not served");
                    response::shutting_down()
                }
            },
        };

        metrics::record_request(decision.as_str(), response.status().as_u16(), start);
        response::with_request_id(response, request_id)
    }

    fn record_slots(&self) {
        metrics::record_slots(self.tracker.active_count(), self.limiter.available());
    }

    /// Hand an admitted request to the first handler that resolves it.
    async fn forward(&self, ctx: RequestContext, request: Request<Incoming>) -> Response {
        let limit = usize::try_from(self.gate.max_request_bytes()).unwrap_or(usize::MAX);
        let request = request.map(|body| Body::new(Limited::new(body, limit)));

        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_id = ctx.request_id;

        let Some(handler) = self.handlers.resolve(&method, &path) else {
            tracing::info!(request_id = %request_id, method = %method, path = %path, "No handler found");
            return response::not_found();
        };

        tracing::debug!(request_id = %request_id, method = %method, path = %path, "Dispatching request");

        let outcome = AssertUnwindSafe(async move { handler.call(ctx, request).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let status = e.status();
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(request_id = %request_id, path = %path, error = %e, "Handler failed");
                } else {
                    tracing::warn!(request_id = %request_id, path = %path, error = %e, "Handler rejected request");
                }
                response::handler_failed(status)
            }
            Err(_) => {
                tracing::error!(request_id = %request_id, path = %path, "Handler panicked");
                response::handler_failed(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_temp_dir_means_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(temp_dir_path(""), cwd);
        assert_eq!(temp_dir_path("/var/tmp/gate"), PathBuf::from("/var/tmp/gate"));
    }

    #[tokio::test]
    async fn run_without_listeners_fails() {
        let server = GateServer::new(GateConfig::default());
        let (_tx, updates) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown) = broadcast::channel(1);

        let err = server.run(Vec::new(), updates, shutdown).await.unwrap_err();
        assert!(matches!(err, ServerError::NoListeners));
    }
}
