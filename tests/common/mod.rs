//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use visit_gate::clients::ClientRegistry;
use visit_gate::config::GateConfig;
use visit_gate::http::request::RequestContext;
use visit_gate::http::{GateStatus, ServerError};
use visit_gate::net::AdmissionLimiter;
use visit_gate::routing::{HandlerError, HandlerResult, RouteTable};
use visit_gate::{GateServer, Shutdown};

/// Registry key of every test client.
pub const LOCAL_CLIENT: &str = "127.0.0.1";

/// A running gate server on an ephemeral port.
pub struct TestGate {
    pub addrs: Vec<SocketAddr>,
    pub shutdown: Shutdown,
    pub registry: Arc<ClientRegistry>,
    pub limiter: AdmissionLimiter,
    pub status: GateStatus,
    pub updates: mpsc::UnboundedSender<GateConfig>,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl TestGate {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addrs[0], path)
    }

    /// Trigger shutdown and wait for the server to stop.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(15), self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// Config with one ephemeral listener, no keep-alive and a fast sweeper.
pub fn test_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.server.listen = vec!["127.0.0.1:0".to_string()];
    config.server.max_concurrency = 4;
    config.server.keep_alive = false;
    config.throttle.sweep_interval_ms = 50;
    config
}

async fn hello(_ctx: RequestContext, _req: Request<Body>) -> HandlerResult {
    Ok(Response::new(Body::from("hello")))
}

/// Replies with the number of body bytes read.
async fn echo(_ctx: RequestContext, req: Request<Body>) -> HandlerResult {
    let bytes = axum::body::to_bytes(req.into_body(), usize::MAX).await?;
    Ok(Response::new(Body::from(bytes.len().to_string())))
}

async fn fail(_ctx: RequestContext, _req: Request<Body>) -> HandlerResult {
    Err(HandlerError::Internal("backing store unavailable".to_string()))
}

async fn explode(_ctx: RequestContext, _req: Request<Body>) -> HandlerResult {
    panic!("handler exploded")
}

/// Routes used by most tests.
pub fn test_routes() -> RouteTable {
    RouteTable::new()
        .get("/hello", hello)
        .post("/echo", echo)
        .get("/fail", fail)
        .get("/panic", explode)
}

/// Bind the server's configured listeners and run it in the background.
pub async fn start(server: GateServer) -> TestGate {
    let listeners = server.bind().await.expect("bind test listeners");
    let addrs = listeners.iter().map(|l| l.local_addr()).collect();
    let shutdown = Shutdown::new();
    let (updates, update_rx) = mpsc::unbounded_channel();
    let registry = server.registry();
    let limiter = server.limiter();
    let status = server.status();

    let server_shutdown = shutdown.subscribe();
    let task = tokio::spawn(server.run(listeners, update_rx, server_shutdown));

    TestGate {
        addrs,
        shutdown,
        registry,
        limiter,
        status,
        updates,
        task,
    }
}

/// Start a server with `config` and the standard test routes.
pub async fn start_with(config: GateConfig) -> TestGate {
    start(GateServer::new(config).with_provider(test_routes())).await
}

/// HTTP client that opens a fresh connection per request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
