//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the server and its handler chain from configuration
//! - Start the metrics exporter and the config watcher
//! - Bind listeners and run until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind last (traffic only when ready)
//! - Admin routes are consulted before static files

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::admin::AdminProvider;
use crate::config::watcher::ConfigWatcher;
use crate::config::GateConfig;
use crate::handlers::StaticFiles;
use crate::http::{GateServer, ServerError};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::ListenerError;
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid metrics address {0}")]
    MetricsAddress(String),
    #[error("Failed to watch config file: {0}")]
    Watcher(#[from] notify::Error),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// How the configuration was obtained, for hot reload.
pub struct ReloadSource {
    pub path: PathBuf,
    /// Re-applies command-line overrides to each reloaded file.
    pub overrides: Box<dyn Fn(&mut GateConfig) + Send + Sync>,
}

/// Build a server with the providers the configuration asks for.
///
/// Admin routes sit behind the same admission checks as every other route:
/// admin calls count as visits, and a blocked operator address gets 429
/// until its block lifts.
pub fn build_server(config: GateConfig) -> GateServer {
    let admin = config.admin.clone();
    let handler_source = config.server.handler_source.clone();

    let mut server = GateServer::new(config);
    if admin.enabled {
        let provider = AdminProvider::new(admin.api_key, server.status());
        server = server.with_provider(provider);
        tracing::info!("Admin endpoints enabled");
    }
    if !handler_source.trim().is_empty() {
        tracing::info!(root = %handler_source, "Serving static files");
        server = server.with_provider(StaticFiles::new(handler_source));
    }
    server
}

/// Run a gate server until `shutdown` fires.
pub async fn run(
    config: GateConfig,
    reload: Option<ReloadSource>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let address: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(address);
    }

    tracing::info!(
        listen = ?config.server.listen,
        max_concurrency = config.server.max_concurrency,
        max_request_bytes = config.server.max_request_bytes,
        visits_minimum = config.throttle.visits_minimum,
        visits_maximum = config.throttle.visits_maximum,
        "Configuration loaded"
    );

    let (_watcher, updates) = match reload {
        Some(source) => {
            let (watcher, updates) = ConfigWatcher::new(&source.path);
            let watcher = watcher
                .with_current(config.clone())
                .with_transform(source.overrides);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let server = build_server(config);
    let listeners = server.bind().await?;
    server.run(listeners, updates, shutdown.subscribe()).await?;
    Ok(())
}
