//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gate server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Listener, body size and handler settings.
    pub server: ServerConfig,

    /// Visit gates and client bookkeeping.
    pub throttle: ThrottleConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Admin endpoints.
    pub admin: AdminConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Where handlers come from. The built-in static file provider serves
    /// this directory; empty disables it.
    pub handler_source: String,

    /// Temporary storage handed to handlers (uploads etc.).
    /// Empty means the current working directory.
    pub temp_dir: String,

    /// Maximum accepted request body size in bytes.
    pub max_request_bytes: u64,

    /// Listen endpoints (e.g., "127.0.0.1:50000").
    pub listen: Vec<String>,

    /// Maximum connections processed simultaneously (admission slots).
    pub max_concurrency: usize,

    /// Keep HTTP/1.1 connections open between requests.
    pub keep_alive: bool,

    /// Time allowed for a client to send request headers, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handler_source: String::new(),
            temp_dir: String::new(),
            max_request_bytes: 5_000_000,
            listen: vec!["127.0.0.1:50000".to_string()],
            max_concurrency: default_concurrency(),
            keep_alive: true,
            request_timeout_secs: 30,
        }
    }
}

/// Four slots per available processing unit.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 4
}

/// Visit tracking and blocking rules.
///
/// A zero for `visits_minimum` or `visits_maximum` disables that gate.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Visits a new client must make within `entry_time_secs` to avoid a block.
    pub visits_minimum: u32,

    /// Entry window in seconds.
    pub entry_time_secs: u64,

    /// Visits allowed within the retention window before a block.
    pub visits_maximum: u32,

    /// Retention window for recorded visits, in seconds.
    pub keep_alive_secs: u64,

    /// How long a block lasts, in seconds.
    pub block_time_secs: u64,

    /// Idle time after which a client's record is forgotten, in seconds.
    pub client_lifetime_secs: u64,

    /// Sweeper cadence in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            visits_minimum: 0,
            entry_time_secs: 0,
            visits_maximum: 0,
            keep_alive_secs: 0,
            block_time_secs: 0,
            client_lifetime_secs: 10,
            sweep_interval_ms: 1000,
        }
    }
}

impl ThrottleConfig {
    pub fn entry_time(&self) -> Duration {
        Duration::from_secs(self.entry_time_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_secs(self.block_time_secs)
    }

    pub fn client_lifetime(&self) -> Duration {
        Duration::from_secs(self.client_lifetime_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// True if either visit gate is active.
    pub fn gates_enabled(&self) -> bool {
        self.visits_minimum > 0 || self.visits_maximum > 0
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format: "pretty" or "compact".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin endpoints alongside application handlers.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}
