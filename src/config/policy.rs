//! Live admission policy.
//!
//! The subset of the configuration that can change while the server runs.
//! Readers load a snapshot per request or per sweep tick; a reload swaps the
//! whole policy atomically.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::{GateConfig, ThrottleConfig};

/// Limits consulted by the dispatcher and the sweeper.
#[derive(Debug, Clone, PartialEq)]
pub struct GatePolicy {
    /// Maximum declared request body size in bytes.
    pub max_request_bytes: u64,
    /// Visit gates and lifetimes.
    pub throttle: ThrottleConfig,
}

impl GatePolicy {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            max_request_bytes: config.server.max_request_bytes,
            throttle: config.throttle.clone(),
        }
    }
}

/// Policy handle shared between the dispatcher, the sweeper and reloads.
pub type SharedPolicy = Arc<ArcSwap<GatePolicy>>;

/// Create a shared policy from a configuration.
pub fn shared_policy(config: &GateConfig) -> SharedPolicy {
    Arc::new(ArcSwap::from_pointee(GatePolicy::from_config(config)))
}
