//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity > 0, intervals > 0)
//! - Check that enabled visit gates can actually observe visits
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GateConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending key.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;
    let throttle = &config.throttle;

    if server.listen.is_empty() {
        errors.push(ValidationError::new(
            "server.listen",
            "at least one listen endpoint is required",
        ));
    }
    for endpoint in &server.listen {
        if endpoint.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "server.listen",
                format!("'{}' is not a socket address", endpoint),
            ));
        }
    }

    if server.max_concurrency == 0 {
        errors.push(ValidationError::new(
            "server.max_concurrency",
            "must be greater than 0",
        ));
    }
    if server.max_request_bytes == 0 {
        errors.push(ValidationError::new(
            "server.max_request_bytes",
            "must be greater than 0",
        ));
    }

    if throttle.sweep_interval_ms == 0 {
        errors.push(ValidationError::new(
            "throttle.sweep_interval_ms",
            "must be greater than 0",
        ));
    }
    // Every recorded visit is pruned on the first tick with a zero window.
    if throttle.gates_enabled() && throttle.keep_alive_secs == 0 {
        errors.push(ValidationError::new(
            "throttle.keep_alive_secs",
            "must be greater than 0 when a visit gate is enabled",
        ));
    }
    if throttle.visits_minimum > 0 && throttle.entry_time_secs == 0 {
        errors.push(ValidationError::new(
            "throttle.entry_time_secs",
            "must be greater than 0 when visits_minimum is enabled",
        ));
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set when the admin endpoints are enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
