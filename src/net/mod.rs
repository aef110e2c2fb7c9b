//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop
//!     → listener.rs (acquire admission slot, accept on any endpoint)
//!     → connection.rs (connection id, live connection count)
//!     → Hand off to HTTP dispatch
//! ```
//!
//! # Design Decisions
//! - Bounded admission prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{accept_any, AdmissionLimiter, AdmissionSlot, Listener, ListenerError};
