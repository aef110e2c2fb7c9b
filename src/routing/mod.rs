//! Handler resolution subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request (method, path)
//!     → router.rs (HandlerChain walks providers in order)
//!     → provider resolves via matcher.rs or its own lookup
//!     → Return: handler or NoMatch (dispatcher answers 404)
//! ```
//!
//! # Design Decisions
//! - Providers are supplied explicitly when the server is built
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always resolves the same handler

pub mod matcher;
pub mod router;

pub use router::{
    handler_fn, Handler, HandlerChain, HandlerError, HandlerFuture, HandlerProvider, HandlerResult,
    RouteTable,
};
