//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted TCP connection
//!     → server.rs (HTTP/1.1 serving, per-request dispatch)
//!     → request.rs (request ID, handler context)
//!     → [security layer admits or rejects]
//!     → [routing layer resolves a handler]
//!     → response.rs (rejections, request ID header)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, RequestId, X_REQUEST_ID};
pub use server::{GateServer, GateStatus, ServerError};
