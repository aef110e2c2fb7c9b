//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (declared body size)
//!     → admission.rs (blocked client? record visit)
//!     → Pass to handler chain
//! ```
//!
//! # Design Decisions
//! - Cheapest check first: size is decided from headers alone
//! - Fail closed: unreadable lengths are rejected
//! - Rejections never occupy a handler

pub mod admission;
pub mod limits;

pub use admission::{Admission, AdmissionGate};
pub use limits::DeclaredLength;
