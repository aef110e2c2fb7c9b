//! Built-in handler providers.
//!
//! # Data Flow
//! ```text
//! Admitted request
//!     → [routing chain asks each provider in turn]
//!     → static_files.rs (files under `handler_source`)
//! ```

pub mod static_files;

pub use static_files::StaticFiles;
