//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI flags
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → policy.rs (GatePolicy shared via ArcSwap)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the GatePolicy
//!     → dispatcher and sweeper observe new limits
//! ```
//!
//! # Design Decisions
//! - Only limits and visit gates reload live; listeners and capacity need a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod policy;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use policy::{GatePolicy, SharedPolicy};
pub use schema::AdminConfig;
pub use schema::GateConfig;
pub use schema::ObservabilityConfig;
pub use schema::ServerConfig;
pub use schema::ThrottleConfig;
