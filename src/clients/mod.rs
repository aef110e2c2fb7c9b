//! Client tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request (dispatcher):
//!     → registry.rs (get or create record + ledger)
//!     → ledger.rs (append visit)
//!     → registry.rs (replace record with fresh last_visit)
//!
//! Every sweep tick (sweeper.rs):
//!     → ledger.rs (prune expired visits)
//!     → record.rs (unblock / enter / block)
//!     → registry.rs (evict idle clients)
//! ```
//!
//! # Design Decisions
//! - One registry per server instance, passed explicitly
//! - Per-key atomicity only; cross-field updates are best effort
//! - Readers tolerate slightly stale data

pub mod ledger;
pub mod record;
pub mod registry;
pub mod sweeper;

pub use ledger::VisitLedger;
pub use record::ClientRecord;
pub use registry::{ClientHandle, ClientRegistry, ClientSnapshot};
pub use sweeper::{SweepReport, Sweeper};
