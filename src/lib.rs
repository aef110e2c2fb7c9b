//! Visit Gate: an admission-controlled HTTP front door.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                      VISIT GATE                      │
//!                 │                                                      │
//!  Client         │  ┌──────────┐   ┌───────────┐   ┌──────────────┐     │
//!  ───────────────┼─▶│   net    │──▶│   http    │──▶│   security   │     │
//!                 │  │ slots +  │   │ dispatch  │   │  admission   │     │
//!                 │  │ accept   │   └─────┬─────┘   └──────┬───────┘     │
//!                 │  └──────────┘         │                │             │
//!                 │                       ▼                ▼             │
//!                 │               ┌──────────────┐  ┌──────────────┐     │
//!                 │               │   routing    │  │   clients    │     │
//!                 │               │ handler chain│  │ registry +   │     │
//!                 │               └──────┬───────┘  │ ledger       │     │
//!                 │                      │          └──────▲───────┘     │
//!                 │                      ▼                 │             │
//!                 │        ┌───────────────────────┐ ┌─────┴───────┐     │
//!                 │        │ handlers / admin      │ │  sweeper    │     │
//!                 │        └───────────────────────┘ └─────────────┘     │
//!                 │                                                      │
//!                 │  Cross-cutting: config, observability, lifecycle     │
//!                 └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod clients;
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod security;

// Handlers
pub mod admin;
pub mod handlers;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::GateConfig;
pub use http::GateServer;
pub use lifecycle::Shutdown;
