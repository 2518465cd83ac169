//! HTTP API for the companion lifecycle engine.
//!
//! An Axum server exposing every caller-facing operation as a JSON
//! endpoint: entity registration, hatch, customization, happiness
//! updates, token awards, and media generation with status polling.
//!
//! # Architecture
//!
//! Handlers hold no state of their own. [`AppState`] bundles the
//! [`PetManager`](companion_core::PetManager),
//! [`Orchestrator`](companion_core::Orchestrator), and
//! [`StatusPoller`](companion_core::StatusPoller); engine errors map to
//! HTTP statuses through [`ApiError`](error::ApiError).

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::AppState;
