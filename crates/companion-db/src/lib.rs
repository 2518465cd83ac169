//! Data layer for the companion lifecycle engine.
//!
//! Every entity container (and the pet inside it) is read and written
//! through the [`PetStore`] trait. Two implementations ship here:
//!
//! ```text
//! PetManager / Orchestrator
//!     |
//!     +-- PetStore (trait)
//!         |-- MemoryStore   (per-entity tokio locks, tests + single node)
//!         +-- PgPetStore    (PostgreSQL, entities + token_awards)
//! ```
//!
//! # Modules
//!
//! - [`store`] -- The [`PetStore`] trait and [`CasOutcome`]
//! - [`memory`] -- In-process store
//! - [`pet_store`] -- `PostgreSQL` store: pool, migrations, queries
//! - [`error`] -- Shared error types

pub mod error;
pub mod memory;
pub mod pet_store;
pub mod store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use memory::MemoryStore;
pub use pet_store::{AwardRow, EntityRow, PgPetStore};
pub use store::{CasOutcome, PetStore};
