//! Shared type definitions for the companion lifecycle engine.
//!
//! This crate is the single source of truth for every type that crosses a
//! crate boundary: identifiers, pet records, generation state, and token
//! award entries. Types flow downstream to `TypeScript` via `ts-rs` for the
//! UI layer.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for entity, job, and award identifiers
//! - [`enums`] -- Pet species, moods, media kinds, generation status and
//!   failure causes, progress estimates
//! - [`structs`] -- Pet and entity records, media slots, customization
//!   inputs, award entries

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    EtaBucket, GenerationFailure, GenerationPreset, GenerationStatus, MediaKind, Mood, PetType,
};
pub use ids::{AwardId, EntityId, GenerationJobId};
pub use structs::{
    CustomizationPatch, EntityRecord, GenerationState, GenerationStatusView, HatchOptions,
    MediaSet, MediaVariant, PetRecord, RelationshipStats, TokenAward,
};
