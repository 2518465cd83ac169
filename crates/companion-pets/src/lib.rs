//! Pet logic for the companion lifecycle engine.
//!
//! Everything in this crate is pure: functions take the current state and
//! return the next one, or a typed [`PetError`]. Persistence and vendor I/O
//! live in `companion-db` and `companion-core`.
//!
//! # Modules
//!
//! - [`config`] -- Scoring weights, level table, economy parameters
//! - [`error`] -- Error types for all pet transitions ([`PetError`])
//! - [`scoring`] -- Relationship Scorer: happiness and level derivation
//! - [`economy`] -- Token awards, level-up bonuses, unlock eligibility
//! - [`lifecycle`] -- Hatch, customization, and happiness updates
//! - [`generation`] -- Generation job state machine

pub mod config;
pub mod economy;
pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod scoring;

pub use config::{EconomyConfig, LevelThreshold, ScoringConfig, SignalWeights, UnlockTable};
pub use economy::{
    AwardOutcome, LEVEL_UP_REASON, LevelChange, Unlocks, apply_award, apply_level_change,
    unlocks_for,
};
pub use error::PetError;
pub use lifecycle::{HappinessChange, apply_customization, hatch, hatch_pet, pet_mut, update_happiness};
pub use scoring::{HappinessOutcome, compute_happiness, happiness_for, level_for_experience};
