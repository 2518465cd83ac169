//! Error types for the companion-pets crate.
//!
//! Every pure transition returns a typed error instead of panicking. The
//! orchestration layer classifies these into caller-facing kinds.

use companion_types::{GenerationJobId, GenerationStatus};

/// Errors raised by scoring, economy, and lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PetError {
    /// A relationship signal fell outside 0--100.
    #[error("relationship signal {signal} must be within 0..=100, got {value}")]
    InvalidSignal {
        /// Name of the offending signal.
        signal: &'static str,
        /// The rejected value.
        value: u32,
    },

    /// A token award was made without a reason.
    #[error("token award reason must not be empty")]
    MissingReason,

    /// Hatch was requested for an entity that already has a pet.
    #[error("pet already hatched")]
    AlreadyHatched,

    /// A pet operation was requested for an entity without a pet.
    #[error("pet not hatched yet")]
    NotHatched,

    /// Derived happiness is below the configured hatch threshold.
    #[error("happiness {happiness} is below the hatch threshold {threshold}")]
    BelowHatchThreshold {
        /// Happiness computed from the supplied stats.
        happiness: u32,
        /// Configured minimum.
        threshold: u32,
    },

    /// A customization field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidCustomization {
        /// The field that was rejected.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A customization slot is not unlocked at the pet's level.
    #[error("{slot} unlocks at level {required_level}, pet is level {level}")]
    Locked {
        /// The locked slot.
        slot: &'static str,
        /// Level at which the slot unlocks.
        required_level: u32,
        /// The pet's current level.
        level: u32,
    },

    /// A generation job is already pending or generating.
    #[error("generation already in progress (status: {})", status.as_str())]
    AlreadyInProgress {
        /// The in-flight status.
        status: GenerationStatus,
    },

    /// A generation request named no variants.
    #[error("generation request names no media variants")]
    EmptyRequest,

    /// The requested generation transition is not allowed from the current status.
    #[error("cannot move generation from {} to {}", from.as_str(), to.as_str())]
    InvalidTransition {
        /// Current status.
        from: GenerationStatus,
        /// Requested status.
        to: GenerationStatus,
    },

    /// A write came from a job that no longer owns the generation state.
    #[error("job {job_id} no longer owns the generation state")]
    StaleJob {
        /// The job that attempted the write.
        job_id: GenerationJobId,
    },

    /// The vendor returned fewer variants than the job requested.
    #[error("vendor result missing variants: {}", missing.join(", "))]
    PartialResult {
        /// Keys of the variants without a result.
        missing: Vec<String>,
    },

    /// An arithmetic overflow occurred during a computation.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Description of what was being computed.
        context: String,
    },

    /// Scoring or economy configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
