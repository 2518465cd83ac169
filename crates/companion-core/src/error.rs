//! Error types for the companion core.
//!
//! [`CompanionError`] is what every caller-facing operation returns. It wraps
//! the lower-level crate errors and classifies them with
//! [`CompanionError::kind`] so that outer surfaces (HTTP, CLI) can map them
//! without matching on every variant.

use companion_db::DbError;
use companion_pets::PetError;
use companion_types::EntityId;

use crate::config::ConfigError;

/// Coarse classification of a [`CompanionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The entity does not exist.
    NotFound,
    /// The request conflicts with the current state.
    InvalidState,
    /// The request itself is malformed.
    Invalid,
    /// The media vendor failed.
    Vendor,
    /// A deadline was exceeded.
    Timeout,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Stable label for logs and response bodies.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::Invalid => "invalid",
            Self::Vendor => "vendor",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

/// Errors returned by the pet manager, orchestrator, and poller.
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    /// The entity does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// A pet transition was rejected.
    #[error(transparent)]
    Pet(#[from] PetError),

    /// The persistence layer failed.
    #[error("storage error: {0}")]
    Db(DbError),

    /// A deadline was exceeded.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Too many concurrent writers; the write was abandoned.
    #[error("entity {entity_id} is contended: gave up after {attempts} attempts")]
    Contention {
        /// The contended entity.
        entity_id: EntityId,
        /// Attempts made.
        attempts: u32,
    },

    /// A prompt template failed to load or render.
    #[error("template error: {0}")]
    Template(String),

    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The ledger rejected an award entry.
    #[error("ledger error: {0}")]
    Ledger(#[from] companion_ledger::LedgerError),
}

impl From<DbError> for CompanionError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::EntityNotFound(id) => Self::EntityNotFound(id),
            other => Self::Db(other),
        }
    }
}

impl CompanionError {
    /// Classify the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EntityNotFound(_) => ErrorKind::NotFound,
            Self::Pet(err) => pet_kind(err),
            Self::Db(DbError::EntityExists(_)) | Self::Contention { .. } => {
                ErrorKind::InvalidState
            }
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Db(_) | Self::Template(_) | Self::Config(_) | Self::Ledger(_) => {
                ErrorKind::Internal
            }
        }
    }
}

const fn pet_kind(err: &PetError) -> ErrorKind {
    match err {
        PetError::AlreadyHatched
        | PetError::NotHatched
        | PetError::BelowHatchThreshold { .. }
        | PetError::Locked { .. }
        | PetError::AlreadyInProgress { .. }
        | PetError::InvalidTransition { .. }
        | PetError::StaleJob { .. } => ErrorKind::InvalidState,
        PetError::InvalidSignal { .. }
        | PetError::MissingReason
        | PetError::InvalidCustomization { .. }
        | PetError::EmptyRequest => ErrorKind::Invalid,
        PetError::PartialResult { .. } => ErrorKind::Vendor,
        PetError::ArithmeticOverflow { .. } | PetError::InvalidConfig(_) => ErrorKind::Internal,
    }
}
