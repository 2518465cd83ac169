//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`serde_json`] errors, plus the store-level conditions a
//! caller has to branch on (missing or duplicate entities).

use companion_types::EntityId;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A pet record could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The entity does not exist.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The entity is already registered.
    #[error("Entity already registered: {0}")]
    EntityExists(EntityId),

    /// A stored value is outside the range the record type allows.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
