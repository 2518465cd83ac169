//! The persistence seam.
//!
//! [`PetStore`] is the only way the engine touches persisted state. Writes
//! are optimistic: a caller reads an [`EntityRecord`], computes the next
//! state, and hands it to [`PetStore::compare_and_swap`] together with the
//! version it read. The store commits only if the version still matches,
//! bumping it by one; award entries passed alongside are committed in the
//! same step, so the balance and its audit log never diverge.

use companion_types::{EntityId, EntityRecord, TokenAward};

use crate::error::DbError;

/// Outcome of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write committed; this is the stored record with its new version.
    Committed(EntityRecord),
    /// Another writer got there first. Re-read and retry.
    Conflict,
}

/// Point-lookup and optimistic-write access to entity records.
#[async_trait::async_trait]
pub trait PetStore: Send + Sync {
    /// Load one entity, or `None` if it is not registered.
    async fn get(&self, entity_id: EntityId) -> Result<Option<EntityRecord>, DbError>;

    /// Register a new entity with no pet.
    ///
    /// Fails with [`DbError::EntityExists`] if it is already registered.
    async fn register_entity(&self, entity_id: EntityId) -> Result<EntityRecord, DbError>;

    /// Remove an entity together with its pet and award log.
    ///
    /// Returns whether anything was removed.
    async fn remove_entity(&self, entity_id: EntityId) -> Result<bool, DbError>;

    /// Write `next` if the stored version still equals `expected_version`.
    ///
    /// `awards` are appended in the same commit. Fails with
    /// [`DbError::EntityNotFound`] if the entity was removed.
    async fn compare_and_swap(
        &self,
        next: &EntityRecord,
        expected_version: u64,
        awards: &[TokenAward],
    ) -> Result<CasOutcome, DbError>;

    /// Every award for one entity, oldest first.
    async fn awards_for(&self, entity_id: EntityId) -> Result<Vec<TokenAward>, DbError>;

    /// Every entity whose pet has a pending or generating job.
    async fn list_in_flight(&self) -> Result<Vec<EntityRecord>, DbError>;
}
