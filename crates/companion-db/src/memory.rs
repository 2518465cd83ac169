//! In-process [`PetStore`] with one `tokio` lock per entity.
//!
//! Used by tests and by single-node deployments configured with
//! `storage: memory`. The entity map is only write-locked to register or
//! remove an entity; reads and compare-and-swap writes take the map's read
//! lock just long enough to clone the entity's slot handle, then serialize
//! on that slot alone. A slot holds the record and its award log, so a
//! compare-and-swap and its award entries commit together.

use std::collections::HashMap;
use std::sync::Arc;

use companion_ledger::TokenLedger;
use companion_types::{EntityId, EntityRecord, TokenAward};
use tokio::sync::{Mutex, RwLock};

use crate::error::DbError;
use crate::store::{CasOutcome, PetStore};

#[derive(Debug)]
struct Slot {
    record: EntityRecord,
    ledger: TokenLedger,
    /// Set under the slot lock by `remove_entity`; a writer that cloned the
    /// handle before removal sees it and reports the entity as gone.
    removed: bool,
}

type SlotHandle = Arc<Mutex<Slot>>;

/// Volatile entity store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<EntityId, SlotHandle>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, entity_id: EntityId) -> Option<SlotHandle> {
        self.slots.read().await.get(&entity_id).cloned()
    }
}

#[async_trait::async_trait]
impl PetStore for MemoryStore {
    async fn get(&self, entity_id: EntityId) -> Result<Option<EntityRecord>, DbError> {
        let Some(handle) = self.slot(entity_id).await else {
            return Ok(None);
        };
        let slot = handle.lock().await;
        Ok((!slot.removed).then(|| slot.record.clone()))
    }

    async fn register_entity(&self, entity_id: EntityId) -> Result<EntityRecord, DbError> {
        let mut slots = self.slots.write().await;
        if slots.contains_key(&entity_id) {
            return Err(DbError::EntityExists(entity_id));
        }
        let record = EntityRecord::new(entity_id);
        slots.insert(
            entity_id,
            Arc::new(Mutex::new(Slot {
                record: record.clone(),
                ledger: TokenLedger::new(),
                removed: false,
            })),
        );
        Ok(record)
    }

    async fn remove_entity(&self, entity_id: EntityId) -> Result<bool, DbError> {
        let Some(handle) = self.slots.write().await.remove(&entity_id) else {
            return Ok(false);
        };
        let mut slot = handle.lock().await;
        slot.removed = true;
        let purged = slot.ledger.purge_entity(entity_id);
        tracing::debug!(entity_id = %entity_id, purged_awards = purged, "entity removed");
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        next: &EntityRecord,
        expected_version: u64,
        awards: &[TokenAward],
    ) -> Result<CasOutcome, DbError> {
        let Some(handle) = self.slot(next.entity_id).await else {
            return Err(DbError::EntityNotFound(next.entity_id));
        };
        let mut slot = handle.lock().await;
        if slot.removed {
            return Err(DbError::EntityNotFound(next.entity_id));
        }
        if slot.record.version != expected_version {
            return Ok(CasOutcome::Conflict);
        }

        let version = expected_version
            .checked_add(1)
            .ok_or_else(|| DbError::Corrupt(format!("version overflow on {}", next.entity_id)))?;
        let mut stored = next.clone();
        stored.version = version;
        slot.record = stored.clone();

        for award in awards {
            slot.ledger.append(award.clone());
        }
        Ok(CasOutcome::Committed(stored))
    }

    async fn awards_for(&self, entity_id: EntityId) -> Result<Vec<TokenAward>, DbError> {
        let Some(handle) = self.slot(entity_id).await else {
            return Ok(Vec::new());
        };
        Ok(handle.lock().await.ledger.entries_for(entity_id))
    }

    async fn list_in_flight(&self) -> Result<Vec<EntityRecord>, DbError> {
        let handles: Vec<SlotHandle> = self.slots.read().await.values().cloned().collect();
        let mut in_flight = Vec::new();
        for handle in handles {
            let slot = handle.lock().await;
            let flying = slot
                .record
                .pet
                .as_ref()
                .is_some_and(|p| p.generation.status.is_in_flight());
            if flying && !slot.removed {
                in_flight.push(slot.record.clone());
            }
        }
        Ok(in_flight)
    }
}
