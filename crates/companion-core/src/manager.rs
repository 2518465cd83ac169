//! Pet record manager: every caller-facing read and write of pet state.
//!
//! All writes go through [`PetManager::mutate`], an optimistic
//! read-modify-write loop over [`PetStore::compare_and_swap`]:
//!
//! ```text
//! loop (at most cas_retries times):
//!     record  = store.get(entity)
//!     next    = f(copy of record)          -- pure, may fail
//!     commit  = store.cas(next, record.version, awards)
//!     Committed -> done
//!     Conflict  -> re-read and retry
//! ```
//!
//! The closure runs once per attempt against a fresh read, so concurrent
//! writers (happiness updates, token awards, generation transitions) each
//! see the other's committed result instead of overwriting it.

use std::sync::Arc;

use chrono::Utc;
use companion_db::{CasOutcome, PetStore};
use companion_ledger::{AwardBuilder, BalanceCheck, verify_balance};
use companion_pets::{
    AwardOutcome, EconomyConfig, LEVEL_UP_REASON, LevelChange, ScoringConfig, apply_award,
    apply_customization, hatch, pet_mut, update_happiness,
};
use companion_types::{
    CustomizationPatch, EntityId, EntityRecord, HatchOptions, PetRecord, RelationshipStats,
    TokenAward,
};

use crate::error::CompanionError;

/// Result of a happiness update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HappinessReport {
    /// The pet as committed.
    pub pet: PetRecord,
    /// Happiness before the update.
    pub previous_happiness: u32,
    /// Level transition, with any bonus paid.
    pub level_change: LevelChange,
}

/// Result of a token award.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardReport {
    /// The pet as committed.
    pub pet: PetRecord,
    /// What the award did to the balance and level.
    pub outcome: AwardOutcome,
    /// Ledger entries committed with the award.
    pub entries: Vec<TokenAward>,
}

/// Owns the store handle and the scoring/economy parameters.
pub struct PetManager {
    store: Arc<dyn PetStore>,
    scoring: ScoringConfig,
    economy: EconomyConfig,
    cas_retries: u32,
}

impl PetManager {
    /// Create a manager over `store`.
    ///
    /// `cas_retries` is floored at one attempt.
    pub fn new(
        store: Arc<dyn PetStore>,
        scoring: ScoringConfig,
        economy: EconomyConfig,
        cas_retries: u32,
    ) -> Self {
        Self {
            store,
            scoring,
            economy,
            cas_retries: cas_retries.max(1),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn PetStore> {
        &self.store
    }

    /// The scoring parameters.
    pub const fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// The economy parameters.
    pub const fn economy(&self) -> &EconomyConfig {
        &self.economy
    }

    // -----------------------------------------------------------------------
    // Entity container
    // -----------------------------------------------------------------------

    /// Register an entity with no pet.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Db`] if the entity already exists or the
    /// store fails.
    pub async fn register_entity(&self, entity_id: EntityId) -> Result<EntityRecord, CompanionError> {
        let record = self.store.register_entity(entity_id).await?;
        tracing::info!(entity_id = %entity_id, "entity registered");
        Ok(record)
    }

    /// Remove an entity, its pet, and its award log.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::EntityNotFound`] if nothing was removed.
    pub async fn remove_entity(&self, entity_id: EntityId) -> Result<(), CompanionError> {
        if self.store.remove_entity(entity_id).await? {
            tracing::info!(entity_id = %entity_id, "entity removed");
            Ok(())
        } else {
            Err(CompanionError::EntityNotFound(entity_id))
        }
    }

    /// Load an entity record.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::EntityNotFound`] for unknown entities.
    pub async fn get_entity(&self, entity_id: EntityId) -> Result<EntityRecord, CompanionError> {
        self.store
            .get(entity_id)
            .await?
            .ok_or(CompanionError::EntityNotFound(entity_id))
    }

    /// Load an entity's pet.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::EntityNotFound`] for unknown entities and
    /// [`companion_pets::PetError::NotHatched`] if there is no pet yet.
    pub async fn get_pet(&self, entity_id: EntityId) -> Result<PetRecord, CompanionError> {
        let record = self.get_entity(entity_id).await?;
        record
            .pet
            .ok_or(CompanionError::Pet(companion_pets::PetError::NotHatched))
    }

    // -----------------------------------------------------------------------
    // Pet operations
    // -----------------------------------------------------------------------

    /// Hatch a pet for `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`companion_pets::PetError::AlreadyHatched`] if a pet exists,
    /// plus the validation errors of [`companion_pets::hatch_pet`].
    pub async fn hatch(
        &self,
        entity_id: EntityId,
        options: &HatchOptions,
        stats: &RelationshipStats,
    ) -> Result<PetRecord, CompanionError> {
        let (record, ()) = self
            .mutate(entity_id, |record| {
                hatch(record, options, stats, &self.scoring, &self.economy, Utc::now())?;
                Ok(((), Vec::new()))
            })
            .await?;
        let pet = committed_pet(record)?;
        tracing::info!(
            entity_id = %entity_id,
            pet_type = ?pet.pet_type,
            pet_name = %pet.pet_name,
            happiness = pet.happiness,
            "pet hatched"
        );
        Ok(pet)
    }

    /// Apply a customization patch.
    ///
    /// # Errors
    ///
    /// Returns [`companion_pets::PetError::NotHatched`],
    /// [`companion_pets::PetError::InvalidCustomization`], or
    /// [`companion_pets::PetError::Locked`].
    pub async fn customize(
        &self,
        entity_id: EntityId,
        patch: &CustomizationPatch,
    ) -> Result<PetRecord, CompanionError> {
        let (record, ()) = self
            .mutate(entity_id, |record| {
                apply_customization(pet_mut(record)?, patch, &self.economy)?;
                Ok(((), Vec::new()))
            })
            .await?;
        committed_pet(record)
    }

    /// Rescore happiness from fresh relationship stats.
    ///
    /// A level-up bonus, if any, is logged to the award ledger in the same
    /// commit.
    ///
    /// # Errors
    ///
    /// Returns [`companion_pets::PetError::NotHatched`] or
    /// [`companion_pets::PetError::InvalidSignal`].
    pub async fn update_happiness(
        &self,
        entity_id: EntityId,
        stats: &RelationshipStats,
    ) -> Result<HappinessReport, CompanionError> {
        let (record, (previous_happiness, level_change)) = self
            .mutate(entity_id, |record| {
                let pet = pet_mut(record)?;
                let change = update_happiness(pet, stats, &self.scoring, &self.economy, Utc::now())?;
                let mut entries = Vec::new();
                if change.level_change.bonus > 0 {
                    entries.push(bonus_entry(
                        entity_id,
                        change.level_change.bonus,
                        pet.evolution_tokens,
                    )?);
                }
                Ok(((change.previous_happiness, change.level_change), entries))
            })
            .await?;

        let pet = committed_pet(record)?;
        log_level_up(entity_id, &level_change);
        tracing::debug!(
            entity_id = %entity_id,
            previous_happiness,
            happiness = pet.happiness,
            level = pet.level,
            "happiness updated"
        );
        Ok(HappinessReport {
            pet,
            previous_happiness,
            level_change,
        })
    }

    /// Apply a signed token award.
    ///
    /// The award is logged even when it moves nothing (a zero delta, or a
    /// debit against an empty balance).
    ///
    /// # Errors
    ///
    /// Returns [`companion_pets::PetError::MissingReason`] for a blank
    /// reason and [`companion_pets::PetError::NotHatched`] without a pet.
    pub async fn award_tokens(
        &self,
        entity_id: EntityId,
        delta: i64,
        reason: &str,
    ) -> Result<AwardReport, CompanionError> {
        let (record, (outcome, entries)) = self
            .mutate(entity_id, |record| {
                let pet = pet_mut(record)?;
                let outcome = apply_award(
                    pet,
                    delta,
                    reason,
                    &self.scoring,
                    &self.economy,
                    Utc::now(),
                )?;

                let mut entries = vec![
                    AwardBuilder::new(entity_id)
                        .requested(outcome.requested_delta)
                        .applied(outcome.applied_delta)
                        .balance_after(outcome.balance_after_award)
                        .reason(outcome.reason.as_str())
                        .build()?,
                ];
                if outcome.level_change.bonus > 0 {
                    entries.push(bonus_entry(
                        entity_id,
                        outcome.level_change.bonus,
                        outcome.new_tokens,
                    )?);
                }
                Ok(((outcome, entries.clone()), entries))
            })
            .await?;

        log_level_up(entity_id, &outcome.level_change);
        tracing::info!(
            entity_id = %entity_id,
            requested = outcome.requested_delta,
            applied = outcome.applied_delta,
            new_tokens = outcome.new_tokens,
            reason = %outcome.reason,
            "tokens awarded"
        );
        Ok(AwardReport {
            pet: committed_pet(record)?,
            outcome,
            entries,
        })
    }

    /// The award log for an entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::EntityNotFound`] for unknown entities.
    pub async fn awards(&self, entity_id: EntityId) -> Result<Vec<TokenAward>, CompanionError> {
        self.get_entity(entity_id).await?;
        Ok(self.store.awards_for(entity_id).await?)
    }

    /// Reconcile an entity's award log against its stored balance.
    ///
    /// An entity without a pet must have an empty log.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::EntityNotFound`] for unknown entities.
    pub async fn audit(&self, entity_id: EntityId) -> Result<BalanceCheck, CompanionError> {
        let record = self.get_entity(entity_id).await?;
        let awards = self.store.awards_for(entity_id).await?;
        let stored = record.pet.map_or(0, |pet| pet.evolution_tokens);
        Ok(verify_balance(entity_id, stored, &awards))
    }

    // -----------------------------------------------------------------------
    // Optimistic write loop
    // -----------------------------------------------------------------------

    /// Read-modify-write one entity with bounded optimistic retries.
    ///
    /// `f` receives a copy of the current record and returns a value plus
    /// the award entries to commit with it. It may run several times; an
    /// `Err` from `f` aborts without writing.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, [`CompanionError::EntityNotFound`] if
    /// the entity is missing, or [`CompanionError::Contention`] once the
    /// retry budget is spent.
    pub async fn mutate<T, F>(
        &self,
        entity_id: EntityId,
        mut f: F,
    ) -> Result<(EntityRecord, T), CompanionError>
    where
        F: FnMut(&mut EntityRecord) -> Result<(T, Vec<TokenAward>), CompanionError> + Send,
        T: Send,
    {
        for attempt in 1..=self.cas_retries {
            let current = self.get_entity(entity_id).await?;
            let expected_version = current.version;
            let mut next = current;
            let (value, awards) = f(&mut next)?;

            match self
                .store
                .compare_and_swap(&next, expected_version, &awards)
                .await?
            {
                CasOutcome::Committed(stored) => return Ok((stored, value)),
                CasOutcome::Conflict => {
                    tracing::debug!(
                        entity_id = %entity_id,
                        attempt,
                        expected_version,
                        "write conflict, retrying"
                    );
                }
            }
        }

        tracing::warn!(
            entity_id = %entity_id,
            attempts = self.cas_retries,
            "giving up on contended entity"
        );
        Err(CompanionError::Contention {
            entity_id,
            attempts: self.cas_retries,
        })
    }
}

fn committed_pet(record: EntityRecord) -> Result<PetRecord, CompanionError> {
    record
        .pet
        .ok_or(CompanionError::Pet(companion_pets::PetError::NotHatched))
}

fn log_level_up(entity_id: EntityId, change: &LevelChange) {
    if change.leveled_up() {
        tracing::info!(
            entity_id = %entity_id,
            previous_level = change.previous_level,
            level = change.level,
            bonus = change.bonus,
            "pet leveled up"
        );
    }
}

fn bonus_entry(
    entity_id: EntityId,
    bonus: u64,
    balance_after: u64,
) -> Result<TokenAward, CompanionError> {
    let delta = i64::try_from(bonus).map_err(|e| {
        CompanionError::Pet(companion_pets::PetError::ArithmeticOverflow {
            context: format!("level-up bonus: {e}"),
        })
    })?;
    Ok(AwardBuilder::new(entity_id)
        .requested(delta)
        .balance_after(balance_after)
        .reason(LEVEL_UP_REASON)
        .build()?)
}
