//! The token ledger: an append-only log of evolution-token awards.
//!
//! [`TokenLedger`] is the in-memory award log used by the in-memory store
//! and by tests. Durable stores keep the same entries in a table and run
//! [`verify_balance`] over the rows they load.
//!
//! # Design
//!
//! - **Append-only**: entries are never modified.
//! - **Attributable**: every entry carries a non-blank reason.
//! - **Reconcilable**: applied deltas replay to the stored balance.

use companion_types::{EntityId, TokenAward};

use crate::reconcile::{verify_balance, BalanceCheck};

/// Append-only log of token awards for any number of entities.
#[derive(Debug, Default, Clone)]
pub struct TokenLedger {
    /// All entries, in insertion order.
    entries: Vec<TokenAward>,
}

impl TokenLedger {
    /// Create a new empty ledger.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Return the number of entries in the ledger.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether the ledger has no entries.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a validated award.
    pub fn append(&mut self, award: TokenAward) {
        tracing::debug!(
            entity_id = %award.entity_id,
            requested = award.requested_delta,
            applied = award.applied_delta,
            balance_after = award.balance_after,
            reason = %award.reason,
            "token award recorded"
        );
        self.entries.push(award);
    }

    /// All awards for one entity, oldest first.
    pub fn entries_for(&self, entity_id: EntityId) -> Vec<TokenAward> {
        self.entries
            .iter()
            .filter(|a| a.entity_id == entity_id)
            .cloned()
            .collect()
    }

    /// Drop every award for an entity.
    ///
    /// Only used when the owning entity itself is removed; returns the
    /// number of entries dropped.
    pub fn purge_entity(&mut self, entity_id: EntityId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|a| a.entity_id != entity_id);
        before.saturating_sub(self.entries.len())
    }

    /// Reconcile one entity's awards against its stored balance.
    pub fn verify_balance(&self, entity_id: EntityId, stored_balance: u64) -> BalanceCheck {
        verify_balance(entity_id, stored_balance, &self.entries)
    }
}
