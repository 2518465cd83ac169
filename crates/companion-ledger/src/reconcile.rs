//! Balance reconciliation for the token ledger.
//!
//! Stores commit award entries in the same write as the pet record, so the
//! log only falls out of step with the stored balance through manual edits
//! or data imported from elsewhere. This check replays the applied deltas
//! for one entity and compares the result to the stored balance:
//!
//! ```text
//! sum(applied_delta for E) == stored evolution_tokens for E
//! ```
//!
//! Each award's `balance_after` is also checked against the running sum so
//! the first divergent entry can be named.

use companion_types::{EntityId, TokenAward};

use crate::BalanceDrift;

/// The result of reconciling one entity's balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceCheck {
    /// The award log reproduces the stored balance.
    Balanced,
    /// The award log and the stored balance disagree.
    Drift(BalanceDrift),
}

impl BalanceCheck {
    /// Whether the check passed.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced)
    }
}

/// Reconcile the awards for `entity_id` against `stored_balance`.
///
/// Entries for other entities are ignored, so callers may pass a shared log.
/// Entries are replayed in slice order, which must be insertion order.
pub fn verify_balance(
    entity_id: EntityId,
    stored_balance: u64,
    awards: &[TokenAward],
) -> BalanceCheck {
    let mut running: i128 = 0;

    for award in awards.iter().filter(|a| a.entity_id == entity_id) {
        running = match running.checked_add(i128::from(award.applied_delta)) {
            Some(value) => value,
            None => {
                return drift(
                    entity_id,
                    running,
                    stored_balance,
                    format!("award log for {entity_id} overflowed while replaying"),
                );
            }
        };

        if running != i128::from(award.balance_after) {
            return drift(
                entity_id,
                running,
                stored_balance,
                format!(
                    "award {} for {entity_id} records balance {} but replay gives {running}",
                    award.id, award.balance_after
                ),
            );
        }
    }

    if running == i128::from(stored_balance) {
        BalanceCheck::Balanced
    } else {
        drift(
            entity_id,
            running,
            stored_balance,
            format!(
                "BALANCE_DRIFT: award log for {entity_id} sums to {running} but record holds {stored_balance}"
            ),
        )
    }
}

fn drift(
    entity_id: EntityId,
    ledger_balance: i128,
    stored_balance: u64,
    message: String,
) -> BalanceCheck {
    tracing::warn!(
        entity_id = %entity_id,
        ledger_balance = %ledger_balance,
        stored_balance,
        "token balance drift detected"
    );
    BalanceCheck::Drift(BalanceDrift {
        entity_id,
        ledger_balance,
        stored_balance,
        message,
    })
}
