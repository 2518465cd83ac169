//! Award builder and validation for the token ledger.
//!
//! [`AwardBuilder`] enforces the attribution rule: every award carries a
//! non-blank reason. It also checks that the applied delta is consistent
//! with the requested one, since clamping at zero may only shrink a
//! negative delta, never grow or flip it.

use chrono::Utc;

use companion_types::{AwardId, EntityId, TokenAward};

use crate::LedgerError;

/// Builder for constructing validated [`TokenAward`] values.
///
/// # Examples
///
/// ```
/// use companion_ledger::AwardBuilder;
/// use companion_types::EntityId;
///
/// // Balance was 3; a -10 award is clamped to -3.
/// let award = AwardBuilder::new(EntityId::new())
///     .requested(-10)
///     .applied(-3)
///     .balance_after(0)
///     .reason("penalty:missed_check_in")
///     .build();
///
/// assert!(award.is_ok());
/// ```
#[derive(Debug)]
pub struct AwardBuilder {
    entity_id: EntityId,
    requested: i64,
    applied: Option<i64>,
    balance_after: Option<u64>,
    reason: Option<String>,
}

impl AwardBuilder {
    /// Start building an award for the given entity.
    pub const fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            requested: 0,
            applied: None,
            balance_after: None,
            reason: None,
        }
    }

    /// Set the delta the caller requested.
    #[must_use]
    pub const fn requested(mut self, delta: i64) -> Self {
        self.requested = delta;
        self
    }

    /// Set the delta actually applied after clamping.
    ///
    /// Defaults to the requested delta when unset.
    #[must_use]
    pub const fn applied(mut self, delta: i64) -> Self {
        self.applied = Some(delta);
        self
    }

    /// Set the balance after the award was applied.
    #[must_use]
    pub const fn balance_after(mut self, balance: u64) -> Self {
        self.balance_after = Some(balance);
        self
    }

    /// Set the attribution reason.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Validate inputs and produce a [`TokenAward`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingReason`] if the reason is unset or blank.
    /// Returns [`LedgerError::InconsistentDelta`] if the applied delta is
    /// larger in magnitude than requested or has the opposite sign.
    pub fn build(self) -> Result<TokenAward, LedgerError> {
        let reason = self
            .reason
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty())
            .ok_or(LedgerError::MissingReason)?;

        let applied = self.applied.unwrap_or(self.requested);
        if !delta_is_consistent(self.requested, applied) {
            return Err(LedgerError::InconsistentDelta {
                requested: self.requested,
                applied,
            });
        }

        let balance_after = match (self.balance_after, applied) {
            (Some(balance), _) => balance,
            (None, delta) if delta >= 0 => delta.unsigned_abs(),
            (None, _) => return Err(LedgerError::MissingField("balance_after")),
        };

        Ok(TokenAward {
            id: AwardId::new(),
            entity_id: self.entity_id,
            requested_delta: self.requested,
            applied_delta: applied,
            balance_after,
            reason,
            created_at: Utc::now(),
        })
    }
}

/// Whether `applied` could result from clamping `requested` at zero.
const fn delta_is_consistent(requested: i64, applied: i64) -> bool {
    if requested >= 0 {
        applied == requested
    } else {
        applied <= 0 && applied >= requested
    }
}
