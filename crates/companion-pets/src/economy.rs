//! Evolution-token economy.
//!
//! Awards move the spendable balance, clamped at zero, and positive awards
//! add to lifetime experience. Experience drives the level table; every
//! level gained credits [`EconomyConfig::level_up_bonus`] tokens and bumps
//! `total_evolutions`. Bonus tokens are balance only, so a level-up bonus
//! can never cascade into another level-up.
//!
//! # Ledger entries
//!
//! One call to [`apply_award`] yields up to two audit entries:
//!
//! | Entry | Requested | Applied | Balance after |
//! |-------|-----------|---------|---------------|
//! | the award | `delta` | clamped `delta` | `balance_after_award` |
//! | the bonus (if any) | `bonus` | `bonus` | `new_tokens` |

use chrono::{DateTime, Utc};
use companion_types::PetRecord;

use crate::config::{EconomyConfig, ScoringConfig, UnlockTable};
use crate::error::PetError;
use crate::scoring::level_for_experience;

/// Reason recorded on level-up bonus entries.
pub const LEVEL_UP_REASON: &str = "level_up_bonus";

/// A level transition and the bonus it paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    /// Level before the operation.
    pub previous_level: u32,
    /// Level after the operation.
    pub level: u32,
    /// Tokens credited for the levels gained.
    pub bonus: u64,
}

impl LevelChange {
    /// Whether any level was gained.
    pub const fn leveled_up(&self) -> bool {
        self.level > self.previous_level
    }

    /// Number of levels gained.
    pub const fn levels_gained(&self) -> u32 {
        self.level.saturating_sub(self.previous_level)
    }
}

/// Result of one token award.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardOutcome {
    /// Delta the caller asked for.
    pub requested_delta: i64,
    /// Delta applied after clamping at zero.
    pub applied_delta: i64,
    /// Balance after the award but before any level-up bonus.
    pub balance_after_award: u64,
    /// Level transition triggered by the award.
    pub level_change: LevelChange,
    /// Final balance.
    pub new_tokens: u64,
    /// Trimmed reason.
    pub reason: String,
}

/// Which customization slots a level unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unlocks {
    /// Coat patterns may be changed.
    pub pattern: bool,
    /// Accessories may be equipped.
    pub accessory: bool,
}

/// Report the slots open at `level`.
pub const fn unlocks_for(level: u32, table: &UnlockTable) -> Unlocks {
    Unlocks {
        pattern: level >= table.pattern_level,
        accessory: level >= table.accessory_level,
    }
}

/// Move a pet to `new_level` (never lower) and pay the level-up bonus.
///
/// # Errors
///
/// Returns [`PetError::ArithmeticOverflow`] if the bonus or counters
/// overflow. The pet is untouched on error.
pub fn apply_level_change(
    pet: &mut PetRecord,
    new_level: u32,
    economy: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<LevelChange, PetError> {
    let previous_level = pet.level;
    let level = new_level.max(previous_level);
    let gained = level.saturating_sub(previous_level);

    if gained == 0 {
        return Ok(LevelChange {
            previous_level,
            level,
            bonus: 0,
        });
    }

    let bonus = economy
        .level_up_bonus
        .checked_mul(u64::from(gained))
        .ok_or_else(|| overflow("level-up bonus"))?;
    let tokens = pet
        .evolution_tokens
        .checked_add(bonus)
        .ok_or_else(|| overflow("token balance with bonus"))?;
    let evolutions = pet
        .total_evolutions
        .checked_add(gained)
        .ok_or_else(|| overflow("total evolutions"))?;

    pet.level = level;
    pet.evolution_tokens = tokens;
    pet.total_evolutions = evolutions;
    pet.last_evolution_at = Some(now);

    Ok(LevelChange {
        previous_level,
        level,
        bonus,
    })
}

/// Apply a token award to a pet.
///
/// The balance is clamped at zero; the clamped amount is reported as
/// `applied_delta`. Positive deltas add to experience and may level the pet
/// up. A zero delta is valid and changes nothing but is still reported so
/// it can be logged.
///
/// # Errors
///
/// - [`PetError::MissingReason`] if `reason` is blank
/// - [`PetError::ArithmeticOverflow`] if the balance or experience overflows
pub fn apply_award(
    pet: &mut PetRecord,
    delta: i64,
    reason: &str,
    scoring: &ScoringConfig,
    economy: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<AwardOutcome, PetError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(PetError::MissingReason);
    }

    let (balance, applied_delta) = if delta >= 0 {
        let credit = delta.unsigned_abs();
        let balance = pet
            .evolution_tokens
            .checked_add(credit)
            .ok_or_else(|| overflow("token balance"))?;
        (balance, delta)
    } else {
        let debit = delta.unsigned_abs().min(pet.evolution_tokens);
        let applied = i64::try_from(debit)
            .map(i64::wrapping_neg)
            .map_err(|e| overflow(&format!("clamped debit: {e}")))?;
        (pet.evolution_tokens.saturating_sub(debit), applied)
    };

    let experience = if delta > 0 {
        pet.experience
            .checked_add(delta.unsigned_abs())
            .ok_or_else(|| overflow("experience"))?
    } else {
        pet.experience
    };

    pet.evolution_tokens = balance;
    pet.experience = experience;

    let derived = level_for_experience(experience, &scoring.level_table);
    let level_change = apply_level_change(pet, derived, economy, now)?;

    Ok(AwardOutcome {
        requested_delta: delta,
        applied_delta,
        balance_after_award: balance,
        level_change,
        new_tokens: pet.evolution_tokens,
        reason: reason.to_owned(),
    })
}

fn overflow(context: &str) -> PetError {
    PetError::ArithmeticOverflow {
        context: context.to_owned(),
    }
}
