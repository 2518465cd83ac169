//! Relationship Scorer: happiness and level derivation.
//!
//! Happiness is the weighted average of the four relationship signals,
//! computed in integer basis points and rounded half-up:
//!
//! ```text
//! happiness = (sum(signal_i * weight_bp_i) + 5000) / 10000
//! ```
//!
//! Level is the highest row of the level table whose `min_experience` does
//! not exceed the pet's lifetime experience, floored at the previously
//! stored level so it never decreases.
//!
//! Everything here is pure. Out-of-range signals are rejected, never
//! clamped.

use companion_types::RelationshipStats;

use crate::config::{LevelThreshold, ScoringConfig, SignalWeights, WEIGHT_TOTAL_BP};
use crate::error::PetError;

/// Upper bound of every relationship signal and of happiness.
pub const MAX_SIGNAL: u32 = 100;

/// Output of [`compute_happiness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HappinessOutcome {
    /// Happiness in 0--100.
    pub happiness: u32,
    /// Level derived from experience, never below the previous level.
    pub level: u32,
    /// Whether `level` exceeds the previous level.
    pub leveled_up: bool,
}

/// Reject any signal outside 0--100.
///
/// # Errors
///
/// Returns [`PetError::InvalidSignal`] naming the first offending signal.
pub fn validate_stats(stats: &RelationshipStats) -> Result<(), PetError> {
    let signals = [
        ("connection", stats.connection),
        ("reliability", stats.reliability),
        ("communication", stats.communication),
        ("energy", stats.energy),
    ];
    match signals.into_iter().find(|(_, value)| *value > MAX_SIGNAL) {
        Some((signal, value)) => Err(PetError::InvalidSignal { signal, value }),
        None => Ok(()),
    }
}

/// Weighted happiness for one signal snapshot.
///
/// # Errors
///
/// Returns [`PetError::InvalidSignal`] for out-of-range input or
/// [`PetError::ArithmeticOverflow`] if the weights are absurdly large.
pub fn happiness_for(stats: &RelationshipStats, weights: &SignalWeights) -> Result<u32, PetError> {
    validate_stats(stats)?;

    let terms = [
        (stats.connection, weights.connection_bp),
        (stats.reliability, weights.reliability_bp),
        (stats.communication, weights.communication_bp),
        (stats.energy, weights.energy_bp),
    ];

    let mut weighted: u64 = 0;
    for (signal, weight) in terms {
        let term = u64::from(signal)
            .checked_mul(u64::from(weight))
            .ok_or_else(|| overflow("weighted signal"))?;
        weighted = weighted
            .checked_add(term)
            .ok_or_else(|| overflow("weighted signal sum"))?;
    }

    let half = u64::from(WEIGHT_TOTAL_BP / 2);
    let rounded = weighted
        .checked_add(half)
        .and_then(|v| v.checked_div(u64::from(WEIGHT_TOTAL_BP)))
        .ok_or_else(|| overflow("happiness rounding"))?;

    // Valid weights keep this within range; the min guards unvalidated ones.
    let happiness = u32::try_from(rounded)
        .unwrap_or(MAX_SIGNAL)
        .min(MAX_SIGNAL);
    Ok(happiness)
}

/// The level a given lifetime experience reaches.
///
/// Returns 1 for an empty table or experience below every row.
pub fn level_for_experience(experience: u64, table: &[LevelThreshold]) -> u32 {
    table
        .iter()
        .take_while(|row| row.min_experience <= experience)
        .map(|row| row.level)
        .last()
        .unwrap_or(1)
        .max(1)
}

/// Compute happiness and level from a signal snapshot.
///
/// `previous_level` is the level currently stored on the pet; pass `1` for
/// a pet that is only now hatching.
///
/// # Errors
///
/// See [`happiness_for`].
pub fn compute_happiness(
    stats: &RelationshipStats,
    experience: u64,
    previous_level: u32,
    config: &ScoringConfig,
) -> Result<HappinessOutcome, PetError> {
    let happiness = happiness_for(stats, &config.weights)?;
    let level = level_for_experience(experience, &config.level_table).max(previous_level);
    Ok(HappinessOutcome {
        happiness,
        level,
        leveled_up: level > previous_level,
    })
}

fn overflow(context: &str) -> PetError {
    PetError::ArithmeticOverflow {
        context: context.to_owned(),
    }
}
