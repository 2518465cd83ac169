//! Tunable parameters for scoring and the token economy.
//!
//! These structs are embedded in the `scoring` and `economy` sections of
//! `companion-config.yaml`. Every field has a default so a partial (or
//! empty) section still yields a working configuration; [`ScoringConfig::validate`]
//! and [`EconomyConfig::validate`] reject combinations the scorer cannot
//! honor.

use serde::{Deserialize, Serialize};

use crate::error::PetError;

/// Basis points that make up a whole.
pub const WEIGHT_TOTAL_BP: u32 = 10_000;

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Per-signal weights, in basis points. Must sum to [`WEIGHT_TOTAL_BP`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalWeights {
    /// Weight of `connection` (default: 2500).
    #[serde(default = "default_weight_bp")]
    pub connection_bp: u32,
    /// Weight of `reliability` (default: 2500).
    #[serde(default = "default_weight_bp")]
    pub reliability_bp: u32,
    /// Weight of `communication` (default: 2500).
    #[serde(default = "default_weight_bp")]
    pub communication_bp: u32,
    /// Weight of `energy` (default: 2500).
    #[serde(default = "default_weight_bp")]
    pub energy_bp: u32,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            connection_bp: default_weight_bp(),
            reliability_bp: default_weight_bp(),
            communication_bp: default_weight_bp(),
            energy_bp: default_weight_bp(),
        }
    }
}

impl SignalWeights {
    /// Sum of all four weights, or `None` on overflow.
    pub fn total(&self) -> Option<u32> {
        self.connection_bp
            .checked_add(self.reliability_bp)?
            .checked_add(self.communication_bp)?
            .checked_add(self.energy_bp)
    }
}

/// One row of the level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelThreshold {
    /// Lifetime experience needed to reach `level`.
    pub min_experience: u64,
    /// The level reached.
    pub level: u32,
}

impl LevelThreshold {
    /// Build a table row.
    pub const fn new(min_experience: u64, level: u32) -> Self {
        Self {
            min_experience,
            level,
        }
    }
}

/// Relationship Scorer parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Happiness weights.
    #[serde(default)]
    pub weights: SignalWeights,

    /// Ordered level table; the first row must start at 0 experience.
    #[serde(default = "default_level_table")]
    pub level_table: Vec<LevelThreshold>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            level_table: default_level_table(),
        }
    }
}

impl ScoringConfig {
    /// Check that the weights sum to a whole and the level table is usable.
    ///
    /// # Errors
    ///
    /// Returns [`PetError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), PetError> {
        match self.weights.total() {
            Some(WEIGHT_TOTAL_BP) => {}
            Some(other) => {
                return Err(PetError::InvalidConfig(format!(
                    "scoring weights sum to {other} bp, expected {WEIGHT_TOTAL_BP}"
                )));
            }
            None => {
                return Err(PetError::InvalidConfig(String::from(
                    "scoring weights overflow",
                )));
            }
        }

        let Some(first) = self.level_table.first() else {
            return Err(PetError::InvalidConfig(String::from(
                "level table is empty",
            )));
        };
        if first.min_experience != 0 || first.level != 1 {
            return Err(PetError::InvalidConfig(String::from(
                "level table must start with level 1 at 0 experience",
            )));
        }

        for pair in self.level_table.windows(2) {
            if let [lower, upper] = pair
                && (upper.min_experience <= lower.min_experience || upper.level <= lower.level)
            {
                return Err(PetError::InvalidConfig(format!(
                    "level table is not ascending at level {}",
                    upper.level
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Economy
// ---------------------------------------------------------------------------

/// Level at which each level-locked customization slot opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockTable {
    /// Level that unlocks coat patterns (default: 2).
    #[serde(default = "default_pattern_level")]
    pub pattern_level: u32,
    /// Level that unlocks accessories (default: 3).
    #[serde(default = "default_accessory_level")]
    pub accessory_level: u32,
}

impl Default for UnlockTable {
    fn default() -> Self {
        Self {
            pattern_level: default_pattern_level(),
            accessory_level: default_accessory_level(),
        }
    }
}

/// Token economy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Tokens credited per level gained (default: 10).
    #[serde(default = "default_level_up_bonus")]
    pub level_up_bonus: u64,

    /// Customization unlock levels.
    #[serde(default)]
    pub unlocks: UnlockTable,

    /// Minimum happiness required to hatch (default: 0, always allowed).
    #[serde(default)]
    pub hatch_threshold: u32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            level_up_bonus: default_level_up_bonus(),
            unlocks: UnlockTable::default(),
            hatch_threshold: 0,
        }
    }
}

impl EconomyConfig {
    /// Check the economy parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PetError::InvalidConfig`] if the hatch threshold exceeds
    /// 100 or an unlock level is 0.
    pub fn validate(&self) -> Result<(), PetError> {
        if self.hatch_threshold > 100 {
            return Err(PetError::InvalidConfig(format!(
                "hatch_threshold {} exceeds 100",
                self.hatch_threshold
            )));
        }
        if self.unlocks.pattern_level == 0 || self.unlocks.accessory_level == 0 {
            return Err(PetError::InvalidConfig(String::from(
                "unlock levels start at 1",
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_weight_bp() -> u32 {
    2500
}

fn default_level_table() -> Vec<LevelThreshold> {
    [
        (0, 1),
        (100, 2),
        (250, 3),
        (500, 4),
        (1_000, 5),
        (2_000, 6),
        (3_500, 7),
        (5_500, 8),
        (8_000, 9),
        (12_000, 10),
    ]
    .into_iter()
    .map(|(min_experience, level)| LevelThreshold::new(min_experience, level))
    .collect()
}

const fn default_pattern_level() -> u32 {
    2
}

const fn default_accessory_level() -> u32 {
    3
}

const fn default_level_up_bonus() -> u64 {
    10
}
