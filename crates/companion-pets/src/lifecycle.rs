//! Pet lifecycle transitions: hatch, customize, and happiness updates.
//!
//! Each function takes the current state by mutable reference and either
//! applies the whole transition or returns an error with the state
//! untouched. Callers run them against a copy of the persisted record and
//! write the copy back with a compare-and-swap.

use chrono::{DateTime, Utc};
use companion_types::{
    CustomizationPatch, EntityRecord, GenerationState, HatchOptions, MediaSet, PetRecord,
    PetType, RelationshipStats,
};

use crate::config::{EconomyConfig, ScoringConfig};
use crate::economy::{LevelChange, apply_level_change, unlocks_for};
use crate::error::PetError;
use crate::scoring::{compute_happiness, level_for_experience};

/// Longest accepted pet name, in characters.
pub const MAX_NAME_CHARS: usize = 40;

/// Longest accepted color, pattern, or accessory label, in characters.
pub const MAX_LABEL_CHARS: usize = 40;

/// Color a pet hatches with when none is chosen.
pub const DEFAULT_COLOR: &str = "amber";

/// Pattern every pet hatches with.
pub const DEFAULT_PATTERN: &str = "solid";

/// Name given when the caller does not pick one.
pub const fn default_name(pet_type: PetType) -> &'static str {
    match pet_type {
        PetType::Cat => "Mochi",
        PetType::Dog => "Biscuit",
        PetType::Bunny => "Clover",
        PetType::Fox => "Ember",
        PetType::Dragon => "Cinder",
        PetType::Owl => "Hoot",
    }
}

/// Result of a happiness update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HappinessChange {
    /// Happiness before the update.
    pub previous_happiness: u32,
    /// Happiness after the update.
    pub happiness: u32,
    /// Level transition, with any bonus paid.
    pub level_change: LevelChange,
}

// ---------------------------------------------------------------------------
// Hatch
// ---------------------------------------------------------------------------

/// Build a freshly hatched pet.
///
/// Happiness and level come from the scorer; tokens and experience start at
/// zero. Pattern starts as [`DEFAULT_PATTERN`] and there is no accessory,
/// since both slots are level-locked.
///
/// # Errors
///
/// - [`PetError::InvalidSignal`] for out-of-range stats
/// - [`PetError::BelowHatchThreshold`] if happiness is under the threshold
/// - [`PetError::InvalidCustomization`] for a bad color or name
pub fn hatch_pet(
    options: &HatchOptions,
    stats: &RelationshipStats,
    scoring: &ScoringConfig,
    economy: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<PetRecord, PetError> {
    let outcome = compute_happiness(stats, 0, 1, scoring)?;
    if outcome.happiness < economy.hatch_threshold {
        return Err(PetError::BelowHatchThreshold {
            happiness: outcome.happiness,
            threshold: economy.hatch_threshold,
        });
    }

    let pet_type = options.pet_type.unwrap_or_default();
    let color = match options.color.as_deref() {
        Some(raw) => label("color", raw)?,
        None => DEFAULT_COLOR.to_owned(),
    };
    let pet_name = match options.pet_name.as_deref() {
        Some(raw) => name(raw)?,
        None => default_name(pet_type).to_owned(),
    };

    Ok(PetRecord {
        pet_type,
        color,
        pattern: DEFAULT_PATTERN.to_owned(),
        accessory: None,
        pet_name,
        level: level_for_experience(0, &scoring.level_table),
        happiness: outcome.happiness,
        stats: *stats,
        evolution_tokens: 0,
        experience: 0,
        total_evolutions: 0,
        last_evolution_at: None,
        hatched_at: now,
        media: MediaSet::default(),
        generation: GenerationState::default(),
    })
}

/// Hatch a pet into an entity container.
///
/// # Errors
///
/// [`PetError::AlreadyHatched`] if the entity already has a pet (the record
/// is left unchanged), plus everything [`hatch_pet`] returns.
pub fn hatch(
    record: &mut EntityRecord,
    options: &HatchOptions,
    stats: &RelationshipStats,
    scoring: &ScoringConfig,
    economy: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<(), PetError> {
    if record.pet.is_some() {
        return Err(PetError::AlreadyHatched);
    }
    record.pet = Some(hatch_pet(options, stats, scoring, economy, now)?);
    Ok(())
}

/// Borrow the pet of an entity, or fail with [`PetError::NotHatched`].
///
/// # Errors
///
/// [`PetError::NotHatched`] when the entity has no pet.
pub const fn pet_mut(record: &mut EntityRecord) -> Result<&mut PetRecord, PetError> {
    match record.pet.as_mut() {
        Some(pet) => Ok(pet),
        None => Err(PetError::NotHatched),
    }
}

// ---------------------------------------------------------------------------
// Customization
// ---------------------------------------------------------------------------

/// Apply a partial customization.
///
/// All fields are validated before any is written. A pattern or a new
/// accessory requires the slot to be unlocked; removing an accessory
/// (`Some("")`) is always allowed.
///
/// # Errors
///
/// - [`PetError::InvalidCustomization`] for an empty or oversize value
/// - [`PetError::Locked`] for a slot above the pet's level
pub fn apply_customization(
    pet: &mut PetRecord,
    patch: &CustomizationPatch,
    economy: &EconomyConfig,
) -> Result<(), PetError> {
    let unlocks = unlocks_for(pet.level, &economy.unlocks);

    let color = patch.color.as_deref().map(|c| label("color", c)).transpose()?;
    let pet_name = patch.pet_name.as_deref().map(name).transpose()?;

    let pattern = match patch.pattern.as_deref() {
        Some(raw) => {
            if !unlocks.pattern {
                return Err(PetError::Locked {
                    slot: "pattern",
                    required_level: economy.unlocks.pattern_level,
                    level: pet.level,
                });
            }
            Some(label("pattern", raw)?)
        }
        None => None,
    };

    // Outer None: untouched. Some(None): remove. Some(Some(_)): equip.
    let accessory = match patch.accessory.as_deref() {
        Some(raw) if raw.trim().is_empty() => Some(None),
        Some(raw) => {
            if !unlocks.accessory {
                return Err(PetError::Locked {
                    slot: "accessory",
                    required_level: economy.unlocks.accessory_level,
                    level: pet.level,
                });
            }
            Some(Some(label("accessory", raw)?))
        }
        None => None,
    };

    if let Some(color) = color {
        pet.color = color;
    }
    if let Some(pet_name) = pet_name {
        pet.pet_name = pet_name;
    }
    if let Some(pattern) = pattern {
        pet.pattern = pattern;
    }
    if let Some(accessory) = accessory {
        pet.accessory = accessory;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Happiness
// ---------------------------------------------------------------------------

/// Replace the signal snapshot and recompute happiness and level.
///
/// Level normally only moves on token awards; recomputing here picks up a
/// level table that changed since the last award. Any level gained pays the
/// usual bonus.
///
/// # Errors
///
/// [`PetError::InvalidSignal`] for out-of-range stats, or an overflow from
/// the level-up bonus.
pub fn update_happiness(
    pet: &mut PetRecord,
    stats: &RelationshipStats,
    scoring: &ScoringConfig,
    economy: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<HappinessChange, PetError> {
    let outcome = compute_happiness(stats, pet.experience, pet.level, scoring)?;
    let previous_happiness = pet.happiness;

    let mut next = pet.clone();
    next.happiness = outcome.happiness;
    next.stats = *stats;
    let level_change = apply_level_change(&mut next, outcome.level, economy, now)?;
    *pet = next;

    Ok(HappinessChange {
        previous_happiness,
        happiness: outcome.happiness,
        level_change,
    })
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn name(raw: &str) -> Result<String, PetError> {
    let trimmed = raw.trim();
    let chars = trimmed.chars().count();
    if chars == 0 || chars > MAX_NAME_CHARS {
        return Err(PetError::InvalidCustomization {
            field: "pet_name",
            reason: format!("must be 1 to {MAX_NAME_CHARS} characters"),
        });
    }
    Ok(trimmed.to_owned())
}

fn label(field: &'static str, raw: &str) -> Result<String, PetError> {
    let trimmed = raw.trim();
    let chars = trimmed.chars().count();
    if chars == 0 || chars > MAX_LABEL_CHARS {
        return Err(PetError::InvalidCustomization {
            field,
            reason: format!("must be 1 to {MAX_LABEL_CHARS} characters"),
        });
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::LevelThreshold;
    use companion_types::EntityId;

    fn stats() -> RelationshipStats {
        RelationshipStats::new(80, 70, 90, 60)
    }

    fn hatched() -> PetRecord {
        hatch_pet(
            &HatchOptions::default(),
            &stats(),
            &ScoringConfig::default(),
            &EconomyConfig::default(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn hatch_initializes_from_scorer() {
        let pet = hatched();
        assert_eq!(pet.happiness, 75);
        assert_eq!(pet.level, 1);
        assert_eq!(pet.evolution_tokens, 0);
        assert_eq!(pet.pattern, DEFAULT_PATTERN);
        assert_eq!(pet.color, DEFAULT_COLOR);
        assert_eq!(pet.pet_name, "Mochi");
        assert!(pet.accessory.is_none());
        assert_eq!(pet.generation, GenerationState::default());
    }

    #[test]
    fn hatch_twice_leaves_record_unchanged() {
        let mut record = EntityRecord::new(EntityId::new());
        let scoring = ScoringConfig::default();
        let economy = EconomyConfig::default();
        let options = HatchOptions {
            pet_type: Some(PetType::Fox),
            color: None,
            pet_name: Some("  Rusty ".to_owned()),
        };

        assert!(hatch(&mut record, &options, &stats(), &scoring, &economy, Utc::now()).is_ok());
        let snapshot = record.clone();

        let second = hatch(
            &mut record,
            &HatchOptions::default(),
            &RelationshipStats::new(0, 0, 0, 0),
            &scoring,
            &economy,
            Utc::now(),
        );
        assert_eq!(second, Err(PetError::AlreadyHatched));
        assert_eq!(record, snapshot);
        assert_eq!(record.pet.map(|p| p.pet_name), Some("Rusty".to_owned()));
    }

    #[test]
    fn hatch_threshold_enforced() {
        let economy = EconomyConfig {
            hatch_threshold: 80,
            ..EconomyConfig::default()
        };
        let result = hatch_pet(
            &HatchOptions::default(),
            &stats(),
            &ScoringConfig::default(),
            &economy,
            Utc::now(),
        );
        assert_eq!(
            result.err(),
            Some(PetError::BelowHatchThreshold {
                happiness: 75,
                threshold: 80,
            })
        );
    }

    #[test]
    fn customize_partial_update() {
        let mut pet = hatched();
        let patch = CustomizationPatch {
            color: Some("teal".to_owned()),
            ..CustomizationPatch::default()
        };
        assert!(apply_customization(&mut pet, &patch, &EconomyConfig::default()).is_ok());
        assert_eq!(pet.color, "teal");
        assert_eq!(pet.pet_name, "Mochi");
        assert_eq!(pet.pattern, DEFAULT_PATTERN);
    }

    #[test]
    fn locked_slot_rejected_atomically() {
        let mut pet = hatched();
        let before = pet.clone();
        let patch = CustomizationPatch {
            color: Some("teal".to_owned()),
            pattern: Some("spotted".to_owned()),
            ..CustomizationPatch::default()
        };
        let result = apply_customization(&mut pet, &patch, &EconomyConfig::default());
        assert_eq!(
            result,
            Err(PetError::Locked {
                slot: "pattern",
                required_level: 2,
                level: 1,
            })
        );
        assert_eq!(pet, before);
    }

    #[test]
    fn accessory_equip_and_remove() {
        let mut pet = hatched();
        pet.level = 3;
        let economy = EconomyConfig::default();

        let equip = CustomizationPatch {
            accessory: Some("scarf".to_owned()),
            ..CustomizationPatch::default()
        };
        assert!(apply_customization(&mut pet, &equip, &economy).is_ok());
        assert_eq!(pet.accessory.as_deref(), Some("scarf"));

        let remove = CustomizationPatch {
            accessory: Some(String::new()),
            ..CustomizationPatch::default()
        };
        assert!(apply_customization(&mut pet, &remove, &economy).is_ok());
        assert!(pet.accessory.is_none());
    }

    #[test]
    fn name_length_validated() {
        let mut pet = hatched();
        let economy = EconomyConfig::default();
        let long = "x".repeat(41);
        for bad in ["", "   ", long.as_str()] {
            let patch = CustomizationPatch {
                pet_name: Some(bad.to_owned()),
                ..CustomizationPatch::default()
            };
            assert!(matches!(
                apply_customization(&mut pet, &patch, &economy),
                Err(PetError::InvalidCustomization { field: "pet_name", .. })
            ));
        }
    }

    #[test]
    fn happiness_update_recomputes() {
        let mut pet = hatched();
        let change = update_happiness(
            &mut pet,
            &RelationshipStats::new(20, 20, 20, 20),
            &ScoringConfig::default(),
            &EconomyConfig::default(),
            Utc::now(),
        );
        assert_eq!(change.map(|c| (c.previous_happiness, c.happiness)), Ok((75, 20)));
        assert_eq!(pet.happiness, 20);
        assert_eq!(pet.stats, RelationshipStats::new(20, 20, 20, 20));
    }

    #[test]
    fn happiness_update_applies_changed_level_table() {
        let mut pet = hatched();
        pet.experience = 50;
        let scoring = ScoringConfig {
            level_table: vec![LevelThreshold::new(0, 1), LevelThreshold::new(40, 2)],
            ..ScoringConfig::default()
        };
        let change = update_happiness(
            &mut pet,
            &stats(),
            &scoring,
            &EconomyConfig::default(),
            Utc::now(),
        )
        .unwrap();
        assert!(change.level_change.leveled_up());
        assert_eq!(change.level_change.bonus, 10);
        assert_eq!(pet.level, 2);
        assert_eq!(pet.evolution_tokens, 10);
    }

    #[test]
    fn invalid_stats_leave_pet_untouched() {
        let mut pet = hatched();
        let before = pet.clone();
        let result = update_happiness(
            &mut pet,
            &RelationshipStats::new(200, 0, 0, 0),
            &ScoringConfig::default(),
            &EconomyConfig::default(),
            Utc::now(),
        );
        assert!(matches!(result, Err(PetError::InvalidSignal { .. })));
        assert_eq!(pet, before);
    }
}
