//! Core record structs for the companion engine.
//!
//! [`EntityRecord`] is the unit of persistence: one per owning relationship
//! entity, carrying an optimistic-concurrency `version` and an optional
//! [`PetRecord`]. A pet is either fully present or absent; there is no
//! partially hatched state to represent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    EtaBucket, GenerationFailure, GenerationPreset, GenerationStatus, MediaKind, Mood, PetType,
};
use crate::ids::{AwardId, EntityId, GenerationJobId};

// ---------------------------------------------------------------------------
// Relationship signals
// ---------------------------------------------------------------------------

/// Snapshot of the four relationship signals, each expected in 0--100.
///
/// Values are validated by the scorer rather than at deserialization so
/// that the rejection carries a typed error naming the offending signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RelationshipStats {
    /// How connected the user feels to the contact.
    pub connection: u32,
    /// How reliably interactions happen.
    pub reliability: u32,
    /// Quality of communication.
    pub communication: u32,
    /// Energy of recent interactions.
    pub energy: u32,
}

impl RelationshipStats {
    /// Build a snapshot from the four signals.
    pub const fn new(connection: u32, reliability: u32, communication: u32, energy: u32) -> Self {
        Self {
            connection,
            reliability,
            communication,
            energy,
        }
    }
}

// ---------------------------------------------------------------------------
// Media references
// ---------------------------------------------------------------------------

/// One (mood, kind) combination a generation job can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MediaVariant {
    /// The mood rendered.
    pub mood: Mood,
    /// Image or video.
    pub kind: MediaKind,
}

impl MediaVariant {
    /// Build a variant.
    pub const fn new(mood: Mood, kind: MediaKind) -> Self {
        Self { mood, kind }
    }

    /// Every variant a preset asks for, moods in display order.
    pub fn for_preset(preset: GenerationPreset) -> Vec<Self> {
        Mood::ALL
            .iter()
            .flat_map(|mood| preset.kinds().iter().map(|kind| Self::new(*mood, *kind)))
            .collect()
    }

    /// Stable key used in logs and prompt contexts, e.g. `happy_video`.
    pub fn key(self) -> String {
        format!("{}_{}", self.mood.as_str(), self.kind.as_str())
    }
}

impl core::fmt::Display for MediaVariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}_{}", self.mood.as_str(), self.kind.as_str())
    }
}

/// The eight media reference slots of a pet.
///
/// Slots are only written by a `completed` generation transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MediaSet {
    /// Happy mood still.
    pub happy_image_url: Option<String>,
    /// Happy mood video.
    pub happy_video_url: Option<String>,
    /// Neutral mood still.
    pub neutral_image_url: Option<String>,
    /// Neutral mood video.
    pub neutral_video_url: Option<String>,
    /// Sad mood still.
    pub sad_image_url: Option<String>,
    /// Sad mood video.
    pub sad_video_url: Option<String>,
    /// Excited mood still.
    pub excited_image_url: Option<String>,
    /// Excited mood video.
    pub excited_video_url: Option<String>,
}

impl MediaSet {
    /// Read the reference for one variant.
    pub const fn get(&self, variant: MediaVariant) -> Option<&String> {
        self.slot(variant).as_ref()
    }

    /// Overwrite the reference for one variant.
    pub fn set(&mut self, variant: MediaVariant, url: String) {
        *self.slot_mut(variant) = Some(url);
    }

    /// Whether every listed variant has a reference.
    pub fn has_all(&self, variants: &[MediaVariant]) -> bool {
        variants.iter().all(|v| self.get(*v).is_some())
    }

    const fn slot(&self, variant: MediaVariant) -> &Option<String> {
        match (variant.mood, variant.kind) {
            (Mood::Happy, MediaKind::Image) => &self.happy_image_url,
            (Mood::Happy, MediaKind::Video) => &self.happy_video_url,
            (Mood::Neutral, MediaKind::Image) => &self.neutral_image_url,
            (Mood::Neutral, MediaKind::Video) => &self.neutral_video_url,
            (Mood::Sad, MediaKind::Image) => &self.sad_image_url,
            (Mood::Sad, MediaKind::Video) => &self.sad_video_url,
            (Mood::Excited, MediaKind::Image) => &self.excited_image_url,
            (Mood::Excited, MediaKind::Video) => &self.excited_video_url,
        }
    }

    const fn slot_mut(&mut self, variant: MediaVariant) -> &mut Option<String> {
        match (variant.mood, variant.kind) {
            (Mood::Happy, MediaKind::Image) => &mut self.happy_image_url,
            (Mood::Happy, MediaKind::Video) => &mut self.happy_video_url,
            (Mood::Neutral, MediaKind::Image) => &mut self.neutral_image_url,
            (Mood::Neutral, MediaKind::Video) => &mut self.neutral_video_url,
            (Mood::Sad, MediaKind::Image) => &mut self.sad_image_url,
            (Mood::Sad, MediaKind::Video) => &mut self.sad_video_url,
            (Mood::Excited, MediaKind::Image) => &mut self.excited_image_url,
            (Mood::Excited, MediaKind::Video) => &mut self.excited_video_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Generation state
// ---------------------------------------------------------------------------

/// The generation pipeline fields of a pet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GenerationState {
    /// Current pipeline status.
    pub status: GenerationStatus,
    /// The current (or most recent) job.
    pub job_id: Option<GenerationJobId>,
    /// Variants the current job must deliver before it may complete.
    pub requested: Vec<MediaVariant>,
    /// When the current job was requested.
    pub started_at: Option<DateTime<Utc>>,
    /// When the current job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Human-readable failure cause for a `failed` job.
    pub error: Option<String>,
    /// Classified failure cause for a `failed` job.
    #[serde(default)]
    pub failure: Option<GenerationFailure>,
}

/// Caller-facing snapshot of the generation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GenerationStatusView {
    /// Current status.
    pub status: GenerationStatus,
    /// Current (or most recent) job.
    pub job_id: Option<GenerationJobId>,
    /// Variants the job must deliver.
    pub requested: Vec<MediaVariant>,
    /// When the job started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure message.
    pub error: Option<String>,
    /// Classified failure cause.
    pub failure: Option<GenerationFailure>,
    /// Advisory estimate; only present while in flight.
    pub estimated_time_remaining: Option<EtaBucket>,
}

// ---------------------------------------------------------------------------
// Pet record
// ---------------------------------------------------------------------------

/// The authoritative state of one companion pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PetRecord {
    /// Species.
    pub pet_type: PetType,
    /// Display color (free-form, e.g. `"amber"` or `"#ffaa00"`).
    pub color: String,
    /// Coat pattern (free-form, e.g. `"spotted"`).
    pub pattern: String,
    /// Optional accessory (e.g. `"scarf"`).
    pub accessory: Option<String>,
    /// Name chosen by the user.
    pub pet_name: String,
    /// Current level, at least 1.
    pub level: u32,
    /// Happiness derived from `stats`, 0--100.
    pub happiness: u32,
    /// The relationship-signal snapshot `happiness` was computed from.
    pub stats: RelationshipStats,
    /// Spendable evolution-token balance.
    pub evolution_tokens: u64,
    /// Lifetime sum of positive awards. Drives the level table.
    pub experience: u64,
    /// Number of levels gained since hatching.
    pub total_evolutions: u32,
    /// When the pet last gained a level.
    pub last_evolution_at: Option<DateTime<Utc>>,
    /// When the pet hatched. Immutable once set.
    pub hatched_at: DateTime<Utc>,
    /// Generated media references.
    pub media: MediaSet,
    /// Generation pipeline state.
    pub generation: GenerationState,
}

/// The persisted container for one relationship entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EntityRecord {
    /// The owning entity.
    pub entity_id: EntityId,
    /// Optimistic-concurrency counter; bumped by every successful write.
    pub version: u64,
    /// The pet, once hatched.
    pub pet: Option<PetRecord>,
    /// When the entity was registered.
    pub created_at: DateTime<Utc>,
}

impl EntityRecord {
    /// A freshly registered entity with no pet.
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            version: 0,
            pet: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Customization inputs
// ---------------------------------------------------------------------------

/// Initial look chosen at hatch time. Every field falls back to a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HatchOptions {
    /// Species; defaults to [`PetType::Cat`].
    #[serde(default)]
    pub pet_type: Option<PetType>,
    /// Color; defaults to `"amber"`.
    #[serde(default)]
    pub color: Option<String>,
    /// Name; defaults to a species-based name.
    #[serde(default)]
    pub pet_name: Option<String>,
}

/// Partial customization update. `None` leaves a field untouched.
///
/// An empty `accessory` string removes the current accessory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CustomizationPatch {
    /// New color.
    #[serde(default)]
    pub color: Option<String>,
    /// New pattern.
    #[serde(default)]
    pub pattern: Option<String>,
    /// New name.
    #[serde(default)]
    pub pet_name: Option<String>,
    /// New accessory, or `""` to remove it.
    #[serde(default)]
    pub accessory: Option<String>,
}

impl CustomizationPatch {
    /// Whether the patch changes nothing.
    pub const fn is_empty(&self) -> bool {
        self.color.is_none()
            && self.pattern.is_none()
            && self.pet_name.is_none()
            && self.accessory.is_none()
    }
}

// ---------------------------------------------------------------------------
// Token award audit entry
// ---------------------------------------------------------------------------

/// One attributable evolution-token award.
///
/// `requested_delta` is what the caller asked for; `applied_delta` is the
/// change actually made after clamping the balance at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TokenAward {
    /// Unique award id.
    pub id: AwardId,
    /// The entity whose pet received the award.
    pub entity_id: EntityId,
    /// Delta the caller requested.
    pub requested_delta: i64,
    /// Delta actually applied to the balance.
    pub applied_delta: i64,
    /// Balance after the award.
    pub balance_after: u64,
    /// Why the award was made. Never empty.
    pub reason: String,
    /// When the award was recorded.
    pub created_at: DateTime<Utc>,
}
