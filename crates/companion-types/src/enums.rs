//! Enumeration types for the companion engine.
//!
//! Pet species, the four mood variants, the two media kinds, and the
//! generation job status that drives the media pipeline state machine.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Pet species
// ---------------------------------------------------------------------------

/// The species a pet hatches as. Chosen at hatch time and part of the
/// customization set.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum PetType {
    /// A small cat.
    #[default]
    Cat,
    /// A puppy.
    Dog,
    /// A rabbit.
    Bunny,
    /// A fox kit.
    Fox,
    /// A baby dragon.
    Dragon,
    /// An owlet.
    Owl,
}

impl PetType {
    /// Lowercase label used in prompts and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cat => "cat",
            Self::Dog => "dog",
            Self::Bunny => "bunny",
            Self::Fox => "fox",
            Self::Dragon => "dragon",
            Self::Owl => "owl",
        }
    }
}

// ---------------------------------------------------------------------------
// Media variants
// ---------------------------------------------------------------------------

/// One of the four moods a pet can be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Mood {
    /// Content and cheerful.
    Happy,
    /// Resting expression.
    Neutral,
    /// Downcast.
    Sad,
    /// Bouncing with energy.
    Excited,
}

impl Mood {
    /// Every mood, in display order.
    pub const ALL: [Self; 4] = [Self::Happy, Self::Neutral, Self::Sad, Self::Excited];

    /// Lowercase label used in prompts and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Neutral => "neutral",
            Self::Sad => "sad",
            Self::Excited => "excited",
        }
    }

    /// The mood a pet shows at the given happiness (0--100).
    pub const fn for_happiness(happiness: u32) -> Self {
        match happiness {
            0..=34 => Self::Sad,
            35..=64 => Self::Neutral,
            65..=84 => Self::Happy,
            _ => Self::Excited,
        }
    }
}

/// The kind of media asset produced for a mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MediaKind {
    /// A still image.
    Image,
    /// A short looping video.
    Video,
}

impl MediaKind {
    /// Both media kinds.
    pub const ALL: [Self; 2] = [Self::Image, Self::Video];

    /// Lowercase label used in prompts and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Which variants a generation request asks for.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum GenerationPreset {
    /// Every mood as both image and video.
    #[default]
    All,
    /// Every mood, images only.
    Images,
    /// Every mood, videos only.
    Videos,
}

impl GenerationPreset {
    /// The media kinds this preset covers.
    pub const fn kinds(self) -> &'static [MediaKind] {
        match self {
            Self::All => &MediaKind::ALL,
            Self::Images => &[MediaKind::Image],
            Self::Videos => &[MediaKind::Video],
        }
    }
}

// ---------------------------------------------------------------------------
// Generation status
// ---------------------------------------------------------------------------

/// Status of the media generation pipeline for one pet.
///
/// ```text
/// none -> pending -> generating -> completed
///            |           |
///            +-----------+-------> failed
/// ```
///
/// `completed` and `failed` are terminal. They only move back to `pending`
/// through an explicit new generation request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum GenerationStatus {
    /// No generation has ever been requested.
    #[default]
    None,
    /// Requested; vendor submissions not yet acknowledged.
    Pending,
    /// All submissions acknowledged; waiting for vendor output.
    Generating,
    /// All requested media retrieved and persisted.
    Completed,
    /// The job failed; see the recorded error.
    Failed,
}

impl GenerationStatus {
    /// Whether a job is currently in flight (`pending` or `generating`).
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Generating)
    }

    /// Whether this is a terminal state (`completed` or `failed`).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase label matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the serialized label back into a status.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "none" => Some(Self::None),
            "pending" => Some(Self::Pending),
            "generating" => Some(Self::Generating),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Why a generation job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum GenerationFailure {
    /// The vendor rejected a submission or reported the job failed.
    Vendor,
    /// The job outlived the timeout ceiling.
    Timeout,
    /// The vendor finished without every requested variant.
    PartialResult,
    /// Poll retries were exhausted on transient errors.
    PollExhausted,
    /// Prompt rendering or another local step failed.
    Internal,
}

// ---------------------------------------------------------------------------
// Progress estimate
// ---------------------------------------------------------------------------

/// Advisory time-remaining bucket for an in-flight job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EtaBucket {
    /// Under a minute elapsed.
    #[serde(rename = "2-3 minutes")]
    TwoToThreeMinutes,
    /// One to two minutes elapsed.
    #[serde(rename = "1-2 minutes")]
    OneToTwoMinutes,
    /// Two to three minutes elapsed.
    #[serde(rename = "30-60 seconds")]
    ThirtyToSixtySeconds,
    /// Three minutes or more elapsed.
    #[serde(rename = "Almost done")]
    AlmostDone,
}

impl EtaBucket {
    /// Elapsed seconds at which the estimate drops to one to two minutes.
    pub const ONE_TO_TWO_AFTER_SECS: i64 = 60;
    /// Elapsed seconds at which the estimate drops to under a minute.
    pub const UNDER_A_MINUTE_AFTER_SECS: i64 = 120;
    /// Elapsed seconds after which the job is reported as almost done.
    pub const ALMOST_DONE_AFTER_SECS: i64 = 180;

    /// Bucket for the given elapsed seconds.
    pub const fn for_elapsed_secs(elapsed: i64) -> Self {
        match elapsed {
            i64::MIN..Self::ONE_TO_TWO_AFTER_SECS => Self::TwoToThreeMinutes,
            Self::ONE_TO_TWO_AFTER_SECS..Self::UNDER_A_MINUTE_AFTER_SECS => Self::OneToTwoMinutes,
            Self::UNDER_A_MINUTE_AFTER_SECS..Self::ALMOST_DONE_AFTER_SECS => {
                Self::ThirtyToSixtySeconds
            }
            _ => Self::AlmostDone,
        }
    }

    /// Display label, matching the serialized form.
    pub const fn label(self) -> &'static str {
        match self {
            Self::TwoToThreeMinutes => "2-3 minutes",
            Self::OneToTwoMinutes => "1-2 minutes",
            Self::ThirtyToSixtySeconds => "30-60 seconds",
            Self::AlmostDone => "Almost done",
        }
    }
}
