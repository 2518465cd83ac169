//! Generation prompt rendering via `minijinja`.
//!
//! Two templates, `image` and `video`, are compiled into the binary. An
//! operator can override either by pointing `generation.templates_dir` at a
//! directory containing `image.j2` and/or `video.j2`; missing files fall
//! back to the built-ins.

use std::path::Path;

use companion_types::{MediaKind, MediaVariant, Mood, PetRecord};
use minijinja::Environment;

use crate::error::CompanionError;
use crate::vendor::MediaRequest;

const IMAGE_TEMPLATE: &str = include_str!("../templates/image.j2");
const VIDEO_TEMPLATE: &str = include_str!("../templates/video.j2");

/// Renders one prompt per requested media variant.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Create an engine with the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Template`] if a template fails to compile.
    pub fn new() -> Result<Self, CompanionError> {
        Self::build(IMAGE_TEMPLATE.to_owned(), VIDEO_TEMPLATE.to_owned())
    }

    /// Create an engine, preferring templates found in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Template`] if a present file cannot be read
    /// or a template fails to compile.
    pub fn from_dir(dir: &Path) -> Result<Self, CompanionError> {
        let image = load_or(dir, "image.j2", IMAGE_TEMPLATE)?;
        let video = load_or(dir, "video.j2", VIDEO_TEMPLATE)?;
        Self::build(image, video)
    }

    fn build(image: String, video: String) -> Result<Self, CompanionError> {
        let mut env = Environment::new();
        env.add_template_owned("image", image)
            .map_err(|e| CompanionError::Template(format!("failed to add image template: {e}")))?;
        env.add_template_owned("video", video)
            .map_err(|e| CompanionError::Template(format!("failed to add video template: {e}")))?;
        Ok(Self { env })
    }

    /// Render the prompt for one variant of a pet.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Template`] if rendering fails.
    pub fn render(
        &self,
        pet: &PetRecord,
        variant: MediaVariant,
    ) -> Result<MediaRequest, CompanionError> {
        let name = match variant.kind {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        };
        let context = serde_json::json!({
            "pet_type": pet.pet_type.as_str(),
            "pet_name": pet.pet_name,
            "color": pet.color,
            "pattern": pet.pattern,
            "accessory": pet.accessory,
            "level": pet.level,
            "mood": variant.mood.as_str(),
            "mood_description": mood_description(variant.mood),
            "motion": motion(variant.mood),
        });

        let rendered = self
            .env
            .get_template(name)
            .map_err(|e| CompanionError::Template(format!("missing {name} template: {e}")))?
            .render(&context)
            .map_err(|e| CompanionError::Template(format!("{name} render failed: {e}")))?;

        Ok(MediaRequest {
            variant,
            prompt: collapse_whitespace(&rendered),
        })
    }

    /// Render every variant, in order.
    ///
    /// # Errors
    ///
    /// Returns the first rendering failure.
    pub fn render_all(
        &self,
        pet: &PetRecord,
        variants: &[MediaVariant],
    ) -> Result<Vec<MediaRequest>, CompanionError> {
        variants.iter().map(|v| self.render(pet, *v)).collect()
    }
}

const fn mood_description(mood: Mood) -> &'static str {
    match mood {
        Mood::Happy => "smiling warmly with bright eyes",
        Mood::Neutral => "sitting calmly with a relaxed expression",
        Mood::Sad => "looking a little downcast with drooping ears",
        Mood::Excited => "bouncing with excitement, eyes sparkling",
    }
}

const fn motion(mood: Mood) -> &'static str {
    match mood {
        Mood::Happy => "It sways gently and blinks contentedly.",
        Mood::Neutral => "It breathes slowly and looks around.",
        Mood::Sad => "It sighs and lowers its head.",
        Mood::Excited => "It hops in place and wiggles happily.",
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read a template file, or fall back to the built-in when it is absent.
fn load_or(dir: &Path, filename: &str, builtin: &str) -> Result<String, CompanionError> {
    let path = dir.join(filename);
    if !path.exists() {
        return Ok(builtin.to_owned());
    }
    std::fs::read_to_string(&path).map_err(|e| {
        CompanionError::Template(format!("failed to read {}: {e}", path.display()))
    })
}
