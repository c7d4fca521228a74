use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::story::GeneratedStory;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SavedStory {
    pub id: String,
    pub date: String,
    pub title: String,
    pub content: String,
    pub hero: String,
}

impl SavedStory {
    /// Builds the library entry for a fresh generation. `id` is the creation time in
    /// milliseconds, suffixed when it collides with an id in `existing`.
    pub fn from_generated(
        story: &GeneratedStory,
        hero: &str,
        at: DateTime<Local>,
        existing: &[SavedStory],
    ) -> Self {
        let base = at.timestamp_millis().to_string();
        let mut id = base.clone();
        let mut n = 1;
        while existing.iter().any(|s| s.id == id) {
            id = format!("{}-{}", base, n);
            n += 1;
        }

        Self {
            id,
            date: at.format("%d.%m.%Y").to_string(),
            title: story.title.clone(),
            content: story.content.clone(),
            hero: hero.to_string(),
        }
    }

    /// First `max` characters of the content, for list views.
    pub fn preview(&self, max: usize) -> String {
        crate::utils::text::truncate_chars(&self.content, max)
    }
}

/// Stories in the order they were created.
pub type Library = Vec<SavedStory>;
