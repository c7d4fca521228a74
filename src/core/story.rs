use serde::{Deserialize, Serialize};

use crate::core::error::ValidationError;

/// Topic value that asks for a user-supplied moral instead of a preset one.
pub const CUSTOM_TOPIC: &str = "Свой вариант";

/// Prompt fallback when the effective topic ends up empty.
pub const DEFAULT_TOPIC: &str = "доброте";

pub const TOPICS: [&str; 5] = [
    "Чистить зубки",
    "Делиться игрушками",
    "Убрать комнату",
    "Не бояться темноты",
    CUSTOM_TOPIC,
];

const PARAGRAPHS_PER_PAGE: usize = 2;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StoryParams {
    pub name: String,
    pub hero: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_topic: Option<String>,
}

impl StoryParams {
    pub fn new(name: &str, hero: &str, topic: &str) -> Self {
        Self {
            name: name.to_string(),
            hero: hero.to_string(),
            topic: topic.to_string(),
            custom_topic: None,
        }
    }

    pub fn with_custom_topic(mut self, custom_topic: &str) -> Self {
        self.custom_topic = Some(custom_topic.to_string());
        self
    }

    pub fn is_custom(&self) -> bool {
        self.topic == CUSTOM_TOPIC || self.topic == "custom"
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.hero.trim().is_empty() {
            return Err(ValidationError::MissingHero);
        }
        if self.is_custom()
            && self
                .custom_topic
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
        {
            return Err(ValidationError::MissingCustomTopic);
        }
        Ok(())
    }

    /// The moral the story should teach; `custom_topic` only counts for the custom topic.
    pub fn effective_topic(&self) -> &str {
        let topic = if self.is_custom() {
            self.custom_topic.as_deref().unwrap_or("")
        } else {
            self.topic.as_str()
        };
        let topic = topic.trim();
        if topic.is_empty() {
            DEFAULT_TOPIC
        } else {
            topic
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GeneratedStory {
    pub title: String,
    pub content: String,
}

impl GeneratedStory {
    pub fn paragraphs(&self) -> Vec<String> {
        paragraphs(&self.content)
    }
}

/// Splits story text on newlines and drops blank segments.
pub fn paragraphs(content: &str) -> Vec<String> {
    content
        .split('\n')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reading view of a story: paragraphs grouped into pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storybook {
    title: String,
    content: String,
    pages: Vec<Vec<String>>,
    page: usize,
}

impl Storybook {
    pub fn new(title: &str, content: &str) -> Self {
        let paras = paragraphs(content);
        let mut pages: Vec<Vec<String>> = paras
            .chunks(PARAGRAPHS_PER_PAGE)
            .map(|chunk| chunk.to_vec())
            .collect();
        if pages.is_empty() {
            pages.push(Vec::new());
        }
        Self {
            title: title.to_string(),
            content: content.to_string(),
            pages,
            page: 0,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Zero-based index of the page being read.
    pub fn page_index(&self) -> usize {
        self.page
    }

    pub fn current_page(&self) -> &[String] {
        &self.pages[self.page]
    }

    pub fn is_last_page(&self) -> bool {
        self.page + 1 == self.pages.len()
    }

    pub fn next_page(&mut self) -> bool {
        if self.is_last_page() {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn previous_page(&mut self) -> bool {
        if self.page == 0 {
            return false;
        }
        self.page -= 1;
        true
    }
}
