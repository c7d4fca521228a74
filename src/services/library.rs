use anyhow::{Context, Result};
use std::sync::Arc;

use crate::core::io::Storage;
use crate::core::state::{Library, SavedStory};

pub const LIBRARY_KEY: &str = "magic_tales_library";
pub const SUBSCRIBED_KEY: &str = "magic_tales_subscribed";

/// Durable copy of the library and the subscription flag. Each save rewrites the
/// whole key.
#[derive(Clone)]
pub struct LibraryStore {
    storage: Arc<dyn Storage>,
}

impl LibraryStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn load_library(&self) -> Result<Library> {
        match self.storage.read(LIBRARY_KEY)? {
            Some(content) => serde_json::from_str(&content).context("Failed to parse saved stories"),
            None => Ok(Vec::new()),
        }
    }

    pub fn save_library(&self, library: &[SavedStory]) -> Result<()> {
        let content = serde_json::to_string(library)?;
        self.storage.write(LIBRARY_KEY, &content)
    }

    pub fn load_subscribed(&self) -> Result<bool> {
        match self.storage.read(SUBSCRIBED_KEY)? {
            Some(content) => serde_json::from_str(&content).context("Failed to parse subscription flag"),
            None => Ok(false),
        }
    }

    pub fn save_subscribed(&self, subscribed: bool) -> Result<()> {
        self.storage.write(SUBSCRIBED_KEY, &serde_json::to_string(&subscribed)?)
    }
}
