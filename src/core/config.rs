use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::llm::LlmConfig;

const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_storage")]
    pub storage_folder: String,

    /// Pause between a confirmed subscription and showing the story.
    #[serde(default = "default_unlock_delay")]
    pub unlock_delay_ms: u64,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_channel_link")]
    pub channel_link: String,
    /// User id to check when running outside of a Telegram host.
    pub user_id: Option<String>,
}

/// Remote endpoints. When unset the app calls the LLM and Telegram itself.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProxyConfig {
    pub generate_url: Option<String>,
    pub subscription_url: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel: default_channel(),
            channel_link: default_channel_link(),
            user_id: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_folder: default_storage(),
            unlock_delay_ms: default_unlock_delay(),
            llm: LlmConfig::default(),
            telegram: TelegramConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

fn default_storage() -> String {
    "data".to_string()
}
fn default_unlock_delay() -> u64 {
    500
}
fn default_channel() -> String {
    "@groupaifaily".to_string()
}
fn default_channel_link() -> String {
    "https://t.me/groupaifaily".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Path::new(CONFIG_FILE))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Reads `path`, writing a default config there first when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("{} not found, writing defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(content).context("Failed to parse config.yml")
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// `API_KEY` fills an empty LLM key, `BOT_TOKEN` (trimmed) overrides the bot token.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("API_KEY").map(|k| k.trim().to_string()) {
            if !key.is_empty() {
                self.llm.fill_api_key(&key);
            }
        }
        if let Some(token) = lookup("BOT_TOKEN").map(|t| t.trim().to_string()) {
            if !token.is_empty() {
                self.telegram.bot_token = Some(token);
            }
        }
    }
}
