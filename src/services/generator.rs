use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::Config;
use crate::core::error::{ErrorCategory, GenerationError};
use crate::core::story::{GeneratedStory, StoryParams};
use crate::services::proxy::StoryProxy;
use crate::utils::time::sleep;

#[cfg(target_arch = "wasm32")]
pub trait GeneratorBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> GeneratorBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait GeneratorBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> GeneratorBounds for T {}

/// Client side of the generation endpoint.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait StoryGenerator: GeneratorBounds {
    async fn generate(&self, params: &StoryParams) -> Result<GeneratedStory, GenerationError>;
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StoryGenerator for StoryProxy {
    async fn generate(&self, params: &StoryParams) -> Result<GeneratedStory, GenerationError> {
        StoryProxy::generate(self, params).await
    }
}

/// Calls a remote story proxy over HTTP.
pub struct HttpStoryGenerator {
    url: String,
    client: reqwest::Client,
}

impl HttpStoryGenerator {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    category: Option<ErrorCategory>,
}

/// Decodes a non-success proxy answer. Falls back to the status code when the body
/// carries no category.
pub fn decode_error_reply(status: u16, body: &str) -> GenerationError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.error.clone())
        .unwrap_or_else(|| format!("HTTP {}", status));

    let category = parsed.and_then(|b| b.category).unwrap_or(match status {
        429 => ErrorCategory::RateLimited,
        400 => ErrorCategory::InvalidRequest,
        _ => ErrorCategory::UpstreamUnavailable,
    });
    GenerationError::from_category(category, message)
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StoryGenerator for HttpStoryGenerator {
    async fn generate(&self, params: &StoryParams) -> Result<GeneratedStory, GenerationError> {
        let resp = self
            .client
            .post(&self.url)
            .json(params)
            .send()
            .await
            .map_err(|e| GenerationError::UpstreamUnavailable(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GenerationError::UpstreamUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(decode_error_reply(status.as_u16(), &text));
        }

        crate::services::proxy::parse_story(&text)
    }
}

pub fn create_generator(config: &Config) -> Arc<dyn StoryGenerator> {
    match &config.proxy.generate_url {
        Some(url) => {
            info!("Using remote story proxy at {}", url);
            Arc::new(HttpStoryGenerator::new(url))
        }
        None => Arc::new(StoryProxy::from_config(&config.llm)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub cooldown: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.llm.retry_count,
            cooldown: Duration::from_secs(config.llm.retry_delay_seconds),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            cooldown: Duration::from_secs(5),
        }
    }
}

/// Runs one generation, retrying only rate-limited failures after the cooldown.
pub async fn generate_with_retry(
    generator: &dyn StoryGenerator,
    params: &StoryParams,
    policy: RetryPolicy,
) -> Result<GeneratedStory, GenerationError> {
    let mut attempt = 0;
    loop {
        match generator.generate(params).await {
            Ok(story) => return Ok(story),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    "Story generation rate limited (attempt {}/{}), retrying in {:?}",
                    attempt,
                    policy.max_retries + 1,
                    policy.cooldown
                );
                sleep(policy.cooldown).await;
            }
            Err(e) => return Err(e),
        }
    }
}
