use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::core::error::GenerationError;
use crate::utils::text::truncate_chars;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.vsegpt.ru/v1";
const DEFAULT_OPENAI_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String, // "openai" or "gemini"
    /// Automatic retries after a rate-limited answer.
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    /// Cooldown before such a retry.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    pub openai: Option<OpenAIConfig>,
    pub gemini: Option<GeminiConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            retry_count: default_retry_count(),
            retry_delay_seconds: default_retry_delay(),
            openai: None,
            gemini: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_retry_count() -> usize {
    1
}
fn default_retry_delay() -> u64 {
    5
}
fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}
fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

impl LlmConfig {
    /// Sets the key of the selected provider when the config left it empty.
    pub fn fill_api_key(&mut self, key: &str) {
        match self.provider.as_str() {
            "gemini" => {
                let cfg = self.gemini.get_or_insert_with(|| GeminiConfig {
                    model: default_gemini_model(),
                    ..Default::default()
                });
                if cfg.api_key.trim().is_empty() {
                    cfg.api_key = key.to_string();
                }
            }
            _ => {
                let cfg = self.openai.get_or_insert_with(|| OpenAIConfig {
                    model: default_openai_model(),
                    ..Default::default()
                });
                if cfg.api_key.trim().is_empty() {
                    cfg.api_key = key.to_string();
                }
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub trait LlmBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> LlmBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait LlmBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> LlmBounds for T {}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait LlmClient: LlmBounds + Debug {
    async fn chat(&self, system: &str, user: &str) -> Result<String, GenerationError>;
}

pub fn create_llm(config: &LlmConfig) -> Result<Box<dyn LlmClient>, GenerationError> {
    match config.provider.as_str() {
        "openai" => {
            let cfg = config
                .openai
                .as_ref()
                .filter(|c| !c.api_key.trim().is_empty())
                .ok_or_else(|| GenerationError::MissingConfiguration("API_KEY is missing".into()))?;
            Ok(Box::new(OpenAIClient::new(
                &cfg.api_key,
                &cfg.model,
                cfg.base_url.as_deref(),
            )))
        }
        "gemini" => {
            let cfg = config
                .gemini
                .as_ref()
                .filter(|c| !c.api_key.trim().is_empty())
                .ok_or_else(|| GenerationError::MissingConfiguration("API_KEY is missing".into()))?;
            Ok(Box::new(GeminiClient::new(&cfg.api_key, &cfg.model)))
        }
        other => Err(GenerationError::MissingConfiguration(format!(
            "Unknown LLM provider: {}",
            other
        ))),
    }
}

/// Maps a non-success upstream answer onto a failure category.
pub fn classify_failure(status: u16, body: &str) -> GenerationError {
    let detail = format!("{} {}", status, truncate_chars(body.trim(), 160));
    if status == 429 || body.contains("insufficient_quota") {
        GenerationError::RateLimited(detail)
    } else {
        GenerationError::UpstreamUnavailable(detail)
    }
}

fn transport_error(e: reqwest::Error) -> GenerationError {
    GenerationError::UpstreamUnavailable(e.to_string())
}

// --- OpenAI compatible ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

fn first_choice_text(result: OpenAIResponse) -> Result<String, GenerationError> {
    result
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| GenerationError::MalformedResponse("empty answer from the model".into()))
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl LlmClient for OpenAIClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage { role: "system".to_string(), content: system.to_string() },
                OpenAIMessage { role: "user".to_string(), content: user.to_string() },
            ],
            temperature: TEMPERATURE,
            response_format: ResponseFormat { kind: "json_object".to_string() },
        };

        debug!("Requesting story from {} ({})", url, self.model);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let response_text = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            warn!("OpenAI API error {}: {}", status, response_text);
            return Err(classify_failure(status.as_u16(), &response_text));
        }

        let result: OpenAIResponse = serde_json::from_str(&response_text).map_err(|e| {
            GenerationError::MalformedResponse(format!("Failed to parse OpenAI response: {}", e))
        })?;
        first_choice_text(result)
    }
}

// --- Gemini ---

#[derive(Debug)]
struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiSystemInstruction,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    response_mime_type: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

fn first_candidate_text(result: GeminiResponse) -> Result<String, GenerationError> {
    if let Some(err) = result.error {
        return Err(GenerationError::UpstreamUnavailable(err.message));
    }

    let first = result
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| GenerationError::MalformedResponse("Gemini returned no candidates".into()))?;

    match first.content.and_then(|c| c.parts.into_iter().next()) {
        Some(part) if !part.text.trim().is_empty() => Ok(part.text),
        _ => {
            let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
            Err(GenerationError::MalformedResponse(format!(
                "Gemini response empty. Finish reason: {}",
                reason
            )))
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl LlmClient for GeminiClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: user.to_string() }],
            }],
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart { text: system.to_string() }],
            },
            generation_config: GeminiGenerationConfig {
                temperature: TEMPERATURE,
                response_mime_type: "application/json".to_string(),
            },
        };

        debug!("Requesting story from Gemini ({})", self.model);
        let resp = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let response_text = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            warn!("Gemini API error {}: {}", status, response_text);
            return Err(classify_failure(status.as_u16(), &response_text));
        }

        let result: GeminiResponse = serde_json::from_str(&response_text).map_err(|e| {
            GenerationError::MalformedResponse(format!("Failed to parse Gemini response: {}", e))
        })?;
        first_candidate_text(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        assert!(matches!(classify_failure(429, "{}"), GenerationError::RateLimited(_)));
        assert!(matches!(
            classify_failure(402, r#"{"error":{"code":"insufficient_quota"}}"#),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure(503, "Service Unavailable"),
            GenerationError::UpstreamUnavailable(_)
        ));
    }

    #[test]
    fn test_create_llm_without_key_is_missing_configuration() {
        let config = LlmConfig::default();
        let err = create_llm(&config).unwrap_err();
        assert!(matches!(err, GenerationError::MissingConfiguration(_)));

        let mut config = LlmConfig::default();
        config.fill_api_key("sk-test");
        assert!(create_llm(&config).is_ok());
    }

    #[test]
    fn test_unknown_provider_is_missing_configuration() {
        let config = LlmConfig { provider: "ollama".to_string(), ..LlmConfig::default() };
        assert!(matches!(
            create_llm(&config).unwrap_err(),
            GenerationError::MissingConfiguration(_)
        ));
    }

    #[test]
    fn test_openai_response_parsing_success() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "{\"title\": \"Сказка\", \"content\": \"Жил-был зайчик.\"}"
                },
                "finish_reason": "stop"
            }]
        }"#;

        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        let text = first_choice_text(result).unwrap();
        assert!(text.contains("Жил-был зайчик."));
    }

    #[test]
    fn test_openai_empty_content_is_malformed() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            first_choice_text(result),
            Err(GenerationError::MalformedResponse(_))
        ));

        let result: OpenAIResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            first_choice_text(result),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_gemini_response_parsing_safety_block() {
        let json = r#"{
            "candidates": [
                {
                    "finishReason": "SAFETY",
                    "index": 0
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        match first_candidate_text(result) {
            Err(GenerationError::MalformedResponse(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_gemini_response_parsing_success() {
        let json = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [
                            { "text": "{\"title\": \"Т\", \"content\": \"К\"}" }
                        ],
                        "role": "model"
                    },
                    "finishReason": "STOP",
                    "index": 0
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(first_candidate_text(result).unwrap(), r#"{"title": "Т", "content": "К"}"#);
    }

    #[test]
    fn test_gemini_error_body_is_upstream_failure() {
        let json = r#"{"error": {"code": 500, "message": "backend error"}}"#;
        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            first_candidate_text(result),
            Err(GenerationError::UpstreamUnavailable("backend error".into()))
        );
    }
}
