//! Server side of the story endpoint: holds the LLM credential, builds the prompt and
//! only lets well-formed `{title, content}` answers through.
//!
//! [`StoryProxy::handle`] is framework agnostic: it maps a raw request body onto a
//! status code and a JSON body, so any HTTP server can mount it.

use log::{error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::error::{ErrorCategory, GenerationError};
use crate::core::story::{GeneratedStory, StoryParams};
use crate::services::llm::{create_llm, LlmClient, LlmConfig};
use crate::utils::text::strip_code_blocks;

pub const SYSTEM_PROMPT: &str = "Ты — талантливый детский писатель.
Твоя задача — написать добрую сказку (около 150-200 слов).

ВАЖНО: Твой ответ должен быть СТРОГО валидным JSON объектом. Не пиши никакого вступительного текста или markdown, просто верни сырой JSON.

Структура JSON:
{
    \"title\": \"Креативный заголовок (3-5 слов), просклоняй имя героя\",
    \"content\": \"Текст сказки. Раздели на 3-4 абзаца символами \\n\"
}

Стиль: Мягкий, волшебный, убаюкивающий.";

pub fn user_prompt(params: &StoryParams) -> String {
    format!(
        "Напиши сказку для ребенка по имени {}.\nГлавный герой: {}.\nСюжет учит: {}.",
        params.name.trim(),
        params.hero.trim(),
        params.effective_topic()
    )
}

/// Parses the model's text into a story, rejecting anything partial.
pub fn parse_story(raw: &str) -> Result<GeneratedStory, GenerationError> {
    let clean = strip_code_blocks(raw);
    let story: GeneratedStory = serde_json::from_str(&clean)
        .map_err(|e| GenerationError::MalformedResponse(format!("invalid story JSON: {}", e)))?;

    if story.title.trim().is_empty() {
        return Err(GenerationError::MalformedResponse("story title is empty".into()));
    }
    if story.paragraphs().is_empty() {
        return Err(GenerationError::MalformedResponse("story content is empty".into()));
    }

    Ok(GeneratedStory {
        title: story.title.trim().to_string(),
        content: story.content,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyReply {
    pub status: u16,
    pub body: Value,
}

impl ProxyReply {
    pub fn ok<T: Serialize>(body: &T) -> Self {
        Self {
            status: 200,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    pub fn error<C: Serialize>(status: u16, message: &str, category: C) -> Self {
        Self {
            status,
            body: json!({ "error": message, "category": category }),
        }
    }
}

#[derive(Debug)]
pub struct StoryProxy {
    llm: Result<Box<dyn LlmClient>, GenerationError>,
}

impl StoryProxy {
    pub fn new(llm: Box<dyn LlmClient>) -> Self {
        Self { llm: Ok(llm) }
    }

    /// A proxy without a usable credential still answers, with `missing_configuration`.
    pub fn from_config(config: &LlmConfig) -> Self {
        let llm = create_llm(config);
        if let Err(e) = &llm {
            warn!("Story proxy is not configured: {}", e);
        }
        Self { llm }
    }

    pub async fn generate(&self, params: &StoryParams) -> Result<GeneratedStory, GenerationError> {
        let llm = self.llm.as_ref().map_err(Clone::clone)?;
        params
            .validate()
            .map_err(|e| GenerationError::InvalidRequest(e.to_string()))?;

        info!(
            "Generating story about {} (topic: {})",
            params.hero,
            params.effective_topic()
        );
        let raw = llm.chat(SYSTEM_PROMPT, &user_prompt(params)).await?;
        parse_story(&raw)
    }

    pub async fn handle(&self, body: &[u8]) -> ProxyReply {
        let params: StoryParams = match serde_json::from_slice(body) {
            Ok(p) => p,
            Err(e) => {
                return ProxyReply::error(
                    400,
                    &format!("Invalid request body: {}", e),
                    ErrorCategory::InvalidRequest,
                )
            }
        };

        match self.generate(&params).await {
            Ok(story) => ProxyReply::ok(&story),
            Err(e) => {
                error!("Server API Error: {}", e);
                ProxyReply::error(e.http_status(), e.detail(), e.category())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::story::CUSTOM_TOPIC;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    const ANYA_REQUEST: &str = r#"{"name":"Аня","hero":"Зайчик","topic":"Убрать комнату"}"#;

    #[derive(Debug)]
    struct MockLlmClient {
        reply: Result<String, GenerationError>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl MockLlmClient {
        fn replying(reply: Result<&str, GenerationError>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn chat(&self, _system: &str, user: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(user.to_string());
            self.reply.clone()
        }
    }

    fn params() -> StoryParams {
        StoryParams::new("Аня", "Зайчик", "Делиться игрушками")
    }

    #[test]
    fn test_user_prompt_resolves_custom_topic() {
        let p = StoryParams::new("Аня", "Зайчик", CUSTOM_TOPIC).with_custom_topic("Не капризничать");
        let prompt = user_prompt(&p);
        assert!(prompt.contains("Аня"));
        assert!(prompt.contains("Зайчик"));
        assert!(prompt.contains("Не капризничать"));
        assert!(!prompt.contains(CUSTOM_TOPIC));
    }

    #[test]
    fn test_parse_story_accepts_fenced_json() {
        let story = parse_story("```json\n{\"title\": \" Зайчик \", \"content\": \"Раз.\\nДва.\"}\n```")
            .unwrap();
        assert_eq!(story.title, "Зайчик");
        assert_eq!(story.paragraphs().len(), 2);
    }

    #[test]
    fn test_parse_story_rejects_partial_answers() {
        for raw in [
            "Жил-был зайчик.",
            r#"{"title": "Зайчик"}"#,
            r#"{"title": "", "content": "Текст"}"#,
            r#"{"title": "Зайчик", "content": "\n \n"}"#,
        ] {
            assert!(
                matches!(parse_story(raw), Err(GenerationError::MalformedResponse(_))),
                "should reject {}",
                raw
            );
        }
    }

    #[tokio::test]
    async fn test_generate_success() {
        let llm = MockLlmClient::replying(Ok(r#"{"title": "Щедрый зайчик", "content": "Раз.\nДва."}"#));
        let prompts = llm.prompts.clone();
        let proxy = StoryProxy::new(Box::new(llm));

        let story = proxy.generate(&params()).await.unwrap();
        assert_eq!(story.title, "Щедрый зайчик");
        assert_eq!(prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_params_never_reach_llm() {
        let llm = MockLlmClient::replying(Ok("{}"));
        let prompts = llm.prompts.clone();
        let proxy = StoryProxy::new(Box::new(llm));

        let err = proxy
            .generate(&StoryParams::new("Аня", "Зайчик", CUSTOM_TOPIC))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest(_)));
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_proxy_reports_missing_configuration() {
        let proxy = StoryProxy::from_config(&LlmConfig::default());
        let reply = proxy.handle(ANYA_REQUEST.as_bytes()).await;

        assert_eq!(reply.status, 500);
        assert_eq!(reply.body["category"], "missing_configuration");
    }

    #[tokio::test]
    async fn test_handle_maps_failures_to_status() {
        let proxy = StoryProxy::new(Box::new(MockLlmClient::replying(Err(
            GenerationError::RateLimited("429".into()),
        ))));
        let reply = proxy.handle(ANYA_REQUEST.as_bytes()).await;
        assert_eq!(reply.status, 429);
        assert_eq!(reply.body["category"], "rate_limited");

        let proxy = StoryProxy::new(Box::new(MockLlmClient::replying(Ok("not json"))));
        let reply = proxy.handle(ANYA_REQUEST.as_bytes()).await;
        assert_eq!(reply.status, 502);
        assert_eq!(reply.body["category"], "malformed_response");

        let reply = proxy.handle(b"garbage").await;
        assert_eq!(reply.status, 400);
        assert_eq!(reply.body["category"], "invalid_request");
    }

    #[tokio::test]
    async fn test_handle_success_body_is_title_and_content() {
        let proxy = StoryProxy::new(Box::new(MockLlmClient::replying(Ok(
            r#"{"title": "Т", "content": "К"}"#,
        ))));
        let reply = proxy
            .handle(ANYA_REQUEST.as_bytes())
            .await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, json!({"title": "Т", "content": "К"}));
    }
}
