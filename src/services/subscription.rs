//! Channel membership verdicts: the Telegram-backed checker that lives next to the
//! bot token, its framework-agnostic endpoint handler, and the HTTP client the app
//! uses to reach it.

use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::error::{SubscriptionCategory, SubscriptionError};
use crate::services::proxy::ProxyReply;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Member statuses that count as subscribed.
const MEMBER_STATUSES: [&str; 4] = ["creator", "administrator", "member", "restricted"];

pub fn is_member_status(status: &str) -> bool {
    MEMBER_STATUSES.contains(&status)
}

#[cfg(target_arch = "wasm32")]
pub trait CheckerBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> CheckerBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait CheckerBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> CheckerBounds for T {}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait SubscriptionChecker: CheckerBounds {
    async fn is_subscribed(&self, user_id: &str, channel: &str) -> Result<bool, SubscriptionError>;
}

fn check_preconditions(user_id: &str, channel: &str) -> Result<(), SubscriptionError> {
    if user_id.trim().is_empty() || channel.trim().is_empty() {
        return Err(SubscriptionError::Indeterminate(
            "Missing userId or channelUsername".into(),
        ));
    }
    Ok(())
}

// --- Telegram ---

pub struct TelegramMembership {
    bot_token: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TelegramReply {
    ok: bool,
    description: Option<String>,
    result: Option<ChatMember>,
}

#[derive(Deserialize)]
struct ChatMember {
    status: String,
}

impl TelegramMembership {
    pub fn new(bot_token: Option<&str>) -> Self {
        Self {
            bot_token: bot_token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            api_base: TELEGRAM_API.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn member_url(&self, token: &str, user_id: &str, channel: &str) -> Result<url::Url, SubscriptionError> {
        url::Url::parse_with_params(
            &format!("{}/bot{}/getChatMember", self.api_base, token),
            &[("chat_id", channel), ("user_id", user_id)],
        )
        .map_err(|e| SubscriptionError::Internal(format!("Invalid Telegram URL: {}", e)))
    }

    /// Fetches the raw member status for `user_id` in `channel`.
    pub async fn member_status(&self, user_id: &str, channel: &str) -> Result<String, SubscriptionError> {
        check_preconditions(user_id, channel)?;
        let token = self.bot_token.as_deref().ok_or_else(|| {
            SubscriptionError::MissingConfiguration("BOT_TOKEN is missing".into())
        })?;

        let url = self.member_url(token, user_id.trim(), channel.trim())?;
        let text = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SubscriptionError::Internal(e.to_string()))?
            .text()
            .await
            .map_err(|e| SubscriptionError::Internal(e.to_string()))?;

        let status = member_status_from_reply(&text)?;
        info!("User {} status in {}: {}", user_id, channel, status);
        Ok(status)
    }
}

fn member_status_from_reply(text: &str) -> Result<String, SubscriptionError> {
    let reply: TelegramReply = serde_json::from_str(text)
        .map_err(|e| SubscriptionError::Internal(format!("Unexpected Telegram reply: {}", e)))?;

    if !reply.ok {
        let details = reply.description.unwrap_or_else(|| "unknown error".to_string());
        warn!("Telegram API Error: {}", details);
        return Err(SubscriptionError::VerificationFailed(details));
    }

    reply
        .result
        .map(|m| m.status)
        .ok_or_else(|| SubscriptionError::Internal("Telegram reply without result".into()))
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl SubscriptionChecker for TelegramMembership {
    async fn is_subscribed(&self, user_id: &str, channel: &str) -> Result<bool, SubscriptionError> {
        let status = self.member_status(user_id, channel).await?;
        Ok(is_member_status(&status))
    }
}

// --- Endpoint ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest {
    #[serde(default, deserialize_with = "id_as_string")]
    user_id: Option<String>,
    #[serde(default, alias = "channelIdentifier")]
    channel_username: Option<String>,
}

/// Telegram user ids arrive as numbers from the WebApp and as strings elsewhere.
fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Handles a `{userId, channelUsername}` body.
pub async fn handle_check(checker: &TelegramMembership, body: &[u8]) -> ProxyReply {
    let request: CheckRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            let err = SubscriptionError::Indeterminate(format!("Invalid request body: {}", e));
            return ProxyReply::error(err.http_status(), &err.to_string(), err.category());
        }
    };
    let user_id = request.user_id.unwrap_or_default();
    let channel = request.channel_username.unwrap_or_default();

    match checker.member_status(&user_id, &channel).await {
        Ok(status) => ProxyReply::ok(&json!({
            "subscribed": is_member_status(&status),
            "debugStatus": status,
        })),
        Err(e) => {
            error!("Subscription Check Error: {}", e);
            ProxyReply::error(e.http_status(), &e.to_string(), e.category())
        }
    }
}

// --- HTTP client ---

pub struct HttpSubscriptionChecker {
    url: String,
    client: reqwest::Client,
}

impl HttpSubscriptionChecker {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct CheckReply {
    subscribed: Option<bool>,
    error: Option<String>,
    category: Option<SubscriptionCategory>,
}

pub fn decode_check_reply(status: u16, body: &str) -> Result<bool, SubscriptionError> {
    let reply: Option<CheckReply> = serde_json::from_str(body).ok();
    if (200..300).contains(&status) {
        return reply
            .and_then(|r| r.subscribed)
            .ok_or_else(|| SubscriptionError::Internal("Reply without verdict".into()));
    }

    let (message, category) = match reply {
        Some(r) => (r.error, r.category),
        None => (None, None),
    };
    let message = message.unwrap_or_else(|| format!("HTTP {}", status));
    let category = category.unwrap_or(if status == 400 {
        SubscriptionCategory::VerificationFailed
    } else {
        SubscriptionCategory::Internal
    });
    Err(SubscriptionError::from_category(category, message))
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl SubscriptionChecker for HttpSubscriptionChecker {
    async fn is_subscribed(&self, user_id: &str, channel: &str) -> Result<bool, SubscriptionError> {
        check_preconditions(user_id, channel)?;

        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "userId": user_id, "channelUsername": channel }))
            .send()
            .await
            .map_err(|e| SubscriptionError::Internal(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| SubscriptionError::Internal(e.to_string()))?;
        decode_check_reply(status, &text)
    }
}

pub fn create_checker(config: &Config) -> Arc<dyn SubscriptionChecker> {
    match &config.proxy.subscription_url {
        Some(url) => {
            info!("Using remote subscription check at {}", url);
            Arc::new(HttpSubscriptionChecker::new(url))
        }
        None => Arc::new(TelegramMembership::new(config.telegram.bot_token.as_deref())),
    }
}
