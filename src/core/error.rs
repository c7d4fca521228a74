//! Error taxonomy shared by the proxies, their clients and the state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::text::truncate_chars;

/// Upper bound for any error text shown to the user.
pub const MAX_MESSAGE_CHARS: usize = 200;

pub const RATE_LIMITED_MESSAGE: &str =
    "Сейчас очень много желающих получить сказку. Подождите немного и попробуйте снова.";
pub const MALFORMED_MESSAGE: &str = "Упс! Магия дала сбой. Попробуйте снова.";
pub const MISSING_CONFIGURATION_MESSAGE: &str =
    "Волшебная книга ещё не настроена. Повторная попытка не поможет, загляните позже.";
pub const NOT_SUBSCRIBED_MESSAGE: &str =
    "Подписка пока не найдена. Подпишитесь на канал и нажмите «Я подписался» ещё раз.";
pub const INDETERMINATE_MESSAGE: &str =
    "Не удалось узнать, кто вы. Откройте сказку внутри Telegram, чтобы проверить подписку.";

/// Local form problems. These never reach the network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is required")]
    MissingName,
    #[error("hero is required")]
    MissingHero,
    #[error("custom topic is required when the custom option is selected")]
    MissingCustomTopic,
}

/// Machine-readable failure category carried in proxy error bodies.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidRequest,
    RateLimited,
    UpstreamUnavailable,
    MalformedResponse,
    MissingConfiguration,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),
}

impl GenerationError {
    pub fn from_category(category: ErrorCategory, message: String) -> Self {
        match category {
            ErrorCategory::InvalidRequest => Self::InvalidRequest(message),
            ErrorCategory::RateLimited => Self::RateLimited(message),
            ErrorCategory::UpstreamUnavailable => Self::UpstreamUnavailable(message),
            ErrorCategory::MalformedResponse => Self::MalformedResponse(message),
            ErrorCategory::MissingConfiguration => Self::MissingConfiguration(message),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            Self::RateLimited(_) => ErrorCategory::RateLimited,
            Self::UpstreamUnavailable(_) => ErrorCategory::UpstreamUnavailable,
            Self::MalformedResponse(_) => ErrorCategory::MalformedResponse,
            Self::MissingConfiguration(_) => ErrorCategory::MissingConfiguration,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::InvalidRequest(m)
            | Self::RateLimited(m)
            | Self::UpstreamUnavailable(m)
            | Self::MalformedResponse(m)
            | Self::MissingConfiguration(m) => m,
        }
    }

    /// Only rate limiting is worth retrying automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::RateLimited(_) => 429,
            Self::UpstreamUnavailable(_) | Self::MalformedResponse(_) => 502,
            Self::MissingConfiguration(_) => 500,
        }
    }

    /// Short text for the error screen, bounded to [`MAX_MESSAGE_CHARS`].
    pub fn user_message(&self) -> String {
        let message = match self {
            Self::RateLimited(_) => RATE_LIMITED_MESSAGE.to_string(),
            Self::MalformedResponse(_) => MALFORMED_MESSAGE.to_string(),
            Self::MissingConfiguration(_) => MISSING_CONFIGURATION_MESSAGE.to_string(),
            Self::UpstreamUnavailable(m) => format!("Упс! Магия дала сбой: {}", m),
            Self::InvalidRequest(m) => format!("Проверьте поля формы: {}", m),
        };
        truncate_chars(&message, MAX_MESSAGE_CHARS)
    }
}

/// Category tags used by the subscription endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionCategory {
    PreconditionUnmet,
    VerificationFailed,
    MissingConfiguration,
    Internal,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// No resolvable user or channel; the verdict cannot be determined.
    #[error("subscription cannot be determined: {0}")]
    Indeterminate(String),
    #[error("verification failed: {0}")]
    VerificationFailed(String),
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SubscriptionError {
    pub fn from_category(category: SubscriptionCategory, message: String) -> Self {
        match category {
            SubscriptionCategory::PreconditionUnmet => Self::Indeterminate(message),
            SubscriptionCategory::VerificationFailed => Self::VerificationFailed(message),
            SubscriptionCategory::MissingConfiguration => Self::MissingConfiguration(message),
            SubscriptionCategory::Internal => Self::Internal(message),
        }
    }

    pub fn category(&self) -> SubscriptionCategory {
        match self {
            Self::Indeterminate(_) => SubscriptionCategory::PreconditionUnmet,
            Self::VerificationFailed(_) => SubscriptionCategory::VerificationFailed,
            Self::MissingConfiguration(_) => SubscriptionCategory::MissingConfiguration,
            Self::Internal(_) => SubscriptionCategory::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Indeterminate(_) | Self::VerificationFailed(_) => 400,
            Self::MissingConfiguration(_) | Self::Internal(_) => 500,
        }
    }

    pub fn user_message(&self) -> String {
        let message = match self {
            Self::Indeterminate(_) => INDETERMINATE_MESSAGE.to_string(),
            Self::VerificationFailed(m) => format!("Не удалось проверить подписку: {}", m),
            Self::MissingConfiguration(_) => MISSING_CONFIGURATION_MESSAGE.to_string(),
            Self::Internal(_) => "Проверка подписки не удалась. Попробуйте ещё раз.".to_string(),
        };
        truncate_chars(&message, MAX_MESSAGE_CHARS)
    }
}
