//! Core types and traits shared by every chat backend

use crate::config::ProviderSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One entry of an ordered conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// How the router should treat a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rate limit, quota, timeout, connection trouble or server-side outage.
    /// The backend is quarantined.
    Temporary,
    /// Bad or revoked credentials. Waiting does not help.
    Permanent,
    /// Anything else (malformed request, unparseable response, ...)
    Other,
}

impl FailureClass {
    pub fn quarantines(&self) -> bool {
        matches!(self, FailureClass::Temporary)
    }
}

/// Error types that can occur while talking to a backend
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Request timed out
    #[error("timeout after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Rate limited by the provider
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimit { retry_after: Option<Duration> },

    /// Account or project quota exhausted
    #[error("quota exceeded: {message}")]
    Quota { message: String },

    /// Authentication failed
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Connection could not be established or was reset
    #[error("network error: {message}")]
    Network { message: String },

    /// Provider returned a 5xx
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Provider rejected the request itself
    #[error("invalid request (HTTP {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    /// Failed to parse response
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Error with no better shape, classified by its status and text
    #[error("{message}")]
    Other {
        status: Option<u16>,
        message: String,
    },
}

static TEMPORARY_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)rate.?limit|quota|time(d)?.?out|connection|econnreset|server error|service unavailable",
    )
    .unwrap()
});

static PERMANENT_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)invalid api key|unauthori[sz]ed|forbidden").unwrap());

impl BackendError {
    /// Check if this error is worth retrying against the same backend
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout { .. }
                | BackendError::RateLimit { .. }
                | BackendError::Network { .. }
                | BackendError::Server { .. }
        )
    }

    /// Classify this error for quarantine decisions
    pub fn failure_class(&self) -> FailureClass {
        match self {
            BackendError::Timeout { .. }
            | BackendError::RateLimit { .. }
            | BackendError::Quota { .. }
            | BackendError::Network { .. }
            | BackendError::Server { .. } => FailureClass::Temporary,
            BackendError::Auth { .. } => FailureClass::Permanent,
            BackendError::InvalidRequest { .. }
            | BackendError::Parse { .. }
            | BackendError::Config { .. } => FailureClass::Other,
            BackendError::Other { status, message } => classify_opaque(*status, message),
        }
    }

    /// Get suggested retry delay for rate limit errors
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BackendError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Create a timeout error
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Create a rate limit error
    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self::RateLimit { retry_after }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a server error
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an unclassified error
    pub fn other(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Other {
            status,
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status and its body onto an error
    ///
    /// A `Retry-After` header value takes precedence over a hint in the body.
    pub fn from_status(
        status: u16,
        body: &str,
        retry_after: Option<Duration>,
        timeout: Duration,
    ) -> Self {
        match status {
            401 | 403 => BackendError::auth(format!("HTTP {}: {}", status, body)),
            429 if body.to_lowercase().contains("quota") => BackendError::Quota {
                message: body.to_string(),
            },
            429 => BackendError::rate_limit(retry_after.or_else(|| parse_retry_after(body))),
            408 | 504 => BackendError::timeout(timeout),
            400..=499 => BackendError::InvalidRequest {
                status,
                message: body.to_string(),
            },
            500..=599 => BackendError::server(status, body),
            _ => BackendError::other(Some(status), format!("unexpected HTTP {}: {}", status, body)),
        }
    }

    /// Consume a non-success response and map it onto an error
    pub async fn from_response(response: reqwest::Response, timeout: Duration) -> Self {
        let status = response.status().as_u16();
        let retry_after = retry_after_header(response.headers());
        let body = response.text().await.unwrap_or_default();
        Self::from_status(status, &body, retry_after, timeout)
    }

    /// Map a transport-level reqwest failure onto an error
    pub fn from_reqwest(err: reqwest::Error, elapsed: Duration) -> Self {
        if err.is_timeout() {
            BackendError::timeout(elapsed)
        } else if err.is_connect() {
            BackendError::network(format!("connection failed: {}", err))
        } else if err.is_decode() {
            BackendError::parse(format!("failed to parse response: {}", err))
        } else {
            BackendError::network(format!("request failed: {}", err))
        }
    }
}

fn classify_opaque(status: Option<u16>, message: &str) -> FailureClass {
    if matches!(status, Some(429 | 502 | 503 | 504)) || TEMPORARY_MESSAGE.is_match(message) {
        FailureClass::Temporary
    } else if matches!(status, Some(401 | 403)) || PERMANENT_MESSAGE.is_match(message) {
        FailureClass::Permanent
    } else {
        FailureClass::Other
    }
}

/// Try to parse retry-after from an error body
fn parse_retry_after(body: &str) -> Option<Duration> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    let seconds = json
        .get("retry_after")
        .or_else(|| json.pointer("/error/retry_after"))
        .and_then(|v| v.as_f64())?;
    seconds_to_duration(seconds)
}

/// Read a `Retry-After` header given as delay seconds or as an HTTP date
fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        return seconds_to_duration(seconds);
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    (at.with_timezone(&Utc) - Utc::now()).to_std().ok()
}

fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

/// Response from a backend call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendResponse {
    /// Assistant text
    pub text: String,

    /// Backend name that produced this response
    pub backend: String,

    /// Model used (if reported)
    pub model: Option<String>,

    /// Time taken by the call
    pub duration: Duration,

    /// Token usage (if available)
    pub usage: Option<TokenUsage>,
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl BackendResponse {
    pub fn new(text: String, backend: String, duration: Duration) -> Self {
        Self {
            text,
            backend,
            model: None,
            duration,
            usage: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Uniform "ordered messages in, text out" contract for one inference backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the conversation and return the assistant reply
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<BackendResponse, BackendError>;

    /// Stable backend name
    fn name(&self) -> &str;
}

#[async_trait]
impl ChatBackend for Box<dyn ChatBackend> {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<BackendResponse, BackendError> {
        (**self).invoke(messages).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Transport-level retry policy for a single backend
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries
    pub max_retries: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy from provider settings
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.retry_delay_ms),
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Up to 25% jitter
            let jitter = rand::random::<f64>() * 0.25 * capped_delay;
            capped_delay + jitter
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}
