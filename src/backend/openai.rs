//! OpenAI-compatible chat completions backend (Groq, Together, Fireworks, Hugging Face)

use super::types::{BackendError, BackendResponse, ChatBackend, ChatMessage, TokenUsage};
use crate::config::ProviderSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Backend speaking the `/chat/completions` dialect
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    /// Backend name
    name: String,

    /// Base URL for the API
    base_url: String,

    /// Bearer token
    api_key: String,

    /// Model ID to use
    model: String,

    /// Sampling temperature
    temperature: f32,

    /// Per-call timeout
    timeout: Duration,

    /// HTTP client
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<MessageContent>,
}

/// Some providers return content as a list of typed parts
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

impl MessageContent {
    fn into_text(self) -> String {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Parts(parts) => parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl OpenAiBackend {
    /// Create a backend from resolved provider settings
    pub fn from_settings(
        name: impl Into<String>,
        api_key: impl Into<String>,
        settings: &ProviderSettings,
    ) -> Result<Self, BackendError> {
        let timeout = Duration::from_secs(settings.timeout);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            name: name.into(),
            base_url: settings.base_url.clone(),
            api_key: api_key.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout,
            client,
        })
    }

    /// Build the chat completion URL
    fn chat_completion_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<BackendResponse, BackendError> {
        let start = Instant::now();

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.temperature,
        };

        let result = self
            .client
            .post(self.chat_completion_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        let response = result.map_err(|e| BackendError::from_reqwest(e, start.elapsed()))?;
        let status = response.status();

        if !status.is_success() {
            return Err(BackendError::from_response(response, self.timeout).await);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::parse(format!("failed to parse response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::parse("response contained no choices"))?;
        let text = choice
            .message
            .content
            .map(MessageContent::into_text)
            .unwrap_or_default();

        let mut backend_response = BackendResponse::new(text, self.name.clone(), start.elapsed());

        if let Some(model) = completion.model {
            backend_response = backend_response.with_model(model);
        }

        if let Some(usage) = completion.usage {
            backend_response = backend_response.with_usage(TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        Ok(backend_response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
