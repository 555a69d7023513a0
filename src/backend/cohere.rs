//! Cohere chat (v2) backend

use super::types::{BackendError, BackendResponse, ChatBackend, ChatMessage, TokenUsage};
use crate::config::ProviderSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Backend for the Cohere chat API
#[derive(Debug, Clone)]
pub struct CohereBackend {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
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
struct ChatResponse {
    message: Option<AssistantMessage>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    tokens: Option<Tokens>,
}

#[derive(Debug, Deserialize)]
struct Tokens {
    input_tokens: Option<f64>,
    output_tokens: Option<f64>,
}

impl CohereBackend {
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

    fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatBackend for CohereBackend {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<BackendResponse, BackendError> {
        let start = Instant::now();

        let body = ChatRequest {
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

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, start.elapsed()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::from_response(response, self.timeout).await);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::parse(format!("failed to parse response: {}", e)))?;

        let message = chat
            .message
            .ok_or_else(|| BackendError::parse("response contained no message"))?;
        let text = message
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(" ");

        let mut backend_response = BackendResponse::new(text, self.name.clone(), start.elapsed())
            .with_model(self.model.clone());

        if let Some(tokens) = chat.usage.and_then(|u| u.tokens) {
            let prompt = tokens.input_tokens.map(|t| t as u32);
            let completion = tokens.output_tokens.map(|t| t as u32);
            backend_response = backend_response.with_usage(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt.zip(completion).map(|(p, c)| p.saturating_add(c)),
            });
        }

        Ok(backend_response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
