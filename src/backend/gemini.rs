//! Google Gemini `generateContent` backend

use super::types::{BackendError, BackendResponse, ChatBackend, ChatMessage, ChatRole, TokenUsage};
use crate::config::ProviderSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Backend for the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

impl GeminiBackend {
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

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// Gemini keeps system text apart and calls the assistant "model"
    fn build_request<'a>(&self, messages: &'a [ChatMessage]) -> GenerateRequest<'a> {
        let system_parts: Vec<Part<'a>> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| Part { text: &m.content })
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| Content {
                role: Some(match m.role {
                    ChatRole::Assistant => "model",
                    _ => "user",
                }),
                parts: vec![Part { text: &m.content }],
            })
            .collect();

        GenerateRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then_some(Content {
                role: None,
                parts: system_parts,
            }),
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<BackendResponse, BackendError> {
        let start = Instant::now();

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(messages))
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, start.elapsed()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::from_response(response, self.timeout).await);
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::parse(format!("failed to parse response: {}", e)))?;

        let content = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| BackendError::parse("response contained no candidates"))?;
        let text = content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join(" ");

        let mut backend_response = BackendResponse::new(text, self.name.clone(), start.elapsed())
            .with_model(generated.model_version.unwrap_or_else(|| self.model.clone()));

        if let Some(usage) = generated.usage_metadata {
            backend_response = backend_response.with_usage(TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            });
        }

        Ok(backend_response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
