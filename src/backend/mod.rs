//! Backend adapters
//!
//! Every inference provider sits behind [`ChatBackend`]: ordered messages in,
//! assistant text out. Three wire dialects cover all supported providers, and
//! each adapter built here is wrapped in transport-level retries.
//!
//! # Example
//!
//! ```ignore
//! use llm_router::backend::{create_backend, ChatMessage, Dialect};
//!
//! let backend = create_backend("Groq", Dialect::OpenAi, api_key, &settings)?;
//! let reply = backend.invoke(&[ChatMessage::user("hello")]).await?;
//! println!("{}", reply.text);
//! ```

mod cohere;
mod gemini;
mod openai;
mod retry;
mod types;

pub use cohere::CohereBackend;
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use retry::{RetryExecutor, with_retry};
pub use types::{
    BackendError, BackendResponse, ChatBackend, ChatMessage, ChatRole, FailureClass,
    RetryPolicy, TokenUsage,
};

use crate::config::ProviderSettings;
use serde::Serialize;

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// OpenAI-compatible `/chat/completions`
    OpenAi,
    /// Google `generateContent`
    Gemini,
    /// Cohere `/v2/chat`
    Cohere,
}

/// Create a retrying adapter for one provider
pub fn create_backend(
    name: &str,
    dialect: Dialect,
    api_key: &str,
    settings: &ProviderSettings,
) -> Result<Box<dyn ChatBackend>, BackendError> {
    let policy = RetryPolicy::from_settings(settings);

    let backend: Box<dyn ChatBackend> = match dialect {
        Dialect::OpenAi => Box::new(with_retry(
            OpenAiBackend::from_settings(name, api_key, settings)?,
            policy,
        )),
        Dialect::Gemini => Box::new(with_retry(
            GeminiBackend::from_settings(name, api_key, settings)?,
            policy,
        )),
        Dialect::Cohere => Box::new(with_retry(
            CohereBackend::from_settings(name, api_key, settings)?,
            policy,
        )),
    };

    Ok(backend)
}
