//! Retry wrapper with exponential backoff

use super::types::{BackendError, BackendResponse, ChatBackend, ChatMessage, RetryPolicy};
use async_trait::async_trait;
use tracing::debug;

/// Wrapper that adds transport-level retries to any chat backend
pub struct RetryExecutor<T: ChatBackend> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: ChatBackend> RetryExecutor<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: ChatBackend> ChatBackend for RetryExecutor<T> {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<BackendResponse, BackendError> {
        let mut attempt = 0;

        loop {
            match self.inner.invoke(messages).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_retryable() || attempt >= self.policy.max_retries => {
                    return Err(e);
                }
                Err(e) => {
                    // Prefer the server's own retry-after hint
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| self.policy.delay_for_attempt(attempt));

                    debug!(
                        backend = self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );

                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Wrap a backend with a retry policy
pub fn with_retry<T: ChatBackend>(backend: T, policy: RetryPolicy) -> RetryExecutor<T> {
    RetryExecutor::new(backend, policy)
}
