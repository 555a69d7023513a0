//! Sticky multi-backend dispatch
//!
//! Each call tries the sticky backend first. On failure the error is
//! classified, temporary failures quarantine the backend, and every other
//! available backend is tried once in registry order. The first success
//! becomes the new sticky backend. Callers only see an error once nothing
//! is left to try.

use crate::backend::{ChatMessage, FailureClass};
use crate::config::RouterConfig;
use crate::registry::{RegisteredBackend, Registry};
use crate::status::{ProviderStatus, RouterStatus};
use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default time a backend sits out after a temporary failure
pub const DEFAULT_QUARANTINE: Duration = Duration::from_secs(600);

const NO_STICKY: usize = usize::MAX;

/// Turn-level failures; never a raw transport error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// No credentials were present at bootstrap
    #[error(
        "No LLM providers available. Please check your API keys in the environment variables."
    )]
    NoBackendsConfigured,

    /// Every backend is quarantined; nothing was tried
    #[error("All LLM providers are currently unavailable. Please try again shortly.")]
    AllProvidersUnavailable,

    /// Every eligible backend was tried this turn and failed
    #[error("All {total} LLM providers failed. Please try again in a few minutes.")]
    AllProvidersFailed { total: usize, attempts: u32 },
}

impl RouterError {
    /// Whether trying again later can succeed without redeploying
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RouterError::NoBackendsConfigured)
    }

    /// HTTP status a web handler should answer with
    pub fn http_status(&self) -> u16 {
        503
    }

    /// Message suitable for end users
    pub fn user_message(&self) -> &'static str {
        match self {
            RouterError::NoBackendsConfigured => {
                "AI services are currently offline. Please try again later."
            }
            RouterError::AllProvidersUnavailable => {
                "AI services are temporarily unavailable. Please try again in a moment."
            }
            RouterError::AllProvidersFailed { .. } => {
                "All AI services are experiencing issues. Please try again in a few minutes."
            }
        }
    }
}

/// Successful turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteResult {
    pub content: String,
    /// Name of the backend that answered
    pub provider: String,
    /// 1-based number of backend calls made this turn
    pub attempt: u32,
    /// False only when the sticky backend answered first time
    pub switched: bool,
}

struct RouterState {
    registry: Registry,
    sticky: AtomicUsize,
    consecutive_failures: AtomicU32,
}

impl RouterState {
    fn new(registry: Registry) -> Self {
        let sticky = if registry.is_empty() { NO_STICKY } else { 0 };
        if let Some(first) = registry.get(0) {
            info!(backend = %first.name, "initial sticky backend");
        }
        Self {
            registry,
            sticky: AtomicUsize::new(sticky),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    fn sticky(&self) -> Option<usize> {
        match self.sticky.load(Ordering::SeqCst) {
            NO_STICKY => None,
            index => Some(index),
        }
    }

    fn promote(&self, index: usize) {
        self.sticky.store(index, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Move stickiness past a failed backend; unchanged if nothing is available
    fn advance_sticky(&self, failed: usize) {
        if let Some(next) = self.registry.next_available_after(failed) {
            self.sticky.store(next, Ordering::SeqCst);
            if let Some(entry) = self.registry.get(next) {
                info!(backend = %entry.name, "switched sticky backend");
            }
        }
    }
}

type Bootstrap = Box<dyn Fn() -> Registry + Send + Sync>;

/// Long-lived dispatcher, shared behind an `Arc` by whoever handles chat turns
pub struct Router {
    quarantine: Duration,
    bootstrap: Bootstrap,
    state: OnceLock<RouterState>,
}

impl Router {
    /// Router whose registry is built from the environment on first use
    pub fn from_env(config: RouterConfig) -> Self {
        let quarantine = config.router.quarantine();
        Self::with_bootstrap(quarantine, move || Registry::from_env(&config))
    }

    /// Router with a custom registry builder, run once on first use
    pub fn with_bootstrap<F>(quarantine: Duration, bootstrap: F) -> Self
    where
        F: Fn() -> Registry + Send + Sync + 'static,
    {
        Self {
            quarantine,
            bootstrap: Box::new(bootstrap),
            state: OnceLock::new(),
        }
    }

    /// Router over an already-built registry
    pub fn with_registry(registry: Registry, quarantine: Duration) -> Self {
        let router = Self::with_bootstrap(quarantine, Registry::default);
        let _ = router.state.set(RouterState::new(registry));
        router
    }

    fn state(&self) -> &RouterState {
        self.state.get_or_init(|| RouterState::new((self.bootstrap)()))
    }

    /// Dispatch one chat turn
    pub async fn call(&self, messages: &[ChatMessage]) -> Result<RouteResult, RouterError> {
        let state = self.state();
        let registry = &state.registry;

        if registry.is_empty() {
            return Err(RouterError::NoBackendsConfigured);
        }

        let mut attempts = 0u32;
        let mut failed_sticky = None;

        if let Some(index) = state.sticky() {
            if let Some(entry) = registry.get(index).filter(|e| e.health.is_available()) {
                attempts += 1;
                debug!(
                    backend = %entry.name,
                    successes = entry.health.success_count(),
                    "using sticky backend"
                );

                match entry.backend.invoke(messages).await {
                    Ok(response) => {
                        entry.health.record_success();
                        state.consecutive_failures.store(0, Ordering::SeqCst);
                        debug!(
                            backend = %entry.name,
                            duration_ms = response.duration.as_millis() as u64,
                            "sticky backend answered"
                        );
                        return Ok(RouteResult {
                            content: response.text,
                            provider: entry.name.clone(),
                            attempt: attempts,
                            switched: false,
                        });
                    }
                    Err(e) => {
                        let consecutive =
                            state.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                        warn!(
                            backend = %entry.name,
                            consecutive_failures = consecutive,
                            error = %e,
                            "sticky backend failed"
                        );
                        self.record_failure(entry, e.failure_class());
                        state.advance_sticky(index);
                        failed_sticky = Some(index);
                    }
                }
            }
        }

        let available = registry.available();
        if available.is_empty() {
            warn!("all backends quarantined");
            return Err(RouterError::AllProvidersUnavailable);
        }

        let candidates: Vec<usize> = available
            .into_iter()
            .filter(|&i| Some(i) != failed_sticky)
            .collect();
        debug!(candidates = candidates.len(), "falling back across available backends");

        for index in candidates {
            let Some(entry) = registry.get(index) else {
                continue;
            };
            attempts += 1;
            debug!(backend = %entry.name, attempt = attempts, "trying backend");

            match entry.backend.invoke(messages).await {
                Ok(response) => {
                    entry.health.record_success();
                    state.promote(index);
                    info!(
                        backend = %entry.name,
                        attempt = attempts,
                        successes = entry.health.success_count(),
                        "backend answered, now sticky"
                    );
                    return Ok(RouteResult {
                        content: response.text,
                        provider: entry.name.clone(),
                        attempt: attempts,
                        switched: true,
                    });
                }
                Err(e) => {
                    warn!(backend = %entry.name, attempt = attempts, error = %e, "backend failed");
                    self.record_failure(entry, e.failure_class());
                }
            }
        }

        warn!(attempts, "every eligible backend failed");
        Err(RouterError::AllProvidersFailed {
            total: registry.len(),
            attempts,
        })
    }

    fn record_failure(&self, entry: &RegisteredBackend, class: FailureClass) {
        entry.health.record_failure();
        if class.quarantines() {
            warn!(
                backend = %entry.name,
                quarantine_secs = self.quarantine.as_secs(),
                "temporary failure, quarantining backend"
            );
            entry.health.quarantine(&entry.name, self.quarantine);
        } else if class == FailureClass::Permanent {
            warn!(backend = %entry.name, "backend rejected credentials, check its API key");
        }
    }

    /// Snapshot for diagnostics
    pub fn status(&self) -> RouterStatus {
        let state = self.state();
        let sticky = state.sticky();

        let providers = state
            .registry
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let health = entry.health.snapshot();
                ProviderStatus {
                    name: entry.name.clone(),
                    available: health.available,
                    success_count: health.success_count,
                    failure_count: health.failure_count,
                    last_failure_at: health.last_failure_at,
                    is_sticky: sticky == Some(i),
                }
            })
            .collect();

        RouterStatus {
            current_provider: sticky
                .and_then(|i| state.registry.get(i))
                .map(|e| e.name.clone())
                .unwrap_or_else(|| "none".to_string()),
            consecutive_failures: state.consecutive_failures.load(Ordering::SeqCst),
            providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResponse, ChatBackend};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::{Arc, Mutex};

    type CallLog = Arc<Mutex<Vec<String>>>;

    /// Backend that replays scripted outcomes, then repeats the fallback
    struct Scripted {
        name: String,
        script: Mutex<VecDeque<Result<String, BackendError>>>,
        fallback: Result<String, BackendError>,
        log: CallLog,
    }

    impl Scripted {
        fn boxed(
            name: &str,
            fallback: Result<&str, BackendError>,
            log: &CallLog,
        ) -> Box<dyn ChatBackend> {
            Self::scripted(name, vec![], fallback, log)
        }

        fn scripted(
            name: &str,
            script: Vec<Result<&str, BackendError>>,
            fallback: Result<&str, BackendError>,
            log: &CallLog,
        ) -> Box<dyn ChatBackend> {
            Box::new(Self {
                name: name.into(),
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(String::from))
                        .collect(),
                ),
                fallback: fallback.map(String::from),
                log: Arc::clone(log),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn invoke(&self, _: &[ChatMessage]) -> Result<BackendResponse, BackendError> {
            self.log.lock().unwrap().push(self.name.clone());
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            outcome.map(|text| BackendResponse::new(text, self.name.clone(), Duration::ZERO))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn rate_limited() -> BackendError {
        BackendError::rate_limit(None)
    }

    fn forbidden() -> BackendError {
        BackendError::auth("HTTP 403: forbidden")
    }

    fn router(backends: Vec<Box<dyn ChatBackend>>) -> Router {
        Router::with_registry(Registry::new(backends), DEFAULT_QUARANTINE)
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("context"), ChatMessage::user("hello?")]
    }

    fn calls(log: &CallLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn provider<'a>(status: &'a RouterStatus, name: &str) -> &'a ProviderStatus {
        status.providers.iter().find(|p| p.name == name).unwrap()
    }

    #[tokio::test]
    async fn test_healthy_sticky_answers_alone() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::boxed("A", Ok("hello"), &log),
            Scripted::boxed("B", Ok("unused"), &log),
        ]);

        let result = router.call(&messages()).await.unwrap();
        assert_eq!(
            result,
            RouteResult {
                content: "hello".into(),
                provider: "A".into(),
                attempt: 1,
                switched: false,
            }
        );
        assert_eq!(calls(&log), vec!["A"]);

        let status = router.status();
        assert_eq!(provider(&status, "A").success_count, 1);
        assert_eq!(status.current_provider, "A");
    }

    #[tokio::test]
    async fn test_rate_limited_sticky_fails_over_and_is_quarantined() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::boxed("A", Err(rate_limited()), &log),
            Scripted::boxed("B", Ok("hi"), &log),
        ]);

        let result = router.call(&messages()).await.unwrap();
        assert_eq!(
            result,
            RouteResult {
                content: "hi".into(),
                provider: "B".into(),
                attempt: 2,
                switched: true,
            }
        );

        let status = router.status();
        let a = provider(&status, "A");
        assert!(!a.available);
        assert_eq!(a.failure_count, 1);
        assert!(a.last_failure_at.is_some());
        assert_eq!(provider(&status, "B").success_count, 1);
        assert_eq!(status.current_provider, "B");
        assert!(provider(&status, "B").is_sticky);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_consecutive_failures_counts_sticky_failures() {
        let log = CallLog::default();
        let router = router(vec![Scripted::boxed("A", Err(rate_limited()), &log)]);

        let err = router.call(&messages()).await.unwrap_err();
        assert_eq!(err, RouterError::AllProvidersUnavailable);

        let status = router.status();
        assert_eq!(status.consecutive_failures, 1);
        assert!(!provider(&status, "A").available);
    }

    #[tokio::test]
    async fn test_winner_becomes_sticky_for_next_call() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::scripted("A", vec![Err(forbidden())], Ok("a"), &log),
            Scripted::boxed("B", Ok("b"), &log),
        ]);

        let first = router.call(&messages()).await.unwrap();
        assert_eq!(first.provider, "B");

        // A was not quarantined, but B is sticky now
        let second = router.call(&messages()).await.unwrap();
        assert_eq!(second.provider, "B");
        assert_eq!(second.attempt, 1);
        assert!(!second.switched);
        assert_eq!(calls(&log), vec!["A", "B", "B"]);
    }

    #[tokio::test]
    async fn test_permanent_failure_switches_without_quarantine() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::boxed("A", Err(forbidden()), &log),
            Scripted::boxed("B", Ok("ok"), &log),
        ]);

        router.call(&messages()).await.unwrap();

        let status = router.status();
        let a = provider(&status, "A");
        assert!(a.available);
        assert_eq!(a.failure_count, 1);
        assert_eq!(a.last_failure_at, None);
    }

    #[tokio::test]
    async fn test_single_backend_permanent_failure_is_not_retried() {
        let log = CallLog::default();
        let router = router(vec![Scripted::boxed("A", Err(forbidden()), &log)]);

        let err = router.call(&messages()).await.unwrap_err();
        assert_eq!(
            err,
            RouterError::AllProvidersFailed {
                total: 1,
                attempts: 1
            }
        );
        assert_eq!(calls(&log), vec!["A"]);
        assert!(provider(&router.status(), "A").available);
    }

    #[tokio::test]
    async fn test_exhaustion_tries_each_once_in_order() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::boxed("A", Err(forbidden()), &log),
            Scripted::boxed("B", Err(BackendError::parse("garbage")), &log),
            Scripted::boxed("C", Err(BackendError::server(500, "boom")), &log),
            Scripted::boxed("D", Err(forbidden()), &log),
        ]);

        let err = router.call(&messages()).await.unwrap_err();
        assert_eq!(
            err,
            RouterError::AllProvidersFailed {
                total: 4,
                attempts: 4
            }
        );
        assert_eq!(calls(&log), vec!["A", "B", "C", "D"]);

        let status = router.status();
        assert!(status.providers.iter().all(|p| p.failure_count == 1));
        assert!(!provider(&status, "C").available);
    }

    #[tokio::test]
    async fn test_exhaustion_skips_quarantined_backends() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::scripted("A", vec![Err(rate_limited())], Err(forbidden()), &log),
            Scripted::scripted("B", vec![Ok("b")], Err(forbidden()), &log),
            Scripted::boxed("C", Err(forbidden()), &log),
        ]);

        // A is quarantined, B wins and becomes sticky
        router.call(&messages()).await.unwrap();
        log.lock().unwrap().clear();

        let err = router.call(&messages()).await.unwrap_err();
        assert!(matches!(err, RouterError::AllProvidersFailed { attempts: 2, .. }));
        assert_eq!(calls(&log), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_empty_registry_reports_no_backends() {
        let router = router(vec![]);

        let err = router.call(&messages()).await.unwrap_err();
        assert_eq!(err, RouterError::NoBackendsConfigured);
        assert!(!err.is_retryable());

        let status = router.status();
        assert_eq!(status.current_provider, "none");
        assert!(status.providers.is_empty());
    }

    #[tokio::test]
    async fn test_all_quarantined_reports_unavailable_without_calls() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::boxed("A", Err(rate_limited()), &log),
            Scripted::boxed("B", Err(BackendError::network("connection reset")), &log),
        ]);

        let err = router.call(&messages()).await.unwrap_err();
        assert!(matches!(err, RouterError::AllProvidersFailed { attempts: 2, .. }));
        log.lock().unwrap().clear();

        let err = router.call(&messages()).await.unwrap_err();
        assert_eq!(err, RouterError::AllProvidersUnavailable);
        assert!(calls(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quarantined_backend_returns_after_window() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::scripted("A", vec![Err(rate_limited())], Ok("a"), &log),
            Scripted::boxed("B", Err(forbidden()), &log),
        ]);

        router.call(&messages()).await.unwrap_err();
        let before = router.status();
        assert!(!provider(&before, "A").available);

        tokio::time::sleep(DEFAULT_QUARANTINE + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        let after = router.status();
        let a = provider(&after, "A");
        assert!(a.available);
        assert_eq!(a.failure_count, provider(&before, "A").failure_count);
        assert_eq!(a.success_count, 0);
        assert_eq!(a.last_failure_at, provider(&before, "A").last_failure_at);

        let result = router.call(&messages()).await.unwrap();
        assert_eq!(result.provider, "A");
    }

    #[tokio::test]
    async fn test_counters_never_decrease() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::scripted(
                "A",
                vec![Ok("1"), Err(forbidden()), Ok("3"), Err(rate_limited())],
                Ok("x"),
                &log,
            ),
            Scripted::scripted("B", vec![Err(forbidden()), Ok("2")], Ok("y"), &log),
        ]);

        let mut previous: Vec<(u64, u64)> = vec![(0, 0); 2];
        for _ in 0..6 {
            let _ = router.call(&messages()).await;
            let now: Vec<(u64, u64)> = router
                .status()
                .providers
                .iter()
                .map(|p| (p.success_count, p.failure_count))
                .collect();
            for (old, new) in previous.iter().zip(&now) {
                assert!(new.0 >= old.0 && new.1 >= old.1);
            }
            previous = now;
        }
    }

    #[tokio::test]
    async fn test_fallback_continues_past_failed_backends() {
        let log = CallLog::default();
        let router = router(vec![
            Scripted::scripted("A", vec![Err(rate_limited())], Ok("a"), &log),
            Scripted::scripted("B", vec![Err(forbidden())], Ok("b"), &log),
            Scripted::boxed("C", Ok("c"), &log),
        ]);

        // A quarantined, B fails, C wins
        let first = router.call(&messages()).await.unwrap();
        assert_eq!((first.provider.as_str(), first.attempt), ("C", 3));

        let status = router.status();
        assert_eq!(status.current_provider, "C");
        assert_eq!(provider(&status, "B").failure_count, 1);
    }

    #[test]
    fn test_bootstrap_is_lazy_and_runs_once() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let router = Router::with_bootstrap(DEFAULT_QUARANTINE, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Registry::default()
        });
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        router.status();
        router.status();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_router_error_messages() {
        assert!(
            RouterError::NoBackendsConfigured
                .to_string()
                .starts_with("No LLM providers available")
        );
        assert!(
            RouterError::AllProvidersUnavailable
                .to_string()
                .contains("shortly")
        );

        let failed = RouterError::AllProvidersFailed {
            total: 3,
            attempts: 3,
        };
        assert!(failed.to_string().contains("All 3 LLM providers failed"));
        assert!(failed.is_retryable());
        assert_eq!(failed.http_status(), 503);
        assert!(failed.user_message().contains("few minutes"));
    }

    #[tokio::test]
    async fn test_empty_completion_fails_over() {
        use crate::backend::OpenAiBackend;
        use crate::config::ProviderSettings;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let settings = ProviderSettings::new(server.uri(), "llama", 5);
        let empty = OpenAiBackend::from_settings("A", "key", &settings).unwrap();
        let log = CallLog::default();
        let backends: Vec<Box<dyn ChatBackend>> =
            vec![Box::new(empty), Scripted::boxed("B", Ok("b"), &log)];
        let router = router(backends);

        let result = router.call(&messages()).await.unwrap();
        assert_eq!(result.provider, "B");
        assert_eq!(result.attempt, 2);
        assert!(result.switched);

        let status = router.status();
        assert_eq!(provider(&status, "A").failure_count, 1);
        assert_eq!(provider(&status, "A").success_count, 0);
        assert_eq!(status.current_provider, "B");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shared_router_across_tasks() {
        let log = CallLog::default();
        let router = Arc::new(router(vec![Scripted::boxed("A", Ok("a"), &log)]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let router = Arc::clone(&router);
                tokio::spawn(async move { router.call(&messages()).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().provider, "A");
        }
        assert_eq!(provider(&router.status(), "A").success_count, 4);
    }
}
