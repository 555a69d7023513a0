//! CLI command implementations

use super::output::{OutputEvent, OutputHandler};
use crate::backend::ChatMessage;
use crate::config::RouterConfig;
use crate::registry::PROVIDERS;
use crate::router::Router;

/// Assemble a one-turn conversation from CLI arguments
pub fn build_messages(system: Option<&str>, prompt: &[String]) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage::system(system));
    }

    messages.push(ChatMessage::user(prompt.join(" ")));
    messages
}

/// Send one chat turn through the router
pub async fn ask(router: &Router, messages: &[ChatMessage], handler: &dyn OutputHandler) -> i32 {
    handler.emit(OutputEvent::Debug {
        message: format!("dispatching {} messages", messages.len()),
    });

    match router.call(messages).await {
        Ok(result) => {
            let content = result.content.clone();
            handler.emit(OutputEvent::Answer { result });
            handler.result(true, Some(&content));
            0
        }
        Err(e) => {
            handler.emit(OutputEvent::RouteFailed {
                error: e.to_string(),
                user_message: e.user_message().to_string(),
                retryable: e.is_retryable(),
                http_status: e.http_status(),
            });
            handler.result(false, None);
            1
        }
    }
}

/// Report router health
pub fn status(router: &Router, handler: &dyn OutputHandler) -> i32 {
    let report = router.status().report();
    let ok = report.total_providers > 0;

    handler.emit(OutputEvent::Status { report });

    if ok { 0 } else { 1 }
}

/// List provider families and whether each would join the registry
pub fn list_backends<F>(config: &RouterConfig, lookup: F, handler: &dyn OutputHandler)
where
    F: Fn(&str) -> Option<String>,
{
    for family in &PROVIDERS {
        let settings = family.settings(config);
        handler.emit(OutputEvent::Provider {
            name: family.name.to_string(),
            slug: family.slug.to_string(),
            credential_var: family.credential_var.to_string(),
            credential_present: family.credential(&lookup).is_some(),
            enabled: settings.enabled,
            model: settings.model,
        });
    }
}
