//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON, and quiet output modes.

use crate::router::RouteResult;
use crate::status::StatusReport;
use serde::Serialize;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    /// Pick a mode from the global flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            Self::Json
        } else if quiet {
            Self::Quiet
        } else {
            Self::Console
        }
    }
}

/// Events emitted by commands
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    Answer {
        #[serde(flatten)]
        result: RouteResult,
    },
    RouteFailed {
        error: String,
        user_message: String,
        retryable: bool,
        http_status: u16,
    },
    Status {
        #[serde(flatten)]
        report: StatusReport,
    },
    Provider {
        name: String,
        slug: String,
        credential_var: String,
        credential_present: bool,
        enabled: bool,
        model: String,
    },
    Debug {
        message: String,
    },
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);

    /// Write final result
    fn result(&self, success: bool, output: Option<&str>);
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn mark(ok: bool) -> &'static str {
        if ok { "✓" } else { "✗" }
    }

    fn format_status(report: &StatusReport) -> String {
        let mut lines = vec![
            format!(
                "Sticky: {} (consecutive failures: {})",
                report.status.current_provider, report.status.consecutive_failures
            ),
            format!(
                "Providers: {}/{} available",
                report.available_providers, report.total_providers
            ),
        ];

        for p in &report.status.providers {
            let sticky = if p.is_sticky { " *" } else { "" };
            let last = p
                .last_failure_at
                .map(|t| format!(", last failure {}", t.format("%Y-%m-%d %H:%M:%S")))
                .unwrap_or_default();
            lines.push(format!(
                "  {} {}{} ({} ok / {} failed{})",
                Self::mark(p.available),
                p.name,
                sticky,
                p.success_count,
                p.failure_count,
                last
            ));
        }

        let s = &report.summary;
        lines.push(format!(
            "Summary: {} healthy, {} struggling, {} failed, {} untested",
            s.healthy, s.struggling, s.failed, s.untested
        ));
        lines.push(format!(
            "Success rate: {}% ({} successes, {} failures)",
            report.performance.success_rate,
            report.performance.total_successes,
            report.performance.total_failures
        ));

        lines.join("\n")
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::Answer { result } => {
                if result.switched {
                    eprintln!(
                        "via {} after switching (attempt {})",
                        result.provider, result.attempt
                    );
                } else {
                    eprintln!("via {} (attempt {})", result.provider, result.attempt);
                }
            }
            OutputEvent::RouteFailed {
                error,
                user_message,
                ..
            } => {
                eprintln!("Error: {}", error);
                eprintln!("{}", user_message);
            }
            OutputEvent::Status { report } => {
                println!("{}", Self::format_status(&report));
            }
            OutputEvent::Provider {
                name,
                credential_var,
                credential_present,
                enabled,
                model,
                ..
            } => {
                let note = match (credential_present, enabled) {
                    (true, true) => String::new(),
                    (false, _) => format!(" - {} not set", credential_var),
                    (true, false) => " - disabled".to_string(),
                };
                println!(
                    "{} {} ({}){}",
                    Self::mark(credential_present && enabled),
                    name,
                    model,
                    note
                );
            }
            OutputEvent::Debug { message } => {
                if self.debug {
                    eprintln!("[debug] {}", message);
                }
            }
        }
    }

    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            println!("{}", out);
        }
    }
}

/// JSON output handler
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        if let Ok(s) = json {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        if matches!(event, OutputEvent::Debug { .. }) {
            return;
        }
        self.print_json(&event);
    }

    // Answers already went out as events
    fn result(&self, _success: bool, _output: Option<&str>) {}
}

/// Quiet handler: only the final output
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: OutputEvent) {}

    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            println!("{}", out);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler::new(true)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{ProviderStatus, RouterStatus};

    fn report() -> StatusReport {
        RouterStatus {
            current_provider: "Groq".into(),
            consecutive_failures: 0,
            providers: vec![
                ProviderStatus {
                    name: "Groq".into(),
                    available: true,
                    success_count: 3,
                    failure_count: 1,
                    last_failure_at: None,
                    is_sticky: true,
                },
                ProviderStatus {
                    name: "Cohere".into(),
                    available: false,
                    success_count: 0,
                    failure_count: 2,
                    last_failure_at: None,
                    is_sticky: false,
                },
            ],
        }
        .report()
    }

    #[test]
    fn test_output_mode_from_flags() {
        assert_eq!(OutputMode::from_flags(true, false), OutputMode::Json);
        assert_eq!(OutputMode::from_flags(true, true), OutputMode::Json);
        assert_eq!(OutputMode::from_flags(false, true), OutputMode::Quiet);
        assert_eq!(OutputMode::from_flags(false, false), OutputMode::Console);
    }

    #[test]
    fn test_console_format_status() {
        let text = ConsoleHandler::format_status(&report());
        assert!(text.contains("Sticky: Groq"));
        assert!(text.contains("1/2 available"));
        assert!(text.contains("✓ Groq * (3 ok / 1 failed)"));
        assert!(text.contains("✗ Cohere (0 ok / 2 failed)"));
        assert!(text.contains("1 healthy, 0 struggling, 1 failed, 0 untested"));
        assert!(text.contains("Success rate: 50%"));
    }

    #[test]
    fn test_answer_event_serializes_flat() {
        let event = OutputEvent::Answer {
            result: RouteResult {
                content: "hi".into(),
                provider: "Groq".into(),
                attempt: 2,
                switched: true,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Answer");
        assert_eq!(json["provider"], "Groq");
        assert_eq!(json["attempt"], 2);
        assert_eq!(json["switched"], true);
    }

    #[test]
    fn test_status_event_serializes_flat() {
        let json = serde_json::to_value(OutputEvent::Status { report: report() }).unwrap();
        assert_eq!(json["type"], "Status");
        assert_eq!(json["current_provider"], "Groq");
        assert_eq!(json["summary"]["failed"], 1);
    }

    #[test]
    fn test_create_handler() {
        let _ = create_handler(OutputMode::Console, false);
        let _ = create_handler(OutputMode::Json, false);
        let _ = create_handler(OutputMode::Quiet, false);
    }
}
