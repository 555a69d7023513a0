//! CLI module for llm-router
//!
//! This module provides:
//! - Command implementations (ask, status, backends)
//! - Output handlers (console, JSON, quiet)
//!
//! # Example
//!
//! ```ignore
//! use llm_router::cli::{commands, output};
//!
//! let handler = output::create_handler(output::OutputMode::Console, false);
//! let messages = commands::build_messages(None, &prompt);
//! let exit_code = commands::ask(&router, &messages, &*handler).await;
//! ```

pub mod commands;
pub mod output;

pub use commands::{ask, build_messages, list_backends, status};
pub use output::{OutputEvent, OutputHandler, OutputMode, create_handler};
