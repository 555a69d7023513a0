//! Sticky multi-provider LLM routing with quarantine and exhaustive failover
//!
//! A [`Router`] owns a registry of interchangeable chat backends discovered
//! from environment credentials. Each call goes to the sticky backend first;
//! failures are classified, temporary ones quarantine the backend for a fixed
//! window, and the remaining backends are tried in order until one answers.

pub mod backend;
pub mod cli;
pub mod config;
pub mod health;
pub mod logging;
pub mod registry;
pub mod router;
pub mod status;

pub use backend::{BackendError, ChatBackend, ChatMessage, ChatRole};
pub use config::RouterConfig;
pub use registry::Registry;
pub use router::{RouteResult, Router, RouterError};
pub use status::{RouterStatus, StatusReport};
