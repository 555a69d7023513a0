//! Configuration types and loading for llm-router

mod loader;
mod provider;

pub use loader::{RouterConfig, RouterSection};
pub use provider::{ProviderOverride, ProviderSettings};
