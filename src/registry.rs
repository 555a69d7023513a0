//! Backend registry and credential-driven bootstrap
//!
//! Provider families are probed in a fixed priority order. A family joins the
//! registry when its credential variable is set and it is not disabled in
//! config; a missing credential is not an error.

use crate::backend::{ChatBackend, Dialect, create_backend};
use crate::config::{ProviderSettings, RouterConfig};
use crate::health::HealthRecord;
use std::sync::Arc;
use tracing::{info, warn};

/// Static description of a provider family
#[derive(Debug, Clone, Copy)]
pub struct ProviderFamily {
    /// Config key (`[providers.<slug>]`)
    pub slug: &'static str,
    /// Display name, also the registry name
    pub name: &'static str,
    /// Environment variable holding the API key
    pub credential_var: &'static str,
    pub dialect: Dialect,
    pub base_url: &'static str,
    pub model: &'static str,
    /// Per-call timeout in seconds
    pub timeout: u64,
}

/// All supported families, in priority order
pub const PROVIDERS: [ProviderFamily; 6] = [
    ProviderFamily {
        slug: "groq",
        name: "Groq",
        credential_var: "GROQ_API_KEY",
        dialect: Dialect::OpenAi,
        base_url: "https://api.groq.com/openai/v1",
        model: "llama-3.3-70b-versatile",
        timeout: 30,
    },
    ProviderFamily {
        slug: "gemini",
        name: "Google Gemini",
        credential_var: "GOOGLE_API_KEY",
        dialect: Dialect::Gemini,
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        model: "gemini-1.5-flash",
        timeout: 30,
    },
    ProviderFamily {
        slug: "together",
        name: "Together AI",
        credential_var: "TOGETHER_API_KEY",
        dialect: Dialect::OpenAi,
        base_url: "https://api.together.xyz/v1",
        model: "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
        timeout: 30,
    },
    ProviderFamily {
        slug: "fireworks",
        name: "Fireworks AI",
        credential_var: "FIREWORKS_API_KEY",
        dialect: Dialect::OpenAi,
        base_url: "https://api.fireworks.ai/inference/v1",
        model: "accounts/fireworks/models/llama-v3p1-70b-instruct",
        timeout: 30,
    },
    ProviderFamily {
        slug: "cohere",
        name: "Cohere",
        credential_var: "COHERE_API_KEY",
        dialect: Dialect::Cohere,
        base_url: "https://api.cohere.com/v2",
        model: "command-r-plus",
        timeout: 30,
    },
    ProviderFamily {
        slug: "huggingface",
        name: "Hugging Face",
        credential_var: "HUGGINGFACE_API_KEY",
        dialect: Dialect::OpenAi,
        base_url: "https://api-inference.huggingface.co/v1",
        model: "meta-llama/Llama-2-70b-chat-hf",
        timeout: 45,
    },
];

impl ProviderFamily {
    /// Built-in defaults with any config overrides applied
    pub fn settings(&self, config: &RouterConfig) -> ProviderSettings {
        let mut settings = ProviderSettings::new(self.base_url, self.model, self.timeout);
        if let Some(over) = config.provider(self.slug) {
            over.apply(&mut settings);
        }
        settings
    }

    /// Read this family's credential; blank values count as absent
    pub fn credential<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(self.credential_var).filter(|v| !v.trim().is_empty())
    }
}

/// One registry slot: the adapter plus its health
pub struct RegisteredBackend {
    pub name: String,
    pub backend: Arc<dyn ChatBackend>,
    pub health: Arc<HealthRecord>,
}

/// Ordered set of backends; order is the tie-break everywhere
#[derive(Default)]
pub struct Registry {
    entries: Vec<RegisteredBackend>,
}

impl Registry {
    /// Build from already-constructed backends, keeping their order
    pub fn new(backends: Vec<Box<dyn ChatBackend>>) -> Self {
        let mut registry = Self::default();
        for backend in backends {
            registry.push(Arc::from(backend));
        }
        registry
    }

    fn push(&mut self, backend: Arc<dyn ChatBackend>) {
        let name = backend.name().to_string();
        if self.position(&name).is_some() {
            warn!(backend = %name, "duplicate backend name, ignoring");
            return;
        }
        self.entries.push(RegisteredBackend {
            name,
            backend,
            health: Arc::new(HealthRecord::new()),
        });
    }

    /// Probe every family with `lookup` and build the matching adapters
    pub fn discover<F>(config: &RouterConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::default();

        for family in &PROVIDERS {
            let Some(api_key) = family.credential(&lookup) else {
                info!(
                    provider = family.name,
                    "{} not set, skipping", family.credential_var
                );
                continue;
            };

            let settings = family.settings(config);
            if !settings.enabled {
                info!(provider = family.name, "disabled in config, skipping");
                continue;
            }

            match create_backend(family.name, family.dialect, &api_key, &settings) {
                Ok(backend) => {
                    info!(provider = family.name, model = %settings.model, "provider initialized");
                    registry.push(Arc::from(backend));
                }
                Err(e) => warn!(provider = family.name, error = %e, "failed to initialize provider"),
            }
        }

        if registry.is_empty() {
            warn!("no LLM providers available, check API keys");
        } else {
            info!(
                providers = %registry.names().join(", "),
                "registry built with {} providers",
                registry.len()
            );
        }

        registry
    }

    /// Discover using the process environment
    pub fn from_env(config: &RouterConfig) -> Self {
        Self::discover(config, |var| std::env::var(var).ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RegisteredBackend> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredBackend> {
        self.entries.iter()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Indices of currently available backends, in registry order
    pub fn available(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.health.is_available())
            .map(|(i, _)| i)
            .collect()
    }

    /// First available backend after `index`, wrapping around (may be `index` itself)
    pub fn next_available_after(&self, index: usize) -> Option<usize> {
        let len = self.entries.len();
        (1..=len)
            .map(|offset| (index + offset) % len)
            .find(|&i| self.entries[i].health.is_available())
    }
}
