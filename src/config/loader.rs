//! Configuration loading with multi-layer merge

use super::ProviderOverride;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level router configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Router-wide settings
    #[serde(default)]
    pub router: RouterSection,

    /// Overrides keyed by provider slug (groq, gemini, together, ...)
    #[serde(default)]
    pub providers: HashMap<String, ProviderOverride>,
}

/// Router-wide settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterSection {
    /// How long a backend stays quarantined after a temporary failure
    pub quarantine_secs: Option<u64>,

    /// Optional log file (tilde is expanded)
    pub log_file: Option<String>,
}

const DEFAULT_QUARANTINE_SECS: u64 = 600; // 10 minutes

impl RouterSection {
    pub fn quarantine(&self) -> Duration {
        Duration::from_secs(self.quarantine_secs.unwrap_or(DEFAULT_QUARANTINE_SECS))
    }

    /// Log file with `~` expanded
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_deref()
            .map(|raw| PathBuf::from(shellexpand::tilde(raw).as_ref()))
    }
}

impl RouterConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/llm-router/config.toml
    /// 3. .llm-router/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join(".llm-router/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".llm-router/config.toml"));

        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/llm-router/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("llm-router/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.router.quarantine_secs.is_some() {
            self.router.quarantine_secs = other.router.quarantine_secs;
        }
        if other.router.log_file.is_some() {
            self.router.log_file = other.router.log_file;
        }

        for (slug, over) in other.providers {
            self.providers.entry(slug).or_default().merge(over);
        }
    }

    /// Overrides for one provider, if any were configured
    pub fn provider(&self, slug: &str) -> Option<&ProviderOverride> {
        self.providers.get(slug)
    }
}
