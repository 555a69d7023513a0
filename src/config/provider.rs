//! Per-provider settings and their config-file overrides

use serde::{Deserialize, Serialize};

/// Fully resolved settings for one provider family
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSettings {
    /// Whether this provider may join the registry
    pub enabled: bool,

    /// API base URL (no trailing endpoint path)
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Per-call timeout in seconds
    pub timeout: u64,

    /// Sampling temperature
    pub temperature: f32,

    /// Transport-level retries for transient failures
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub retry_delay_ms: u64,
}

pub(crate) fn default_temperature() -> f32 {
    0.7
}

pub(crate) fn default_max_retries() -> u32 {
    2
}

pub(crate) fn default_retry_delay() -> u64 {
    1000
}

impl ProviderSettings {
    /// Settings with the router-wide defaults for everything but the endpoint
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: u64) -> Self {
        Self {
            enabled: true,
            base_url: base_url.into(),
            model: model.into(),
            timeout,
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// Optional overrides for a provider, as written in a config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderOverride {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<u64>,
    pub temperature: Option<f32>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl ProviderOverride {
    /// Apply the fields that are set on top of `settings`
    pub fn apply(&self, settings: &mut ProviderSettings) {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(ref base_url) = self.base_url {
            settings.base_url = base_url.clone();
        }
        if let Some(ref model) = self.model {
            settings.model = model.clone();
        }
        if let Some(timeout) = self.timeout {
            settings.timeout = timeout;
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }
        if let Some(max_retries) = self.max_retries {
            settings.max_retries = max_retries;
        }
        if let Some(retry_delay_ms) = self.retry_delay_ms {
            settings.retry_delay_ms = retry_delay_ms;
        }
    }

    /// Merge another override into this one (other takes precedence field by field)
    pub fn merge(&mut self, other: Self) {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.retry_delay_ms.is_some() {
            self.retry_delay_ms = other.retry_delay_ms;
        }
    }
}
