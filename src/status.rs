//! Read-only diagnostics over the router's health state

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health of one backend as seen by diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub available: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub is_sticky: bool,
}

impl ProviderStatus {
    pub fn is_healthy(&self) -> bool {
        self.available && self.success_count > self.failure_count
    }

    pub fn is_struggling(&self) -> bool {
        self.available && self.failure_count >= self.success_count && self.success_count > 0
    }

    pub fn is_failed(&self) -> bool {
        !self.available
    }

    pub fn is_untested(&self) -> bool {
        self.success_count == 0 && self.failure_count == 0
    }
}

/// Snapshot of the whole router
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterStatus {
    /// Sticky backend name, or "none"
    pub current_provider: String,
    pub consecutive_failures: u32,
    pub providers: Vec<ProviderStatus>,
}

/// Backend counts by health bucket
///
/// Buckets overlap: a quarantined backend that never ran counts as both
/// failed and untested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub healthy: usize,
    pub struggling: usize,
    pub failed: usize,
    pub untested: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Performance {
    pub total_successes: u64,
    pub total_failures: u64,
    /// Rounded percentage of successful calls, 0 when nothing ran
    pub success_rate: u32,
}

/// Everything a diagnostics endpoint reports
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub status: RouterStatus,
    pub total_providers: usize,
    pub available_providers: usize,
    pub summary: StatusSummary,
    pub performance: Performance,
}

impl RouterStatus {
    pub fn total_providers(&self) -> usize {
        self.providers.len()
    }

    pub fn available_providers(&self) -> usize {
        self.providers.iter().filter(|p| p.available).count()
    }

    pub fn summary(&self) -> StatusSummary {
        let count =
            |pred: fn(&ProviderStatus) -> bool| self.providers.iter().filter(|p| pred(p)).count();
        StatusSummary {
            healthy: count(ProviderStatus::is_healthy),
            struggling: count(ProviderStatus::is_struggling),
            failed: count(ProviderStatus::is_failed),
            untested: count(ProviderStatus::is_untested),
        }
    }

    pub fn performance(&self) -> Performance {
        let total_successes: u64 = self.providers.iter().map(|p| p.success_count).sum();
        let total_failures: u64 = self.providers.iter().map(|p| p.failure_count).sum();
        let total = total_successes + total_failures;

        let success_rate = if total > 0 {
            (total_successes as f64 / total as f64 * 100.0).round() as u32
        } else {
            0
        };

        Performance {
            total_successes,
            total_failures,
            success_rate,
        }
    }

    pub fn report(self) -> StatusReport {
        StatusReport {
            total_providers: self.total_providers(),
            available_providers: self.available_providers(),
            summary: self.summary(),
            performance: self.performance(),
            status: self,
        }
    }
}
