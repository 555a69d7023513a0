//! Per-backend health state and timed quarantine
//!
//! A [`HealthRecord`] is only ever touched between await points, so plain
//! atomics are enough. Concurrent dispatches may interleave their updates;
//! counters stay monotonic and availability converges.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

const NEVER: i64 = i64::MIN;

/// Mutable health of one registered backend
#[derive(Debug)]
pub struct HealthRecord {
    available: AtomicBool,
    /// Millisecond timestamp of the last quarantining failure
    last_failure_at: AtomicI64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    /// Bumped on every quarantine; a recovery timer only fires for its own generation
    generation: AtomicU64,
}

/// Point-in-time copy of a [`HealthRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub available: bool,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub success_count: u64,
    pub failure_count: u64,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRecord {
    /// Fresh record: available, never failed
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            last_failure_at: AtomicI64::new(NEVER),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::SeqCst)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }

    pub fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        match self.last_failure_at.load(Ordering::SeqCst) {
            NEVER => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    pub fn record_success(&self) -> u64 {
        self.success_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_failure(&self) -> u64 {
        self.failure_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Take the backend out of rotation and schedule its return
    ///
    /// Must be called from within a tokio runtime. The recovery task flips
    /// `available` back to true after `window` and touches nothing else.
    pub fn quarantine(self: &Arc<Self>, name: &str, window: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.last_failure_at
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
        self.available.store(false, Ordering::SeqCst);

        let record = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if record.recover(generation) {
                info!(backend = %name, "quarantine window elapsed, backend re-enabled");
            }
        });
    }

    /// End quarantine `generation`; a later quarantine supersedes older timers
    fn recover(&self, generation: u64) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.available.store(true, Ordering::SeqCst);
        true
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            available: self.is_available(),
            last_failure_at: self.last_failure_at(),
            success_count: self.success_count(),
            failure_count: self.failure_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(600);

    #[test]
    fn test_new_record_is_available_and_untouched() {
        let record = HealthRecord::new();
        let snap = record.snapshot();
        assert!(snap.available);
        assert_eq!(snap.last_failure_at, None);
        assert_eq!(snap.success_count, 0);
        assert_eq!(snap.failure_count, 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let record = HealthRecord::new();
        assert_eq!(record.record_success(), 1);
        assert_eq!(record.record_success(), 2);
        assert_eq!(record.record_failure(), 1);
        assert_eq!(record.success_count(), 2);
        assert_eq!(record.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quarantine_recovers_after_window() {
        let record = Arc::new(HealthRecord::new());
        record.record_failure();
        record.quarantine("Groq", WINDOW);

        let quarantined = record.snapshot();
        assert!(!quarantined.available);
        assert!(quarantined.last_failure_at.is_some());

        tokio::time::sleep(WINDOW - Duration::from_secs(1)).await;
        assert!(!record.is_available());

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        // Only the flag moves
        let recovered = record.snapshot();
        assert!(recovered.available);
        assert_eq!(recovered.failure_count, quarantined.failure_count);
        assert_eq!(recovered.success_count, quarantined.success_count);
        assert_eq!(recovered.last_failure_at, quarantined.last_failure_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_end_newer_quarantine() {
        let record = Arc::new(HealthRecord::new());
        record.quarantine("Groq", WINDOW);

        tokio::time::sleep(Duration::from_secs(300)).await;
        record.quarantine("Groq", WINDOW);

        // First timer fires at 600s but belongs to the superseded quarantine
        tokio::time::sleep(Duration::from_secs(301)).await;
        tokio::task::yield_now().await;
        assert!(!record.is_available());

        tokio::time::sleep(Duration::from_secs(300)).await;
        tokio::task::yield_now().await;
        assert!(record.is_available());
    }

    #[test]
    fn test_recover_ignores_unknown_generation() {
        let record = HealthRecord::new();
        record.available.store(false, Ordering::SeqCst);
        assert!(!record.recover(7));
        assert!(!record.is_available());
    }
}
