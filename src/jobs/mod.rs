//! Scheduled Jobs
//!
//! Background maintenance for the in-memory request guards: expired
//! idempotency records and finished rate limit windows.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::api::middleware::RateLimiter;
use crate::idempotency::IdempotencyStore;

// =========================================================================
// Idempotency sweep
// =========================================================================

/// Remove expired idempotency records and abandoned in-progress markers
pub fn sweep_idempotency_keys(store: &IdempotencyStore) -> usize {
    let rows_deleted = store.purge_expired();

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            remaining = store.len(),
            "Purged expired idempotency keys"
        );
    }

    rows_deleted
}

// =========================================================================
// Rate limit window cleanup
// =========================================================================

/// Drop rate limit windows that have already ended
pub fn cleanup_rate_limit_windows(limiter: &RateLimiter) -> usize {
    let rows_deleted = limiter.purge_expired();

    if rows_deleted > 0 {
        tracing::debug!(rows_deleted = rows_deleted, "Cleaned up rate limit windows");
    }

    rows_deleted
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for idempotency sweeps and rate limit cleanup (default: 1 minute)
    pub sweep_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    idempotency: IdempotencyStore,
    rate_limiter: RateLimiter,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(idempotency: IdempotencyStore, rate_limiter: RateLimiter) -> Self {
        Self {
            idempotency,
            rate_limiter,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: JobSchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            "Job scheduler started"
        );

        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            sweep.tick().await;
            self.run_all_once();
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub fn run_all_once(&self) -> MaintenanceReport {
        MaintenanceReport {
            idempotency_keys_deleted: sweep_idempotency_keys(&self.idempotency),
            rate_limit_windows_cleaned: cleanup_rate_limit_windows(&self.rate_limiter),
            completed_at: Utc::now(),
        }
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub idempotency_keys_deleted: usize,
    pub rate_limit_windows_cleaned: usize,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::CachedResponse;

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_run_all_once_purges_expired_keys() {
        let idempotency = IdempotencyStore::new(Duration::ZERO);
        idempotency.begin("key-1", "hash").unwrap();
        idempotency.complete(
            "key-1",
            CachedResponse {
                status: 200,
                body: serde_json::json!({}),
            },
        );

        let scheduler = JobScheduler::new(idempotency.clone(), RateLimiter::new(10));
        let report = scheduler.run_all_once();

        assert_eq!(report.idempotency_keys_deleted, 1);
        assert!(idempotency.is_empty());
    }

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.idempotency_keys_deleted, 0);
        assert_eq!(report.rate_limit_windows_cleaned, 0);
    }
}
