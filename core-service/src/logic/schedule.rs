//! Periodic Jobs
//!
//! Single-flight guard for scheduled replay regression and training runs,
//! plus a tokio interval driver.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::error::{DefenseError, DefenseResult};

// ============================================================================
// JOB GUARD
// ============================================================================

#[derive(Debug)]
pub struct PeriodicJob {
    name: String,
    running: AtomicBool,
    runs: AtomicU64,
    failures: AtomicU64,
    last_started: RwLock<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub running: bool,
    pub runs: u64,
    pub failures: u64,
    pub last_started: Option<DateTime<Utc>>,
}

impl PeriodicJob {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            running: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_started: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the job. A second claim while one is held fails with
    /// `JobAlreadyRunning`; the claim is released when the guard drops.
    pub fn try_start(&self) -> DefenseResult<JobGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| DefenseError::JobAlreadyRunning(self.name.clone()))?;

        self.runs.fetch_add(1, Ordering::Relaxed);
        *self.last_started.write() = Some(Utc::now());
        Ok(JobGuard { job: self })
    }

    /// Run `work` under the single-flight guard
    pub async fn run<T, Fut>(&self, work: Fut) -> DefenseResult<T>
    where
        Fut: Future<Output = DefenseResult<T>>,
    {
        let _guard = self.try_start()?;
        let result = work.await;
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            name: self.name.clone(),
            running: self.is_running(),
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_started: *self.last_started.read(),
        }
    }
}

pub struct JobGuard<'a> {
    job: &'a PeriodicJob,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.job.running.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// DRIVER
// ============================================================================

/// Call `tick` every `period` until the handle is aborted. Overlapping ticks
/// are rejected by the job guard inside `tick` and only logged.
pub fn spawn_periodic<F, Fut>(name: &str, period: Duration, tick: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DefenseResult<()>> + Send + 'static,
{
    let name = name.to_string();

    tokio::spawn(async move {
        log::info!("Starting periodic job '{}' every {:?}", name, period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            match tick().await {
                Ok(()) => log::debug!("Periodic job '{}' finished", name),
                Err(DefenseError::JobAlreadyRunning(_)) => {
                    log::warn!("Periodic job '{}' skipped: previous run still active", name)
                }
                Err(e) => log::error!("Periodic job '{}' failed: {}", name, e),
            }
        }
    })
}

// ============================================================================
// TESTS
// ============================================================================
