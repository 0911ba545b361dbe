// crates/server/src/jobs/registry.rs
//! Shared keyed store of job state; the only point of truth the engine
//! components read and write.
//!
//! Each job sits behind its own `Mutex`, so read-modify-write updates to
//! the same key are serialized while updates to different keys stay
//! independent. The outer map lock is held only long enough to clone the
//! per-job `Arc`. `std::sync` locks are deliberate: no lock is ever held
//! across an `.await` point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::job::{Job, JobSnapshot};

pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<Mutex<Job>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new job under `key`. Returns `false` (and leaves the
    /// existing entry untouched) if the key is already present.
    pub fn create(&self, key: &str, initial: Job) -> bool {
        match self.jobs.write() {
            Ok(mut jobs) => {
                if jobs.contains_key(key) {
                    return false;
                }
                jobs.insert(key.to_string(), Arc::new(Mutex::new(initial)));
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Registry lock poisoned on create");
                false
            }
        }
    }

    /// Number of jobs currently tracked, terminal ones included.
    pub fn job_count(&self) -> usize {
        match self.jobs.read() {
            Ok(jobs) => jobs.len(),
            Err(e) => {
                tracing::error!(error = %e, "Registry lock poisoned on count");
                0
            }
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        match self.jobs.read() {
            Ok(jobs) => jobs.contains_key(key),
            Err(e) => {
                tracing::error!(error = %e, "Registry lock poisoned on exists");
                false
            }
        }
    }

    fn entry(&self, key: &str) -> Option<Arc<Mutex<Job>>> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(key).cloned(),
            Err(e) => {
                tracing::error!(error = %e, "Registry lock poisoned on lookup");
                None
            }
        }
    }

    /// Copy of the current job state, or `None` for an absent key.
    pub fn get(&self, key: &str) -> Option<Job> {
        let entry = self.entry(key)?;
        let locked = entry.lock();
        match locked {
            Ok(job) => Some(job.clone()),
            Err(e) => {
                tracing::error!(job_key = %key, error = %e, "Job lock poisoned on get");
                None
            }
        }
    }

    /// Apply an atomic read-modify-write to the job under `key`.
    ///
    /// Silent no-op on an absent key (returns `false`); callers racing an
    /// eviction must not crash.
    pub fn update(&self, key: &str, mutator: impl FnOnce(&mut Job)) -> bool {
        let Some(entry) = self.entry(key) else {
            return false;
        };
        let locked = entry.lock();
        match locked {
            Ok(mut job) => {
                mutator(&mut job);
                true
            }
            Err(e) => {
                tracing::error!(job_key = %key, error = %e, "Job lock poisoned on update");
                false
            }
        }
    }

    /// Display snapshot with derived metrics recomputed, or `None` for an
    /// absent key.
    pub fn snapshot(&self, key: &str) -> Option<JobSnapshot> {
        let entry = self.entry(key)?;
        let locked = entry.lock();
        match locked {
            Ok(job) => Some(job.snapshot(key)),
            Err(e) => {
                tracing::error!(job_key = %key, error = %e, "Job lock poisoned on snapshot");
                None
            }
        }
    }

    /// Snapshots of every tracked job, for the listing endpoint.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let entries: Vec<(String, Arc<Mutex<Job>>)> = match self.jobs.read() {
            Ok(jobs) => jobs
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(v)))
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "Registry lock poisoned on snapshots");
                return Vec::new();
            }
        };
        entries
            .into_iter()
            .filter_map(|(key, entry)| entry.lock().ok().map(|job| job.snapshot(&key)))
            .collect()
    }

    /// Remove jobs that have been terminal for longer than `ttl`.
    /// Returns the evicted keys.
    pub fn evict_terminal(&self, ttl: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        match self.jobs.write() {
            Ok(mut jobs) => {
                jobs.retain(|key, entry| {
                    let keep = match entry.lock() {
                        Ok(job) => job
                            .terminal_at
                            .map(|t| t.elapsed() < ttl)
                            .unwrap_or(true),
                        // A poisoned job is unrecoverable; drop it.
                        Err(_) => false,
                    };
                    if !keep {
                        evicted.push(key.clone());
                    }
                    keep
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Registry lock poisoned on evict");
            }
        }
        evicted
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic eviction sweep; runs until the token is cancelled.
pub async fn run_eviction_sweep(
    registry: Arc<JobRegistry>,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = registry.evict_terminal(ttl);
                if !evicted.is_empty() {
                    tracing::info!(count = evicted.len(), keys = ?evicted, "Evicted terminal jobs");
                }
            }
        }
    }
}
