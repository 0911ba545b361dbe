// crates/server/src/jobs/supervisor.rs
//! Owns job lifecycles: submission, launch, cancellation.
//!
//! `begin` is idempotent. The handle maps are what make repeated launch
//! triggers safe: a key with a live worker or broadcaster never gets a
//! second one. Each launch mints a fresh cancellation token; the token is
//! dropped when its worker exits.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use takeoff_core::AnalyzerFactory;

use super::broadcaster::run_status_broadcaster;
use super::handles::HandleMap;
use super::job::Job;
use super::registry::JobRegistry;
use super::worker::{run_job_worker, WorkerEnv};
use crate::live::LiveChannel;

/// What `begin` did for the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Worker and broadcaster launched.
    Launched,
    /// A worker for this key is already live; nothing spawned.
    AlreadyRunning,
    /// The job already reached a terminal state; nothing spawned.
    AlreadyTerminal,
    /// No job under this key.
    Unknown,
}

pub struct JobSupervisor {
    registry: Arc<JobRegistry>,
    live: LiveChannel,
    factory: Arc<dyn AnalyzerFactory>,
    data_dir: PathBuf,
    workers: Arc<HandleMap>,
    reporters: Arc<HandleMap>,
    broadcasters: Arc<HandleMap>,
    cancels: Mutex<HashMap<String, CancellationToken>>,
    /// Serializes launch decisions; the liveness check and the spawn must
    /// not interleave with another begin for the same key.
    launch_lock: Mutex<()>,
}

impl JobSupervisor {
    pub fn new(
        registry: Arc<JobRegistry>,
        live: LiveChannel,
        factory: Arc<dyn AnalyzerFactory>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            live,
            factory,
            data_dir,
            workers: Arc::new(HandleMap::new()),
            reporters: Arc::new(HandleMap::new()),
            broadcasters: Arc::new(HandleMap::new()),
            cancels: Mutex::new(HashMap::new()),
            launch_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn live(&self) -> &LiveChannel {
        &self.live
    }

    /// Register a pending job for `key`. Returns `false` if the key is
    /// already tracked.
    pub fn submit(&self, key: &str) -> bool {
        let created = self.registry.create(key, Job::new());
        if created {
            tracing::info!(job_key = %key, "Job submitted");
        }
        created
    }

    /// Launch the worker and broadcaster for `key`, unless they are
    /// already live or the job is already done.
    pub fn begin(self: &Arc<Self>, key: &str) -> BeginOutcome {
        let _launching = match self.launch_lock.lock() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(error = %e, "Launch lock poisoned");
                return BeginOutcome::Unknown;
            }
        };

        let Some(job) = self.registry.get(key) else {
            return BeginOutcome::Unknown;
        };
        if job.status().is_terminal() {
            return BeginOutcome::AlreadyTerminal;
        }
        if self.workers.is_live(key) {
            tracing::debug!(job_key = %key, "Worker already live, begin is a no-op");
            return BeginOutcome::AlreadyRunning;
        }

        // Flip to running here, not in the worker task, so a status read
        // right after begin never reports pending.
        self.registry.update(key, |job| job.mark_running());

        let cancel = CancellationToken::new();
        self.store_cancel(key, cancel.clone());

        if !self.broadcasters.is_live(key) {
            self.broadcasters.spawn_tracked(
                key,
                run_status_broadcaster(
                    Arc::clone(&self.registry),
                    self.live.clone(),
                    key.to_string(),
                ),
            );
        }

        let env = WorkerEnv {
            registry: Arc::clone(&self.registry),
            factory: Arc::clone(&self.factory),
            data_dir: self.data_dir.clone(),
            reporters: Arc::clone(&self.reporters),
        };
        let supervisor = Arc::clone(self);
        let worker_key = key.to_string();
        self.workers.spawn_tracked(key, async move {
            run_job_worker(env, worker_key.clone(), cancel).await;
            supervisor.drop_cancel(&worker_key);
        });

        tracing::info!(job_key = %key, "Job launched");
        BeginOutcome::Launched
    }

    /// Trip the cancellation token for `key`. Returns `false` if no
    /// cancellable run exists.
    pub fn cancel(&self, key: &str) -> bool {
        let token = match self.cancels.lock() {
            Ok(map) => map.get(key).cloned(),
            Err(e) => {
                tracing::error!(error = %e, "Cancel map lock poisoned");
                None
            }
        };
        match token {
            Some(token) => {
                tracing::info!(job_key = %key, "Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn store_cancel(&self, key: &str, token: CancellationToken) {
        if let Ok(mut map) = self.cancels.lock() {
            map.insert(key.to_string(), token);
        }
    }

    fn drop_cancel(&self, key: &str) {
        if let Ok(mut map) = self.cancels.lock() {
            map.remove(key);
        }
    }
}
