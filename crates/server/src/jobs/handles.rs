// crates/server/src/jobs/handles.rs
//! Per-key background task handles.
//!
//! One map per task kind (worker, reporter, broadcaster). Liveness is what
//! guards against duplicate launches from repeated begin triggers: a key
//! maps to at most one live task at a time. Entries for finished tasks are
//! pruned lazily on the next liveness check.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

#[derive(Default)]
pub struct HandleMap {
    inner: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl HandleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is there a live (unfinished) task registered for `key`?
    pub fn is_live(&self, key: &str) -> bool {
        match self.inner.lock() {
            Ok(mut map) => match map.get(key) {
                Some(handle) if handle.is_finished() => {
                    map.remove(key);
                    false
                }
                Some(_) => true,
                None => false,
            },
            Err(e) => {
                tracing::error!(error = %e, "Handle map lock poisoned");
                false
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(key);
        }
    }

    fn insert(&self, key: String, handle: JoinHandle<()>) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(key, handle);
        }
    }

    /// Spawn `fut` as a tracked task for `key`; the entry is released when
    /// the task finishes.
    pub fn spawn_tracked<F>(self: &Arc<Self>, key: &str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let map = Arc::clone(self);
        let task_key = key.to_string();
        let handle = tokio::spawn(async move {
            fut.await;
            map.remove(&task_key);
        });
        self.insert(key.to_string(), handle);
    }
}
