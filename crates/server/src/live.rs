// crates/server/src/live.rs
//! Fan-out of job status frames to connected stream subscribers.
//!
//! A single broadcast channel carries snapshots for all jobs; each SSE
//! connection subscribes and filters for the key it cares about. Lagging
//! subscribers lose old frames rather than slowing the engine down.

use tokio::sync::broadcast;

use crate::jobs::JobSnapshot;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct LiveChannel {
    tx: broadcast::Sender<JobSnapshot>,
}

impl LiveChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobSnapshot> {
        self.tx.subscribe()
    }

    /// Push a frame to whoever is listening. No subscribers is normal.
    pub fn push(&self, snapshot: JobSnapshot) {
        let _ = self.tx.send(snapshot);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LiveChannel {
    fn default() -> Self {
        Self::new()
    }
}
