use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of a job queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Jobs accepted since the queue was created.
    pub submitted: u64,
    /// Jobs that finished, successfully or not.
    pub completed: u64,
    /// Finished jobs that returned an error or panicked.
    pub failed: u64,
    /// Jobs waiting for a worker.
    pub pending: usize,
    /// Jobs executing right now.
    pub running: usize,
    pub shut_down: bool,
    pub taken_at: DateTime<Utc>,
}

impl QueueStats {
    /// Jobs that finished without error.
    pub fn succeeded(&self) -> u64 {
        self.completed - self.failed
    }

    /// True when nothing is pending or running.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}
