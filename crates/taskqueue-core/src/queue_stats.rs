use serde::{Deserialize, Serialize};

/// Derived (never persisted) statistics for a single queue, computed from
/// set cardinalities by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub paused: bool,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}
