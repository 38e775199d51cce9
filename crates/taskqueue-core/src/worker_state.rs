use crate::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness/lifecycle snapshot for a single worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Starting,
    Idle,
    Busy,
    Stopping,
    Stopped,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Stopped => "stopped",
        }
    }
}

/// Published to the store under `worker:{worker_id}` so dashboards and
/// recovery routines can observe a worker without talking to it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub current_task_id: Option<TaskId>,
    pub current_task_name: Option<String>,
    #[serde(with = "crate::time_format")]
    pub last_heartbeat: DateTime<Utc>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    #[serde(with = "crate::time_format")]
    pub started_at: DateTime<Utc>,
    pub queues: Vec<String>,
}

impl WorkerState {
    pub fn new(worker_id: impl Into<String>, queues: Vec<String>) -> Self {
        let now = Utc::now();
        WorkerState {
            worker_id: worker_id.into(),
            status: WorkerStatus::Starting,
            current_task_id: None,
            current_task_name: None,
            last_heartbeat: now,
            tasks_completed: 0,
            tasks_failed: 0,
            started_at: now,
            queues,
        }
    }

    /// A worker is active iff its last heartbeat is within `timeout` of now.
    pub fn is_active(&self, timeout: chrono::Duration) -> bool {
        Utc::now() - self.last_heartbeat < timeout
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(crate::TaskError::from)
    }

    pub fn from_json(s: &str) -> crate::Result<Self> {
        serde_json::from_str(s).map_err(crate::TaskError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_heartbeat_is_active() {
        let state = WorkerState::new("w1", vec!["default".to_string()]);
        assert!(state.is_active(chrono::Duration::seconds(30)));
    }

    #[test]
    fn stale_heartbeat_is_inactive() {
        let mut state = WorkerState::new("w1", vec!["default".to_string()]);
        state.last_heartbeat = Utc::now() - chrono::Duration::seconds(90);
        assert!(!state.is_active(chrono::Duration::seconds(30)));
    }

    #[test]
    fn json_round_trip() {
        let state = WorkerState::new("w1", vec!["default".to_string(), "low".to_string()]);
        let json = state.to_json().unwrap();
        let back = WorkerState::from_json(&json).unwrap();
        assert_eq!(state.worker_id, back.worker_id);
        assert_eq!(state.queues, back.queues);
        assert_eq!(state.status, back.status);
    }
}
