use crate::{Priority, Result, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;

/// Unique identifier for a task.
pub type TaskId = Uuid;

/// Structured, free-form task payload/result (scalars, lists, nested maps).
pub type TaskPayload = Map<String, serde_json::Value>;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// A unit of work moving through the queue.
///
/// Invariants (see SPEC_FULL.md §3): `priority` in 1..=10; `retries <=
/// max_retries + 1`; `started_at` implies status is processing/completed/
/// failed; `completed_at` implies status is completed/failed; `result`
/// and `error` are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub payload: TaskPayload,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(with = "crate::time_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::time_format::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "crate::time_format::option")]
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskPayload>,
    pub error: Option<String>,
    pub retries: u32,
    pub max_retries: u32,
}

impl Task {
    /// Create a new pending task.
    pub fn new(name: impl Into<String>, payload: TaskPayload, priority: Priority) -> Self {
        Task {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
            status: TaskStatus::Pending,
            priority,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retries: 0,
            max_retries: 3,
        }
    }

    pub fn builder(name: impl Into<String>, payload: TaskPayload) -> TaskBuilder {
        TaskBuilder::new(name, payload)
    }

    /// Mark as claimed by a worker. Requires `Pending`.
    pub fn mark_processing(&mut self) -> Result<()> {
        self.require_status(TaskStatus::Pending)?;
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark as successfully completed. Requires `Processing`.
    pub fn mark_completed(&mut self, result: Option<TaskPayload>) -> Result<()> {
        self.require_status(TaskStatus::Processing)?;
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = result;
        self.error = None;
        Ok(())
    }

    /// Mark as failed. Requires `Processing`.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.require_status(TaskStatus::Processing)?;
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.result = None;
        Ok(())
    }

    /// Whether the task has retry budget remaining.
    pub fn can_retry(&self) -> bool {
        self.retries < self.max_retries
    }

    /// Prepare the task for another attempt: increments `retries`, resets
    /// to `Pending`, clears `started_at`/`completed_at`/`error`.
    pub fn prepare_retry(&mut self) -> Result<()> {
        if !self.can_retry() {
            return Err(TaskError::RetriesExhausted {
                retries: self.retries,
                max_retries: self.max_retries,
            });
        }
        self.retries += 1;
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error = None;
        Ok(())
    }

    /// Duration between start and completion, if both are recorded.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }

    /// Stable JSON wire form: ISO-8601 UTC millisecond timestamps, canonical
    /// hyphenated UUID.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(TaskError::from)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(TaskError::from)
    }

    fn require_status(&self, expected: TaskStatus) -> Result<()> {
        if self.status != expected {
            return Err(TaskError::InvalidState {
                expected: expected.as_str().to_string(),
                actual: self.status.as_str().to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for tasks with non-default retry/priority configuration.
pub struct TaskBuilder {
    name: String,
    payload: TaskPayload,
    priority: Priority,
    max_retries: u32,
}

impl TaskBuilder {
    pub fn new(name: impl Into<String>, payload: TaskPayload) -> Self {
        TaskBuilder {
            name: name.into(),
            payload,
            priority: Priority::default(),
            max_retries: 3,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn build(self) -> Task {
        let mut task = Task::new(self.name, self.payload, self.priority);
        task.max_retries = self.max_retries;
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TaskPayload {
        let mut m = Map::new();
        m.insert("v".to_string(), serde_json::json!(42));
        m
    }

    #[test]
    fn new_task_is_pending() {
        let task = Task::new("echo", payload(), Priority::default());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retries, 0);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut task = Task::new("echo", payload(), Priority::default());
        task.mark_processing().unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert!(task.started_at.is_some());

        task.mark_completed(Some(payload())).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert!(task.result.is_some());
        assert!(task.error.is_none());
        assert!(task.started_at.unwrap() <= task.completed_at.unwrap());
    }

    #[test]
    fn mark_processing_requires_pending() {
        let mut task = Task::new("echo", payload(), Priority::default());
        task.mark_processing().unwrap();
        assert!(task.mark_processing().is_err());
    }

    #[test]
    fn mark_completed_requires_processing() {
        let mut task = Task::new("echo", payload(), Priority::default());
        assert!(task.mark_completed(None).is_err());
    }

    #[test]
    fn prepare_retry_guard_is_idempotent_and_non_mutating() {
        let mut task = Task::new("echo", payload(), Priority::default());
        task.max_retries = 1;
        task.mark_processing().unwrap();
        task.mark_failed("boom").unwrap();

        task.prepare_retry().unwrap();
        assert_eq!(task.retries, 1);
        assert_eq!(task.status, TaskStatus::Pending);

        task.mark_processing().unwrap();
        task.mark_failed("boom again").unwrap();

        let before = task.clone();
        assert!(!task.can_retry());
        let err = task.prepare_retry();
        assert!(err.is_err());
        // no mutation on guard failure
        assert_eq!(task.retries, before.retries);
        assert_eq!(task.status, before.status);
    }

    #[test]
    fn result_and_error_are_mutually_exclusive() {
        let mut task = Task::new("echo", payload(), Priority::default());
        task.mark_processing().unwrap();
        task.mark_completed(Some(payload())).unwrap();
        assert!(task.result.is_some() && task.error.is_none());

        let mut task = Task::new("echo", payload(), Priority::default());
        task.mark_processing().unwrap();
        task.mark_failed("boom").unwrap();
        assert!(task.error.is_some() && task.result.is_none());
    }

    #[test]
    fn json_round_trip_is_structural() {
        let mut task = Task::new("echo", payload(), Priority::new(7).unwrap());
        task.mark_processing().unwrap();
        task.mark_completed(Some(payload())).unwrap();

        let json = task.to_json().unwrap();
        let back = Task::from_json(&json).unwrap();

        assert_eq!(task.id, back.id);
        assert_eq!(task.name, back.name);
        assert_eq!(task.status, back.status);
        assert_eq!(task.priority, back.priority);
        assert_eq!(task.result, back.result);
        assert_eq!(task.retries, back.retries);
        assert_eq!(task.max_retries, back.max_retries);
    }

    #[test]
    fn duration_requires_both_timestamps() {
        let mut task = Task::new("echo", payload(), Priority::default());
        assert!(task.duration().is_none());
        task.mark_processing().unwrap();
        assert!(task.duration().is_none());
        task.mark_completed(None).unwrap();
        assert!(task.duration().is_some());
    }

    #[test]
    fn builder_sets_priority_and_retry_budget() {
        let task = Task::builder("echo", payload())
            .priority(Priority::new(9).unwrap())
            .max_retries(5)
            .build();
        assert_eq!(task.priority.value(), 9);
        assert_eq!(task.max_retries, 5);
    }
}
