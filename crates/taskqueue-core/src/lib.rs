mod error;
mod priority;
mod queue_stats;
mod task;
mod time_format;
mod worker_state;

pub use error::{Result, TaskError};
pub use priority::Priority;
pub use queue_stats::QueueStats;
pub use task::{Task, TaskBuilder, TaskId, TaskPayload, TaskStatus};
pub use worker_state::{WorkerState, WorkerStatus};
