//! Worker state publication, active/stale enumeration, and orphan recovery.
//!
//! This generalizes `task-queue-broker`'s in-process `WorkerRegistry`
//! (a `parking_lot`-guarded `HashMap` local to one broker) into reads and
//! writes against the shared `Store`, so recovery is correct across
//! independent worker and broker processes that share nothing else.

use crate::error::Result;
use crate::keys;
use chrono::Duration as ChronoDuration;
use std::time::Duration;
use taskqueue_core::{Task, TaskStatus, WorkerState};
use taskqueue_store::Store;
use tracing::{info, warn};

pub async fn publish_worker_state<S: Store>(store: &S, state: &WorkerState) -> Result<()> {
    store
        .str_set(&keys::worker(&state.worker_id), &state.to_json()?)
        .await?;
    store.sadd(keys::ACTIVE_WORKERS, &state.worker_id).await?;
    Ok(())
}

pub async fn get_worker_state<S: Store>(store: &S, worker_id: &str) -> Result<Option<WorkerState>> {
    match store.str_get(&keys::worker(worker_id)).await? {
        Some(json) => Ok(Some(WorkerState::from_json(&json)?)),
        None => Ok(None),
    }
}

pub async fn get_all_workers<S: Store>(store: &S) -> Result<Vec<WorkerState>> {
    let ids = store.smembers(keys::ACTIVE_WORKERS).await?;
    let mut workers = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(state) = get_worker_state(store, &id).await? {
            workers.push(state);
        }
    }
    Ok(workers)
}

pub async fn get_active_workers<S: Store>(store: &S, timeout: Duration) -> Result<Vec<WorkerState>> {
    let timeout = ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::zero());
    Ok(get_all_workers(store)
        .await?
        .into_iter()
        .filter(|w| w.is_active(timeout))
        .collect())
}

pub async fn get_stale_workers<S: Store>(store: &S, timeout: Duration) -> Result<Vec<WorkerState>> {
    let timeout = ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::zero());
    Ok(get_all_workers(store)
        .await?
        .into_iter()
        .filter(|w| !w.is_active(timeout))
        .collect())
}

/// Remove stale `worker:{wid}` records and their `workers:active`
/// membership. Returns the removed worker ids.
pub async fn cleanup_stale_workers<S: Store>(store: &S, timeout: Duration) -> Result<Vec<String>> {
    let stale = get_stale_workers(store, timeout).await?;
    let mut removed = Vec::with_capacity(stale.len());
    for worker in stale {
        store.str_delete(&keys::worker(&worker.worker_id)).await?;
        store.srem(keys::ACTIVE_WORKERS, &worker.worker_id).await?;
        info!(worker_id = %worker.worker_id, "removed stale worker");
        removed.push(worker.worker_id);
    }
    Ok(removed)
}

/// For every stale worker with an in-flight task, rewrite that task back to
/// `pending` and reconcile `queue:{Q}:processing`/`queue:{Q}:pending`
/// membership. Returns the number of tasks recovered.
pub async fn recover_orphaned_tasks<S: Store>(
    store: &S,
    queue: &str,
    timeout: Duration,
) -> Result<usize> {
    let stale = get_stale_workers(store, timeout).await?;
    let mut recovered = 0;

    for worker in stale {
        let Some(task_id) = worker.current_task_id else {
            continue;
        };

        let Some(json) = store.str_get(&keys::task(task_id)).await? else {
            continue;
        };
        let mut task: Task = Task::from_json(&json)?;
        if task.status != TaskStatus::Processing {
            continue;
        }

        task.status = TaskStatus::Pending;
        task.started_at = None;
        store.str_set(&keys::task(task_id), &task.to_json()?).await?;

        let id_str = task_id.to_string();
        store.srem(&keys::processing(queue), &id_str).await?;
        store
            .zadd(&keys::pending(queue), &id_str, task.priority.score())
            .await?;

        warn!(task_id = %task_id, worker_id = %worker.worker_id, "recovered orphaned task");
        recovered += 1;
    }

    Ok(recovered)
}
