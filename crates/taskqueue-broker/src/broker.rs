use crate::error::Result;
use crate::keys;
use crate::metrics::BrokerMetrics;
use crate::worker_registry;
use std::sync::Arc;
use std::time::Duration;
use taskqueue_core::{Priority, QueueStats, Task, TaskId, TaskStatus, WorkerState};
use taskqueue_store::Store;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The only component that touches the shared store. Generic over `Store`
/// so the concrete backend (Redis, or the in-memory test double) is a
/// runtime choice rather than a hard-wired dependency, the way
/// `task-queue-broker::Broker` was hard-wired to `task-queue-persistence`.
pub struct Broker<S: Store> {
    store: Arc<S>,
    metrics: Arc<BrokerMetrics>,
}

impl<S: Store> Clone for Broker<S> {
    fn clone(&self) -> Self {
        Broker {
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: Store> Broker<S> {
    pub fn new(store: Arc<S>, metrics: Arc<BrokerMetrics>) -> Self {
        Broker { store, metrics }
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        self.metrics.clone()
    }

    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    /// Persist the task record and insert its id into `queue:{Q}:pending`
    /// with score `-priority`. `priority_override`, if given, replaces the
    /// task's own priority before persisting (spec.md §4.2's `enqueue`
    /// `priority? override` input).
    pub async fn enqueue(&self, mut task: Task, queue: &str, priority_override: Option<Priority>) -> Result<Task> {
        if let Some(priority) = priority_override {
            task.priority = priority;
        }
        let id_str = task.id.to_string();
        self.store.str_set(&keys::task(task.id), &task.to_json()?).await?;
        self.store
            .zadd(&keys::pending(queue), &id_str, task.priority.score())
            .await?;

        self.metrics.inc_tasks_total("pending", queue);
        self.metrics.tasks_pending.inc();
        self.refresh_queue_depth_metric(queue).await;
        info!(task_id = %task.id, queue, priority = task.priority.value(), "enqueued task");
        Ok(task)
    }

    /// Blocking pop of the highest-priority pending task, or `None` on
    /// timeout. Mutates the popped task to `processing` and reconciles
    /// `queue:{Q}:pending -> queue:{Q}:processing` membership.
    pub async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<Task>> {
        let Some((id_str, _score)) = self.store.bzpopmin(&keys::pending(queue), timeout).await?
        else {
            return Ok(None);
        };

        let Ok(id) = Uuid::parse_str(&id_str) else {
            warn!(raw_id = %id_str, queue, "popped malformed task id, dropping");
            return Ok(None);
        };

        let Some(json) = self.store.str_get(&keys::task(id)).await? else {
            warn!(task_id = %id, queue, "task record missing after pop, treating as dropped");
            return Ok(None);
        };

        let mut task = Task::from_json(&json)?;
        task.mark_processing()?;
        self.store.str_set(&keys::task(id), &task.to_json()?).await?;
        self.store.sadd(&keys::processing(queue), &id_str).await?;

        self.metrics.tasks_pending.dec();
        self.metrics.tasks_in_progress.inc();
        self.refresh_queue_depth_metric(queue).await;
        debug!(task_id = %id, queue, "dequeued task");
        Ok(Some(task))
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        match self.store.str_get(&keys::task(id)).await? {
            Some(json) => Ok(Some(Task::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// Persist `task` and reconcile set membership to match its new
    /// status. Called from `processing` for every terminal/retry
    /// transition (see SPEC_FULL.md §4.2).
    pub async fn update_task(&self, task: &Task, queue: &str) -> Result<()> {
        let id_str = task.id.to_string();
        self.store.str_set(&keys::task(task.id), &task.to_json()?).await?;

        match task.status {
            TaskStatus::Completed => {
                self.store
                    .smove(&keys::processing(queue), &keys::completed(queue), &id_str)
                    .await?;
                self.metrics.inc_tasks_total("completed", queue);
                self.metrics.tasks_in_progress.dec();
                if let Some(duration) = task.duration() {
                    let secs = duration.num_milliseconds() as f64 / 1000.0;
                    self.metrics.observe_processing_duration(queue, secs);
                }
            }
            TaskStatus::Failed => {
                self.store
                    .smove(&keys::processing(queue), &keys::failed(queue), &id_str)
                    .await?;
                self.metrics.inc_tasks_total("failed", queue);
                self.metrics.tasks_in_progress.dec();
            }
            TaskStatus::Pending => {
                self.store.srem(&keys::processing(queue), &id_str).await?;
                self.store
                    .zadd(&keys::pending(queue), &id_str, task.priority.score())
                    .await?;
                self.metrics.tasks_in_progress.dec();
                self.metrics.tasks_pending.inc();
            }
            TaskStatus::Processing => {}
        }

        self.refresh_queue_depth_metric(queue).await;
        Ok(())
    }

    /// If `task` can still retry, prepares the retry and calls
    /// `update_task` (which re-enqueues it). Returns `None` if the retry
    /// budget is exhausted.
    pub async fn retry_task(&self, mut task: Task, queue: &str) -> Result<Option<Task>> {
        if !task.can_retry() {
            return Ok(None);
        }
        task.prepare_retry()?;
        self.update_task(&task, queue).await?;
        Ok(Some(task))
    }

    /// Move a task out of a queue's `failed` set, prepare a retry, and
    /// re-enqueue it into `pending` (observer-facing `retry_failed`,
    /// distinct from `retry_task`'s processing-set origin).
    pub async fn retry_failed_task(&self, id: TaskId, queue: &str) -> Result<Option<Task>> {
        let Some(mut task) = self.get_task(id).await? else {
            return Ok(None);
        };
        if !task.can_retry() {
            return Ok(None);
        }
        task.prepare_retry()?;

        let id_str = id.to_string();
        self.store.str_set(&keys::task(id), &task.to_json()?).await?;
        self.store.srem(&keys::failed(queue), &id_str).await?;
        self.store
            .zadd(&keys::pending(queue), &id_str, task.priority.score())
            .await?;

        info!(task_id = %id, queue, "retried failed task");
        Ok(Some(task))
    }

    /// Remove `id` from `queue:{Q}:pending` iff its recorded status is
    /// still `pending`.
    pub async fn cancel_pending(&self, id: TaskId, queue: &str) -> Result<bool> {
        let Some(task) = self.get_task(id).await? else {
            return Ok(false);
        };
        if task.status != TaskStatus::Pending {
            return Ok(false);
        }
        self.store.zrem(&keys::pending(queue), &id.to_string()).await?;
        info!(task_id = %id, queue, "cancelled pending task");
        Ok(true)
    }

    /// Move a task to the DLQ: copy its id into `queue:{Q}:dlq:failed`
    /// (kept alongside the ordinary `failed` set per SPEC_FULL.md §9's
    /// dual-membership note).
    pub async fn dead_letter(&self, id: TaskId, queue: &str) -> Result<()> {
        self.store.sadd(&keys::dlq(queue), &id.to_string()).await?;
        warn!(task_id = %id, queue, "moved task to dead-letter queue");
        Ok(())
    }

    pub async fn get_queue_stats(&self, queue: &str) -> Result<QueueStats> {
        let pending = self.store.zcard(&keys::pending(queue)).await?;
        let processing = self.store.scard(&keys::processing(queue)).await?;
        let completed = self.store.scard(&keys::completed(queue)).await?;
        let failed = self.store.scard(&keys::failed(queue)).await?;
        let paused = self.store.sismember(keys::PAUSED, queue).await?;

        Ok(QueueStats {
            queue_name: queue.to_string(),
            pending,
            processing,
            completed,
            failed,
            paused,
        })
    }

    /// Ordered slice (highest priority first) of pending tasks, up to
    /// `limit`.
    pub async fn get_pending_tasks(&self, queue: &str, limit: usize) -> Result<Vec<Task>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids = self
            .store
            .zrange(&keys::pending(queue), 0, limit as isize - 1)
            .await?;

        let mut tasks = Vec::with_capacity(ids.len());
        for id_str in ids {
            if let Ok(id) = Uuid::parse_str(&id_str) {
                if let Some(task) = self.get_task(id).await? {
                    tasks.push(task);
                }
            }
        }
        Ok(tasks)
    }

    /// Delete every id (and backing `task:{id}` record) in the pending,
    /// processing, and failed sets of `queue`, plus the sets themselves.
    /// Completed tasks are only cleared when `include_completed` is set.
    pub async fn clear_queue(&self, queue: &str, include_completed: bool) -> Result<()> {
        let pending_ids = self.store.zrange(&keys::pending(queue), 0, -1).await?;
        for id in &pending_ids {
            self.store.str_delete(&keys::task_str(id)).await?;
        }
        self.store.str_delete(&keys::pending(queue)).await?;

        for set_key in [keys::processing(queue), keys::failed(queue)] {
            for id in self.store.smembers(&set_key).await? {
                self.store.str_delete(&keys::task_str(&id)).await?;
            }
            self.store.str_delete(&set_key).await?;
        }

        if include_completed {
            let completed_key = keys::completed(queue);
            for id in self.store.smembers(&completed_key).await? {
                self.store.str_delete(&keys::task_str(&id)).await?;
            }
            self.store.str_delete(&completed_key).await?;
        }

        info!(queue, include_completed, "cleared queue");
        Ok(())
    }

    /// Queue names discovered via their `pending` sorted sets.
    pub async fn list_queues(&self) -> Result<Vec<String>> {
        let keys = self.store.scan("queue:*:pending").await?;
        let mut names: Vec<String> = keys
            .into_iter()
            .filter_map(|k| {
                k.strip_prefix("queue:")
                    .and_then(|rest| rest.strip_suffix(":pending"))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub async fn pause(&self, queue: &str) -> Result<()> {
        self.store.sadd(keys::PAUSED, queue).await?;
        info!(queue, "paused queue");
        Ok(())
    }

    pub async fn resume(&self, queue: &str) -> Result<()> {
        self.store.srem(keys::PAUSED, queue).await?;
        info!(queue, "resumed queue");
        Ok(())
    }

    pub async fn is_paused(&self, queue: &str) -> Result<bool> {
        Ok(self.store.sismember(keys::PAUSED, queue).await?)
    }

    /// Delete every `task:{id}` referenced by `queue:{Q}:dlq:failed`, then
    /// the set itself.
    pub async fn clear_dead_letter(&self, queue: &str) -> Result<()> {
        let dlq_key = keys::dlq(queue);
        for id in self.store.smembers(&dlq_key).await? {
            self.store.str_delete(&keys::task_str(&id)).await?;
        }
        self.store.str_delete(&dlq_key).await?;
        info!(queue, "cleared dead-letter queue");
        Ok(())
    }

    pub async fn publish_worker_state(&self, state: &WorkerState) -> Result<()> {
        worker_registry::publish_worker_state(self.store.as_ref(), state).await
    }

    pub async fn get_worker_state(&self, worker_id: &str) -> Result<Option<WorkerState>> {
        worker_registry::get_worker_state(self.store.as_ref(), worker_id).await
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerState>> {
        worker_registry::get_all_workers(self.store.as_ref()).await
    }

    pub async fn get_active_workers(&self, timeout: Duration) -> Result<Vec<WorkerState>> {
        worker_registry::get_active_workers(self.store.as_ref(), timeout).await
    }

    pub async fn get_stale_workers(&self, timeout: Duration) -> Result<Vec<WorkerState>> {
        worker_registry::get_stale_workers(self.store.as_ref(), timeout).await
    }

    pub async fn cleanup_stale_workers(&self, timeout: Duration) -> Result<Vec<String>> {
        let removed = worker_registry::cleanup_stale_workers(self.store.as_ref(), timeout).await?;
        self.metrics.workers_connected.sub(removed.len() as i64);
        Ok(removed)
    }

    pub async fn recover_orphaned_tasks(&self, queue: &str, timeout: Duration) -> Result<usize> {
        let recovered = worker_registry::recover_orphaned_tasks(self.store.as_ref(), queue, timeout).await?;
        self.refresh_queue_depth_metric(queue).await;
        Ok(recovered)
    }

    /// Refresh the workers-connected gauge from the active-worker set.
    /// Intended to be called periodically by whatever process runs
    /// maintenance (e.g. the same loop that calls `recover_orphaned_tasks`).
    pub async fn refresh_workers_connected_metric(&self, active_timeout: Duration) -> Result<()> {
        let active = self.get_active_workers(active_timeout).await?;
        self.metrics.workers_connected.set(active.len() as i64);
        Ok(())
    }

    async fn refresh_queue_depth_metric(&self, queue: &str) {
        if let Ok(depth) = self.store.zcard(&keys::pending(queue)).await {
            self.metrics.set_queue_depth(queue, depth as i64);
        }
    }
}

impl Broker<taskqueue_store::RedisStore> {
    /// Connect to Redis and build a broker with a fresh metrics registry.
    /// Translates `original_source/src/queue/broker.py`'s `RedisBroker`
    /// async context manager (`connect`/`__aenter__`) into a plain
    /// constructor — there's no `disconnect` counterpart since the
    /// underlying `redis::aio::ConnectionManager` reconnects on its own.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let store = Arc::new(taskqueue_store::RedisStore::connect(redis_url).await?);
        let metrics = Arc::new(BrokerMetrics::new().map_err(|_| crate::error::BrokerError::MetricsInit)?);
        Ok(Broker::new(store, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use taskqueue_core::Priority;
    use taskqueue_store::InMemoryStore;

    fn broker() -> Broker<InMemoryStore> {
        Broker::new(Arc::new(InMemoryStore::new()), Arc::new(BrokerMetrics::new().unwrap()))
    }

    fn task(name: &str, priority: u8) -> Task {
        Task::new(name, Map::new(), Priority::new(priority as i32).unwrap())
    }

    // S1
    #[tokio::test]
    async fn dequeue_returns_highest_priority_first() {
        let broker = broker();
        let t1 = broker.enqueue(task("t1", 1), "default", None).await.unwrap();
        let t2 = broker.enqueue(task("t2", 10), "default", None).await.unwrap();
        let t3 = broker.enqueue(task("t3", 5), "default", None).await.unwrap();

        let first = broker.dequeue("default", Duration::from_millis(50)).await.unwrap().unwrap();
        let second = broker.dequeue("default", Duration::from_millis(50)).await.unwrap().unwrap();
        let third = broker.dequeue("default", Duration::from_millis(50)).await.unwrap().unwrap();

        assert_eq!(first.id, t2.id);
        assert_eq!(second.id, t3.id);
        assert_eq!(third.id, t1.id);
    }

    // S2
    #[tokio::test]
    async fn success_path_completes_task() {
        let broker = broker();
        let t = broker.enqueue(task("echo", 5), "default", None).await.unwrap();

        let mut dequeued = broker.dequeue("default", Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(dequeued.id, t.id);
        assert_eq!(dequeued.status, TaskStatus::Processing);

        let mut result = Map::new();
        result.insert("v".to_string(), json!(42));
        dequeued.mark_completed(Some(result.clone())).unwrap();
        broker.update_task(&dequeued, "default").await.unwrap();

        let stored = broker.get_task(t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.result, Some(result));

        let stats = broker.get_queue_stats("default").await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.processing, 0);
    }

    // S3
    #[tokio::test]
    async fn retry_then_succeed() {
        let broker = broker();
        let mut t = Task::builder("flaky", Map::new())
            .priority(Priority::default())
            .max_retries(2)
            .build();
        t.id = Uuid::new_v4();
        let t = broker.enqueue(t, "default", None).await.unwrap();

        let mut dequeued = broker.dequeue("default", Duration::from_millis(50)).await.unwrap().unwrap();
        dequeued.mark_failed("boom").unwrap();
        let retried = broker.retry_task(dequeued, "default").await.unwrap().unwrap();
        assert_eq!(retried.status, TaskStatus::Pending);
        assert_eq!(retried.retries, 1);

        let mut dequeued_again = broker.dequeue("default", Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(dequeued_again.id, t.id);
        let mut ok = Map::new();
        ok.insert("ok".to_string(), json!(true));
        dequeued_again.mark_completed(Some(ok.clone())).unwrap();
        broker.update_task(&dequeued_again, "default").await.unwrap();

        let stored = broker.get_task(t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.retries, 1);
        assert_eq!(stored.result, Some(ok));
    }

    // S4
    #[tokio::test]
    async fn exhausted_retries_land_in_dead_letter_queue() {
        let broker = broker();
        let mut t = Task::builder("always-fails", Map::new()).max_retries(0).build();
        t.id = Uuid::new_v4();
        let t = broker.enqueue(t, "default", None).await.unwrap();

        let mut dequeued = broker.dequeue("default", Duration::from_millis(50)).await.unwrap().unwrap();
        dequeued.mark_failed("boom").unwrap();
        assert!(broker.retry_task(dequeued.clone(), "default").await.unwrap().is_none());

        broker.update_task(&dequeued, "default").await.unwrap();
        broker.dead_letter(t.id, "default").await.unwrap();

        let stored = broker.get_task(t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(broker.store.sismember("queue:default:dlq:failed", &t.id.to_string()).await.unwrap());
        assert!(broker.store.sismember("queue:default:failed", &t.id.to_string()).await.unwrap());
    }

    // S5
    #[tokio::test]
    async fn orphan_recovery_requeues_stale_workers_task() {
        let broker = broker();
        let t = broker.enqueue(task("long-job", 5), "default", None).await.unwrap();
        let dequeued = broker.dequeue("default", Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(dequeued.id, t.id);

        let mut state = WorkerState::new("w1".to_string(), vec!["default".to_string()]);
        state.status = taskqueue_core::WorkerStatus::Busy;
        state.current_task_id = Some(t.id);
        state.last_heartbeat = chrono::Utc::now() - chrono::Duration::seconds(120);
        broker.publish_worker_state(&state).await.unwrap();

        let recovered = broker.recover_orphaned_tasks("default", Duration::from_secs(60)).await.unwrap();
        assert_eq!(recovered, 1);

        let stored = broker.get_task(t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
        assert!(stored.started_at.is_none());
        assert!(broker.store.zcard("queue:default:pending").await.unwrap() == 1);
        assert!(!broker.store.sismember("queue:default:processing", &t.id.to_string()).await.unwrap());
    }

    // S6
    #[tokio::test]
    async fn paused_queue_is_flagged_for_pollers() {
        let broker = broker();
        broker.enqueue(task("t1", 5), "default", None).await.unwrap();
        broker.pause("default").await.unwrap();

        assert!(broker.is_paused("default").await.unwrap());
        let stats = broker.get_queue_stats("default").await.unwrap();
        assert!(stats.paused);
        assert_eq!(stats.pending, 1);

        broker.resume("default").await.unwrap();
        assert!(!broker.is_paused("default").await.unwrap());
    }

    #[tokio::test]
    async fn cancel_pending_requires_pending_status() {
        let broker = broker();
        let t = broker.enqueue(task("t1", 5), "default", None).await.unwrap();
        assert!(broker.cancel_pending(t.id, "default").await.unwrap());
        assert_eq!(broker.store.zcard("queue:default:pending").await.unwrap(), 0);

        let t2 = broker.enqueue(task("t2", 5), "default", None).await.unwrap();
        broker.dequeue("default", Duration::from_millis(50)).await.unwrap();
        assert!(!broker.cancel_pending(t2.id, "default").await.unwrap());
    }

    #[tokio::test]
    async fn clear_queue_removes_pending_and_processing_records() {
        let broker = broker();
        broker.enqueue(task("t1", 5), "default", None).await.unwrap();
        let t2 = broker.enqueue(task("t2", 5), "default", None).await.unwrap();
        broker.dequeue("default", Duration::from_millis(50)).await.unwrap();

        broker.clear_queue("default", false).await.unwrap();
        assert_eq!(broker.store.zcard("queue:default:pending").await.unwrap(), 0);
        assert_eq!(broker.store.scard("queue:default:processing").await.unwrap(), 0);
        assert!(broker.get_task(t2.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_queues_discovers_by_pending_set() {
        let broker = broker();
        broker.enqueue(task("t1", 5), "alpha", None).await.unwrap();
        broker.enqueue(task("t2", 5), "beta", None).await.unwrap();

        let mut queues = broker.list_queues().await.unwrap();
        queues.sort();
        assert_eq!(queues, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[tokio::test]
    async fn enqueue_priority_override_replaces_tasks_own_priority() {
        let broker = broker();
        let t = broker
            .enqueue(task("t1", 1), "default", Some(Priority::new(9).unwrap()))
            .await
            .unwrap();
        assert_eq!(t.priority.value(), 9);

        let stored = broker.get_task(t.id).await.unwrap().unwrap();
        assert_eq!(stored.priority.value(), 9);
    }
}
