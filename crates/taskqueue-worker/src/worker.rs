use crate::config::WorkerConfig;
use crate::handler::HandlerRegistry;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskqueue_broker::Broker;
use taskqueue_core::{Task, WorkerState, WorkerStatus};
use taskqueue_store::Store;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const HEARTBEAT_RETRY_DELAY: Duration = Duration::from_secs(1);
const POLL_IDLE_DELAY: Duration = Duration::from_millis(100);
const DEQUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(1);
const BASE_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 300;

/// Computes `min(BASE * 2^retries, MAX_DELAY)` per spec.md's Glossary
/// entry for Backoff. Reported for observability; this implementation
/// re-enqueues immediately (Open Question (a), see DESIGN.md).
fn backoff_delay(retries: u32) -> Duration {
    let scaled = BASE_RETRY_DELAY_SECS.saturating_mul(1u64 << retries.min(20));
    Duration::from_secs(scaled.min(MAX_RETRY_DELAY_SECS))
}

/// Owns a handler registry, a list of queues in polling priority, a
/// concurrency N, and a shutdown signal. Mirrors
/// `task-queue-worker::Worker`'s shape, generalized to talk to the shared
/// `Store` through a `Broker` instead of a TCP connection to a broker
/// process.
pub struct WorkerRuntime<S: Store> {
    broker: Arc<Broker<S>>,
    config: WorkerConfig,
    worker_id: String,
    registry: Arc<HandlerRegistry>,
    state: Arc<RwLock<WorkerState>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl<S: Store + 'static> WorkerRuntime<S> {
    pub fn new(broker: Arc<Broker<S>>, config: WorkerConfig, registry: HandlerRegistry) -> Self {
        let worker_id = config.resolved_worker_id();
        let state = WorkerState::new(worker_id.clone(), config.queues.clone());

        WorkerRuntime {
            broker,
            config,
            worker_id,
            registry: Arc::new(registry),
            state: Arc::new(RwLock::new(state)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Flip `running = false`, mark the worker `stopping`, and wake every
    /// loop waiting on the shutdown latch.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Spawn N processing loops and one heartbeat loop; return only after
    /// every loop has exited. Processing loops finish their current task
    /// before observing shutdown.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(worker_id = %self.worker_id, concurrency = self.config.concurrency, queues = ?self.config.queues, "starting worker");

        self.set_status(WorkerStatus::Idle);
        self.broker.publish_worker_state(&self.snapshot()).await?;
        self.running.store(true, Ordering::SeqCst);

        let mut handles = Vec::with_capacity(self.config.concurrency);
        for loop_id in 0..self.config.concurrency {
            let runtime = self.clone_inner();
            handles.push(tokio::spawn(async move { runtime.processing_loop(loop_id).await }));
        }

        let heartbeat_runtime = self.clone_inner();
        let heartbeat_handle = tokio::spawn(async move { heartbeat_runtime.heartbeat_loop().await });

        self.shutdown.notified().await;
        info!(worker_id = %self.worker_id, "shutdown requested, draining processing loops");
        self.running.store(false, Ordering::SeqCst);
        self.set_status(WorkerStatus::Stopping);
        let _ = self.broker.publish_worker_state(&self.snapshot()).await;

        for handle in handles {
            let _ = handle.await;
        }
        heartbeat_handle.abort();

        self.set_status(WorkerStatus::Stopped);
        let _ = self.broker.publish_worker_state(&self.snapshot()).await;
        info!(worker_id = %self.worker_id, "worker stopped");
        Ok(())
    }

    fn clone_inner(&self) -> Self {
        WorkerRuntime {
            broker: self.broker.clone(),
            config: self.config.clone(),
            worker_id: self.worker_id.clone(),
            registry: self.registry.clone(),
            state: self.state.clone(),
            running: self.running.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    fn snapshot(&self) -> WorkerState {
        self.state.read().clone()
    }

    fn set_status(&self, status: WorkerStatus) {
        self.state.write().status = status;
    }

    async fn processing_loop(&self, loop_id: usize) {
        debug!(worker_id = %self.worker_id, loop_id, "processing loop started");

        while self.running.load(Ordering::SeqCst) {
            let mut dispatched = false;

            for queue in &self.config.queues {
                match self.broker.is_paused(queue).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(worker_id = %self.worker_id, queue, error = %e, "pause check failed");
                        continue;
                    }
                }

                match self.broker.dequeue(queue, DEQUEUE_POLL_TIMEOUT).await {
                    Ok(Some(task)) => {
                        self.dispatch(task, queue).await;
                        dispatched = true;
                        break;
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(worker_id = %self.worker_id, queue, error = %e, "dequeue failed, pausing briefly");
                        tokio::time::sleep(POLL_IDLE_DELAY).await;
                    }
                }
            }

            if !dispatched {
                tokio::time::sleep(POLL_IDLE_DELAY).await;
            }
        }

        debug!(worker_id = %self.worker_id, loop_id, "processing loop exited");
    }

    async fn dispatch(&self, mut task: Task, queue: &str) {
        {
            let mut state = self.state.write();
            state.status = WorkerStatus::Busy;
            state.current_task_id = Some(task.id);
            state.current_task_name = Some(task.name.clone());
        }

        let outcome = match self.registry.get(&task.name) {
            None => Err(format!("no handler registered for task '{}'", task.name)),
            Some(handler) => {
                match timeout(self.config.task_timeout(), handler.execute(task.payload.clone())).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(format!(
                        "timed out after {}s",
                        self.config.task_timeout().as_secs()
                    )),
                }
            }
        };

        match outcome {
            Ok(result) => {
                if let Err(e) = task.mark_completed(Some(result)) {
                    error!(task_id = %task.id, error = %e, "illegal state transition on completion");
                    return;
                }
                if let Err(e) = self.broker.update_task(&task, queue).await {
                    error!(task_id = %task.id, error = %e, "failed to persist completed task");
                }
                info!(task_id = %task.id, queue, "task completed");
                self.state.write().tasks_completed += 1;
            }
            Err(err) => {
                if let Err(e) = task.mark_failed(err) {
                    error!(task_id = %task.id, error = %e, "illegal state transition on failure");
                    return;
                }
                self.fail(task, queue).await;
                self.state.write().tasks_failed += 1;
            }
        }

        let mut state = self.state.write();
        state.status = WorkerStatus::Idle;
        state.current_task_id = None;
        state.current_task_name = None;
    }

    /// Retry-or-DLQ path: computes backoff for observability, then asks
    /// the broker to retry (re-enqueue) or, if the retry budget is
    /// exhausted, persists the failure and copies the id into the DLQ.
    async fn fail(&self, task: Task, queue: &str) {
        let delay = backoff_delay(task.retries);
        debug!(task_id = %task.id, retries = task.retries, backoff_secs = delay.as_secs(), "computed retry backoff");

        match self.broker.retry_task(task.clone(), queue).await {
            Ok(Some(_)) => {
                info!(task_id = %task.id, queue, "task failed, scheduled for retry");
            }
            Ok(None) => {
                if let Err(e) = self.broker.update_task(&task, queue).await {
                    error!(task_id = %task.id, error = %e, "failed to persist exhausted task");
                    return;
                }
                if let Err(e) = self.broker.dead_letter(task.id, queue).await {
                    error!(task_id = %task.id, error = %e, "failed to dead-letter task");
                }
                warn!(task_id = %task.id, queue, "retries exhausted, moved to dead-letter queue");
            }
            Err(e) => error!(task_id = %task.id, error = %e, "retry_task failed"),
        }
    }

    async fn heartbeat_loop(&self) {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.state.write().last_heartbeat = chrono::Utc::now();
                    let snapshot = self.snapshot();
                    if let Err(e) = self.broker.publish_worker_state(&snapshot).await {
                        warn!(worker_id = %self.worker_id, error = %e, "heartbeat failed, retrying in 1s");
                        tokio::time::sleep(HEARTBEAT_RETRY_DELAY).await;
                    }
                }
                _ = self.shutdown.notified() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EchoHandler;
    use serde_json::{json, Map};
    use std::time::Duration as StdDuration;
    use taskqueue_broker::BrokerMetrics;
    use taskqueue_core::Priority;
    use taskqueue_store::InMemoryStore;

    fn test_broker() -> Arc<Broker<InMemoryStore>> {
        Arc::new(Broker::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(BrokerMetrics::new().unwrap()),
        ))
    }

    fn test_config() -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.worker_id = Some("test-worker".to_string());
        config.concurrency = 1;
        config.task_timeout_secs = 1;
        config
    }

    #[tokio::test]
    async fn runs_until_shutdown_and_processes_a_task() {
        let broker = test_broker();
        let registry = HandlerRegistry::new();
        registry.register("echo", EchoHandler);

        let mut payload = Map::new();
        payload.insert("v".to_string(), json!(42));
        let task = Task::new("echo", payload.clone(), Priority::default());
        let task_id = task.id;
        broker.enqueue(task, "default", None).await.unwrap();

        let runtime = Arc::new(WorkerRuntime::new(broker.clone(), test_config(), registry));
        let run_handle = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.run().await })
        };

        let mut completed = false;
        for _ in 0..50 {
            tokio::time::sleep(StdDuration::from_millis(20)).await;
            if let Ok(Some(t)) = broker.get_task(task_id).await {
                if t.status == taskqueue_core::TaskStatus::Completed {
                    completed = true;
                    assert_eq!(t.result, Some(payload.clone()));
                    break;
                }
            }
        }
        assert!(completed, "task did not complete in time");

        runtime.shutdown();
        run_handle.await.unwrap().unwrap();
    }

    #[test]
    fn backoff_grows_exponentially_and_saturates() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(10), Duration::from_secs(300));
        assert_eq!(backoff_delay(40), Duration::from_secs(300));
    }
}
