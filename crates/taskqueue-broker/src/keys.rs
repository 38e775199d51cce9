use taskqueue_core::TaskId;

pub fn task(id: TaskId) -> String {
    format!("task:{id}")
}

pub fn task_str(id: &str) -> String {
    format!("task:{id}")
}

pub fn pending(queue: &str) -> String {
    format!("queue:{queue}:pending")
}

pub fn processing(queue: &str) -> String {
    format!("queue:{queue}:processing")
}

pub fn completed(queue: &str) -> String {
    format!("queue:{queue}:completed")
}

pub fn failed(queue: &str) -> String {
    format!("queue:{queue}:failed")
}

pub fn dlq(queue: &str) -> String {
    format!("queue:{queue}:dlq:failed")
}

pub const PAUSED: &str = "queues:paused";

pub fn worker(worker_id: &str) -> String {
    format!("worker:{worker_id}")
}

pub const ACTIVE_WORKERS: &str = "workers:active";
