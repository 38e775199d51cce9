use prometheus::{CounterVec, HistogramOpts, HistogramVec, IntGauge, IntGaugeVec, Opts, Registry};

/// Prometheus metrics for the broker, minus the teacher's Raft gauges
/// (Raft is out of scope here).
pub struct BrokerMetrics {
    pub registry: Registry,
    pub tasks_total: CounterVec,
    pub tasks_pending: IntGauge,
    pub tasks_in_progress: IntGauge,
    pub task_processing_duration: HistogramVec,
    pub workers_connected: IntGauge,
    pub queue_depth: IntGaugeVec,
}

impl BrokerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let tasks_total = CounterVec::new(
            Opts::new("tq_tasks_total", "Total number of tasks by status and queue"),
            &["status", "queue"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let tasks_pending = IntGauge::new("tq_tasks_pending", "Number of pending tasks")?;
        registry.register(Box::new(tasks_pending.clone()))?;

        let tasks_in_progress = IntGauge::new("tq_tasks_in_progress", "Number of in-progress tasks")?;
        registry.register(Box::new(tasks_in_progress.clone()))?;

        let task_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "tq_task_processing_duration_seconds",
                "Task processing duration in seconds",
            ),
            &["queue"],
        )?;
        registry.register(Box::new(task_processing_duration.clone()))?;

        let workers_connected = IntGauge::new("tq_workers_connected", "Number of active workers")?;
        registry.register(Box::new(workers_connected.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("tq_queue_depth", "Pending queue depth by queue name"),
            &["queue"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(BrokerMetrics {
            registry,
            tasks_total,
            tasks_pending,
            tasks_in_progress,
            task_processing_duration,
            workers_connected,
            queue_depth,
        })
    }

    pub fn inc_tasks_total(&self, status: &str, queue: &str) {
        self.tasks_total.with_label_values(&[status, queue]).inc();
    }

    pub fn observe_processing_duration(&self, queue: &str, duration_secs: f64) {
        self.task_processing_duration
            .with_label_values(&[queue])
            .observe(duration_secs);
    }

    pub fn set_queue_depth(&self, queue: &str, depth: i64) {
        self.queue_depth.with_label_values(&[queue]).set(depth);
    }
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new().expect("failed to construct broker metrics registry")
    }
}
