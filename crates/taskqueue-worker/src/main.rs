use clap::Parser;
use std::sync::Arc;
use taskqueue_broker::Broker;
use taskqueue_worker::{EchoHandler, HandlerRegistry, WorkerConfig, WorkerRuntime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Polls the queues it's configured for, dispatches tasks to registered
/// handlers, retries or dead-letters on failure, and heartbeats its
/// liveness to the store.
#[derive(Parser, Debug)]
#[command(name = "tq-worker")]
#[command(about = "Task queue worker process", long_about = None)]
struct Args {
    /// Path to a YAML configuration override file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Stable identifier for this worker. Defaults to a generated
    /// `worker-{uuid}` if omitted.
    #[arg(long)]
    worker_id: Option<String>,

    /// Queues to poll, in priority order (comma-separated). Overrides the
    /// configured list when given.
    #[arg(long, value_delimiter = ',')]
    queues: Option<Vec<String>>,

    /// Number of concurrent processing loops. Overrides the configured
    /// value when given.
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = WorkerConfig::load(Some(&args.config))?;
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }
    if let Some(queues) = args.queues {
        config.queues = queues;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }

    let broker = Arc::new(Broker::connect(&config.redis_url).await?);

    // EchoHandler is a demo/template registration; real deployments
    // register their own business handlers before calling `run`.
    let registry = HandlerRegistry::new();
    registry.register("echo", EchoHandler);

    let runtime = Arc::new(WorkerRuntime::new(broker, config, registry));
    tracing::info!(worker_id = runtime.worker_id(), "worker configured");

    let shutdown_runtime = runtime.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            shutdown_runtime.shutdown();
        }
    });

    runtime.run().await
}
