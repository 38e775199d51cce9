use clap::Parser;
use std::time::Duration;
use taskqueue_broker::{Broker, BrokerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STALE_TIMEOUT_SECS: u64 = 60;
const ACTIVE_TIMEOUT_SECS: u64 = 30;
const MAINTENANCE_INTERVAL_SECS: u64 = 10;

/// Runs the broker's background maintenance: stale-worker cleanup and
/// orphaned-task recovery. Producers, workers, and observers otherwise
/// talk to the store directly, so this binary wires configuration and a
/// store connection and otherwise stays out of the data path.
#[derive(Parser, Debug)]
#[command(name = "tq-broker")]
#[command(about = "Task queue broker maintenance daemon", long_about = None)]
struct Args {
    /// Path to a YAML configuration override file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Queues to run maintenance against (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "default")]
    queues: Vec<String>,
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

    let config = BrokerConfig::load(Some(&args.config))?;
    tracing::info!(?config, queues = ?args.queues, "starting broker maintenance daemon");

    let broker = Broker::connect(&config.redis_url).await?;

    let mut interval = tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
    loop {
        interval.tick().await;

        let stale_timeout = Duration::from_secs(STALE_TIMEOUT_SECS);
        for queue in &args.queues {
            match broker.recover_orphaned_tasks(queue, stale_timeout).await {
                Ok(n) if n > 0 => tracing::info!(queue, recovered = n, "recovered orphaned tasks"),
                Ok(_) => {}
                Err(e) => tracing::error!(queue, error = %e, "orphan recovery failed"),
            }
        }

        if let Err(e) = broker.cleanup_stale_workers(stale_timeout).await {
            tracing::error!(error = %e, "stale worker cleanup failed");
        }
        if let Err(e) = broker
            .refresh_workers_connected_metric(Duration::from_secs(ACTIVE_TIMEOUT_SECS))
            .await
        {
            tracing::error!(error = %e, "metrics refresh failed");
        }
    }
}
