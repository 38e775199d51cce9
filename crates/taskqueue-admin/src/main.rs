use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use taskqueue_broker::Broker;
use uuid::Uuid;

/// Talks directly to the same store the broker and workers share — there
/// is no broker network service to front, so this is a thin `Broker`
/// client rather than an HTTP client.
#[derive(Parser, Debug)]
#[command(name = "tq-admin")]
#[command(about = "Task queue admin CLI", long_about = None)]
struct Args {
    /// Redis connection URL.
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Output format (json, table).
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a task's current record.
    Status { task_id: String },

    /// List pending tasks in a queue.
    List {
        #[arg(short, long, default_value = "default")]
        queue: String,
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Cancel a task still in the pending state.
    Cancel {
        task_id: String,
        #[arg(short, long, default_value = "default")]
        queue: String,
    },

    /// Re-enqueue a task out of the failed set.
    Retry {
        task_id: String,
        #[arg(short, long, default_value = "default")]
        queue: String,
    },

    /// List known queues.
    Queues,

    /// Show derived statistics for a queue.
    Stats {
        #[arg(short, long, default_value = "default")]
        queue: String,
    },

    /// List registered workers.
    Workers,

    /// Pause a queue; pollers stop dequeuing from it.
    Pause { queue: String },

    /// Resume a paused queue.
    Resume { queue: String },

    /// Empty a queue's dead-letter set.
    ClearDlq { queue: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let broker = Broker::connect(&args.redis_url).await?;

    match args.command {
        Commands::Status { task_id } => {
            let task_id = Uuid::parse_str(&task_id)?;
            match broker.get_task(task_id).await? {
                Some(task) => print_one(&args.format, &task)?,
                None => eprintln!("task not found"),
            }
        }

        Commands::List { queue, limit } => {
            let tasks = broker.get_pending_tasks(&queue, limit).await?;
            match args.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&tasks)?),
                _ => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["ID", "Name", "Status", "Priority", "Created"]);
                    for task in &tasks {
                        table.add_row(vec![
                            task.id.to_string(),
                            task.name.clone(),
                            task.status.as_str().to_string(),
                            task.priority.value().to_string(),
                            task.created_at.to_rfc3339(),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }

        Commands::Cancel { task_id, queue } => {
            let task_id = Uuid::parse_str(&task_id)?;
            if broker.cancel_pending(task_id, &queue).await? {
                println!("task cancelled");
            } else {
                eprintln!("task was not pending, not cancelled");
            }
        }

        Commands::Retry { task_id, queue } => {
            let task_id = Uuid::parse_str(&task_id)?;
            match broker.retry_failed_task(task_id, &queue).await? {
                Some(_) => println!("task re-enqueued"),
                None => eprintln!("task was not in the failed set"),
            }
        }

        Commands::Queues => {
            let queues = broker.list_queues().await?;
            match args.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&queues)?),
                _ => queues.iter().for_each(|q| println!("{q}")),
            }
        }

        Commands::Stats { queue } => {
            let stats = broker.get_queue_stats(&queue).await?;
            match args.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
                _ => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["Metric", "Value"]);
                    table.add_row(vec!["Queue", &stats.queue_name]);
                    table.add_row(vec!["Pending", &stats.pending.to_string()]);
                    table.add_row(vec!["Processing", &stats.processing.to_string()]);
                    table.add_row(vec!["Completed", &stats.completed.to_string()]);
                    table.add_row(vec!["Failed", &stats.failed.to_string()]);
                    table.add_row(vec!["Paused", &stats.paused.to_string()]);
                    println!("{table}");
                }
            }
        }

        Commands::Workers => {
            let workers = broker.list_workers().await?;
            match args.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&workers)?),
                _ => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["Worker ID", "Status", "Current Task", "Heartbeat", "Completed", "Failed"]);
                    for worker in &workers {
                        let active = worker.is_active(chrono::Duration::seconds(30));
                        table.add_row(vec![
                            worker.worker_id.clone(),
                            format!("{}{}", worker.status.as_str(), if active { "" } else { " (stale)" }),
                            worker
                                .current_task_name
                                .clone()
                                .unwrap_or_else(|| "-".to_string()),
                            worker.last_heartbeat.to_rfc3339(),
                            worker.tasks_completed.to_string(),
                            worker.tasks_failed.to_string(),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }

        Commands::Pause { queue } => {
            broker.pause(&queue).await?;
            println!("queue '{queue}' paused");
        }

        Commands::Resume { queue } => {
            broker.resume(&queue).await?;
            println!("queue '{queue}' resumed");
        }

        Commands::ClearDlq { queue } => {
            broker.clear_dead_letter(&queue).await?;
            println!("dead-letter queue for '{queue}' cleared");
        }
    }

    Ok(())
}

fn print_one(format: &str, task: &taskqueue_core::Task) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(task)?),
        _ => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Field", "Value"]);
            table.add_row(vec!["ID", &task.id.to_string()]);
            table.add_row(vec!["Name", &task.name]);
            table.add_row(vec!["Status", task.status.as_str()]);
            table.add_row(vec!["Priority", &task.priority.value().to_string()]);
            table.add_row(vec!["Created", &task.created_at.to_rfc3339()]);
            table.add_row(vec!["Retries", &task.retries.to_string()]);
            if let Some(error) = &task.error {
                table.add_row(vec!["Error", error]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
