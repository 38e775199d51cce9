use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker configuration, loaded from environment variables (prefix `TQ_`)
/// with an optional YAML override file, matching
/// `taskqueue-broker::BrokerConfig::load`'s precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub worker_id: Option<String>,
    pub queues: Vec<String>,
    pub concurrency: usize,
    pub task_timeout_secs: u64,
    pub max_retries: u32,
    pub log_level: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            worker_id: None,
            queues: vec!["default".to_string()],
            concurrency: 4,
            task_timeout_secs: 300,
            max_retries: 3,
            log_level: "info".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn load(yaml_path: Option<&str>) -> anyhow::Result<Self> {
        let defaults = WorkerConfig::default();
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        if let Some(path) = yaml_path {
            if std::path::Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TQ")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("queues"),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn resolved_worker_id(&self) -> String {
        self.worker_id
            .clone()
            .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()))
    }
}
