use serde::{Deserialize, Serialize};

/// Broker configuration, loaded from environment variables (prefix `TQ_`)
/// with an optional YAML override file, mirroring the `pydantic-settings`
/// env-var model of the original and `task-queue-broker`'s `from_file`
/// convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub redis_url: String,
    pub default_queue: String,
    pub task_timeout_secs: u64,
    pub max_retries: u32,
    pub log_level: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_queue: "default".to_string(),
            task_timeout_secs: 300,
            max_retries: 3,
            log_level: "info".to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BrokerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load defaults, then an optional YAML file, then `TQ_*` environment
    /// overrides, in that order of increasing precedence.
    pub fn load(yaml_path: Option<&str>) -> anyhow::Result<Self> {
        let defaults = BrokerConfig::default();
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&defaults)?,
        );

        if let Some(path) = yaml_path {
            if std::path::Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        builder = builder.add_source(config::Environment::with_prefix("TQ"));

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
