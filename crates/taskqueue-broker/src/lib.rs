pub mod broker;
pub mod config;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod worker_registry;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use metrics::BrokerMetrics;
