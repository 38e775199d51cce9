mod error;
mod in_memory;
mod redis_store;
mod trait_def;

pub use error::{Result, StoreError};
pub use in_memory::InMemoryStore;
pub use redis_store::RedisStore;
pub use trait_def::Store;
