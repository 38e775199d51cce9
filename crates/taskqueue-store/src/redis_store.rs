use crate::{Result, Store, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

/// Redis-backed `Store`. Uses a `ConnectionManager`, which reconnects
/// transparently on connection loss (the "lazy-connect, surface errors to
/// the caller" behavior SPEC_FULL.md §7 asks of store unavailability).
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to `redis_url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(StoreError::Command)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(StoreError::Command)?;
        debug!(redis_url, "connected to redis store");
        Ok(RedisStore { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn str_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().set(key, value).await.map_err(StoreError::from)
    }

    async fn str_get(&self, key: &str) -> Result<Option<String>> {
        self.conn().get(key).await.map_err(StoreError::from)
    }

    async fn str_delete(&self, key: &str) -> Result<()> {
        let _: () = self.conn().del(key).await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()> {
        let _: () = self
            .conn()
            .zadd(key, member, score)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn bzpopmin(&self, key: &str, timeout: Duration) -> Result<Option<(String, i64)>> {
        let result: Option<(String, String, i64)> = redis::cmd("BZPOPMIN")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut self.conn())
            .await
            .map_err(StoreError::from)?;

        Ok(result.map(|(_key, member, score)| (member, score)))
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.conn()
            .zrange(key, start, stop)
            .await
            .map_err(StoreError::from)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        self.conn().zcard(key).await.map_err(StoreError::from)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let _: () = self.conn().zrem(key, member).await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let _: () = self.conn().sadd(key, member).await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let _: () = self.conn().srem(key, member).await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.conn()
            .sismember(key, member)
            .await
            .map_err(StoreError::from)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.conn().smembers(key).await.map_err(StoreError::from)
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        self.conn().scard(key).await.map_err(StoreError::from)
    }

    async fn smove(&self, src: &str, dst: &str, member: &str) -> Result<bool> {
        self.conn()
            .smove(src, dst, member)
            .await
            .map_err(StoreError::from)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(StoreError::from)?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    async fn health_check(&self) -> bool {
        match redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "redis health check failed");
                false
            }
        }
    }
}
