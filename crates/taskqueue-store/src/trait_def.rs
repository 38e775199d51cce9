use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// The primitive contract the broker requires of its shared key/value
/// store (SPEC_FULL.md §4.2). Redis satisfies this contract directly; any
/// store offering the same atomic primitives is conformant.
///
/// Every method name matches the Redis command it is grounded on so the
/// broker's key layout reads the same whether the backing implementation
/// is `RedisStore` or the in-memory test double.
#[async_trait]
pub trait Store: Send + Sync {
    /// SET — atomically write a string value.
    async fn str_set(&self, key: &str, value: &str) -> Result<()>;

    /// GET — atomically read a string value.
    async fn str_get(&self, key: &str) -> Result<Option<String>>;

    /// DEL — atomically delete a key (string, set, or sorted set).
    async fn str_delete(&self, key: &str) -> Result<()>;

    /// ZADD — insert/update a member of a sorted set with the given score.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()>;

    /// BZPOPMIN — blocking pop of the lowest-scored member, waiting up to
    /// `timeout`. Returns `None` if the timeout elapses with no member.
    async fn bzpopmin(&self, key: &str, timeout: Duration) -> Result<Option<(String, i64)>>;

    /// ZRANGE — members in ascending score order, inclusive rank range.
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    /// ZCARD — cardinality of a sorted set.
    async fn zcard(&self, key: &str) -> Result<u64>;

    /// ZREM — remove a member from a sorted set.
    async fn zrem(&self, key: &str, member: &str) -> Result<()>;

    /// SADD — add a member to an unordered set.
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    /// SREM — remove a member from an unordered set.
    async fn srem(&self, key: &str, member: &str) -> Result<()>;

    /// SISMEMBER — membership test on an unordered set.
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    /// SMEMBERS — enumerate an unordered set.
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// SCARD — cardinality of an unordered set.
    async fn scard(&self, key: &str) -> Result<u64>;

    /// SMOVE — atomically move a member between two unordered sets. Returns
    /// `false` if the member was not present in `src`.
    async fn smove(&self, src: &str, dst: &str, member: &str) -> Result<bool>;

    /// SCAN — enumerate keys matching a glob pattern.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// PING — liveness check.
    async fn health_check(&self) -> bool;
}
