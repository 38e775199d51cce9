use crate::{Result, Store};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// In-process `Store` used by unit tests (no example in the pack ships one;
/// this is the boundary the broker/worker tests exercise in place of a live
/// Redis, per SPEC_FULL.md §2's ambient test-tooling section).
#[derive(Default)]
pub struct InMemoryStore {
    strings: Mutex<HashMap<String, String>>,
    zsets: Mutex<HashMap<String, BTreeMap<String, i64>>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    fn sorted_members(zset: &BTreeMap<String, i64>) -> Vec<(String, i64)> {
        let mut items: Vec<(String, i64)> = zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
        items.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        items
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn str_set(&self, key: &str, value: &str) -> Result<()> {
        self.strings.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn str_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.strings.lock().get(key).cloned())
    }

    async fn str_delete(&self, key: &str) -> Result<()> {
        self.strings.lock().remove(key);
        self.zsets.lock().remove(key);
        self.sets.lock().remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()> {
        self.zsets
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn bzpopmin(&self, key: &str, timeout: Duration) -> Result<Option<(String, i64)>> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut zsets = self.zsets.lock();
                if let Some(zset) = zsets.get_mut(key) {
                    if let Some((member, score)) = Self::sorted_members(zset).into_iter().next() {
                        zset.remove(&member);
                        return Ok(Some((member, score)));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(Duration::from_millis(5)).await;
        }
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let zsets = self.zsets.lock();
        let items = zsets
            .get(key)
            .map(Self::sorted_members)
            .unwrap_or_default();
        let len = items.len() as isize;

        let clamp = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len)
            }
        };
        let start = clamp(start) as usize;
        let end = if stop < 0 {
            clamp(stop + 1) as usize
        } else {
            ((stop + 1).min(len)) as usize
        };

        if start >= end {
            return Ok(Vec::new());
        }
        Ok(items[start..end].iter().map(|(m, _)| m.clone()).collect())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        Ok(self.zsets.lock().get(key).map(|z| z.len() as u64).unwrap_or(0))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(zset) = self.zsets.lock().get_mut(key) {
            zset.remove(member);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(set) = self.sets.lock().get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .sets
            .lock()
            .get(key)
            .map(|s| s.contains(member))
            .unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .lock()
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        Ok(self.sets.lock().get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn smove(&self, src: &str, dst: &str, member: &str) -> Result<bool> {
        let mut sets = self.sets.lock();
        let removed = sets
            .get_mut(src)
            .map(|s| s.remove(member))
            .unwrap_or(false);
        if removed {
            sets.entry(dst.to_string()).or_default().insert(member.to_string());
        }
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = Vec::new();
        keys.extend(self.strings.lock().keys().cloned());
        keys.extend(self.zsets.lock().keys().cloned());
        keys.extend(self.sets.lock().keys().cloned());
        keys.retain(|k| glob_match(pattern, k));
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Minimal glob matcher supporting the `*` wildcard, sufficient for the
/// broker's key patterns (e.g. `worker:*`, `queue:*:pending`).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(pos) = rest.find(part) {
            rest = &rest[pos + part.len()..];
        } else {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_roundtrip() {
        let store = InMemoryStore::new();
        store.str_set("task:1", "payload").await.unwrap();
        assert_eq!(store.str_get("task:1").await.unwrap().as_deref(), Some("payload"));
        store.str_delete("task:1").await.unwrap();
        assert_eq!(store.str_get("task:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zset_pops_lowest_score_first() {
        let store = InMemoryStore::new();
        store.zadd("q:pending", "low", -1).await.unwrap();
        store.zadd("q:pending", "high", -10).await.unwrap();
        store.zadd("q:pending", "mid", -5).await.unwrap();

        let (member, _) = store
            .bzpopmin("q:pending", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(member, "high");
    }

    #[tokio::test]
    async fn bzpopmin_times_out_when_empty() {
        let store = InMemoryStore::new();
        let result = store.bzpopmin("q:pending", Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn smove_requires_membership_in_source() {
        let store = InMemoryStore::new();
        store.sadd("a", "x").await.unwrap();
        assert!(store.smove("a", "b", "x").await.unwrap());
        assert!(!store.sismember("a", "x").await.unwrap());
        assert!(store.sismember("b", "x").await.unwrap());
        assert!(!store.smove("a", "b", "missing").await.unwrap());
    }

    #[tokio::test]
    async fn scan_matches_glob_pattern() {
        let store = InMemoryStore::new();
        store.str_set("worker:a", "x").await.unwrap();
        store.str_set("worker:b", "x").await.unwrap();
        store.str_set("task:1", "x").await.unwrap();

        let mut keys = store.scan("worker:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["worker:a".to_string(), "worker:b".to_string()]);
    }
}
