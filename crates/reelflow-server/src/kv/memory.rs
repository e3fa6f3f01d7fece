use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use reelflow_core::Result;

use super::KvStore;

/// In-process backend used for local development and tests. Not shared
/// across processes — restarts lose state, which is fine since nothing in
/// this binary's test suite exercises cross-process recovery.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKv {
    values: Arc<DashMap<String, String>>,
    counters: Arc<DashMap<String, i64>>,
    sets: Arc<DashMap<String, HashSet<String>>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<()> {
        self.sets.entry(set_key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<()> {
        if let Some(mut s) = self.sets.get_mut(set_key) {
            s.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        Ok(self.sets.get(set_key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_is_monotonic_per_key() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.incr("a").await.unwrap(), 1);
        assert_eq!(kv.incr("a").await.unwrap(), 2);
        assert_eq!(kv.incr("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_add_remove_roundtrip() {
        let kv = InMemoryKv::new();
        kv.set_add("s", "x").await.unwrap();
        kv.set_add("s", "y").await.unwrap();
        let mut members = kv.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["x".to_string(), "y".to_string()]);
        kv.set_remove("s", "x").await.unwrap();
        assert_eq!(kv.set_members("s").await.unwrap(), vec!["y".to_string()]);
    }
}
