//! Memory Backend Module
//!
//! In-process keyspace of byte strings and string sets with lazy TTL
//! expiry, guarded by a single lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::entry::{current_timestamp_ms, Slot, SlotValue};
use crate::backend::{
    apply_prefix, strip_prefix, Backend, Command, GlobPattern, Pipeline, Reply, TTL_ABSENT,
};
use crate::error::{CacheError, Result};

// == Keyspace ==
/// The raw slot map. Keys stored here are already prefixed.
#[derive(Debug, Default)]
pub struct Keyspace {
    slots: HashMap<String, Slot>,
}

impl Keyspace {
    /// Returns the live slot for `key`, evicting it first if it expired.
    fn live_mut(&mut self, key: &str) -> Option<&mut Slot> {
        if self.slots.get(key).is_some_and(Slot::is_expired) {
            debug!(key = %key, "Key expired, removing");
            self.slots.remove(key);
        }
        self.slots.get_mut(key)
    }

    // == Apply ==
    /// Applies one command. The caller already holds the write lock.
    fn apply(&mut self, prefix: &str, command: Command) -> Result<Reply> {
        match command {
            Command::Get(key) => {
                let key = apply_prefix(prefix, &key);
                match self.live_mut(&key).map(|slot| &slot.value) {
                    Some(SlotValue::Bytes(bytes)) => Ok(Reply::Bytes(Some(bytes.clone()))),
                    Some(SlotValue::Set(_)) => Err(wrong_type(&key)),
                    None => Ok(Reply::Bytes(None)),
                }
            }
            Command::Set { key, value, ttl } => {
                if ttl == Some(0) {
                    return Err(invalid_expire(&key));
                }
                self.slots
                    .insert(apply_prefix(prefix, &key), Slot::bytes(value, ttl));
                Ok(Reply::Ok(true))
            }
            Command::SetWithExpiry { key, ttl, value } => {
                if ttl == 0 {
                    return Err(invalid_expire(&key));
                }
                self.slots
                    .insert(apply_prefix(prefix, &key), Slot::bytes(value, Some(ttl)));
                Ok(Reply::Ok(true))
            }
            Command::Delete(keys) => {
                let now = current_timestamp_ms();
                let mut removed = 0;
                for key in keys {
                    if let Some(slot) = self.slots.remove(&apply_prefix(prefix, &key)) {
                        if !slot.is_expired_at(now) {
                            removed += 1;
                        }
                    }
                }
                Ok(Reply::Count(removed))
            }
            Command::Ttl(key) => {
                let key = apply_prefix(prefix, &key);
                Ok(Reply::Ttl(
                    self.live_mut(&key).map_or(TTL_ABSENT, |slot| slot.ttl_seconds()),
                ))
            }
            Command::SetAdd { key, members } => {
                let key = apply_prefix(prefix, &key);
                if self.live_mut(&key).is_none() {
                    self.slots.insert(key.clone(), Slot::empty_set());
                }
                match self.slots.get_mut(&key).map(|slot| &mut slot.value) {
                    Some(SlotValue::Set(set)) => {
                        let added = members
                            .into_iter()
                            .filter(|member| set.insert(member.clone()))
                            .count();
                        Ok(Reply::Count(added as u64))
                    }
                    _ => Err(wrong_type(&key)),
                }
            }
            Command::SetMembers(key) => {
                let key = apply_prefix(prefix, &key);
                match self.live_mut(&key).map(|slot| &slot.value) {
                    Some(SlotValue::Set(set)) => Ok(Reply::Members(set.clone())),
                    Some(SlotValue::Bytes(_)) => Err(wrong_type(&key)),
                    None => Ok(Reply::Members(HashSet::new())),
                }
            }
            Command::Expire { key, ttl } => {
                let key = apply_prefix(prefix, &key);
                match self.live_mut(&key) {
                    Some(slot) => {
                        slot.expire_in(ttl);
                        Ok(Reply::Ok(true))
                    }
                    None => Ok(Reply::Ok(false)),
                }
            }
        }
    }

    // == Purge Expired ==
    /// Removes all expired slots and returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired_at(now));
        before - self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::BackendUnavailable(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

fn invalid_expire(key: &str) -> CacheError {
    CacheError::BackendUnavailable(format!("invalid expire time for key '{}'", key))
}

// == Memory Backend ==
/// Thread-safe in-process backend.
///
/// Every mutating operation, including the lazy "check expired, evict,
/// read" sequence, runs under one write lock, and a pipeline holds that
/// lock for the whole batch. Cloning shares the same keyspace.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    key_prefix: String,
    keyspace: Arc<RwLock<Keyspace>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose keys all live under `key_prefix`.
    pub fn with_prefix(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            keyspace: Arc::new(RwLock::new(Keyspace::default())),
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Removes every expired slot, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        self.keyspace.write().await.purge_expired()
    }

    /// Number of slots held, expired ones included until they are evicted.
    pub async fn len(&self) -> usize {
        self.keyspace.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keyspace.read().await.is_empty()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        let commands = pipeline.into_commands();
        debug!(commands = commands.len(), "Memory EXEC");

        let mut keyspace = self.keyspace.write().await;
        commands
            .into_iter()
            .map(|command| keyspace.apply(&self.key_prefix, command))
            .collect()
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
        debug!(pattern = %pattern, "Memory KEYS");
        let glob = GlobPattern::new(pattern)?;

        let keyspace = self.keyspace.read().await;
        let now = current_timestamp_ms();
        Ok(keyspace
            .slots
            .iter()
            .filter(|(_, slot)| !slot.is_expired_at(now))
            .filter_map(|(key, _)| strip_prefix(&self.key_prefix, key))
            .filter(|key| glob.matches(key))
            .map(str::to_string)
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_set_and_overwrite() {
        let backend = MemoryBackend::new();

        assert_eq!(backend.get("k").await.unwrap(), None);
        backend.set("k", b"v1".to_vec(), None).await.unwrap();
        backend.set("k", b"v2".to_vec(), None).await.unwrap();

        assert_eq!(backend.get("k").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(backend.time_to_live("k").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_set_with_expiry_expires() {
        let backend = MemoryBackend::new();
        backend
            .set_with_expiry("k", 1, b"v".to_vec())
            .await
            .unwrap();
        assert_eq!(backend.time_to_live("k").await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(backend.get("k").await.unwrap(), None);
        assert_eq!(backend.time_to_live("k").await.unwrap(), TTL_ABSENT);
    }

    #[tokio::test]
    async fn test_zero_expiry_is_rejected() {
        let backend = MemoryBackend::new();
        let result = backend.set_with_expiry("k", 0, b"v".to_vec()).await;
        assert!(matches!(result, Err(CacheError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_delete_counts_existing_keys_only() {
        let backend = MemoryBackend::new();
        backend.set("a", b"1".to_vec(), None).await.unwrap();
        backend.set_add("s", &keys(&["x"])).await.unwrap();

        let removed = backend.delete(&keys(&["a", "s", "missing"])).await.unwrap();
        assert_eq!(removed, 2);
        assert!(backend.is_empty().await);
        assert_eq!(backend.delete(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_operations() {
        let backend = MemoryBackend::new();

        assert_eq!(backend.set_add("s", &keys(&["a", "b"])).await.unwrap(), 2);
        assert_eq!(backend.set_add("s", &keys(&["b", "c"])).await.unwrap(), 1);

        let members = backend.set_members("s").await.unwrap();
        assert_eq!(members.len(), 3);
        assert!(members.contains("c"));
        assert!(backend.set_members("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let backend = MemoryBackend::new();
        backend.set("k", b"v".to_vec(), None).await.unwrap();
        assert!(backend.set_add("k", &keys(&["m"])).await.is_err());

        backend.set_add("s", &keys(&["m"])).await.unwrap();
        assert!(backend.get("s").await.is_err());
    }

    #[tokio::test]
    async fn test_expire_only_touches_existing_keys() {
        let backend = MemoryBackend::new();
        assert!(!backend.expire("missing", 10).await.unwrap());

        backend.set_add("s", &keys(&["m"])).await.unwrap();
        assert_eq!(backend.time_to_live("s").await.unwrap(), -1);
        assert!(backend.expire("s", 390).await.unwrap());
        assert_eq!(backend.time_to_live("s").await.unwrap(), 390);
    }

    #[tokio::test]
    async fn test_expired_set_is_recreated_on_add() {
        let backend = MemoryBackend::new();
        backend.set_add("s", &keys(&["old"])).await.unwrap();
        backend.expire("s", 1).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        backend.set_add("s", &keys(&["new"])).await.unwrap();
        let members = backend.set_members("s").await.unwrap();
        assert_eq!(members.len(), 1);
        assert!(members.contains("new"));
        assert_eq!(backend.time_to_live("s").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_list_keys_glob_and_prefix_stripping() {
        let backend = MemoryBackend::with_prefix("app1:");
        let other = MemoryBackend {
            key_prefix: "app2:".to_string(),
            keyspace: backend.keyspace.clone(),
        };

        backend.set("cache:f:1", b"1".to_vec(), None).await.unwrap();
        backend.set("cache:f:2", b"2".to_vec(), None).await.unwrap();
        backend.set("cache:g:1", b"3".to_vec(), None).await.unwrap();
        other.set("cache:f:9", b"4".to_vec(), None).await.unwrap();

        let mut found = backend.list_keys("cache:f:*").await.unwrap();
        found.sort();
        assert_eq!(found, keys(&["cache:f:1", "cache:f:2"]));

        assert_eq!(backend.list_keys("*").await.unwrap().len(), 3);
        assert_eq!(other.list_keys("*").await.unwrap(), keys(&["cache:f:9"]));
    }

    #[tokio::test]
    async fn test_pipeline_replies_in_order() {
        let backend = MemoryBackend::new();

        let mut pipe = backend.pipeline();
        pipe.set_with_expiry("cache:f:1", 60, b"v".to_vec())
            .ttl("entity:user:1")
            .set_add("entity:user:1", ["cache:f:1"])
            .expire("entity:user:1", 360)
            .ttl("entity:user:1")
            .get("cache:f:1");
        let replies = pipe.execute(&backend).await.unwrap();

        assert_eq!(replies[0], Reply::Ok(true));
        assert_eq!(replies[1], Reply::Ttl(TTL_ABSENT));
        assert_eq!(replies[2], Reply::Count(1));
        assert_eq!(replies[3], Reply::Ok(true));
        assert_eq!(replies[4], Reply::Ttl(360));
        assert_eq!(replies[5], Reply::Bytes(Some(b"v".to_vec())));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new();
        backend.set("short", b"1".to_vec(), Some(1)).await.unwrap();
        backend.set("long", b"2".to_vec(), Some(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(backend.purge_expired().await, 1);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_pipelines_do_not_interleave() {
        let backend = MemoryBackend::new();
        let mut handles = Vec::new();

        for writer in 0..16u64 {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                let mut pipe = Pipeline::new();
                pipe.set_add("entity:user:1", [format!("cache:f:{}", writer)])
                    .expire("entity:user:1", 300 + writer);
                pipe.execute(&backend).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(backend.set_members("entity:user:1").await.unwrap().len(), 16);
    }
}
