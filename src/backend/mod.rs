//! Backend Module
//!
//! The storage contract the engine needs from a key-value store, plus an
//! in-process implementation and a Redis adapter.

mod entry;
mod glob;
mod memory;
mod pipeline;
mod redis;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::{CacheError, Result};

// Re-export public types
pub use self::redis::RedisBackend;
pub use entry::{Slot, SlotValue};
pub use glob::{escape_glob, GlobPattern};
pub use memory::MemoryBackend;
pub use pipeline::{Command, Pipeline, Reply};

// == Public Constants ==
/// TTL reported for a key that does not exist.
pub const TTL_ABSENT: i64 = -2;

/// TTL reported for a key that exists without an expiry.
pub const TTL_PERSISTENT: i64 = -1;

// == Backend Trait ==
/// Capability contract of a key-value store.
///
/// Implementations apply their namespace prefix to every key they receive
/// and strip it from every key they return, so callers only ever see
/// unprefixed keys. Any failure is reported as
/// [`CacheError::BackendUnavailable`].
///
/// Only [`Backend::execute`] and [`Backend::list_keys`] are required; the
/// scalar and set operations default to one-command batches.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs a batch in order and returns one reply per command.
    ///
    /// The batch is atomic where the store supports it, otherwise it runs
    /// as a tight loop under a single lock.
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>>;

    /// Lists the unprefixed keys matching a glob pattern.
    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn pipeline(&self) -> Pipeline {
        Pipeline::new()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut pipe = Pipeline::new();
        pipe.get(key);
        single(self.execute(pipe).await?)?.into_bytes()
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<bool> {
        let mut pipe = Pipeline::new();
        pipe.set(key, value, ttl);
        single(self.execute(pipe).await?)?.as_ok()
    }

    async fn set_with_expiry(&self, key: &str, ttl: u64, value: Vec<u8>) -> Result<bool> {
        let mut pipe = Pipeline::new();
        pipe.set_with_expiry(key, ttl, value);
        single(self.execute(pipe).await?)?.as_ok()
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut pipe = Pipeline::new();
        pipe.delete(keys.iter().cloned());
        single(self.execute(pipe).await?)?.as_count()
    }

    async fn time_to_live(&self, key: &str) -> Result<i64> {
        let mut pipe = Pipeline::new();
        pipe.ttl(key);
        single(self.execute(pipe).await?)?.as_ttl()
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut pipe = Pipeline::new();
        pipe.set_add(key, members.iter().cloned());
        single(self.execute(pipe).await?)?.as_count()
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>> {
        let mut pipe = Pipeline::new();
        pipe.set_members(key);
        single(self.execute(pipe).await?)?.into_members()
    }

    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        let mut pipe = Pipeline::new();
        pipe.expire(key, ttl);
        single(self.execute(pipe).await?)?.as_ok()
    }
}

fn single(replies: Vec<Reply>) -> Result<Reply> {
    replies
        .into_iter()
        .next()
        .ok_or_else(|| CacheError::BackendUnavailable("empty reply to single command".to_string()))
}

// == Prefix Helpers ==
pub(crate) fn apply_prefix(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}{}", prefix, key)
    }
}

pub(crate) fn strip_prefix<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix)
}
