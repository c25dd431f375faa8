//! Redis Backend Module
//!
//! Adapter over a managed async Redis connection. Multi-command batches run
//! inside MULTI/EXEC.

use std::collections::HashSet;
use std::fmt;

use ::redis::aio::ConnectionManager;
use ::redis::{from_redis_value, Client, Value};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::backend::{
    apply_prefix, escape_glob, strip_prefix, Backend, Command, Pipeline, Reply,
};
use crate::error::{CacheError, Result};

/// Redis-backed store. Cloning shares the underlying connection manager,
/// which reconnects on its own after a dropped connection.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
    key_prefix: String,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Wraps an existing connection manager.
    pub fn new(manager: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            manager,
            key_prefix: key_prefix.into(),
        }
    }

    /// Opens a managed connection to `url`.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL, e.g. `redis://127.0.0.1:6379/0`
    /// * `key_prefix` - Namespace prepended to every key
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        let key_prefix = key_prefix.into();
        info!(url = %url, key_prefix = %key_prefix, "Connected to Redis");
        Ok(Self::new(manager, key_prefix))
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn key(&self, key: &str) -> String {
        apply_prefix(&self.key_prefix, key)
    }

    fn queue(&self, pipe: &mut ::redis::Pipeline, command: &Command) {
        match command {
            Command::Get(key) => {
                pipe.cmd("GET").arg(self.key(key));
            }
            Command::Set {
                key,
                value,
                ttl: Some(ttl),
            } => {
                pipe.cmd("SETEX").arg(self.key(key)).arg(*ttl).arg(value.as_slice());
            }
            Command::Set {
                key,
                value,
                ttl: None,
            } => {
                pipe.cmd("SET").arg(self.key(key)).arg(value.as_slice());
            }
            Command::SetWithExpiry { key, ttl, value } => {
                pipe.cmd("SETEX").arg(self.key(key)).arg(*ttl).arg(value.as_slice());
            }
            Command::Delete(keys) => {
                let keys: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
                pipe.cmd("DEL").arg(keys);
            }
            Command::Ttl(key) => {
                pipe.cmd("TTL").arg(self.key(key));
            }
            Command::SetAdd { key, members } => {
                pipe.cmd("SADD").arg(self.key(key)).arg(members.as_slice());
            }
            Command::SetMembers(key) => {
                pipe.cmd("SMEMBERS").arg(self.key(key));
            }
            Command::Expire { key, ttl } => {
                pipe.cmd("EXPIRE").arg(self.key(key)).arg(*ttl);
            }
        }
    }
}

/// Converts a raw reply into the shape the queued command promises.
fn convert(command: &Command, value: &Value) -> Result<Reply> {
    Ok(match command {
        Command::Get(_) => Reply::Bytes(from_redis_value::<Option<Vec<u8>>>(value)?),
        Command::Set { .. } | Command::SetWithExpiry { .. } => {
            Reply::Ok(!matches!(value, Value::Nil))
        }
        Command::Delete(_) | Command::SetAdd { .. } => Reply::Count(from_redis_value::<u64>(value)?),
        Command::Ttl(_) => Reply::Ttl(from_redis_value::<i64>(value)?),
        Command::SetMembers(_) => Reply::Members(from_redis_value::<HashSet<String>>(value)?),
        Command::Expire { .. } => Reply::Ok(from_redis_value::<i64>(value)? != 0),
    })
}

#[async_trait]
impl Backend for RedisBackend {
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        let commands = pipeline.into_commands();
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = ::redis::pipe();
        if commands.len() > 1 {
            pipe.atomic();
        }
        for command in &commands {
            self.queue(&mut pipe, command);
        }
        debug!(commands = commands.len(), "Redis EXEC");

        let mut conn = self.manager.clone();
        let values: Vec<Value> = pipe.query_async(&mut conn).await?;
        if values.len() != commands.len() {
            return Err(CacheError::BackendUnavailable(format!(
                "expected {} replies, got {}",
                commands.len(),
                values.len()
            )));
        }

        commands
            .iter()
            .zip(values.iter())
            .map(|(command, value)| convert(command, value))
            .collect()
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = ::redis::cmd("KEYS")
            .arg(prefixed_pattern(&self.key_prefix, pattern))
            .query_async(&mut conn)
            .await?;
        debug!(pattern = %pattern, found = keys.len(), "Redis KEYS");

        Ok(keys
            .iter()
            .filter_map(|key| strip_prefix(&self.key_prefix, key))
            .map(str::to_string)
            .collect())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// `pattern` scoped to the keys under `prefix`; the prefix matches literally.
fn prefixed_pattern(prefix: &str, pattern: &str) -> String {
    format!("{}{}", escape_glob(prefix), pattern)
}
