//! Pipeline Module
//!
//! Batched commands queued against a backend and executed as one unit.

use std::collections::HashSet;

use crate::backend::Backend;
use crate::error::{CacheError, Result};

// == Command ==
/// A single queued backend command. Keys are unprefixed; the backend
/// applies its namespace prefix when the batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(String),
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Option<u64>,
    },
    SetWithExpiry {
        key: String,
        ttl: u64,
        value: Vec<u8>,
    },
    Delete(Vec<String>),
    Ttl(String),
    SetAdd {
        key: String,
        members: Vec<String>,
    },
    SetMembers(String),
    Expire {
        key: String,
        ttl: u64,
    },
}

impl Command {
    /// Redis command name, used for logging and by the networked backend.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get(_) => "GET",
            Command::Set { ttl: Some(_), .. } => "SETEX",
            Command::Set { ttl: None, .. } => "SET",
            Command::SetWithExpiry { .. } => "SETEX",
            Command::Delete(_) => "DEL",
            Command::Ttl(_) => "TTL",
            Command::SetAdd { .. } => "SADD",
            Command::SetMembers(_) => "SMEMBERS",
            Command::Expire { .. } => "EXPIRE",
        }
    }
}

// == Reply ==
/// Result of one executed command, in queue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Success flag (SET, SETEX, EXPIRE)
    Ok(bool),
    /// Number of keys or members affected (DEL, SADD)
    Count(u64),
    /// Seconds to live; -1 without expiry, -2 when absent
    Ttl(i64),
    /// Value of a GET
    Bytes(Option<Vec<u8>>),
    /// Members of a set
    Members(HashSet<String>),
}

impl Reply {
    pub fn into_bytes(self) -> Result<Option<Vec<u8>>> {
        match self {
            Reply::Bytes(value) => Ok(value),
            other => Err(unexpected("bytes", &other)),
        }
    }

    pub fn into_members(self) -> Result<HashSet<String>> {
        match self {
            Reply::Members(members) => Ok(members),
            other => Err(unexpected("members", &other)),
        }
    }

    pub fn as_ttl(&self) -> Result<i64> {
        match self {
            Reply::Ttl(ttl) => Ok(*ttl),
            other => Err(unexpected("ttl", other)),
        }
    }

    pub fn as_count(&self) -> Result<u64> {
        match self {
            Reply::Count(count) => Ok(*count),
            other => Err(unexpected("count", other)),
        }
    }

    pub fn as_ok(&self) -> Result<bool> {
        match self {
            Reply::Ok(ok) => Ok(*ok),
            other => Err(unexpected("status", other)),
        }
    }
}

fn unexpected(expected: &str, got: &Reply) -> CacheError {
    CacheError::BackendUnavailable(format!("expected {} reply, got {:?}", expected, got))
}

// == Pipeline ==
/// Ordered batch of commands. Nothing touches the store until
/// [`Pipeline::execute`] hands the batch to a backend.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Get(key.into()));
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>, ttl: Option<u64>) -> &mut Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value,
            ttl,
        });
        self
    }

    pub fn set_with_expiry(&mut self, key: impl Into<String>, ttl: u64, value: Vec<u8>) -> &mut Self {
        self.commands.push(Command::SetWithExpiry {
            key: key.into(),
            ttl,
            value,
        });
        self
    }

    /// Queues a delete. An empty key list queues nothing.
    pub fn delete<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if !keys.is_empty() {
            self.commands.push(Command::Delete(keys));
        }
        self
    }

    pub fn ttl(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Ttl(key.into()));
        self
    }

    /// Queues a set-add. An empty member list queues nothing.
    pub fn set_add<I, S>(&mut self, key: impl Into<String>, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members: Vec<String> = members.into_iter().map(Into::into).collect();
        if !members.is_empty() {
            self.commands.push(Command::SetAdd {
                key: key.into(),
                members,
            });
        }
        self
    }

    pub fn set_members(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::SetMembers(key.into()));
        self
    }

    pub fn expire(&mut self, key: impl Into<String>, ttl: u64) -> &mut Self {
        self.commands.push(Command::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    /// Runs the batch against `backend`, returning one reply per command.
    pub async fn execute(self, backend: &dyn Backend) -> Result<Vec<Reply>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        backend.execute(self).await
    }
}
