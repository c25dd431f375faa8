//! Slot Module
//!
//! A single keyspace slot of the in-process backend: either a byte string
//! or a set of strings, with an optional expiry.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::backend::TTL_PERSISTENT;

// == Slot Value ==
/// Payload held by a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

// == Slot ==
/// Represents a single keyspace entry with value and expiry metadata.
#[derive(Debug, Clone)]
pub struct Slot {
    /// The stored payload
    pub value: SlotValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl Slot {
    // == Constructors ==
    /// Creates a byte-string slot with optional TTL in seconds.
    pub fn bytes(value: Vec<u8>, ttl_seconds: Option<u64>) -> Self {
        let now = current_timestamp_ms();
        Self {
            value: SlotValue::Bytes(value),
            created_at: now,
            expires_at: ttl_seconds.map(|ttl| expiry_from(now, ttl)),
        }
    }

    /// Creates an empty set slot without expiry.
    pub fn empty_set() -> Self {
        Self {
            value: SlotValue::Set(HashSet::new()),
            created_at: current_timestamp_ms(),
            expires_at: None,
        }
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its expiry.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now_ms >= expires)
    }

    // == Expiry ==
    /// Sets the expiry to `ttl_seconds` from now.
    pub fn expire_in(&mut self, ttl_seconds: u64) {
        self.expires_at = Some(expiry_from(current_timestamp_ms(), ttl_seconds));
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }

    /// Remaining TTL in whole seconds, rounded to nearest, or `-1` when the
    /// slot never expires.
    pub fn ttl_seconds(&self) -> i64 {
        match self.ttl_remaining_ms() {
            Some(ms) => i64::try_from(ms.saturating_add(500) / 1000).unwrap_or(i64::MAX),
            None => TTL_PERSISTENT,
        }
    }
}

// == Utility Functions ==
/// Absolute expiry `ttl_seconds` after `now_ms`, clamped at the end of time.
fn expiry_from(now_ms: u64, ttl_seconds: u64) -> u64 {
    now_ms.saturating_add(ttl_seconds.saturating_mul(1000))
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
