//! Codec Module
//!
//! Pluggable encoding of cached results to bytes.

use serde_json::Value;

use crate::error::{CacheError, Result};

// == Codec Trait ==
/// Turns a result into the bytes stored under a cache key and back.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

// == MessagePack Codec ==
/// Compact binary encoding. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

impl Codec for MessagePackCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        rmp_serde::from_slice(bytes).map_err(|e| CacheError::Deserialization(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "msgpack"
    }
}

// == JSON Codec ==
/// Textual encoding, readable with any Redis client.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Deserialization(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
