//! Cache Module
//!
//! The entity-reference caching engine: key construction, codecs, the
//! read/write protocol, invalidation and the handles of wrapped functions.

mod codec;
mod engine;
mod handle;
mod key;
mod signatures;
mod stats;


// Re-export public types
pub use codec::{Codec, JsonCodec, MessagePackCodec};
pub use engine::{is_indexable, needs_extension, CacheTarget, EntityCache, EntityCacheBuilder};
pub use handle::{CacheMeta, CacheOptions, CachedFn, InvalidatingFn};
pub use key::{
    cache_key, cache_key_pattern, effective_prefix, entity_index_key, normalize_value, CallArgs,
    FunctionId, Scope, CACHE_KEY_NAMESPACE, ENTITY_KEY_NAMESPACE, NO_ARGS,
};
pub use signatures::{Signature, SignatureCache, DEFAULT_SIGNATURE_CAPACITY};
pub use stats::{CacheStats, StatsRecorder};
