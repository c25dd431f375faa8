//! cacheref - entity-aware result caching
//!
//! Memoises async function results in a key-value store and keeps a reverse
//! index from domain entities to the cache entries that mention them, so a
//! change to one entity evicts exactly the results that depend on it.
//!
//! ```no_run
//! use cacheref::{CacheError, CacheOptions, EntityCache, FunctionId};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! # async fn run() -> Result<(), CacheError> {
//! let cache = EntityCache::in_memory();
//! let get_user = cache.wrap(
//!     FunctionId::new("app", "get_user").with_params(["user_id"]),
//!     CacheOptions::new().entity("user").ttl(60),
//!     |user_id: u64| async move {
//!         Ok::<_, CacheError>(User { id: user_id, name: "Ada".into() })
//!     },
//! )?;
//!
//! get_user.call(1).await?;
//! cache.invalidate_entity("user", 1).await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod resolver;
pub mod tasks;

pub use api::AppState;
pub use backend::{Backend, MemoryBackend, RedisBackend};
pub use cache::{
    CacheMeta, CacheOptions, CacheStats, CacheTarget, CachedFn, CallArgs, Codec, EntityCache,
    FunctionId, InvalidatingFn, JsonCodec, MessagePackCodec, Scope,
};
pub use config::{Config, EngineConfig};
pub use error::{CacheError, IdExtractionError, Result};
pub use extract::{EntityId, IdKind, IdPart, IdRule};
pub use resolver::{EntityResolver, Model, ModelDescriptor, ResolverRegistry};
pub use tasks::spawn_cleanup_task;
