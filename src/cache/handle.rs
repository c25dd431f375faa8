//! Cached Function Handles
//!
//! Options accepted by [`EntityCache::wrap`], the metadata it resolves
//! from them, and the callable handles it returns.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::cache::engine::EntityCache;
use crate::cache::key::{cache_key, CallArgs, FunctionId, Scope};
use crate::error::{CacheError, Result};
use crate::extract::{IdKind, IdRule};
use crate::resolver::{Model, ModelDescriptor};

// == Cache Options ==
/// Per-function caching settings.
///
/// ```
/// use cacheref::{CacheOptions, IdRule, Scope};
/// let options = CacheOptions::new()
///     .entity("user")
///     .id_rule(IdRule::field("user_id"))
///     .scope(Scope::Entity)
///     .ttl(60);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub(crate) entity: Option<String>,
    pub(crate) id_rule: Option<IdRule>,
    pub(crate) model: Option<ModelDescriptor>,
    pub(crate) cache_name: Option<String>,
    pub(crate) normalize_args: bool,
    pub(crate) ttl: Option<u64>,
    pub(crate) scope: Scope,
    pub(crate) supported_id_kinds: Option<Vec<IdKind>>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity type the results refer to; enables reverse indexing.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Where the id sits in each result item. Defaults to the `id` field.
    pub fn id_rule(mut self, rule: impl Into<IdRule>) -> Self {
        self.id_rule = Some(rule.into());
        self
    }

    /// Takes the entity type and id rule from a model. Explicit `entity`
    /// and `id_rule` settings still win.
    pub fn model<M: Model>(self) -> Self {
        self.model_descriptor(M::descriptor())
    }

    pub fn model_descriptor(mut self, model: ModelDescriptor) -> Self {
        self.model = Some(model);
        self
    }

    /// Replaces the key prefix entirely.
    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = Some(name.into());
        self
    }

    pub fn normalize_args(mut self, normalize: bool) -> Self {
        self.normalize_args = normalize;
        self
    }

    /// TTL in seconds for this function's entries.
    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn supported_id_kinds(mut self, kinds: Vec<IdKind>) -> Self {
        self.supported_id_kinds = Some(kinds);
        self
    }
}

// == Cache Meta ==
/// Settings of a wrapped function after resolution.
#[derive(Debug, Clone)]
pub struct CacheMeta {
    pub function: FunctionId,
    /// Key namespace: `cache:{prefix}:{digest}`
    pub prefix: String,
    pub entity: Option<String>,
    pub id_rule: IdRule,
    pub scope: Scope,
    /// Entry TTL in seconds
    pub ttl: u64,
    pub normalize_args: bool,
    pub supported_id_kinds: Vec<IdKind>,
}

impl CacheMeta {
    /// Key for a call with `args`.
    pub fn key_for(&self, args: &CallArgs) -> String {
        if self.normalize_args {
            cache_key(&self.prefix, &args.normalized(self.function.params()))
        } else {
            cache_key(&self.prefix, args)
        }
    }
}

// == Cached Function ==
/// A memoised function returned by [`EntityCache::wrap`].
pub struct CachedFn<F> {
    cache: EntityCache,
    meta: Arc<CacheMeta>,
    f: F,
}

impl<F> CachedFn<F> {
    pub(crate) fn new(cache: EntityCache, meta: Arc<CacheMeta>, f: F) -> Self {
        Self { cache, meta, f }
    }

    pub fn meta(&self) -> &CacheMeta {
        &self.meta
    }

    /// The key a call with `args` uses.
    pub fn cache_key<A: Serialize + ?Sized>(&self, args: &A) -> Result<String> {
        Ok(self.meta.key_for(&CallArgs::from_serialize(args)?))
    }

    /// Drops the cached entry of one call.
    pub async fn invalidate<A: Serialize + ?Sized>(&self, args: &A) -> bool {
        match CallArgs::from_serialize(args) {
            Ok(args) => self.cache.invalidate_call(self.meta.as_ref(), &args).await,
            Err(e) => {
                warn!(function = %self.meta.function, error = %e, "Cannot invalidate call");
                false
            }
        }
    }

    /// Drops every cached entry of this function.
    pub async fn invalidate_all(&self) -> u64 {
        self.cache.invalidate_function(self.meta.as_ref()).await
    }

    // == Call ==
    /// Returns the cached result for `args`, or runs the function and
    /// caches what it returns.
    ///
    /// Errors of the function propagate unchanged and are never cached.
    /// The only caching-layer error that reaches the caller is a failed
    /// id extraction, converted through `E: From<CacheError>`.
    pub async fn call<A, T, E, Fut>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        A: Serialize,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
    {
        if !self.cache.config().enabled {
            return (self.f)(args).await;
        }

        let key = match CallArgs::from_serialize(&args) {
            Ok(call_args) => self.meta.key_for(&call_args),
            Err(e) => {
                warn!(function = %self.meta.function, error = %e, "Arguments not serialisable, calling uncached");
                return (self.f)(args).await;
            }
        };

        if let Some(cached) = self.cache.lookup::<T>(&key).await {
            return Ok(cached);
        }

        let result = (self.f)(args).await?;
        self.cache
            .store(&self.meta, &key, &result)
            .await
            .map_err(E::from)?;
        Ok(result)
    }
}

impl<F> fmt::Debug for CachedFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFn").field("meta", &self.meta).finish()
    }
}

// == Invalidating Function ==
/// A mutating function returned by [`EntityCache::invalidating`]; every
/// successful call invalidates the entities its result refers to.
pub struct InvalidatingFn<F> {
    cache: EntityCache,
    entity: String,
    id_rule: IdRule,
    f: F,
}

impl<F> InvalidatingFn<F> {
    pub(crate) fn new(cache: EntityCache, entity: String, id_rule: IdRule, f: F) -> Self {
        Self {
            cache,
            entity,
            id_rule,
            f,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub async fn call<A, T, E, Fut>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize,
    {
        let result = (self.f)(args).await?;
        let label = format!("invalidating:{}", self.entity);
        self.cache
            .invalidate_referenced(&label, &self.entity, &self.id_rule, &result)
            .await;
        Ok(result)
    }
}

impl<F> fmt::Debug for InvalidatingFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidatingFn")
            .field("entity", &self.entity)
            .field("id_rule", &self.id_rule)
            .finish()
    }
}
