//! Cache Engine Module
//!
//! The read path, the batched write protocol that stores a result together
//! with its entity reverse indices, and the invalidation algorithms.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, MemoryBackend, TTL_ABSENT};
use crate::cache::codec::{Codec, MessagePackCodec};
use crate::cache::handle::{CacheMeta, CacheOptions, CachedFn, InvalidatingFn};
use crate::cache::key::{
    cache_key, cache_key_pattern, effective_prefix, entity_index_key, CallArgs, FunctionId, Scope,
};
use crate::cache::signatures::{Signature, SignatureCache};
use crate::cache::stats::{CacheStats, StatsRecorder};
use crate::config::{validate_id_kinds, EngineConfig};
use crate::error::{CacheError, Result};
use crate::extract::{extract_ids, EntityId, ExtractSettings, IdRule};
use crate::resolver::ResolverRegistry;

// == Cache Target ==
/// Anything that names a cached function: its effective prefix as a
/// string, or the handle returned by [`EntityCache::wrap`].
pub trait CacheTarget {
    /// The key namespace (`cache:{prefix}:...`) of the function.
    fn prefix(&self) -> Cow<'_, str>;

    /// How the function normalises its arguments, when known directly.
    fn signature(&self) -> Option<Signature> {
        None
    }
}

impl CacheTarget for str {
    fn prefix(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl CacheTarget for String {
    fn prefix(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl CacheTarget for CacheMeta {
    fn prefix(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.prefix.as_str())
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature {
            params: self.function.params().to_vec(),
            normalize: self.normalize_args,
        })
    }
}

impl<F> CacheTarget for CachedFn<F> {
    fn prefix(&self) -> Cow<'_, str> {
        self.meta().prefix()
    }

    fn signature(&self) -> Option<Signature> {
        self.meta().signature()
    }
}

/// Distinct index keys for `ids`, in first-seen order. Ids that differ
/// only in kind (`1` and `"1"`) share one index.
fn index_keys(entity: &str, ids: &[EntityId]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| entity_index_key(entity, id))
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Whether a result counts as non-empty. Empty results are cached but
/// never entity-indexed.
pub fn is_indexable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// High-water-mark rule for entity-index expiry: extend when the index has
/// no expiry (or is absent) or when the candidate outlives the current one.
pub fn needs_extension(current_ttl: i64, candidate_ttl: u64) -> bool {
    current_ttl < 0 || i64::try_from(candidate_ttl).map_or(true, |c| c > current_ttl)
}

struct Inner {
    backend: Arc<dyn Backend>,
    codec: Arc<dyn Codec>,
    config: EngineConfig,
    signatures: SignatureCache,
    resolvers: ResolverRegistry,
    stats: StatsRecorder,
}

// == Entity Cache ==
/// Memoising cache with entity-based invalidation.
///
/// Cloning is cheap and every clone shares the backend, the signature
/// cache and the statistics.
#[derive(Clone)]
pub struct EntityCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("backend", &self.inner.backend.name())
            .field("codec", &self.inner.codec.name())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl EntityCache {
    // == Constructors ==
    pub fn builder() -> EntityCacheBuilder {
        EntityCacheBuilder::default()
    }

    /// Creates an engine over `backend` with the default codec.
    pub fn new(backend: Arc<dyn Backend>, config: EngineConfig) -> Result<Self> {
        Self::builder()
            .shared_backend(backend)
            .config(config)
            .build()
    }

    /// Engine over a fresh in-process backend with default settings.
    pub fn in_memory() -> Self {
        let config = EngineConfig::default();
        Self::from_parts(
            Arc::new(MemoryBackend::new()),
            Arc::new(MessagePackCodec),
            config,
            ResolverRegistry::default(),
        )
    }

    fn from_parts(
        backend: Arc<dyn Backend>,
        codec: Arc<dyn Codec>,
        config: EngineConfig,
        resolvers: ResolverRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                codec,
                signatures: SignatureCache::new(config.signature_capacity),
                config,
                resolvers,
                stats: StatsRecorder::new(),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    pub fn signatures(&self) -> &SignatureCache {
        &self.inner.signatures
    }

    // == Wrap ==
    /// Wraps `f` so its results are cached and entity-indexed.
    ///
    /// All settings are checked here; an invalid combination is a
    /// [`CacheError::Configuration`] and nothing is registered.
    ///
    /// # Arguments
    /// * `function` - Identity and parameter names of `f`
    /// * `options` - Entity, id rule, naming, TTL and scope settings
    /// * `f` - The function to memoise
    pub fn wrap<F>(&self, function: FunctionId, options: CacheOptions, f: F) -> Result<CachedFn<F>> {
        let meta = self.resolve_meta(function, options)?;

        self.inner.signatures.register(
            &meta.prefix,
            Signature {
                params: meta.function.params().to_vec(),
                normalize: meta.normalize_args,
            },
        );
        debug!(
            function = %meta.function,
            prefix = %meta.prefix,
            ttl = meta.ttl,
            "Wrapped function"
        );

        Ok(CachedFn::new(self.clone(), Arc::new(meta), f))
    }

    fn resolve_meta(&self, function: FunctionId, options: CacheOptions) -> Result<CacheMeta> {
        let config = &self.inner.config;

        let resolved = match &options.model {
            Some(model) => Some(self.inner.resolvers.resolve(model)?),
            None => None,
        };
        let entity = options
            .entity
            .or_else(|| resolved.as_ref().map(|r| r.entity.clone()));
        let id_rule = options
            .id_rule
            .or_else(|| resolved.map(|r| r.id_rule))
            .unwrap_or_default();

        if entity.as_deref().is_some_and(str::is_empty) {
            return Err(CacheError::Configuration(
                "entity type must not be empty".to_string(),
            ));
        }
        if options.cache_name.as_deref().is_some_and(str::is_empty) {
            return Err(CacheError::Configuration(
                "cache name must not be empty".to_string(),
            ));
        }
        if options.scope == Scope::Entity && entity.is_none() {
            return Err(CacheError::Configuration(format!(
                "{} uses entity scope without an entity type",
                function
            )));
        }

        let ttl = config.effective_ttl(options.ttl)?;
        let supported_id_kinds = match options.supported_id_kinds {
            Some(kinds) => {
                validate_id_kinds(&kinds)?;
                kinds
            }
            None => config.supported_id_kinds.clone(),
        };

        let prefix = effective_prefix(
            &function,
            options.cache_name.as_deref(),
            entity.as_deref(),
            options.scope,
        );

        Ok(CacheMeta {
            function,
            prefix,
            entity,
            id_rule,
            scope: options.scope,
            ttl,
            normalize_args: options.normalize_args,
            supported_id_kinds,
        })
    }

    // == Invalidating Wrapper ==
    /// Wraps a mutating function: after it succeeds, every entity its
    /// result refers to is invalidated.
    pub fn invalidating<F>(&self, entity: impl Into<String>, id_rule: IdRule, f: F) -> InvalidatingFn<F> {
        InvalidatingFn::new(self.clone(), entity.into(), id_rule, f)
    }

    // == Key Computation ==
    /// The key a call of `target` with `args` reads and writes.
    ///
    /// For a name, arguments are normalised the way the most recent
    /// function wrapped under that prefix does.
    pub fn compute_cache_key<T: CacheTarget + ?Sized>(&self, target: &T, args: &CallArgs) -> String {
        let prefix = target.prefix();
        let signature = target
            .signature()
            .or_else(|| self.inner.signatures.lookup(&prefix));

        match signature {
            Some(sig) if sig.normalize => cache_key(&prefix, &args.normalized(&sig.params)),
            _ => cache_key(&prefix, args),
        }
    }

    // == Read Path ==
    /// Reads and decodes `key`. Backend and decoding failures are misses.
    pub(crate) async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.inner.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                self.inner.stats.record_miss();
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                self.inner.stats.record_miss();
                return None;
            }
        };

        let decoded = self.inner.codec.decode(&bytes).and_then(|value| {
            serde_json::from_value::<T>(value).map_err(|e| CacheError::Deserialization(e.to_string()))
        });

        match decoded {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                self.inner.stats.record_hit();
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.inner.stats.record_miss();
                None
            }
        }
    }

    // == Write Path ==
    /// Stores `result` under `key` and indexes it by the entities it
    /// refers to.
    ///
    /// Only an id extraction failure is returned; every storage or codec
    /// failure is logged and leaves the result uncached.
    pub(crate) async fn store<T: Serialize + ?Sized>(
        &self,
        meta: &CacheMeta,
        key: &str,
        result: &T,
    ) -> Result<()> {
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Result is not serialisable, skipping cache");
                return Ok(());
            }
        };
        let bytes = match self.inner.codec.encode(&value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Result encoding failed, skipping cache");
                return Ok(());
            }
        };

        let index_keys = match &meta.entity {
            Some(entity) if is_indexable(&value) => {
                let settings = ExtractSettings {
                    supported: &meta.supported_id_kinds,
                    fail_on_missing: self.inner.config.fail_on_missing_id,
                };
                let label = meta.function.qualified_name();
                let ids = extract_ids(&label, &value, &meta.id_rule, settings).map_err(|e| {
                    error!(
                        function = %label,
                        item = %e.item,
                        rule = %e.rule,
                        "{}",
                        e.message
                    );
                    e
                })?;
                index_keys(entity, &ids)
            }
            _ => Vec::new(),
        };

        self.write_entry(key, meta.ttl, bytes, &index_keys).await;
        Ok(())
    }

    /// Writes one entry and adds it to every index in `index_keys`.
    ///
    /// Current index TTLs are read in one preliminary batch; the value and
    /// index updates then go out as a single batch, value first.
    pub(crate) async fn write_entry(&self, key: &str, ttl: u64, bytes: Vec<u8>, index_keys: &[String]) {
        let backend = self.inner.backend.as_ref();

        let current_ttls: Vec<i64> = if index_keys.is_empty() {
            Vec::new()
        } else {
            let mut ttl_check = backend.pipeline();
            for index_key in index_keys {
                ttl_check.ttl(index_key.as_str());
            }
            match ttl_check.execute(backend).await {
                Ok(replies) => replies
                    .iter()
                    .map(|reply| reply.as_ttl().unwrap_or(TTL_ABSENT))
                    .collect(),
                Err(e) => {
                    warn!(key = %key, error = %e, "Index TTL lookup failed, skipping cache write");
                    self.inner.stats.record_write_failure();
                    return;
                }
            }
        };

        let candidate = ttl.saturating_add(self.inner.config.reverse_index_ttl_gap);
        let mut pipe = backend.pipeline();
        pipe.set_with_expiry(key, ttl, bytes);
        for (index_key, current) in index_keys.iter().zip(current_ttls) {
            pipe.set_add(index_key.as_str(), [key]);
            if needs_extension(current, candidate) {
                pipe.expire(index_key.as_str(), candidate);
            }
        }

        let commands = pipe.len();
        match pipe.execute(backend).await {
            Ok(_) => {
                debug!(key = %key, ttl, indices = index_keys.len(), commands, "Cached result");
                self.inner.stats.record_write();
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache write failed");
                self.inner.stats.record_write_failure();
            }
        }
    }

    // == Invalidation ==
    /// Removes every cache entry that referenced the entity, plus its
    /// index. Returns the number of entries the index listed.
    pub async fn invalidate_entity(&self, entity: &str, id: impl Into<EntityId>) -> u64 {
        let id = id.into();
        let index_key = entity_index_key(entity, &id);
        let backend = self.inner.backend.as_ref();

        let members = match backend.set_members(&index_key).await {
            Ok(members) => members,
            Err(e) => {
                warn!(entity = %entity, id = %id, error = %e, "Entity invalidation failed");
                return 0;
            }
        };
        if members.is_empty() {
            debug!(entity = %entity, id = %id, "No cache entries for entity");
            return 0;
        }

        let mut pipe = backend.pipeline();
        for member in &members {
            pipe.delete([member.as_str()]);
        }
        pipe.delete([index_key.as_str()]);

        match pipe.execute(backend).await {
            Ok(_) => {
                let count = members.len() as u64;
                info!(entity = %entity, id = %id, count, "Invalidated entity");
                self.inner.stats.record_invalidated(count);
                count
            }
            Err(e) => {
                warn!(entity = %entity, id = %id, error = %e, "Entity invalidation failed");
                0
            }
        }
    }

    /// Removes every cache entry of a function. Entity indices are left to
    /// expire on their own.
    pub async fn invalidate_function<T: CacheTarget + ?Sized>(&self, target: &T) -> u64 {
        let prefix = target.prefix();
        let pattern = cache_key_pattern(&prefix);
        let backend = self.inner.backend.as_ref();

        let keys = match backend.list_keys(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(function = %prefix, error = %e, "Function invalidation failed");
                return 0;
            }
        };
        if keys.is_empty() {
            debug!(function = %prefix, "No cache entries for function");
            return 0;
        }

        match backend.delete(&keys).await {
            Ok(_) => {
                let count = keys.len() as u64;
                info!(function = %prefix, count, "Invalidated function");
                self.inner.stats.record_invalidated(count);
                count
            }
            Err(e) => {
                warn!(function = %prefix, error = %e, "Function invalidation failed");
                0
            }
        }
    }

    /// Removes the entry of one exact call. Succeeds whether or not the
    /// entry existed; `false` only when the backend failed.
    pub async fn invalidate_call<T: CacheTarget + ?Sized>(&self, target: &T, args: &CallArgs) -> bool {
        let key = self.compute_cache_key(target, args);
        match self.inner.backend.delete(&[key.clone()]).await {
            Ok(removed) => {
                debug!(key = %key, removed, "Invalidated call");
                self.inner.stats.record_invalidated(removed);
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Call invalidation failed");
                false
            }
        }
    }

    /// Removes every key in the namespace, entries and indices alike.
    pub async fn invalidate_all(&self) -> u64 {
        let backend = self.inner.backend.as_ref();
        let keys = match backend.list_keys("*").await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Global invalidation failed");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }

        match backend.delete(&keys).await {
            Ok(removed) => {
                info!(count = removed, "Invalidated all cache keys");
                self.inner.stats.record_invalidated(removed);
                removed
            }
            Err(e) => {
                warn!(error = %e, "Global invalidation failed");
                0
            }
        }
    }

    /// Invalidates every entity a mutation result refers to. Extraction
    /// here never fails the caller; ids that cannot be read are logged.
    pub(crate) async fn invalidate_referenced<T: Serialize + ?Sized>(
        &self,
        label: &str,
        entity: &str,
        id_rule: &IdRule,
        result: &T,
    ) -> u64 {
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                warn!(function = %label, error = %e, "Mutation result is not serialisable");
                return 0;
            }
        };
        if !is_indexable(&value) {
            return 0;
        }

        let settings = ExtractSettings {
            supported: &self.inner.config.supported_id_kinds,
            fail_on_missing: false,
        };
        let ids = match extract_ids(label, &value, id_rule, settings) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(function = %label, error = %e, "Could not read ids to invalidate");
                return 0;
            }
        };

        let mut total = 0;
        for id in ids {
            total += self.invalidate_entity(entity, id).await;
        }
        total
    }

    // == Introspection ==
    /// Cache keys currently listed in an entity's index, sorted.
    pub async fn entity_references(&self, entity: &str, id: impl Into<EntityId>) -> Result<Vec<String>> {
        let index_key = entity_index_key(entity, &id.into());
        let mut keys: Vec<String> = self
            .inner
            .backend
            .set_members(&index_key)
            .await?
            .into_iter()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// == Builder ==
/// Assembles an [`EntityCache`]. Unset parts fall back to an in-process
/// backend, the MessagePack codec, default settings and the built-in
/// resolvers.
#[derive(Default)]
pub struct EntityCacheBuilder {
    backend: Option<Arc<dyn Backend>>,
    codec: Option<Arc<dyn Codec>>,
    config: Option<EngineConfig>,
    resolvers: Option<ResolverRegistry>,
}

impl EntityCacheBuilder {
    pub fn backend(mut self, backend: impl Backend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    pub fn shared_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    pub fn build(self) -> Result<EntityCache> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));
        let codec = self.codec.unwrap_or_else(|| Arc::new(MessagePackCodec));
        info!(
            backend = backend.name(),
            codec = codec.name(),
            default_ttl = config.default_ttl,
            "Entity cache ready"
        );

        Ok(EntityCache::from_parts(
            backend,
            codec,
            config,
            self.resolvers.unwrap_or_default(),
        ))
    }
}
