//! API Handlers
//!
//! HTTP request handlers for each admin endpoint. Every handler is a thin
//! shell over one [`EntityCache`] operation.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::backend::{MemoryBackend, RedisBackend};
use crate::cache::EntityCache;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::extract::EntityId;
use crate::models::{
    validate_name, CallInvalidatedResponse, CallRequest, EntityInvalidatedResponse,
    HealthResponse, InvalidatedResponse, KeyResponse, ReferencesResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// The engine is internally reference counted, so cloning the state per
/// request is cheap.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The caching engine
    pub cache: EntityCache,
    /// In-process backend the cleanup task should purge, if one is in use
    pub memory: Option<MemoryBackend>,
}

impl AppState {
    /// Creates a new AppState around an existing engine.
    pub fn new(cache: EntityCache) -> Self {
        Self {
            cache,
            memory: None,
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Connects to Redis when `redis_url` is set, otherwise runs on an
    /// in-process backend.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let builder = EntityCache::builder().config(config.engine.clone());

        match &config.redis_url {
            Some(url) => {
                let backend = RedisBackend::connect(url, &config.key_prefix).await?;
                info!(prefix = %config.key_prefix, "Connected to Redis");
                Ok(Self::new(builder.backend(backend).build()?))
            }
            None => {
                let backend = MemoryBackend::with_prefix(&config.key_prefix);
                let cache = builder.backend(backend.clone()).build()?;
                Ok(Self {
                    cache,
                    memory: Some(backend),
                })
            }
        }
    }
}

fn check_name(name: &str) -> Result<()> {
    match validate_name(name) {
        Some(error_msg) => Err(CacheError::InvalidRequest(error_msg)),
        None => Ok(()),
    }
}

/// Handler for DELETE /entities/:entity/:id
///
/// Evicts every cached result that referenced the entity.
pub async fn invalidate_entity_handler(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Json<EntityInvalidatedResponse>> {
    check_name(&entity)?;

    let invalidated = state
        .cache
        .invalidate_entity(&entity, EntityId::parse(&id))
        .await;

    Ok(Json(EntityInvalidatedResponse::new(entity, id, invalidated)))
}

/// Handler for GET /entities/:entity/:id
///
/// Lists the cache keys the entity index currently holds.
pub async fn entity_references_handler(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Json<ReferencesResponse>> {
    check_name(&entity)?;

    let keys = state
        .cache
        .entity_references(&entity, EntityId::parse(&id))
        .await?;

    Ok(Json(ReferencesResponse::new(entity, id, keys)))
}

/// Handler for DELETE /functions/:name
///
/// Evicts every cached result of the function registered under `name`.
pub async fn invalidate_function_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<InvalidatedResponse>> {
    check_name(&name)?;

    let invalidated = state.cache.invalidate_function(name.as_str()).await;

    Ok(Json(InvalidatedResponse::new(&name, invalidated)))
}

/// Handler for POST /calls/invalidate
///
/// Evicts the cached result of one exact call.
pub async fn invalidate_call_handler(
    State(state): State<AppState>,
    Json(req): Json<CallRequest>,
) -> Result<Json<CallInvalidatedResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let args = req.call_args();
    let key = state.cache.compute_cache_key(req.name.as_str(), &args);
    let invalidated = state.cache.invalidate_call(req.name.as_str(), &args).await;

    Ok(Json(CallInvalidatedResponse { invalidated, key }))
}

/// Handler for POST /calls/key
///
/// Computes the key a call would read and write, without touching the
/// backend.
pub async fn call_key_handler(
    State(state): State<AppState>,
    Json(req): Json<CallRequest>,
) -> Result<Json<KeyResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let key = state
        .cache
        .compute_cache_key(req.name.as_str(), &req.call_args());

    Ok(Json(KeyResponse { key }))
}

/// Handler for DELETE /all
pub async fn invalidate_all_handler(State(state): State<AppState>) -> Json<InvalidatedResponse> {
    let invalidated = state.cache.invalidate_all().await;
    Json(InvalidatedResponse::new("all functions", invalidated))
}

/// Handler for GET /stats
///
/// Returns the engine counters since startup.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.backend().name(),
        state.cache.stats(),
    ))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
