//! Integration Tests for the Caching Engine
//!
//! Drives the public engine API end to end over the in-process backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cacheref::{
    Backend, CacheError, CacheOptions, CachedFn, CallArgs, EngineConfig, EntityCache, EntityId,
    FunctionId, IdRule, MemoryBackend, Model, ModelDescriptor, Scope,
};
use serde_json::{json, Value};

type UserFuture = Pin<Box<dyn Future<Output = Result<Value, CacheError>> + Send>>;

// == Helper Functions ==

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}

fn engine_over(backend: &MemoryBackend) -> EntityCache {
    EntityCache::builder()
        .backend(backend.clone())
        .build()
        .unwrap()
}

// == Hit / Miss ==

#[tokio::test]
async fn test_basic_hit_and_miss() {
    let cache = EntityCache::in_memory();
    let calls = counter();
    let seen = calls.clone();

    let add = cache
        .wrap(
            FunctionId::new("math", "add").with_params(["a", "b"]),
            CacheOptions::new(),
            move |(a, b): (i64, i64)| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(a + b)
                }
            },
        )
        .unwrap();

    assert_eq!(add.call((1, 2)).await.unwrap(), 3);
    assert_eq!(count(&calls), 1);

    assert_eq!(add.call((1, 2)).await.unwrap(), 3);
    assert_eq!(count(&calls), 1);

    assert_eq!(add.call((2, 3)).await.unwrap(), 5);
    assert_eq!(count(&calls), 2);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn test_repeated_calls_compute_once() {
    let cache = EntityCache::in_memory();
    let calls = counter();
    let seen = calls.clone();

    let get_user = cache
        .wrap(
            FunctionId::new("app", "get_user").with_params(["user_id"]),
            CacheOptions::new().entity("user"),
            move |user_id: u64| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(json!({"id": user_id, "name": "Ada"}))
                }
            },
        )
        .unwrap();

    for _ in 0..10 {
        get_user.call(1).await.unwrap();
    }
    assert_eq!(count(&calls), 1);
}

// == Scopes ==

fn user_lookup(
    cache: &EntityCache,
    name: &str,
    scope: Scope,
    calls: Arc<AtomicUsize>,
) -> CachedFn<impl Fn(u64) -> UserFuture> {
    cache
        .wrap(
            FunctionId::new("app", name).with_params(["user_id"]),
            CacheOptions::new()
                .entity("user")
                .scope(scope)
                .normalize_args(true),
            move |user_id: u64| -> UserFuture {
                let calls = calls.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(json!({"id": user_id}))
                })
            },
        )
        .unwrap()
}

#[tokio::test]
async fn test_entity_scope_shares_one_slot() {
    let cache = EntityCache::in_memory();
    let calls = counter();

    let by_id = user_lookup(&cache, "get_user", Scope::Entity, calls.clone());
    let by_profile = user_lookup(&cache, "get_profile_owner", Scope::Entity, calls.clone());

    by_id.call(1).await.unwrap();
    by_profile.call(1).await.unwrap();

    assert_eq!(count(&calls), 1, "second function should hit the shared slot");
    assert_eq!(by_id.cache_key(&1).unwrap(), by_profile.cache_key(&1).unwrap());
    assert!(by_id.cache_key(&1).unwrap().starts_with("cache:entity:user:"));
}

#[tokio::test]
async fn test_function_scope_isolates_slots() {
    let cache = EntityCache::in_memory();
    let calls = counter();

    let by_id = user_lookup(&cache, "get_user", Scope::Function, calls.clone());
    let by_profile = user_lookup(&cache, "get_profile_owner", Scope::Function, calls.clone());

    by_id.call(1).await.unwrap();
    by_profile.call(1).await.unwrap();

    assert_eq!(count(&calls), 2);
    assert_ne!(by_id.cache_key(&1).unwrap(), by_profile.cache_key(&1).unwrap());

    // Both entries reference the same entity
    let refs = cache.entity_references("user", 1).await.unwrap();
    assert_eq!(refs.len(), 2);
}

// == Entity Invalidation ==

#[tokio::test]
async fn test_entity_invalidation_is_precise() {
    let cache = EntityCache::in_memory();
    let calls = counter();
    let get_user = user_lookup(&cache, "get_user", Scope::Function, calls.clone());

    get_user.call(1).await.unwrap();
    get_user.call(2).await.unwrap();
    assert_eq!(count(&calls), 2);

    assert_eq!(cache.invalidate_entity("user", 1).await, 1);

    get_user.call(2).await.unwrap();
    assert_eq!(count(&calls), 2, "id 2 should still hit");

    get_user.call(1).await.unwrap();
    assert_eq!(count(&calls), 3, "id 1 should recompute");
}

#[tokio::test]
async fn test_list_results_index_every_item() {
    let cache = EntityCache::in_memory();
    let calls = counter();
    let seen = calls.clone();

    let list_team = cache
        .wrap(
            FunctionId::new("app", "list_team").with_params(["team_id"]),
            CacheOptions::new().entity("user"),
            move |_team_id: u64| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(json!([{"id": 1}, {"id": 2}, {"id": 3}]))
                }
            },
        )
        .unwrap();

    list_team.call(10).await.unwrap();
    for id in 1..=3 {
        assert_eq!(cache.entity_references("user", id).await.unwrap().len(), 1);
    }

    cache.invalidate_entity("user", 3).await;
    list_team.call(10).await.unwrap();
    assert_eq!(count(&calls), 2);
}

#[tokio::test]
async fn test_empty_results_are_cached_but_not_indexed() {
    let backend = MemoryBackend::new();
    let cache = engine_over(&backend);
    let calls = counter();
    let seen = calls.clone();

    let search = cache
        .wrap(
            FunctionId::new("app", "search").with_params(["query"]),
            CacheOptions::new().entity("user"),
            move |_query: String| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(Vec::<Value>::new())
                }
            },
        )
        .unwrap();

    search.call("nobody".to_string()).await.unwrap();
    search.call("nobody".to_string()).await.unwrap();

    assert_eq!(count(&calls), 1);
    // Only the entry itself exists
    assert_eq!(backend.list_keys("entity:*").await.unwrap().len(), 0);
    assert_eq!(backend.list_keys("cache:*").await.unwrap().len(), 1);
}

// == Composite Ids ==

#[tokio::test]
async fn test_composite_id_invalidation() {
    let cache = EntityCache::in_memory();
    let calls = counter();
    let seen = calls.clone();

    let get_line = cache
        .wrap(
            FunctionId::new("shop", "get_order_line").with_params(["order_key", "product_key"]),
            CacheOptions::new()
                .entity("order_line")
                .id_rule(IdRule::fields(["order_key", "product_key"])),
            move |(order_key, product_key): (String, i64)| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(json!({
                        "order_key": order_key,
                        "product_key": product_key,
                        "quantity": 2,
                    }))
                }
            },
        )
        .unwrap();

    let args = ("A1".to_string(), 7);
    get_line.call(args.clone()).await.unwrap();
    assert_eq!(count(&calls), 1);

    // Part of the id is not the entity
    assert_eq!(cache.invalidate_entity("order_line", "A1").await, 0);
    get_line.call(args.clone()).await.unwrap();
    assert_eq!(count(&calls), 1);

    assert_eq!(cache.invalidate_entity("order_line", ("A1", 7)).await, 1);
    get_line.call(args).await.unwrap();
    assert_eq!(count(&calls), 2);
}

#[tokio::test]
async fn test_function_rule_derives_ids() {
    let cache = EntityCache::in_memory();

    let get_doc = cache
        .wrap(
            FunctionId::new("docs", "get").with_params(["slug"]),
            CacheOptions::new().entity("document").id_rule(IdRule::function(
                "meta.uuid",
                |item: &Value| Ok(item.get("meta").and_then(|m| m.get("uuid")).cloned()),
            )),
            |slug: String| async move {
                Ok::<_, CacheError>(json!({"slug": slug, "meta": {"uuid": "d-42"}}))
            },
        )
        .unwrap();

    get_doc.call("intro".to_string()).await.unwrap();

    let refs = cache
        .entity_references("document", EntityId::parse("d-42"))
        .await
        .unwrap();
    assert_eq!(refs.len(), 1);
}

#[tokio::test]
async fn test_missing_id_fails_in_strict_mode() {
    let cache = EntityCache::in_memory();

    let get_user = cache
        .wrap(
            FunctionId::new("app", "get_nameless").with_params(["user_id"]),
            CacheOptions::new().entity("user"),
            |_user_id: u64| async move { Ok::<_, CacheError>(json!({"name": "no id"})) },
        )
        .unwrap();

    let result = get_user.call(1).await;
    assert!(matches!(result, Err(CacheError::IdExtraction(_))));
}

#[tokio::test]
async fn test_missing_id_is_skipped_when_lenient() {
    let cache = EntityCache::builder()
        .config(EngineConfig {
            fail_on_missing_id: false,
            ..EngineConfig::default()
        })
        .build()
        .unwrap();

    let list_users = cache
        .wrap(
            FunctionId::new("app", "list_users"),
            CacheOptions::new().entity("user"),
            |_: ()| async move { Ok::<_, CacheError>(json!([{"id": 1}, {"name": "ghost"}])) },
        )
        .unwrap();

    list_users.call(()).await.unwrap();
    assert_eq!(cache.entity_references("user", 1).await.unwrap().len(), 1);
}

// == TTL ==

#[tokio::test]
async fn test_very_long_ttl_is_cached_without_failing() {
    let backend = MemoryBackend::new();
    let cache = engine_over(&backend);
    let calls = counter();
    let seen = calls.clone();

    let get_user = cache
        .wrap(
            FunctionId::new("app", "get_forever").with_params(["user_id"]),
            CacheOptions::new().entity("user").ttl(u64::MAX / 100),
            move |user_id: u64| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(json!({"id": user_id}))
                }
            },
        )
        .unwrap();

    get_user.call(1).await.unwrap();
    get_user.call(1).await.unwrap();

    assert_eq!(count(&calls), 1);
    assert!(backend.time_to_live("entity:user:1").await.unwrap() > 0);
}

#[tokio::test]
async fn test_index_ttl_high_water_mark() {
    let backend = MemoryBackend::new();
    let cache = engine_over(&backend);

    let writer = |name: &'static str, ttl: u64| {
        cache
            .wrap(
                FunctionId::new("app", name).with_params(["user_id"]),
                CacheOptions::new().entity("user").ttl(ttl),
                |user_id: u64| async move { Ok::<_, CacheError>(json!({"id": user_id})) },
            )
            .unwrap()
    };

    writer("short", 10).call(1).await.unwrap();
    assert_eq!(backend.time_to_live("entity:user:1").await.unwrap(), 310);

    writer("long", 90).call(1).await.unwrap();
    assert_eq!(backend.time_to_live("entity:user:1").await.unwrap(), 390);

    writer("shorter", 5).call(1).await.unwrap();
    assert_eq!(backend.time_to_live("entity:user:1").await.unwrap(), 390);

    assert_eq!(backend.set_members("entity:user:1").await.unwrap().len(), 3);
}

// == Naming ==

#[tokio::test]
async fn test_custom_cache_name() {
    let cache = EntityCache::in_memory();
    let calls = counter();
    let seen = calls.clone();

    let get_user = cache
        .wrap(
            FunctionId::new("app", "get_user").with_params(["user_id"]),
            CacheOptions::new().entity("user").cache_name("users_v2"),
            move |user_id: u64| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(json!({"id": user_id}))
                }
            },
        )
        .unwrap();

    get_user.call(1).await.unwrap();
    get_user.call(2).await.unwrap();
    assert!(get_user.cache_key(&1).unwrap().starts_with("cache:users_v2:"));

    assert_eq!(cache.invalidate_function("app.get_user").await, 0);
    assert_eq!(cache.invalidate_function("users_v2").await, 2);

    get_user.call(1).await.unwrap();
    assert_eq!(count(&calls), 3);
}

#[tokio::test]
async fn test_invalidate_call_by_name_matches_handle() {
    let cache = EntityCache::in_memory();
    let calls = counter();
    let get_user = user_lookup(&cache, "get_user", Scope::Function, calls.clone());

    get_user.call(1).await.unwrap();

    let args = CallArgs::new().kwarg("user_id", 1);
    assert_eq!(
        cache.compute_cache_key("app.get_user", &args),
        get_user.cache_key(&1).unwrap()
    );
    assert!(cache.invalidate_call("app.get_user", &args).await);

    get_user.call(1).await.unwrap();
    assert_eq!(count(&calls), 2);
}

// == Models ==

struct Account;

impl Model for Account {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new(std::any::type_name::<Self>())
    }
}

struct OrderLine;

impl Model for OrderLine {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("shop::OrderLine")
            .with_table("order_lines")
            .with_primary_key(["order_id", "line_no"])
    }
}

#[tokio::test]
async fn test_model_resolves_entity_and_rule() {
    let cache = EntityCache::in_memory();

    let get_account = cache
        .wrap(
            FunctionId::new("app", "get_account").with_params(["account_id"]),
            CacheOptions::new().model::<Account>(),
            |account_id: u64| async move { Ok::<_, CacheError>(json!({"id": account_id})) },
        )
        .unwrap();
    assert_eq!(get_account.meta().entity.as_deref(), Some("account"));

    let get_line = cache
        .wrap(
            FunctionId::new("shop", "get_line").with_params(["order_id", "line_no"]),
            CacheOptions::new().model::<OrderLine>(),
            |(order_id, line_no): (u64, u64)| async move {
                Ok::<_, CacheError>(json!({"order_id": order_id, "line_no": line_no}))
            },
        )
        .unwrap();
    assert_eq!(get_line.meta().entity.as_deref(), Some("order_lines"));

    get_account.call(5).await.unwrap();
    get_line.call((9, 1)).await.unwrap();

    assert_eq!(cache.invalidate_entity("account", 5).await, 1);
    assert_eq!(cache.invalidate_entity("order_lines", (9u64, 1u64)).await, 1);
}

// == Invalidating Wrapper ==

#[tokio::test]
async fn test_invalidating_wrapper_evicts_updated_entity() {
    let cache = EntityCache::in_memory();
    let calls = counter();
    let get_user = user_lookup(&cache, "get_user", Scope::Function, calls.clone());

    get_user.call(1).await.unwrap();
    get_user.call(2).await.unwrap();

    let update_user = cache.invalidating("user", IdRule::default(), |user: Value| async move {
        Ok::<_, CacheError>(user)
    });
    update_user
        .call(json!({"id": 1, "name": "Grace"}))
        .await
        .unwrap();

    get_user.call(1).await.unwrap();
    get_user.call(2).await.unwrap();
    assert_eq!(count(&calls), 3);
}

#[tokio::test]
async fn test_invalidating_wrapper_skips_on_error() {
    let cache = EntityCache::in_memory();
    let calls = counter();
    let get_user = user_lookup(&cache, "get_user", Scope::Function, calls.clone());
    get_user.call(1).await.unwrap();

    let failing = cache.invalidating("user", IdRule::default(), |_: u64| async move {
        Err::<Value, _>(anyhow::anyhow!("write rejected"))
    });
    assert!(failing.call(1).await.is_err());

    get_user.call(1).await.unwrap();
    assert_eq!(count(&calls), 1);
}

// == Global ==

#[tokio::test]
async fn test_invalidate_all_clears_entries_and_indices() {
    let backend = MemoryBackend::with_prefix("app:");
    let cache = engine_over(&backend);

    let get_user = user_lookup(&cache, "get_user", Scope::Function, counter());
    get_user.call(1).await.unwrap();
    get_user.call(2).await.unwrap();

    // two entries and two indices
    assert_eq!(cache.invalidate_all().await, 4);
    assert!(backend.is_empty().await);
    assert_eq!(cache.invalidate_all().await, 0);
}
