//! Read-through, TTL and invalidation behaviour of the server cache.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use devtrack_server::cache::{CacheClient, CacheInvalidator, CacheStore, MemoryStore};

async fn counted_fetch(calls: &AtomicUsize, value: u32) -> Result<u32, Infallible> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(value)
}

#[tokio::test(start_paused = true)]
async fn ttl_expiry_forces_a_fresh_fetch() {
    let cache = CacheClient::with_store(Arc::new(MemoryStore::new()));
    let calls = AtomicUsize::new(0);

    let first = cache
        .get_cached("projects:user1", 300, || counted_fetch(&calls, 1))
        .await
        .unwrap();
    let cached = cache
        .get_cached("projects:user1", 300, || counted_fetch(&calls, 2))
        .await
        .unwrap();
    assert_eq!((first, cached), (1, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(301)).await;

    let refreshed = cache
        .get_cached("projects:user1", 300, || counted_fetch(&calls, 3))
        .await
        .unwrap();
    assert_eq!(refreshed, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn pattern_invalidation_removes_exactly_the_matching_keys() {
    let memory = Arc::new(MemoryStore::new());
    for key in [
        "skills:recent:user42",
        "skills:historical:user42",
        "skills:user42",
        "skills:recent:user421",
        "skills:recent:user4",
        "projects:recent:user42",
    ] {
        memory.set_with_ttl(key, "[]", 300).await.unwrap();
    }
    let invalidator = CacheInvalidator::new(CacheClient::with_store(memory.clone()));

    assert_eq!(invalidator.invalidate_pattern("skills:*:user42").await, 2);
    assert_eq!(
        memory.keys(),
        vec![
            "projects:recent:user42",
            "skills:recent:user4",
            "skills:recent:user421",
            "skills:user42",
        ]
    );

    // Nothing left to match is still a success
    assert_eq!(invalidator.invalidate_pattern("skills:*:user42").await, 0);
}

#[tokio::test]
async fn backend_outage_falls_through_to_fetch() {
    let memory = Arc::new(MemoryStore::new());
    let cache = CacheClient::with_store(memory.clone());
    memory.set_offline(true);

    let calls = AtomicUsize::new(0);
    let value = cache
        .get_cached("dashboard:user1", 300, || counted_fetch(&calls, 7))
        .await
        .unwrap();
    assert_eq!(value, 7);
    assert!(!cache.is_available());

    // While unavailable, every read goes to the source without touching the backend
    memory.set_offline(false);
    let value = cache
        .get_cached("dashboard:user1", 300, || counted_fetch(&calls, 8))
        .await
        .unwrap();
    assert_eq!(value, 8);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(memory.keys().is_empty());

    // Recovery resumes caching
    cache.probe().await.unwrap();
    cache
        .get_cached("dashboard:user1", 300, || counted_fetch(&calls, 9))
        .await
        .unwrap();
    assert!(memory.contains("dashboard:user1"));
}

#[tokio::test]
async fn disabled_cache_always_fetches() {
    let cache = CacheClient::disabled();
    let calls = AtomicUsize::new(0);
    for n in 0..3 {
        let value = cache
            .get_cached("skills:user1", 300, || counted_fetch(&calls, n))
            .await
            .unwrap();
        assert_eq!(value, n);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
