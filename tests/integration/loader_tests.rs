//! Loader pipeline integration tests.
//!
//! Tests verify:
//! - Concurrent loads of one tile share a single fetch
//! - Failed fetches are not cached
//! - Store write failures do not fail the load
//! - LRU eviction forces a fresh fetch

use std::sync::Arc;
use std::time::Duration;

use tile_loader::{LoaderConfig, TileError, TileId, TileImage};

use super::test_utils::{build_loader, url_of, MockFetcher, MockStore};

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test]
async fn test_concurrent_loads_share_one_fetch() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::new());
    let loader = build_loader(&fetcher, &store, LoaderConfig::default());
    let id = TileId::new(12, 2048, 1361);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let loader = loader.clone();
        handles.push(tokio::spawn(async move { loader.load_tile(id).await }));
    }

    let mut tiles = Vec::new();
    for handle in handles {
        tiles.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(fetcher.calls(), 1);
    for tile in &tiles {
        assert_eq!(tile.id, id);
        assert_eq!(tile, &tiles[0]);
    }
    assert_eq!(tiles[0].image.dimensions(), (256, 256));
}

#[tokio::test]
async fn test_distinct_tiles_fetched_independently() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::new());
    let loader = build_loader(&fetcher, &store, LoaderConfig::default());

    let ids = [TileId::new(3, 0, 0), TileId::new(3, 1, 0), TileId::new(3, 0, 1)];
    let results = loader.load_tiles(ids).await;

    for (id, result) in ids.iter().zip(&results) {
        assert_eq!(result.as_ref().unwrap().id, *id);
        assert_eq!(fetcher.calls_for(&url_of(id.zoom, id.column, id.row)).await, 1);
    }
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(store.writes(), 3);
}

// =============================================================================
// Failure Handling
// =============================================================================

#[tokio::test]
async fn test_network_failure_is_not_sticky() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::new());
    let loader = build_loader(&fetcher, &store, LoaderConfig::default());
    let id = TileId::new(4, 2, 9);
    let url = url_of(4, 2, 9);

    fetcher.fail(&url, 1).await;

    let err = loader.load_tile(id).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(loader.cache_stats().await.0, 0);

    // A brand-new fetch, not a replay of the cached failure
    let tile = loader.load_tile(id).await.unwrap();
    assert_eq!(tile.id, id);
    assert_eq!(fetcher.calls_for(&url).await, 2);
}

#[tokio::test]
async fn test_failure_reaches_every_waiter() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::new());
    let loader = build_loader(&fetcher, &store, LoaderConfig::default());
    let id = TileId::new(6, 1, 1);

    fetcher.fail(&url_of(6, 1, 1), 1).await;

    let results = loader.load_tiles(vec![id; 5]).await;
    assert_eq!(fetcher.calls(), 1);
    for result in results {
        assert!(matches!(result, Err(TileError::Network(_))));
    }
}

#[tokio::test]
async fn test_undecodable_download_surfaces_and_recovers() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::new());
    let loader = build_loader(&fetcher, &store, LoaderConfig::default());
    let id = TileId::new(8, 10, 20);

    fetcher.serve_garbage(&url_of(8, 10, 20), 1).await;

    let err = loader.load_tile(id).await.unwrap_err();
    assert!(err.is_decode());
    assert_eq!(loader.cache_stats().await.0, 0);

    // The bad bytes were persisted before decoding; the next load discards them
    let tile = loader.load_tile(id).await.unwrap();
    assert_eq!(tile.id, id);
    assert_eq!(store.deletes(), 1);
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(loader.stats().await.corrupt_recovered, 1);
}

#[tokio::test]
async fn test_concurrent_readers_of_corrupt_entry_keep_fresh_tile() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(
        MockStore::new()
            .with_read_delay(Duration::from_millis(10))
            .with_delete_delay(Duration::from_millis(200))
            .with_entry("7/1/2.png", &b"corrupt"[..])
            .await,
    );
    let loader = build_loader(&fetcher, &store, LoaderConfig::default());
    let id = TileId::new(7, 1, 2);

    let (first, second) = tokio::join!(loader.load_tile(id), loader.load_tile(id));
    first.unwrap();
    second.unwrap();

    assert_eq!(store.reads(), 2);
    assert_eq!(fetcher.calls(), 1);

    // Only the fetch that replaces the bytes deletes them
    assert_eq!(store.deletes(), 1);
    let persisted = store.get("7/1/2.png").await.expect("fresh tile persisted");
    assert!(image::load_from_memory(&persisted).is_ok());
}

#[tokio::test]
async fn test_store_write_failure_still_returns_tile() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::read_only());
    let loader = build_loader(&fetcher, &store, LoaderConfig::default());

    let tile = loader.load_tile(TileId::new(2, 1, 1)).await.unwrap();
    assert_eq!(tile.image.dimensions(), (256, 256));
    assert_eq!(store.writes(), 1);
    assert!(store.get("2/1/1.png").await.is_none());
}

// =============================================================================
// In-memory Cache
// =============================================================================

#[tokio::test]
async fn test_completed_entry_serves_later_calls() {
    // Without persistence, the in-memory entry is what answers repeat loads
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::read_only());
    let loader = build_loader(&fetcher, &store, LoaderConfig::default());
    let id = TileId::new(5, 3, 3);

    let first = loader.load_tile(id).await.unwrap();
    let second = loader.load_tile(id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(loader.stats().await.coalesced, 1);
}

#[tokio::test]
async fn test_lru_eviction_triggers_fresh_fetch() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::read_only());
    let loader = build_loader(
        &fetcher,
        &store,
        LoaderConfig::default().with_cache_capacity(2),
    );

    let a = TileId::new(1, 0, 0);
    let b = TileId::new(1, 1, 0);
    let c = TileId::new(1, 0, 1);

    loader.load_tile(a).await.unwrap();
    loader.load_tile(b).await.unwrap();
    loader.load_tile(c).await.unwrap();
    assert_eq!(loader.cache_stats().await, (2, 2));

    // A was evicted by C
    loader.load_tile(a).await.unwrap();
    assert_eq!(fetcher.calls_for(&url_of(1, 0, 0)).await, 2);

    // C is still cached
    loader.load_tile(c).await.unwrap();
    assert_eq!(fetcher.calls_for(&url_of(1, 0, 1)).await, 1);
}

#[tokio::test]
async fn test_explicit_evict() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockStore::read_only());
    let loader = build_loader(&fetcher, &store, LoaderConfig::default());
    let id = TileId::new(9, 9, 9);

    loader.load_tile(id).await.unwrap();
    assert!(loader.evict(id).await);
    assert!(!loader.evict(id).await);

    loader.load_tile(id).await.unwrap();
    assert_eq!(fetcher.calls(), 2);
}
