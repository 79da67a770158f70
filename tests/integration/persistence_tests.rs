//! Persistence integration tests against a real directory.
//!
//! Tests verify:
//! - Downloaded tiles land at `<root>/z/x/y.png`
//! - Persisted tiles are served without the network, across loaders
//! - Corrupt files on disk are replaced by a fresh download

use std::sync::Arc;

use tile_loader::{FileStore, LoaderConfig, RasterDecoder, TileId, TileImage, TileLoader};

use super::test_utils::{create_test_png, MockFetcher, TEST_BASE_URL};

fn file_loader(
    fetcher: &Arc<MockFetcher>,
    root: &std::path::Path,
) -> TileLoader<Arc<MockFetcher>, FileStore, RasterDecoder> {
    TileLoader::new(
        fetcher.clone(),
        FileStore::new(root),
        RasterDecoder::new(),
        LoaderConfig::default().with_base_url(TEST_BASE_URL),
    )
}

#[tokio::test]
async fn test_downloaded_tile_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::new());
    let loader = file_loader(&fetcher, dir.path());

    loader.load_tile(TileId::new(12, 2048, 1361)).await.unwrap();

    let path = dir.path().join("12").join("2048").join("1361.png");
    assert!(path.exists());
    assert!(!dir.path().join("12/2048/1361.png.tmp").exists());

    let bytes = std::fs::read(&path).unwrap();
    assert!(image::load_from_memory(&bytes).is_ok());
}

#[tokio::test]
async fn test_persisted_tile_survives_cache_clear() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::new());
    let loader = file_loader(&fetcher, dir.path());
    let id = TileId::new(6, 30, 21);

    let first = loader.load_tile(id).await.unwrap();
    loader.clear_cache().await;
    assert_eq!(loader.cache_stats().await.0, 0);

    let second = loader.load_tile(id).await.unwrap();
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(first.image.dimensions(), second.image.dimensions());
    assert_eq!(loader.stats().await.persisted_hits, 1);
}

#[tokio::test]
async fn test_new_loader_reuses_directory() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::new());
    let id = TileId::new(9, 100, 200);

    file_loader(&fetcher, dir.path()).load_tile(id).await.unwrap();

    let reopened = file_loader(&fetcher, dir.path());
    let tile = reopened.load_tile(id).await.unwrap();

    assert_eq!(tile.id, id);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_preseeded_file_served_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let tile_dir = dir.path().join("4").join("8");
    std::fs::create_dir_all(&tile_dir).unwrap();
    std::fs::write(tile_dir.join("3.png"), create_test_png(99)).unwrap();

    let fetcher = Arc::new(MockFetcher::new());
    let loader = file_loader(&fetcher, dir.path());

    let tile = loader.load_tile(TileId::new(4, 8, 3)).await.unwrap();
    assert_eq!(tile.image.dimensions(), (256, 256));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_corrupt_file_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let tile_dir = dir.path().join("7").join("1");
    std::fs::create_dir_all(&tile_dir).unwrap();
    let path = tile_dir.join("2.png");
    std::fs::write(&path, b"truncated").unwrap();

    let fetcher = Arc::new(MockFetcher::new());
    let loader = file_loader(&fetcher, dir.path());

    let tile = loader.load_tile(TileId::new(7, 1, 2)).await.unwrap();
    assert_eq!(tile.image.dimensions(), (256, 256));
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(loader.stats().await.corrupt_recovered, 1);

    // The fresh download replaced the corrupt bytes
    let bytes = std::fs::read(&path).unwrap();
    assert!(image::load_from_memory(&bytes).is_ok());
}
