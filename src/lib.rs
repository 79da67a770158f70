//! # Tile Loader
//!
//! Fetches, decodes and caches fixed-size raster map tiles addressed by
//! `(zoom, column, row)`.
//!
//! The library serves a rendering layer that requests overlapping sets of
//! tiles at high frequency, for example while panning or zooming a map.
//!
//! ## Features
//!
//! - **Single-flight fetches**: concurrent loads of one tile share one network request
//! - **Bounded parallelism**: a permit pool caps simultaneous network fetches
//! - **Two cache tiers**: an LRU of in-flight/completed fetches plus a persistent byte store
//! - **Failure isolation**: a failed or corrupt tile is never cached as a failure
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`tile`] - Tile ids, the LRU fetch cache, the limiter and the loader
//! - [`io`] - Network fetcher, persistent store and image decoder collaborators
//! - [`config`] - Loader settings and CLI configuration
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tile_loader::{FileStore, HttpFetcher, LoaderConfig, RasterDecoder, TileId, TileLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LoaderConfig::default().with_parallelism(8);
//!     config.validate()?;
//!
//!     let loader = TileLoader::new(
//!         HttpFetcher::new()?,
//!         FileStore::new("/var/cache/tiles"),
//!         RasterDecoder::with_expected_size(256),
//!         config,
//!     );
//!
//!     let tiles = loader
//!         .load_tiles([TileId::new(1, 0, 0), TileId::new(1, 1, 0)])
//!         .await;
//!     println!("loaded {} tiles", tiles.iter().filter(|t| t.is_ok()).count());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod tile;

// Re-export commonly used types
pub use config::{Config, LoaderConfig};
pub use error::{DecodeError, NetworkError, StoreError, TileError};
pub use io::{
    FileStore, HttpFetcher, ImageDecoder, MemoryStore, NetworkFetcher, PersistentStore,
    RasterDecoder, RasterImage, TileImage, DEFAULT_USER_AGENT,
};
pub use tile::{
    store_key, CacheLookup, ConcurrencyLimiter, EntryToken, FetchHandle, FetchPermit,
    LoaderStats, MapTile, ParseTileIdError, TileCache, TileId, TileLoader, TileUrls,
    DEFAULT_BASE_URL, DEFAULT_PARALLELISM, DEFAULT_TILE_CACHE_CAPACITY,
};
