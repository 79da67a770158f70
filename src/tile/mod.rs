//! Tile loading and caching.
//!
//! This module is the core of the crate: it turns tile ids into decoded map
//! tiles, fetching each tile from the network at most once at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             Rendering layer             │
//! └────────────────────┬────────────────────┘
//!                      │ load_tile(id)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileLoader                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  Concurrency    │  │
//! │  │  (shared     │  │  Limiter        │  │
//! │  │   fetches)   │  │  (permits)      │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │ PersistentStore · NetworkFetcher ·      │
//! │ ImageDecoder                            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileLoader`]: Entry point; orchestrates store lookup, coalescing, fetch and decode
//! - [`TileCache`]: LRU map from tile id to a shared fetch handle
//! - [`ConcurrencyLimiter`]: Permit pool bounding concurrent network fetches
//! - [`TileId`], [`MapTile`]: Tile key and loaded tile
//! - [`TileUrls`]: Remote URL and store key derivation

mod cache;
mod id;
mod limiter;
mod loader;

pub use cache::{CacheLookup, EntryToken, TileCache, DEFAULT_TILE_CACHE_CAPACITY};
pub use id::{store_key, MapTile, ParseTileIdError, TileId, TileUrls, DEFAULT_BASE_URL};
pub use limiter::{ConcurrencyLimiter, FetchPermit, DEFAULT_PARALLELISM};
pub use loader::{FetchHandle, LoaderStats, TileLoader};
