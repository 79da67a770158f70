//! Tile Loader orchestrating persisted lookups, shared fetches and decoding.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          TileLoader                              │
//! │  load_tile(id)                                                   │
//! │   1. PersistentStore::read ──► decode ──► hit: return            │
//! │                         └─ corrupt: fall through                 │
//! │   2. TileCache::find_or_create(id) ──► join or spawn fetch task  │
//! │   3. await shared handle                                         │
//! │                                                                  │
//! │  fetch task (spawned, one per live entry)                        │
//! │   0. creator saw corrupt bytes: PersistentStore::delete          │
//! │   a. ConcurrencyLimiter::acquire                                 │
//! │   b. NetworkFetcher::get(url)                                    │
//! │   c. PersistentStore::write (best effort) ──► decode             │
//! │   d. permit dropped                                              │
//! │   e. on failure: TileCache::remove_entry(token)                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The fetch task is detached from its callers: dropping a waiter (or all
//! of them) never cancels it and never counts as a failure. Only the task,
//! or a waiter observing that the task died, removes the entry. A panic
//! inside the fetch is caught by the task and handled like any other failure.
//!
//! Corrupt persisted bytes are deleted by the task that replaces them, never
//! by a caller joining that task, so a late delete cannot wipe a fresh write.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::LoaderConfig;
use crate::error::{NetworkError, TileError};
use crate::io::{ImageDecoder, NetworkFetcher, PersistentStore};

use super::cache::{EntryToken, TileCache};
use super::id::{MapTile, TileId, TileUrls};
use super::limiter::ConcurrencyLimiter;

/// Handle to an in-flight or completed fetch, shared by every waiter.
pub type FetchHandle<I> = Shared<BoxFuture<'static, Result<MapTile<I>, TileError>>>;

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of loader activity since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    /// Loads answered from the persistent store
    pub persisted_hits: u64,

    /// Loads that joined an existing shared fetch
    pub coalesced: u64,

    /// Network fetches started
    pub network_fetches: u64,

    /// Fetches that ended in a network or decode failure
    pub failures: u64,

    /// Corrupt persisted entries deleted
    pub corrupt_recovered: u64,

    /// Entries currently in the in-memory cache
    pub cached_entries: usize,

    /// Maximum in-memory cache entries
    pub cache_capacity: usize,

    /// Fetch permits not currently held
    pub available_permits: usize,
}

#[derive(Debug, Default)]
struct Counters {
    persisted_hits: AtomicU64,
    coalesced: AtomicU64,
    network_fetches: AtomicU64,
    failures: AtomicU64,
    corrupt_recovered: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Outcome of a persistent store lookup.
enum Persisted<I> {
    Hit(I),
    Miss,
    Corrupt,
}

// =============================================================================
// Tile Loader
// =============================================================================

/// Loads decoded map tiles with single-flight fetches and two cache tiers.
///
/// Cloning is cheap; clones share caches, limiter and collaborators.
///
/// # Type Parameters
///
/// * `F` - Network fetcher (e.g. [`HttpFetcher`](crate::io::HttpFetcher))
/// * `S` - Persistent store (e.g. [`FileStore`](crate::io::FileStore))
/// * `D` - Image decoder (e.g. [`RasterDecoder`](crate::io::RasterDecoder))
///
/// # Example
///
/// ```no_run
/// use tile_loader::{HttpFetcher, LoaderConfig, MemoryStore, RasterDecoder, TileId, TileLoader};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let loader = TileLoader::new(
///         HttpFetcher::new()?,
///         MemoryStore::new(),
///         RasterDecoder::new(),
///         LoaderConfig::default(),
///     );
///
///     let tile = loader.load_tile(TileId::new(0, 0, 0)).await?;
///     println!("loaded {}", tile.id);
///     Ok(())
/// }
/// ```
pub struct TileLoader<F, S, D: ImageDecoder> {
    inner: Arc<LoaderInner<F, S, D>>,
}

struct LoaderInner<F, S, D: ImageDecoder> {
    fetcher: F,
    store: S,
    decoder: D,
    urls: TileUrls,
    limiter: ConcurrencyLimiter,
    cache: TileCache<FetchHandle<D::Image>>,
    fetch_timeout: Option<Duration>,
    counters: Counters,
}

impl<F, S, D: ImageDecoder> Clone for TileLoader<F, S, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, S, D> TileLoader<F, S, D>
where
    F: NetworkFetcher + 'static,
    S: PersistentStore + 'static,
    D: ImageDecoder + 'static,
{
    /// Create a loader from its collaborators and settings.
    ///
    /// Settings are taken as given; call [`LoaderConfig::validate`] first if
    /// they come from user input. A zero cache capacity or parallelism is
    /// treated as one.
    pub fn new(fetcher: F, store: S, decoder: D, config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                fetcher,
                store,
                decoder,
                urls: TileUrls::new(config.base_url),
                limiter: ConcurrencyLimiter::new(config.parallelism),
                cache: TileCache::with_capacity(config.cache_capacity),
                fetch_timeout: config.fetch_timeout,
                counters: Counters::default(),
            }),
        }
    }

    /// Load a tile.
    ///
    /// Persisted bytes are served directly when they decode. Otherwise the
    /// call joins the live fetch for `id`, or starts one. All concurrent
    /// callers for the same id observe the same outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the network fetch fails, the downloaded bytes do
    /// not decode, or the loader has been shut down.
    pub async fn load_tile(&self, id: TileId) -> Result<MapTile<D::Image>, TileError> {
        let purge_corrupt = match self.inner.load_persisted(id).await {
            Persisted::Hit(image) => {
                bump(&self.inner.counters.persisted_hits);
                return Ok(MapTile::new(id, image));
            }
            Persisted::Miss => false,
            Persisted::Corrupt => true,
        };

        let lookup = self
            .inner
            .cache
            .find_or_create(id, |token| {
                LoaderInner::spawn_fetch(&self.inner, token, purge_corrupt)
            })
            .await;

        if lookup.is_joined() {
            debug!("Joined in-flight fetch for tile {}", id);
            bump(&self.inner.counters.coalesced);
        }

        lookup.into_inner().await
    }

    /// Load several tiles concurrently.
    ///
    /// Results are returned in the order of `ids`.
    pub async fn load_tiles<I>(&self, ids: I) -> Vec<Result<MapTile<D::Image>, TileError>>
    where
        I: IntoIterator<Item = TileId>,
    {
        futures::future::join_all(ids.into_iter().map(|id| self.load_tile(id))).await
    }

    /// Drop the in-memory entry for `id`. Does not touch the persistent store
    /// or cancel a running fetch.
    pub async fn evict(&self, id: TileId) -> bool {
        self.inner.cache.remove(&id).await
    }

    /// Drop every in-memory entry. The persistent store is untouched.
    pub async fn clear_cache(&self) {
        self.inner.cache.clear().await;
    }

    /// Stop issuing network fetches.
    ///
    /// Fetches waiting for a permit, and any later fetch, fail with
    /// [`TileError::Shutdown`]. Fetches already holding a permit finish
    /// normally, and persisted tiles are still served.
    pub fn shutdown(&self) {
        self.inner.limiter.close();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.limiter.is_closed()
    }

    /// Get in-memory cache statistics.
    ///
    /// Returns `(entry_count, capacity)`.
    pub async fn cache_stats(&self) -> (usize, usize) {
        (self.inner.cache.len().await, self.inner.cache.capacity())
    }

    /// Snapshot the loader counters.
    pub async fn stats(&self) -> LoaderStats {
        let counters = &self.inner.counters;
        let (cached_entries, cache_capacity) = self.cache_stats().await;
        LoaderStats {
            persisted_hits: counters.persisted_hits.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            network_fetches: counters.network_fetches.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            corrupt_recovered: counters.corrupt_recovered.load(Ordering::Relaxed),
            cached_entries,
            cache_capacity,
            available_permits: self.inner.limiter.available(),
        }
    }

    /// URL and store-key mapping used by this loader.
    pub fn urls(&self) -> &TileUrls {
        &self.inner.urls
    }

    /// The persistent store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The network fetcher.
    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }
}

impl<F, S, D> LoaderInner<F, S, D>
where
    F: NetworkFetcher + 'static,
    S: PersistentStore + 'static,
    D: ImageDecoder + 'static,
{
    /// Try the persistent store. Read failures are logged and reported as a
    /// miss. Corrupt bytes are left in place for the fetch task to delete.
    async fn load_persisted(&self, id: TileId) -> Persisted<D::Image> {
        let key = self.urls.store_key(id);

        let data = match self.store.read(&key).await {
            Ok(Some(data)) => data,
            Ok(None) => return Persisted::Miss,
            Err(e) => {
                warn!("Failed to read persisted tile {}: {}", id, e);
                return Persisted::Miss;
            }
        };

        match self.decoder.decode(&data) {
            Ok(image) => {
                debug!("Served tile {} from persistent store", id);
                Persisted::Hit(image)
            }
            Err(e) => {
                warn!("Persisted tile {} is corrupt: {}", id, e);
                Persisted::Corrupt
            }
        }
    }

    /// Delete corrupt persisted bytes ahead of the fetch that replaces them.
    async fn purge_corrupt(&self, id: TileId) {
        let key = self.urls.store_key(id);
        match self.store.delete(&key).await {
            Ok(()) => {
                debug!("Deleted corrupt persisted tile {}", id);
                bump(&self.counters.corrupt_recovered);
            }
            Err(e) => warn!("Failed to delete corrupt tile {}: {}", id, e),
        }
    }

    /// Spawn the fetch task for a new cache entry and wrap it in a shared
    /// handle.
    ///
    /// Runs under the cache lock, so the task's own `remove_entry` cannot
    /// overtake the insertion of its entry.
    fn spawn_fetch(
        this: &Arc<Self>,
        token: EntryToken,
        purge_corrupt: bool,
    ) -> FetchHandle<D::Image> {
        let task = {
            let inner = Arc::clone(this);
            tokio::spawn(async move {
                let id = token.id();
                if purge_corrupt {
                    inner.purge_corrupt(id).await;
                }

                let result = AssertUnwindSafe(inner.fetch_tile(id))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(TileError::Aborted(panic_message(panic))));
                if let Err(ref e) = result {
                    warn!("Failed to load tile {}: {}", id, e);
                    bump(&inner.counters.failures);
                    inner.cache.remove_entry(&token).await;
                }
                result
            })
        };

        let inner = Arc::clone(this);
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => {
                    // The runtime shut down under the task
                    inner.cache.remove_entry(&token).await;
                    Err(TileError::Aborted(join_err.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Permit-gated fetch, persist and decode of one tile.
    async fn fetch_tile(&self, id: TileId) -> Result<MapTile<D::Image>, TileError> {
        let _permit = self.limiter.acquire().await?;
        bump(&self.counters.network_fetches);

        let url = self.urls.url(id);
        debug!("Fetching tile {} from {}", id, url);
        let data = with_deadline(self.fetch_timeout, &url, self.fetcher.get(&url)).await?;

        let key = self.urls.store_key(id);
        if let Err(e) = self.store.write(&key, &data).await {
            warn!("Failed to persist tile {}: {}", id, e);
        }

        let image = self.decoder.decode(&data)?;
        Ok(MapTile::new(id, image))
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("fetch panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("fetch panicked: {}", message)
    } else {
        "fetch panicked".to_string()
    }
}

/// Apply an optional deadline to a fetch.
async fn with_deadline<T>(
    deadline: Option<Duration>,
    url: &str,
    fetch: impl Future<Output = Result<T, NetworkError>>,
) -> Result<T, NetworkError> {
    match deadline {
        Some(after) => tokio::time::timeout(after, fetch)
            .await
            .map_err(|_| NetworkError::Timeout {
                url: url.to_string(),
                after,
            })?,
        None => fetch.await,
    }
}

// =============================================================================
// Tests
// =============================================================================
