//! In-memory cache of shared tile fetches.
//!
//! This module provides an LRU map from [`TileId`] to a cloneable fetch
//! handle (in practice a shared future). It is the single point of truth for
//! which tiles have a live fetch, and provides request coalescing: the first
//! caller for an id creates the handle, later callers join it.
//!
//! # Entry Lifecycle
//!
//! - Created by [`TileCache::find_or_create`] when no live entry exists.
//! - Promoted to most-recently-used on every successful lookup.
//! - Dropped silently when a new id is inserted past capacity.
//! - Removed explicitly on fetch failure, via the [`EntryToken`] handed to the
//!   factory, so a failure from an older fetch never removes a newer entry.
//!
//! Evicting an entry does not cancel the fetch behind it; it only stops new
//! callers from discovering it.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use super::id::TileId;

/// Default maximum number of cached entries.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 200;

// =============================================================================
// Entry Token
// =============================================================================

/// Identifies one specific cache entry for an id.
///
/// Two entries for the same id created at different times have different
/// tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryToken {
    id: TileId,
    generation: u64,
}

impl EntryToken {
    /// The tile this entry belongs to.
    pub fn id(&self) -> TileId {
        self.id
    }
}

/// Result of [`TileCache::find_or_create`].
#[derive(Debug, Clone)]
pub enum CacheLookup<T> {
    /// An existing entry was found and joined
    Joined(T),

    /// A new entry was created by the factory
    Created(T),
}

impl<T> CacheLookup<T> {
    /// The handle, whichever way it was obtained.
    pub fn into_inner(self) -> T {
        match self {
            CacheLookup::Joined(handle) | CacheLookup::Created(handle) => handle,
        }
    }

    /// Whether an existing entry was joined.
    pub fn is_joined(&self) -> bool {
        matches!(self, CacheLookup::Joined(_))
    }
}

struct CacheEntry<T> {
    generation: u64,
    handle: T,
}

struct CacheState<T> {
    entries: LruCache<TileId, CacheEntry<T>>,
    next_generation: u64,
}

// =============================================================================
// Tile Cache
// =============================================================================

/// LRU cache of fetch handles keyed by tile id.
///
/// # Thread Safety
///
/// All operations take one internal lock, so [`find_or_create`] is atomic:
/// two concurrent callers for an unseen id never both run the factory.
///
/// [`find_or_create`]: TileCache::find_or_create
///
/// # Example
///
/// ```
/// use tile_loader::tile::{TileCache, TileId};
///
/// #[tokio::main]
/// async fn main() {
///     let cache: TileCache<&'static str> = TileCache::with_capacity(2);
///     let id = TileId::new(1, 0, 0);
///
///     let first = cache.find_or_create(id, |_| "fetch-a").await;
///     let second = cache.find_or_create(id, |_| "fetch-b").await;
///
///     assert!(!first.is_joined());
///     assert!(second.is_joined());
///     assert_eq!(second.into_inner(), "fetch-a");
/// }
/// ```
pub struct TileCache<T> {
    state: Mutex<CacheState<T>>,
    capacity: NonZeroUsize,
}

impl<T: Clone> TileCache<T> {
    /// Create a cache with the default capacity (200 entries).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                next_generation: 0,
            }),
            capacity,
        }
    }

    /// Return the live entry for `id`, or create one with `factory`.
    ///
    /// The factory runs under the cache lock, at most once per call, and only
    /// when no entry exists. It receives the token of the entry being created.
    /// A successful lookup marks the entry as recently used.
    pub async fn find_or_create<F>(&self, id: TileId, factory: F) -> CacheLookup<T>
    where
        F: FnOnce(EntryToken) -> T,
    {
        let mut state = self.state.lock().await;

        if let Some(entry) = state.entries.get(&id) {
            return CacheLookup::Joined(entry.handle.clone());
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let handle = factory(EntryToken { id, generation });
        let entry = CacheEntry {
            generation,
            handle: handle.clone(),
        };

        if let Some((evicted, _)) = state.entries.push(id, entry) {
            debug!("Evicted tile {} from memory cache", evicted);
        }

        CacheLookup::Created(handle)
    }

    /// Look up an entry without creating one. Marks it as recently used.
    pub async fn get(&self, id: &TileId) -> Option<T> {
        let mut state = self.state.lock().await;
        state.entries.get(id).map(|entry| entry.handle.clone())
    }

    /// Check if an entry exists without updating LRU order.
    pub async fn contains(&self, id: &TileId) -> bool {
        let state = self.state.lock().await;
        state.entries.contains(id)
    }

    /// Drop the entry for `id` if present. Idempotent.
    ///
    /// Returns `true` if an entry was removed.
    pub async fn remove(&self, id: &TileId) -> bool {
        let mut state = self.state.lock().await;
        state.entries.pop(id).is_some()
    }

    /// Drop the entry identified by `token`, but only if it is still the
    /// live entry for its id.
    ///
    /// Returns `true` if an entry was removed.
    pub async fn remove_entry(&self, token: &EntryToken) -> bool {
        let mut state = self.state.lock().await;
        let is_current = state
            .entries
            .peek(&token.id)
            .map(|entry| entry.generation == token.generation)
            .unwrap_or(false);

        if is_current {
            state.entries.pop(&token.id);
        }
        is_current
    }

    /// Clear all entries.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
    }

    /// Get the current number of entries.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.entries.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        let state = self.state.lock().await;
        state.entries.is_empty()
    }

    /// Get the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

impl<T: Clone> Default for TileCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
