//! Configuration for the tile loader.
//!
//! Two layers:
//! - [`LoaderConfig`]: the constructor-time settings of a [`TileLoader`],
//!   immutable once the loader is built
//! - [`Config`]: command-line arguments for the `tile-loader` binary, parsed
//!   with clap
//!
//! [`TileLoader`]: crate::tile::TileLoader
//!
//! # Environment Variables
//!
//! All binary options can be set via environment variables with the `TILES_` prefix:
//!
//! - `TILES_BASE_URL` - Tile server base URL (default: https://tile.openstreetmap.org)
//! - `TILES_CACHE_DIR` - Directory for persisted tiles (default: in-memory only)
//! - `TILES_PARALLELISM` - Max concurrent network fetches (default: 4)
//! - `TILES_CACHE_CAPACITY` - Max in-memory cache entries (default: 200)
//! - `TILES_FETCH_TIMEOUT` - Per-fetch deadline in seconds (default: none)
//! - `TILES_USER_AGENT` - User-Agent header for tile requests

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::io::DEFAULT_USER_AGENT;
use crate::tile::{TileId, DEFAULT_BASE_URL, DEFAULT_PARALLELISM, DEFAULT_TILE_CACHE_CAPACITY};

// =============================================================================
// Loader Configuration
// =============================================================================

/// Settings fixed at [`TileLoader`](crate::tile::TileLoader) construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Base URL tiles are fetched from
    pub base_url: String,

    /// Maximum number of concurrent network fetches
    pub parallelism: usize,

    /// Maximum number of entries in the in-memory cache
    pub cache_capacity: usize,

    /// Deadline for a single network fetch. `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            parallelism: DEFAULT_PARALLELISM,
            cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            fetch_timeout: None,
        }
    }
}

impl LoaderConfig {
    /// Set the tile server base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the maximum number of concurrent network fetches.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the in-memory cache capacity.
    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    /// Set a deadline for each network fetch.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.parallelism == 0 {
            return Err("parallelism must be greater than 0".to_string());
        }
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }

        let url = url::Url::parse(&self.base_url)
            .map_err(|e| format!("base_url '{}' is not a valid URL: {}", self.base_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "base_url must use http or https, got '{}'",
                url.scheme()
            ));
        }

        if self.fetch_timeout == Some(Duration::ZERO) {
            return Err("fetch_timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile Loader - fetch and cache raster map tiles.
///
/// Loads the given tiles through the caching loader and reports the outcome
/// of each one.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-loader")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Tiles to load, as zoom/column/row (e.g. 12/2048/1361).
    #[arg(required = true, value_name = "Z/X/Y")]
    pub tiles: Vec<TileId>,

    // =========================================================================
    // Source Configuration
    // =========================================================================
    /// Tile server base URL.
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "TILES_BASE_URL")]
    pub base_url: String,

    /// User-Agent header sent with tile requests.
    #[arg(long, default_value = DEFAULT_USER_AGENT, env = "TILES_USER_AGENT")]
    pub user_agent: String,

    /// Per-fetch deadline in seconds. Unset means no deadline.
    #[arg(long, env = "TILES_FETCH_TIMEOUT")]
    pub fetch_timeout: Option<u64>,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Directory for persisted tiles.
    ///
    /// If not specified, tiles are only kept in memory for this run.
    #[arg(long, env = "TILES_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum number of concurrent network fetches.
    #[arg(long, default_value_t = DEFAULT_PARALLELISM, env = "TILES_PARALLELISM")]
    pub parallelism: usize,

    /// Maximum number of entries in the in-memory cache.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "TILES_CACHE_CAPACITY")]
    pub cache_capacity: usize,

    // =========================================================================
    // Output Configuration
    // =========================================================================
    /// Print results and statistics as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Build the loader settings from the command line.
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            base_url: self.base_url.clone(),
            parallelism: self.parallelism,
            cache_capacity: self.cache_capacity,
            fetch_timeout: self.fetch_timeout.map(Duration::from_secs),
        }
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_agent.trim().is_empty() {
            return Err(
                "User-Agent must not be empty. Set --user-agent or TILES_USER_AGENT".to_string(),
            );
        }
        self.loader_config().validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
