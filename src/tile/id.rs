//! Tile addressing.
//!
//! A tile is addressed by zoom level and grid column/row. The same key drives
//! the in-memory cache, the remote URL and the persistent store key:
//!
//! ```text
//! url(id)       = {base_url}/{zoom}/{column}/{row}.png
//! store_key(id) = {zoom}/{column}/{row}.png
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Default tile endpoint (OpenStreetMap standard tile layer).
pub const DEFAULT_BASE_URL: &str = "https://tile.openstreetmap.org";

/// File extension used for both remote tiles and persisted bytes.
const TILE_EXTENSION: &str = "png";

// =============================================================================
// TileId
// =============================================================================

/// Immutable tile key, compared and hashed by value.
///
/// No range validation is performed; out-of-range coordinates are a caller
/// error and simply produce a URL the server will reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileId {
    /// Zoom level
    pub zoom: u32,

    /// Grid column (x)
    pub column: u32,

    /// Grid row (y)
    pub row: u32,
}

impl TileId {
    /// Create a new tile id.
    pub const fn new(zoom: u32, column: u32, row: u32) -> Self {
        Self { zoom, column, row }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// Error returned when a `z/x/y` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid tile id '{input}': expected zoom/column/row")]
pub struct ParseTileIdError {
    input: String,
}

impl FromStr for TileId {
    type Err = ParseTileIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTileIdError {
            input: s.to_string(),
        };

        let mut parts = s.trim().split('/');
        let mut next = || -> Result<u32, ParseTileIdError> {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(err)
        };

        let zoom = next()?;
        let column = next()?;
        let row = next()?;

        if parts.next().is_some() {
            return Err(err());
        }

        Ok(Self::new(zoom, column, row))
    }
}

// =============================================================================
// MapTile
// =============================================================================

/// A successfully loaded tile: its id and the decoded image.
#[derive(Debug, Clone, PartialEq)]
pub struct MapTile<I> {
    /// The tile this image belongs to
    pub id: TileId,

    /// Decoded image handle
    pub image: I,
}

impl<I> MapTile<I> {
    /// Wrap a decoded image with its id.
    pub fn new(id: TileId, image: I) -> Self {
        Self { id, image }
    }
}

// =============================================================================
// URL / key derivation
// =============================================================================

/// Maps tile ids to remote URLs and persistent store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileUrls {
    base_url: String,
}

impl TileUrls {
    /// Create a mapping for the given base URL.
    ///
    /// A trailing slash on the base URL is ignored.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// The configured base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Remote URL for a tile.
    pub fn url(&self, id: TileId) -> String {
        format!("{}/{}", self.base_url, store_key(id))
    }

    /// Persistent store key for a tile.
    pub fn store_key(&self, id: TileId) -> String {
        store_key(id)
    }
}

impl Default for TileUrls {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Store key for a tile, independent of the base URL.
pub fn store_key(id: TileId) -> String {
    format!("{}/{}/{}.{}", id.zoom, id.column, id.row, TILE_EXTENSION)
}
