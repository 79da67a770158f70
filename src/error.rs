use std::time::Duration;

use thiserror::Error;

/// Errors raised while fetching tile bytes from the remote tile server
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// The request could not be sent or the connection failed
    #[error("Request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The response body could not be read
    #[error("Failed to read response body: {0}")]
    Body(String),

    /// The fetch did not complete within the configured deadline
    #[error("Fetch of {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },
}

/// Errors raised when bytes do not decode to a usable tile image
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The bytes are not a supported, well-formed image
    #[error("Malformed image: {0}")]
    Malformed(String),

    /// The image decoded but is not the expected tile size
    #[error("Unexpected tile dimensions: expected {expected}x{expected}, got {width}x{height}")]
    UnexpectedDimensions {
        expected: u32,
        width: u32,
        height: u32,
    },
}

/// Errors raised by the persistent byte store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Underlying filesystem or storage failure
    #[error("Store I/O error for {key}: {message}")]
    Io { key: String, message: String },

    /// The key would escape the store root
    #[error("Invalid store key: {0}")]
    InvalidKey(String),
}

/// Errors surfaced to callers of `TileLoader::load_tile`.
///
/// Every waiter of a shared fetch receives a clone of the same error.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Network fetch failed
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Freshly downloaded bytes did not decode
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The fetch task died before producing a result
    #[error("Fetch aborted: {0}")]
    Aborted(String),

    /// The loader was shut down and no longer issues network fetches
    #[error("Tile loader is shut down")]
    Shutdown,
}

impl TileError {
    /// True for failures that came from the network layer.
    pub fn is_network(&self) -> bool {
        matches!(self, TileError::Network(_))
    }

    /// True for failures that came from decoding downloaded bytes.
    pub fn is_decode(&self) -> bool {
        matches!(self, TileError::Decode(_))
    }
}
