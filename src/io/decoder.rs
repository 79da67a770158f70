//! Tile image decoding.
//!
//! The loader never depends on a concrete image type. It asks an injected
//! [`ImageDecoder`] to turn bytes into an image that exposes the
//! [`TileImage`] capability. [`RasterDecoder`] is the default, built on the
//! `image` crate.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView, RgbaImage};

use crate::error::DecodeError;

/// Capability shared by every decoded tile image.
pub trait TileImage {
    /// Pixel dimensions as `(width, height)`.
    fn dimensions(&self) -> (u32, u32);
}

/// Trait for turning raw tile bytes into a decoded image.
pub trait ImageDecoder: Send + Sync {
    /// The decoded image handle handed to every waiter of a load.
    type Image: TileImage + Clone + Send + Sync + 'static;

    /// Decode `data` into an image.
    fn decode(&self, data: &[u8]) -> Result<Self::Image, DecodeError>;
}

// =============================================================================
// Raster decoder
// =============================================================================

/// A decoded raster tile.
///
/// Cheap to clone; all clones share the same pixel buffer.
#[derive(Debug, Clone)]
pub struct RasterImage {
    inner: Arc<DynamicImage>,
}

impl RasterImage {
    /// Wrap a decoded image.
    pub fn new(image: DynamicImage) -> Self {
        Self {
            inner: Arc::new(image),
        }
    }

    /// Convert to 8-bit RGBA pixels, e.g. for upload to a texture.
    pub fn to_rgba8(&self) -> RgbaImage {
        self.inner.to_rgba8()
    }
}

impl PartialEq for RasterImage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || *self.inner == *other.inner
    }
}

impl TileImage for RasterImage {
    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }
}

/// Decodes PNG and JPEG tiles with the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct RasterDecoder {
    /// If set, tiles must be exactly this many pixels on each edge
    expected_size: Option<u32>,
}

impl RasterDecoder {
    /// Create a decoder that accepts any dimensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder that rejects tiles not `size`x`size` pixels.
    pub fn with_expected_size(size: u32) -> Self {
        Self {
            expected_size: Some(size),
        }
    }
}

impl ImageDecoder for RasterDecoder {
    type Image = RasterImage;

    fn decode(&self, data: &[u8]) -> Result<RasterImage, DecodeError> {
        let img =
            image::load_from_memory(data).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        if let Some(expected) = self.expected_size {
            let (width, height) = img.dimensions();
            if width != expected || height != expected {
                return Err(DecodeError::UnexpectedDimensions {
                    expected,
                    width,
                    height,
                });
            }
        }

        Ok(RasterImage::new(img))
    }
}
