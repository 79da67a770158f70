mod decoder;
mod fetcher;
mod store;

pub use decoder::{ImageDecoder, RasterDecoder, RasterImage, TileImage};
pub use fetcher::{HttpFetcher, NetworkFetcher, DEFAULT_USER_AGENT};
pub use store::{FileStore, MemoryStore, PersistentStore};
