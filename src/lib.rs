//! Reader and thumbnailer for a virtual-world client's texture cache.
//!
//! The cache is an index file (`texture.entries`), a data file of fixed
//! 600-byte slots holding the first bytes of every JPEG2000 codestream, and
//! per-texture overflow files with the rest. [`cache`] enumerates entries and
//! reassembles codestreams; [`decode`] turns them into packed pixels.

pub mod cache;
pub mod config;
pub mod decode;
pub mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{stream_entries, Cache, CacheEntry, CacheHeader};
pub use config::Config;
pub use decode::{PackedImage, ThumbnailDecoder, ThumbnailPool};
pub use error::{BlobError, CacheError, CacheResult, DecodeError, FormatError};
