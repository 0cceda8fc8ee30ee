//! Entry to pixels: blob assembly, engine decode and unpacking.

use std::sync::Arc;

use tokio::task;
use tracing::debug;

use super::backend::Jpeg2000Backend;
use super::pixels::PackedImage;
use super::stream::ByteStream;
use super::unpack::{reduced_dimension, reduction_factor, unpack};
use crate::cache::CacheEntry;
use crate::error::{CacheResult, DecodeResult};

/// Default cap on the longer side of a thumbnail
pub const DEFAULT_THUMBNAIL_DIMENSION: u32 = 64;

/// Decodes cache entries through a JPEG2000 backend.
///
/// Stateless apart from the backend, so one decoder can be shared by any
/// number of concurrent decodes.
#[derive(Debug, Clone)]
pub struct ThumbnailDecoder<B> {
    backend: B,
}

impl<B: Jpeg2000Backend> ThumbnailDecoder<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Decode `entry`, reduced to fit `max_dimension` when one is given.
    ///
    /// Engine failures propagate; use [`thumbnail`](Self::thumbnail) for
    /// the forgiving variant.
    pub fn decode(
        &self,
        entry: &CacheEntry,
        max_dimension: Option<u32>,
    ) -> CacheResult<PackedImage> {
        let encoded = entry.load_encoded()?;
        Ok(decode_encoded(&self.backend, encoded, max_dimension)?)
    }

    /// Small preview of `entry`.
    ///
    /// Returns `Ok(None)` for entries without an image and for codestreams
    /// the engine cannot decode. Missing or truncated overflow files are
    /// still errors, since they point at a damaged cache rather than a bad
    /// picture.
    pub fn thumbnail(
        &self,
        entry: &CacheEntry,
        max_dimension: u32,
    ) -> CacheResult<Option<PackedImage>> {
        if !entry.has_image() {
            return Ok(None);
        }

        let encoded = entry.load_encoded()?;
        match decode_encoded(&self.backend, encoded, Some(max_dimension)) {
            Ok(image) => Ok(Some(image)),
            Err(e) => {
                debug!(id = %entry.id(), error = %e, "Thumbnail decode failed");
                Ok(None)
            }
        }
    }

    /// Full-resolution decode; `None` only for entries without an image.
    pub fn full_image(&self, entry: &CacheEntry) -> CacheResult<Option<PackedImage>> {
        if !entry.has_image() {
            return Ok(None);
        }
        self.decode(entry, None).map(Some)
    }
}

/// Decode one complete codestream.
///
/// The header is parsed first; a reduction is requested only when
/// `max_dimension` is smaller than the native size.
pub fn decode_encoded<B>(
    backend: &B,
    encoded: Vec<u8>,
    max_dimension: Option<u32>,
) -> DecodeResult<PackedImage>
where
    B: Jpeg2000Backend + ?Sized,
{
    let mut session = backend.open(ByteStream::new(encoded))?;
    let header = session.read_header()?;

    let factor = match max_dimension {
        Some(cap) if header.max_dimension() > cap => reduction_factor(header.max_dimension(), cap),
        _ => 0,
    };
    if factor > 0 {
        session.set_resolution_reduction(factor)?;
    }

    let planes = session.decode()?;
    let width = reduced_dimension(header.width, factor);
    let height = reduced_dimension(header.height, factor);
    debug!(
        native_width = header.width,
        native_height = header.height,
        factor,
        width,
        height,
        "Decoded codestream"
    );

    unpack(&planes, width, height)
}

/// Full-resolution decode of `entry` on the blocking pool.
pub async fn load_full_image<B>(
    decoder: Arc<ThumbnailDecoder<B>>,
    entry: CacheEntry,
) -> CacheResult<Option<PackedImage>>
where
    B: Jpeg2000Backend + 'static,
{
    // Decoding is CPU-bound
    task::spawn_blocking(move || decoder.full_image(&entry))
        .await?
}
