//! JPEG2000 decoding of cache entries.
//!
//! [`ThumbnailDecoder`] drives a [`Jpeg2000Backend`] over the assembled
//! codestream of an entry and packs the resulting planes into a
//! [`PackedImage`]. [`ThumbnailPool`] runs many of those at once.

pub mod backend;
#[cfg(feature = "openjpeg")]
pub mod openjpeg;
pub mod pixels;
pub mod pool;
pub mod stream;
pub mod thumbnail;
pub mod unpack;

pub use backend::{DecodeSession, ImageHeader, Jpeg2000Backend};
#[cfg(feature = "openjpeg")]
pub use openjpeg::OpenJpegBackend;
pub use pixels::{ComponentPlane, PackedImage};
pub use pool::{ThumbnailOutcome, ThumbnailPool};
pub use stream::ByteStream;
pub use thumbnail::{decode_encoded, load_full_image, ThumbnailDecoder, DEFAULT_THUMBNAIL_DIMENSION};
