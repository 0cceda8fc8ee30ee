//! Seam between the thumbnail pipeline and a JPEG2000 engine.

use crate::error::DecodeResult;

use super::pixels::ComponentPlane;
use super::stream::ByteStream;

/// Geometry learned from a header-only parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub components: u32,
}

impl ImageHeader {
    /// Native maximum dimension used to pick a reduction factor.
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// One decode of one codestream.
///
/// Calls are expected in order: [`read_header`](Self::read_header), then
/// optionally [`set_resolution_reduction`](Self::set_resolution_reduction),
/// then [`decode`](Self::decode). A session is used by a single thread and
/// dropped once the planes are out.
pub trait DecodeSession {
    fn read_header(&mut self) -> DecodeResult<ImageHeader>;

    /// Ask the engine to skip the `factor` highest resolution levels, so
    /// each axis comes out divided by `2^factor`.
    fn set_resolution_reduction(&mut self, factor: u32) -> DecodeResult<()>;

    /// Decode the codestream into one plane per component.
    fn decode(&mut self) -> DecodeResult<Vec<ComponentPlane>>;
}

/// Factory for decode sessions.
///
/// Implementations hold no per-decode state, so one backend can serve
/// many concurrent decodes.
pub trait Jpeg2000Backend: Send + Sync {
    fn open(&self, stream: ByteStream) -> DecodeResult<Box<dyn DecodeSession>>;
}
