//! Overflow file location and encoded-stream assembly.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::trace;
use uuid::Uuid;

use super::entry::CacheEntry;
use crate::error::BlobError;

/// File extension of overflow files.
const OVERFLOW_EXTENSION: &str = "texture";

/// Build `root/<bucket>/<id>.texture`.
///
/// The bucket is the first character of the lowercase hyphenated form of
/// the id, so overflow files are spread over 16 subdirectories.
pub fn resolve_overflow_path(root: &Path, id: &Uuid) -> PathBuf {
    let mut buf = Uuid::encode_buffer();
    let text = id.hyphenated().encode_lower(&mut buf);
    let bucket = &text[..1];
    root.join(bucket)
        .join(format!("{}.{}", text, OVERFLOW_EXTENSION))
}

/// Concatenate the entry's prefix with its overflow bytes.
///
/// The result is exactly [`CacheEntry::image_size`] bytes long. The overflow
/// file is opened fresh on every call and closed before returning.
pub fn assemble_encoded_bytes(entry: &CacheEntry) -> Result<Vec<u8>, BlobError> {
    let id = entry.id();
    if !entry.has_image() {
        return Err(BlobError::NoImageAvailable { id });
    }

    let prefix = entry.prefix();
    let body_size = entry.body_size() as usize;
    let mut image = vec![0u8; prefix.len() + body_size];
    image[..prefix.len()].copy_from_slice(prefix);

    if body_size > 0 {
        let path = entry.overflow_path();
        let mut body = File::open(&path).map_err(|source| BlobError::OverflowUnavailable {
            id,
            path: path.clone(),
            source,
        })?;

        let available = read_fully(&mut body, &mut image[prefix.len()..]).map_err(|source| {
            BlobError::OverflowUnavailable {
                id,
                path: path.clone(),
                source,
            }
        })?;
        if available != body_size {
            return Err(BlobError::TruncatedOverflow {
                id,
                path,
                expected: body_size,
                available,
            });
        }
        trace!(%id, body_size, "Read overflow bytes");
    }

    Ok(image)
}

/// Fill `buf` from `reader` until it is full or the reader is exhausted.
///
/// Returns how many bytes were read. Unlike `read_exact`, a short source is
/// reported through the count instead of an error so callers can say how
/// much was there.
pub(crate) fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
