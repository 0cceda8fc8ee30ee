//! Entry records and the assembled, user-facing cache entry.
//!
//! A record is the fixed 28-byte block in the index file. A [`CacheEntry`]
//! pairs it with the prefix bytes read from the data file and the cache
//! root, which is everything needed to fetch the rest of the image later.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::header::le_field;
use super::locator;
use crate::error::BlobError;

/// Size of one entry record in the index file.
pub const ENTRY_SIZE: usize = 4 * 7;

/// Declared image size meaning "this entry has no image".
pub const NO_IMAGE_SENTINEL: u32 = 0xFFFF_FFFF;

/// One fixed-size record from the index file.
///
/// Layout: `uuid[16] | u32 image_size | u32 body_size | i32 time`, integers
/// little-endian, the UUID in the mixed-endian form handled by [`decode_uuid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheEntryRecord {
    pub id: Uuid,
    /// Total encoded size, or [`NO_IMAGE_SENTINEL`]
    pub image_size: u32,
    /// Bytes stored in the overflow file; 0 when the entry is fully inline
    pub body_size: u32,
    /// Capture time in Unix seconds
    pub time: i32,
}

impl CacheEntryRecord {
    pub fn parse(bytes: &[u8; ENTRY_SIZE]) -> Self {
        let mut id = [0u8; 16];
        id.copy_from_slice(&bytes[0..16]);
        Self {
            id: decode_uuid(&id),
            image_size: u32::from_le_bytes(le_field(bytes, 16)),
            body_size: u32::from_le_bytes(le_field(bytes, 20)),
            time: i32::from_le_bytes(le_field(bytes, 24)),
        }
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        out[0..16].copy_from_slice(&encode_uuid(&self.id));
        out[16..20].copy_from_slice(&self.image_size.to_le_bytes());
        out[20..24].copy_from_slice(&self.body_size.to_le_bytes());
        out[24..28].copy_from_slice(&self.time.to_le_bytes());
        out
    }

    /// Whether the record carries the "no image" sentinel.
    pub fn has_image(&self) -> bool {
        self.image_size != NO_IMAGE_SENTINEL
    }
}

/// Decode the on-disk UUID layout.
///
/// The first three groups are stored big-endian (`u32`, `u16`, `u16`) and
/// the last eight bytes are taken literally.
pub fn decode_uuid(bytes: &[u8; 16]) -> Uuid {
    let d1 = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let d2 = u16::from_be_bytes([bytes[4], bytes[5]]);
    let d3 = u16::from_be_bytes([bytes[6], bytes[7]]);
    let mut d4 = [0u8; 8];
    d4.copy_from_slice(&bytes[8..16]);
    Uuid::from_fields(d1, d2, d3, &d4)
}

/// Inverse of [`decode_uuid`].
pub fn encode_uuid(id: &Uuid) -> [u8; 16] {
    let (d1, d2, d3, d4) = id.as_fields();
    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&d1.to_be_bytes());
    out[4..6].copy_from_slice(&d2.to_be_bytes());
    out[6..8].copy_from_slice(&d3.to_be_bytes());
    out[8..16].copy_from_slice(d4);
    out
}

/// A cached texture as seen by callers.
///
/// Immutable once built by the reader. Holds no file handles: the overflow
/// bytes are read again every time [`CacheEntry::load_encoded`] is called.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    root: Arc<Path>,
    index: u32,
    record: CacheEntryRecord,
    prefix: Vec<u8>,
}

impl CacheEntry {
    pub fn new(root: Arc<Path>, index: u32, record: CacheEntryRecord, prefix: Vec<u8>) -> Self {
        Self {
            root,
            index,
            record,
            prefix,
        }
    }

    /// Position of the entry in the index file, starting at 0
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn record(&self) -> &CacheEntryRecord {
        &self.record
    }

    /// Directory holding the index, data and overflow files
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn body_size(&self) -> u32 {
        self.record.body_size
    }

    /// Image size as declared in the index record (may be the sentinel)
    pub fn declared_image_size(&self) -> u32 {
        self.record.image_size
    }

    /// Encoded size actually available: prefix length plus overflow length
    pub fn image_size(&self) -> u64 {
        self.prefix.len() as u64 + u64::from(self.record.body_size)
    }

    pub fn has_image(&self) -> bool {
        self.record.has_image()
    }

    /// Image size in KiB, as shown in listings
    pub fn size_kib(&self) -> f64 {
        self.image_size() as f64 / 1024.0
    }

    pub fn time(&self) -> i32 {
        self.record.time
    }

    /// Capture time in UTC, if the timestamp is representable
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(i64::from(self.record.time), 0)
    }

    /// Inline leading bytes of the encoded image
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Where the overflow bytes of this entry live
    pub fn overflow_path(&self) -> PathBuf {
        locator::resolve_overflow_path(&self.root, &self.record.id)
    }

    /// Read the complete encoded codestream (prefix + overflow).
    pub fn load_encoded(&self) -> Result<Vec<u8>, BlobError> {
        locator::assemble_encoded_bytes(self)
    }
}
