//! Index file header.

use serde::Serialize;

use crate::error::FormatError;

/// Size of the index file header in bytes.
pub const HEADER_SIZE: usize = 4 * 11;

/// Length of the NUL-padded encoder name field.
const ENCODER_NAME_LEN: usize = 32;

/// Header at the start of every index file.
///
/// All fields are little-endian on disk:
/// `f32 version | u32 address | [u8; 32] encoder | u32 entry_count`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHeader {
    /// Cache format version written by the client
    pub version: f32,
    /// Base address field (opaque to readers)
    pub address: u32,
    /// Name of the encoder that produced the cache, NUL padding trimmed
    pub encoder: String,
    /// Number of entry records that follow the header
    pub entry_count: u32,
}

impl CacheHeader {
    /// Parse a header from the first [`HEADER_SIZE`] bytes of an index file.
    ///
    /// Fails with [`FormatError::TruncatedHeader`] if `bytes` is shorter
    /// than the header. Extra trailing bytes are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::TruncatedHeader {
                expected: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let version = f32::from_le_bytes(le_field(bytes, 0));
        let address = u32::from_le_bytes(le_field(bytes, 4));
        let encoder = String::from_utf8_lossy(&bytes[8..8 + ENCODER_NAME_LEN])
            .trim_end_matches('\0')
            .to_string();
        let entry_count = u32::from_le_bytes(le_field(bytes, 40));

        Ok(Self {
            version,
            address,
            encoder,
            entry_count,
        })
    }

    /// Serialize the header back into its on-disk layout.
    ///
    /// Encoder names longer than 32 bytes are cut at the field width.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..8].copy_from_slice(&self.address.to_le_bytes());
        let name = self.encoder.as_bytes();
        let len = name.len().min(ENCODER_NAME_LEN);
        out[8..8 + len].copy_from_slice(&name[..len]);
        out[40..44].copy_from_slice(&self.entry_count.to_le_bytes());
        out
    }
}

/// Copy a 4-byte field out of an already length-checked buffer.
pub(crate) fn le_field(bytes: &[u8], offset: usize) -> [u8; 4] {
    let mut field = [0u8; 4];
    field.copy_from_slice(&bytes[offset..offset + 4]);
    field
}
