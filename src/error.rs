//! Error types for reading and decoding a texture cache.
//!
//! The buckets follow how far a failure reaches:
//! - [`FormatError`] aborts the whole enumeration (index and data file are
//!   read in lockstep, so one bad record desynchronizes everything after it)
//! - [`BlobError`] only affects the entry whose bytes were being assembled
//! - [`DecodeError`] is raised by the JPEG2000 engine or the pixel unpacker
//!
//! [`CacheError`] wraps all of them for callers that do not care which.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Malformed or truncated index/data files.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The index file is shorter than its fixed-size header
    #[error("Truncated header: expected {expected} bytes, found {available}")]
    TruncatedHeader { expected: usize, available: usize },

    /// An entry record could not be read in full
    #[error("Truncated entry record #{index} at offset {offset}: expected {expected} bytes, found {available}")]
    TruncatedEntry {
        index: u32,
        offset: u64,
        expected: usize,
        available: usize,
    },

    /// The data file ran out before the entry's prefix was complete
    #[error("Truncated data for entry #{index} ({id}) at offset {offset}: expected {expected} bytes, found {available}")]
    TruncatedData {
        index: u32,
        id: Uuid,
        offset: u64,
        expected: usize,
        available: usize,
    },

    /// A record claims more overflow bytes than the whole image
    #[error("Entry #{index} ({id}) has body size {body_size} larger than image size {image_size}")]
    BodyExceedsImage {
        index: u32,
        id: Uuid,
        image_size: u32,
        body_size: u32,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures while reconstructing one entry's encoded bytes.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The entry carries the "no image" sentinel size
    #[error("No image available for {id}")]
    NoImageAvailable { id: Uuid },

    #[error("Cannot open overflow file {path} for {id}: {source}")]
    OverflowUnavailable {
        id: Uuid,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Truncated overflow file {path} for {id}: expected {expected} bytes, found {available}")]
    TruncatedOverflow {
        id: Uuid,
        path: PathBuf,
        expected: usize,
        available: usize,
    },
}

/// Failures raised while turning an encoded stream into pixels.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The engine could not be configured
    #[error("Decoder setup failed: {0}")]
    Setup(String),

    /// The codestream header could not be parsed
    #[error("Image header decode failed: {0}")]
    Header(String),

    /// The codestream body could not be decoded
    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Unsupported component count: {0}")]
    UnsupportedComponents(usize),

    /// A component plane does not hold the samples its geometry promises
    #[error("Component {component} holds {actual} samples, expected {expected}")]
    PlaneSamples {
        component: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Decoder backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Top-level error for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    /// A blocking worker panicked or was aborted
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
