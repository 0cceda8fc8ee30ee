//! Lockstep reader over the index and data files.

use std::fs::File;
use std::io::{BufReader, Read};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::entry::{CacheEntry, CacheEntryRecord, ENTRY_SIZE, NO_IMAGE_SENTINEL};
use super::header::{CacheHeader, HEADER_SIZE};
use super::locator::read_fully;
use crate::error::{CacheError, CacheResult, FormatError};

/// Name of the data file, always next to the index file.
pub const DATA_FILE_NAME: &str = "texture.cache";

/// Fixed stride of one entry's slot in the data file.
pub const PREFIX_SLOT_SIZE: usize = 600;

/// A texture cache on disk, identified by its index file.
///
/// The cache root is the directory that holds the index file; the data
/// file and the overflow buckets are resolved relative to it.
#[derive(Clone)]
pub struct Cache {
    index_path: PathBuf,
    root: Arc<Path>,
}

impl Cache {
    /// Create a handle for the cache whose index file is `index_path`.
    ///
    /// Nothing is opened until [`Cache::entries`] is called.
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        let index_path = index_path.into();
        let root = match index_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            index_path,
            root: Arc::from(root),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_path(&self) -> PathBuf {
        self.root.join(DATA_FILE_NAME)
    }

    /// Read only the header of the index file.
    pub fn read_header(&self) -> Result<CacheHeader, FormatError> {
        let mut index = open(&self.index_path)?;
        read_header(&mut index, &self.index_path)
    }

    /// Open both files and start enumerating entries from the beginning.
    ///
    /// Every call re-opens the files; the returned iterator owns both
    /// handles and releases them when dropped.
    pub fn entries(&self) -> Result<Entries, FormatError> {
        self.open_entries(None)
    }

    /// Like [`Cache::entries`], checking `cancel` before every entry.
    pub fn entries_with_cancel(&self, cancel: CancellationToken) -> Result<Entries, FormatError> {
        self.open_entries(Some(cancel))
    }

    fn open_entries(&self, cancel: Option<CancellationToken>) -> Result<Entries, FormatError> {
        let mut index = BufReader::new(open(&self.index_path)?);
        let data_path = self.data_path();
        let data = BufReader::new(open(&data_path)?);
        let header = read_header(&mut index, &self.index_path)?;

        debug!(
            index = %self.index_path.display(),
            version = header.version,
            encoder = %header.encoder,
            entry_count = header.entry_count,
            "Opened texture cache"
        );

        Ok(Entries {
            index,
            data,
            index_path: self.index_path.clone(),
            data_path,
            root: Arc::clone(&self.root),
            header,
            next: 0,
            data_offset: 0,
            cancel,
            done: false,
        })
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("index_path", &self.index_path)
            .finish()
    }
}

fn open(path: &Path) -> Result<File, FormatError> {
    File::open(path).map_err(|source| FormatError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_header<R: Read>(index: &mut R, path: &Path) -> Result<CacheHeader, FormatError> {
    let mut buf = [0u8; HEADER_SIZE];
    let available = read_fully(index, &mut buf).map_err(|source| FormatError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    CacheHeader::parse(&buf[..available])
}

/// Iterator over the entries of one cache.
///
/// Owns the index and data readers together: an error in either file ends
/// the enumeration for good, since the two would no longer line up.
pub struct Entries {
    index: BufReader<File>,
    data: BufReader<File>,
    index_path: PathBuf,
    data_path: PathBuf,
    root: Arc<Path>,
    header: CacheHeader,
    next: u32,
    data_offset: u64,
    cancel: Option<CancellationToken>,
    done: bool,
}

impl Entries {
    pub fn header(&self) -> &CacheHeader {
        &self.header
    }

    /// Number of entries not yet yielded, if enumeration has not failed
    pub fn remaining(&self) -> u32 {
        if self.done {
            0
        } else {
            self.header.entry_count - self.next
        }
    }

    fn read_entry(&mut self) -> CacheResult<CacheEntry> {
        let index = self.next;

        let mut record_bytes = [0u8; ENTRY_SIZE];
        let available = read_fully(&mut self.index, &mut record_bytes).map_err(|source| {
            FormatError::Io {
                path: self.index_path.clone(),
                source,
            }
        })?;
        if available != ENTRY_SIZE {
            return Err(FormatError::TruncatedEntry {
                index,
                offset: (HEADER_SIZE + index as usize * ENTRY_SIZE) as u64,
                expected: ENTRY_SIZE,
                available,
            }
            .into());
        }
        let record = CacheEntryRecord::parse(&record_bytes);

        let prefix_len = prefix_len(index, &record)?;
        let mut prefix = vec![0u8; prefix_len];
        let available = read_fully(&mut self.data, &mut prefix).map_err(|source| {
            FormatError::Io {
                path: self.data_path.clone(),
                source,
            }
        })?;
        if available != prefix_len {
            // Every remaining entry would be read from the wrong slot.
            return Err(FormatError::TruncatedData {
                index,
                id: record.id,
                offset: self.data_offset,
                expected: prefix_len,
                available,
            }
            .into());
        }
        if prefix_len < PREFIX_SLOT_SIZE {
            self.data
                .seek_relative((PREFIX_SLOT_SIZE - prefix_len) as i64)
                .map_err(|source| FormatError::Io {
                    path: self.data_path.clone(),
                    source,
                })?;
        }
        self.data_offset += PREFIX_SLOT_SIZE as u64;

        trace!(
            index,
            id = %record.id,
            image_size = record.image_size,
            body_size = record.body_size,
            "Read cache entry"
        );

        Ok(CacheEntry::new(Arc::clone(&self.root), index, record, prefix))
    }
}

/// Number of prefix bytes stored inline for `record`.
fn prefix_len(index: u32, record: &CacheEntryRecord) -> Result<usize, FormatError> {
    let inline = if record.has_image() {
        record
            .image_size
            .checked_sub(record.body_size)
            .ok_or(FormatError::BodyExceedsImage {
                index,
                id: record.id,
                image_size: record.image_size,
                body_size: record.body_size,
            })?
    } else {
        NO_IMAGE_SENTINEL - record.body_size
    };
    Ok((inline as usize).min(PREFIX_SLOT_SIZE))
}

impl Iterator for Entries {
    type Item = CacheResult<CacheEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next >= self.header.entry_count {
            return None;
        }
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            self.done = true;
            return Some(Err(CacheError::Cancelled));
        }

        match self.read_entry() {
            Ok(entry) => {
                self.next += 1;
                Some(Ok(entry))
            }
            Err(e) => {
                warn!(index = self.next, error = %e, "Cache enumeration aborted");
                self.done = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining() as usize))
    }
}

impl FusedIterator for Entries {}
