//! Texture cache files: index header, entry records, lockstep enumeration
//! and overflow file lookup.

pub mod entry;
pub mod header;
pub mod locator;
pub mod reader;

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use entry::{CacheEntry, CacheEntryRecord, ENTRY_SIZE, NO_IMAGE_SENTINEL};
pub use header::{CacheHeader, HEADER_SIZE};
pub use locator::{assemble_encoded_bytes, resolve_overflow_path};
pub use reader::{Cache, Entries, DATA_FILE_NAME, PREFIX_SLOT_SIZE};

use crate::error::CacheResult;

/// Capacity of the channel between the reader task and its consumer.
const STREAM_BUFFER: usize = 64;

/// Enumerate the cache at `index_path` on the blocking pool.
///
/// Entries arrive in file order. The reader stops after the first error
/// (which is delivered), when `cancel` fires (delivering
/// [`CacheError::Cancelled`](crate::error::CacheError::Cancelled)), or as
/// soon as the receiver is dropped.
pub fn stream_entries(
    index_path: impl Into<PathBuf>,
    cancel: CancellationToken,
) -> mpsc::Receiver<CacheResult<CacheEntry>> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    spawn_reader(Cache::new(index_path), cancel, tx);
    rx
}

/// Run the lockstep reader on the blocking pool, sending into `tx`.
///
/// The task resolves to the number of entries handed to the channel.
fn spawn_reader(
    cache: Cache,
    cancel: CancellationToken,
    tx: mpsc::Sender<CacheResult<CacheEntry>>,
) -> JoinHandle<u32> {
    task::spawn_blocking(move || {
        let entries = match cache.entries_with_cancel(cancel) {
            Ok(entries) => entries,
            Err(e) => {
                let index = cache.index_path().display();
                warn!(index = %index, error = %e, "Cannot open texture cache");
                let _ = tx.blocking_send(Err(e.into()));
                return 0;
            }
        };

        let mut sent = 0u32;
        for entry in entries {
            if tx.blocking_send(entry).is_err() {
                debug!(sent, "Entry receiver dropped, stopping enumeration");
                return sent;
            }
            sent += 1;
        }
        debug!(sent, "Entry stream finished");
        sent
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::error::{CacheError, FormatError};
    use crate::testing::{CacheBuilder, FixtureEntry};

    #[tokio::test]
    async fn test_stream_delivers_all_entries_in_order() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let fixture = CacheBuilder::new()
            .entry(FixtureEntry::inline(first, vec![1; 8]))
            .entry(FixtureEntry::with_body(second, vec![2; 8], vec![3; 8]))
            .build();

        let mut rx = stream_entries(fixture.index_path(), CancellationToken::new());
        let mut ids = Vec::new();
        while let Some(entry) = rx.recv().await {
            ids.push(entry.unwrap().id());
        }
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_stream_reports_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut rx = stream_entries(dir.path().join("texture.entries"), CancellationToken::new());

        assert!(matches!(
            rx.recv().await,
            Some(Err(CacheError::Format(FormatError::Io { .. })))
        ));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_reader() {
        let total = STREAM_BUFFER * 3;
        let mut builder = CacheBuilder::new();
        for i in 0..total {
            builder = builder.entry(FixtureEntry::inline(Uuid::new_v4(), vec![i as u8; 4]));
        }
        let fixture = builder.build();

        let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);
        let reader = spawn_reader(Cache::new(fixture.index_path()), CancellationToken::new(), tx);
        assert!(rx.recv().await.unwrap().is_ok());
        drop(rx);

        // Buffered entries plus the one received, never the whole cache.
        let sent = reader.await.unwrap();
        assert!(sent <= STREAM_BUFFER as u32 + 1, "sent {sent} entries");
        assert!((sent as usize) < total);
    }

    #[tokio::test]
    async fn test_stream_honours_cancellation() {
        let fixture = CacheBuilder::new()
            .entry(FixtureEntry::inline(Uuid::new_v4(), vec![1; 8]))
            .entry(FixtureEntry::inline(Uuid::new_v4(), vec![2; 8]))
            .build();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut rx = stream_entries(fixture.index_path(), cancel);
        assert!(matches!(rx.recv().await, Some(Err(CacheError::Cancelled))));
        assert!(rx.recv().await.is_none());
    }
}
