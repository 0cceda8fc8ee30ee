//! Bounded parallel thumbnail decoding.

use std::sync::Arc;
use std::thread;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::backend::Jpeg2000Backend;
use super::pixels::PackedImage;
use super::thumbnail::ThumbnailDecoder;
use crate::cache::CacheEntry;
use crate::error::{CacheError, CacheResult};

/// Result of one thumbnail request, paired with the entry it was for.
#[derive(Debug)]
pub struct ThumbnailOutcome {
    pub entry: CacheEntry,
    pub result: CacheResult<Option<PackedImage>>,
}

/// Runs thumbnail decodes on the blocking pool, at most `workers` at once.
pub struct ThumbnailPool<B> {
    decoder: Arc<ThumbnailDecoder<B>>,
    workers: usize,
    max_dimension: u32,
}

impl<B> ThumbnailPool<B>
where
    B: Jpeg2000Backend + 'static,
{
    /// `workers == 0` sizes the pool to the number of CPUs.
    pub fn new(decoder: Arc<ThumbnailDecoder<B>>, workers: usize, max_dimension: u32) -> Self {
        let workers = if workers == 0 {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            workers
        };
        Self {
            decoder,
            workers,
            max_dimension,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Decode a thumbnail for every entry.
    ///
    /// Outcomes come back in input order. Once `cancel` fires no new decode
    /// starts; entries that never started report [`CacheError::Cancelled`],
    /// decodes already running are allowed to finish.
    pub async fn run(
        &self,
        entries: Vec<CacheEntry>,
        cancel: CancellationToken,
    ) -> Vec<ThumbnailOutcome> {
        let permits = Arc::new(Semaphore::new(self.workers));
        let total = entries.len();
        let mut handles: Vec<(CacheEntry, Option<JoinHandle<CacheResult<Option<PackedImage>>>>)> =
            Vec::with_capacity(total);

        info!(total, workers = self.workers, "Decoding thumbnails");

        for entry in entries {
            let permit = if cancel.is_cancelled() {
                None
            } else {
                tokio::select! {
                    permit = Arc::clone(&permits).acquire_owned() => permit.ok(),
                    _ = cancel.cancelled() => None,
                }
            };

            let Some(permit) = permit else {
                handles.push((entry, None));
                continue;
            };

            let decoder = Arc::clone(&self.decoder);
            let max_dimension = self.max_dimension;
            let job = entry.clone();
            let handle = task::spawn_blocking(move || {
                let _permit = permit;
                decoder.thumbnail(&job, max_dimension)
            });
            handles.push((entry, Some(handle)));
        }

        let mut outcomes = Vec::with_capacity(total);
        for (entry, handle) in handles {
            let result = match handle {
                Some(handle) => handle.await.unwrap_or_else(|e| Err(CacheError::from(e))),
                None => Err(CacheError::Cancelled),
            };
            outcomes.push(ThumbnailOutcome { entry, result });
        }

        debug!(
            decoded = outcomes.iter().filter(|o| matches!(o.result, Ok(Some(_)))).count(),
            total,
            "Thumbnail batch finished"
        );
        outcomes
    }
}

impl<B> std::fmt::Debug for ThumbnailPool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailPool")
            .field("workers", &self.workers)
            .field("max_dimension", &self.max_dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::cache::Cache;
    use crate::decode::pixels::ComponentPlane;
    use crate::testing::{CacheBuilder, FixtureEntry, MockBackend};

    fn entries(fixture: &crate::testing::CacheFixture) -> Vec<CacheEntry> {
        Cache::new(fixture.index_path())
            .entries()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn fixture_with(count: usize) -> crate::testing::CacheFixture {
        let mut builder = CacheBuilder::new();
        for i in 0..count {
            builder = builder.entry(FixtureEntry::inline(Uuid::new_v4(), vec![i as u8; 16]));
        }
        builder.build()
    }

    #[test]
    fn test_zero_workers_means_cpu_count() {
        let decoder = Arc::new(ThumbnailDecoder::new(MockBackend::failing()));
        let pool = ThumbnailPool::new(decoder, 0, 64);
        assert!(pool.workers() >= 1);
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let fixture = fixture_with(6);
        let entries = entries(&fixture);
        let ids: Vec<_> = entries.iter().map(|e| e.id()).collect();
        let backend =
            MockBackend::with_image(2, 2, vec![ComponentPlane::unsigned8(2, 2, vec![1; 4])]);
        let pool = ThumbnailPool::new(Arc::new(ThumbnailDecoder::new(backend)), 2, 64);

        let outcomes = pool.run(entries, CancellationToken::new()).await;

        assert_eq!(outcomes.iter().map(|o| o.entry.id()).collect::<Vec<_>>(), ids);
        assert!(outcomes.iter().all(|o| matches!(o.result, Ok(Some(_)))));
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let fixture = CacheBuilder::new()
            .entry(FixtureEntry::no_image(Uuid::new_v4()))
            .entry(FixtureEntry::inline(Uuid::new_v4(), vec![3; 16]))
            .build();
        let pool = ThumbnailPool::new(
            Arc::new(ThumbnailDecoder::new(MockBackend::failing())),
            1,
            64,
        );

        let outcomes = pool.run(entries(&fixture), CancellationToken::new()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o.result, Ok(None))));
    }

    #[tokio::test]
    async fn test_cancelled_pool_starts_nothing() {
        let fixture = fixture_with(3);
        let backend =
            MockBackend::with_image(2, 2, vec![ComponentPlane::unsigned8(2, 2, vec![1; 4])]);
        let decoder = Arc::new(ThumbnailDecoder::new(backend));
        let pool = ThumbnailPool::new(Arc::clone(&decoder), 1, 64);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = pool.run(entries(&fixture), cancel).await;
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, Err(CacheError::Cancelled))));
        assert_eq!(decoder.backend().last_input(), None);
    }
}
