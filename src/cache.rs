/// Block Read Caching
///
/// Time-lock evaluation reads the block of every output it checks. Outputs of
/// one address cluster in a few blocks, so a small LRU in front of the chain
/// view removes most repeated reads within a request.
///
/// The cache is request-scoped: build a `CachedChain` per query and drop it
/// afterwards, so later requests always see current chain state.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::SapiError;
use crate::ledger::ChainView;
use crate::metrics;
use crate::types::Block;

/// Default number of blocks kept per request
pub const DEFAULT_BLOCK_CACHE_SIZE: usize = 256;

/// `ChainView` wrapper with an LRU of recently read blocks
pub struct CachedChain<'a> {
    inner: &'a dyn ChainView,
    blocks: Mutex<LruCache<i32, Arc<Block>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<'a> CachedChain<'a> {
    pub fn new(inner: &'a dyn ChainView) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_CACHE_SIZE)
    }

    pub fn with_capacity(inner: &'a dyn ChainView, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            blocks: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// (hits, misses) since construction
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

impl ChainView for CachedChain<'_> {
    fn height(&self) -> i32 {
        self.inner.height()
    }

    fn median_time_past(&self) -> Option<i64> {
        self.inner.median_time_past()
    }

    fn read_block(&self, height: i32) -> Result<Arc<Block>, SapiError> {
        {
            let mut cache = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(block) = cache.get(&height) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::BLOCK_READS.with_label_values(&["cache"]).inc();
                return Ok(Arc::clone(block));
            }
        }

        // Read outside the lock; failures are not cached
        let block = self.inner.read_block(height)?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::BLOCK_READS.with_label_values(&["ledger"]).inc();

        let mut cache = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(height, Arc::clone(&block));
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::fixtures::{txid, SnapshotBuilder};

    #[test]
    fn test_repeated_reads_hit_cache() {
        let ledger = SnapshotBuilder::new()
            .tip(10, Some(42))
            .block_tx(5, txid(1), vec![])
            .block_tx(6, txid(2), vec![])
            .build();
        let chain = CachedChain::new(&ledger);

        for _ in 0..5 {
            assert_eq!(chain.read_block(5).unwrap().height, 5);
        }
        assert_eq!(chain.read_block(6).unwrap().height, 6);

        assert_eq!(ledger.block_reads(), 2);
        assert_eq!(chain.stats(), (4, 2));
        assert_eq!(chain.height(), 10);
        assert_eq!(chain.median_time_past(), Some(42));
    }

    #[test]
    fn test_eviction_and_errors() {
        let ledger = SnapshotBuilder::new()
            .block_tx(1, txid(1), vec![])
            .block_tx(2, txid(2), vec![])
            .build();
        let chain = CachedChain::with_capacity(&ledger, 1);

        chain.read_block(1).unwrap();
        chain.read_block(2).unwrap();
        chain.read_block(1).unwrap(); // evicted by block 2
        assert_eq!(ledger.block_reads(), 3);

        assert_eq!(chain.read_block(9).unwrap_err(), SapiError::BlockNotFound(9));
        assert_eq!(chain.read_block(9).unwrap_err(), SapiError::BlockNotFound(9));
        assert_eq!(ledger.block_reads(), 5);
    }
}
