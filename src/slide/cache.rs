//! LRU cache of decoded source tiles.
//!
//! Output frames rarely line up with the file's own tiles, so neighbouring
//! frames decode the same source tile more than once. The cache bounds the
//! total decoded bytes and evicts least-recently-used tiles past that.

use std::num::NonZeroUsize;
use std::sync::Arc;

use image::RgbImage;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default capacity: 256MB of decoded RGB pixels
pub const DEFAULT_DECODED_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Upper bound on entries, independent of their size
const MAX_ENTRIES: usize = 4_096;

/// Source tile coordinate within one slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceTileKey {
    pub level: usize,
    pub tile_x: u32,
    pub tile_y: u32,
}

struct CacheState {
    entries: LruCache<SourceTileKey, Arc<RgbImage>>,
    current_size: usize,
}

/// Size-bounded LRU cache of decoded tiles, shareable across tasks.
pub struct DecodedTileCache {
    state: Mutex<CacheState>,
    max_size: usize,
}

impl DecodedTileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DECODED_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of pixels.
    pub fn with_capacity(max_size: usize) -> Self {
        let max_entries = NonZeroUsize::new(MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(max_entries),
                current_size: 0,
            }),
            max_size,
        }
    }

    pub async fn get(&self, key: &SourceTileKey) -> Option<Arc<RgbImage>> {
        let mut state = self.state.lock().await;
        state.entries.get(key).cloned()
    }

    /// Insert a tile, evicting old entries until the cache fits its budget.
    pub async fn put(&self, key: SourceTileKey, tile: Arc<RgbImage>) {
        let tile_size = tile.as_raw().len();
        let mut state = self.state.lock().await;

        if let Some(old) = state.entries.peek(&key) {
            let old_size = old.as_raw().len();
            state.current_size = state.current_size.saturating_sub(old_size);
        }

        // LruCache::push hands back whatever it displaced (same key or the
        // entry-count eviction), so both are accounted for here.
        if let Some((evicted_key, evicted)) = state.entries.push(key, tile) {
            if evicted_key != key {
                let evicted_size = evicted.as_raw().len();
                state.current_size = state.current_size.saturating_sub(evicted_size);
            }
        }
        state.current_size += tile_size;

        while state.current_size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    let evicted_size = evicted.as_raw().len();
                    state.current_size = state.current_size.saturating_sub(evicted_size);
                }
                None => break,
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Total decoded bytes currently held.
    pub async fn size(&self) -> usize {
        self.state.lock().await.current_size
    }
}

impl Default for DecodedTileCache {
    fn default() -> Self {
        Self::new()
    }
}
