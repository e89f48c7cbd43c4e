//! Grouping a level's tiles into size-bounded instance batches.

use crate::error::PlanError;

use super::TileDescriptor;

/// Default maximum number of frames per output instance
pub const DEFAULT_MAX_FRAME_COUNT: usize = 500;

/// Contiguous run of one level's tiles, destined for one output instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBatch {
    pub level: usize,
    /// Position of this batch among the level's batches (0-based)
    pub batch_index: usize,
    pub tiles: Vec<TileDescriptor>,
}

impl FrameBatch {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Splits scan-ordered tiles into batches of at most `max_frame_count`.
#[derive(Debug, Clone, Copy)]
pub struct InstanceSplitter {
    max_frame_count: usize,
}

impl InstanceSplitter {
    pub fn new(max_frame_count: usize) -> Result<Self, PlanError> {
        if max_frame_count == 0 {
            return Err(PlanError::InvalidMaxFrameCount);
        }
        Ok(Self { max_frame_count })
    }

    pub fn max_frame_count(&self) -> usize {
        self.max_frame_count
    }

    /// Partition `tiles` without reordering. Only the last batch may be
    /// short; no tiles means no batches.
    pub fn split(&self, level: usize, tiles: &[TileDescriptor]) -> Vec<FrameBatch> {
        tiles
            .chunks(self.max_frame_count)
            .enumerate()
            .map(|(batch_index, chunk)| FrameBatch {
                level,
                batch_index,
                tiles: chunk.to_vec(),
            })
            .collect()
    }

    /// Number of batches `tile_count` tiles produce.
    pub fn batch_count(&self, tile_count: usize) -> usize {
        tile_count.div_ceil(self.max_frame_count)
    }
}
