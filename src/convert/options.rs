use crate::plan::{LevelSelection, SlideCoordinates, TileSize, DEFAULT_MAX_FRAME_COUNT};
use crate::tile::FrameCodec;

/// Fallback encode concurrency when the platform cannot report its own
const FALLBACK_WORKERS: usize = 4;

/// Settings for one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Upper bound on frames per output instance
    pub max_frame_count: usize,
    pub tile_size: TileSize,
    pub levels: LevelSelection,
    pub codec: FrameCodec,
    /// Tiles read and encoded concurrently within one batch
    pub workers: usize,
    pub coordinates: SlideCoordinates,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            max_frame_count: DEFAULT_MAX_FRAME_COUNT,
            tile_size: TileSize::default(),
            levels: LevelSelection::All,
            codec: FrameCodec::default(),
            workers: default_workers(),
            coordinates: SlideCoordinates::default(),
        }
    }
}

/// One worker per available CPU.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_WORKERS)
}
