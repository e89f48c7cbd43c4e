//! Conversion planning: tile layout, instance batches and frame metadata.
//!
//! Planning is pure. It works from a [`crate::slide::PyramidGeometry`]
//! snapshot and never reads pixels, so the same plan can be inspected
//! without encoding anything.

mod layout;
mod metadata;
mod split;

pub use layout::{
    FrameLayoutPlanner, LevelPlan, LevelSelection, TileDescriptor, TileSize, DEFAULT_TILE_SIZE,
    MAX_TILE_SIDE,
};
pub use metadata::{
    FrameMetadata, FrameMetadataBuilder, SlideCoordinates, DEFAULT_ORIGIN_X_MM,
    DEFAULT_ORIGIN_Y_MM, DEFAULT_PIXEL_SPACING_MM,
};
pub use split::{FrameBatch, InstanceSplitter, DEFAULT_MAX_FRAME_COUNT};
