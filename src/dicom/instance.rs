//! The per-batch output unit handed to a container writer.

use crate::plan::{FrameMetadata, TileSize};
use crate::tile::{FrameCodec, PixelStream};

/// One output instance: a batch's frame metadata and packed pixel data,
/// plus the identifiers that differ between instances.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInstance {
    pub instance_number: u32,
    pub level: usize,
    pub codec: FrameCodec,
    /// Rows/Columns of every frame
    pub tile_size: TileSize,
    /// Level-native `(columns, rows)` of the total pixel matrix
    pub total_matrix: (u32, u32),
    /// `(row spacing, column spacing)` in mm at this level
    pub pixel_spacing: (f64, f64),
    /// Slide coordinates of the total pixel matrix origin, in mm
    pub origin: (f64, f64),
    /// One entry per frame, in the same order as the pixel stream
    pub frames: Vec<FrameMetadata>,
    pub pixel_stream: PixelStream,
}

impl ContainerInstance {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Whether the metadata list and pixel stream agree on the frame count.
    pub fn is_consistent(&self) -> bool {
        self.frames.len() == self.pixel_stream.frame_count()
            && self.codec.is_compressed() == self.pixel_stream.is_encapsulated()
    }
}
