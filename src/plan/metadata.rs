//! Per-frame position metadata.

use serde::{Deserialize, Serialize};

use super::{FrameBatch, TileDescriptor};

/// Default slide origin, in millimetres
pub const DEFAULT_ORIGIN_X_MM: f64 = 20.0;
pub const DEFAULT_ORIGIN_Y_MM: f64 = 40.0;

/// Default level-0 pixel spacing, in millimetres (0.25 µm)
pub const DEFAULT_PIXEL_SPACING_MM: f64 = 0.00025;

/// Physical placement of the image on the slide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlideCoordinates {
    pub origin_x: f64,
    pub origin_y: f64,
    /// Level-0 pixel spacing along x (mm)
    pub spacing_x: f64,
    /// Level-0 pixel spacing along y (mm)
    pub spacing_y: f64,
}

impl SlideCoordinates {
    /// Default origin with a uniform level-0 spacing.
    pub fn with_spacing(spacing: f64) -> Self {
        Self {
            spacing_x: spacing,
            spacing_y: spacing,
            ..Self::default()
        }
    }
}

impl Default for SlideCoordinates {
    fn default() -> Self {
        Self {
            origin_x: DEFAULT_ORIGIN_X_MM,
            origin_y: DEFAULT_ORIGIN_Y_MM,
            spacing_x: DEFAULT_PIXEL_SPACING_MM,
            spacing_y: DEFAULT_PIXEL_SPACING_MM,
        }
    }
}

/// Position record for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameMetadata {
    /// `(column, row)`, copied from the tile descriptor
    pub dimension_index: (u32, u32),
    pub slide_x_offset: f64,
    pub slide_y_offset: f64,
    pub slide_z_offset: f64,
    /// 1-based column within the level's total pixel matrix
    pub matrix_col_position: u64,
    /// 1-based row within the level's total pixel matrix
    pub matrix_row_position: u64,
}

/// Computes [`FrameMetadata`] from tile descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameMetadataBuilder {
    coordinates: SlideCoordinates,
}

impl FrameMetadataBuilder {
    pub fn new(coordinates: SlideCoordinates) -> Self {
        Self { coordinates }
    }

    pub fn coordinates(&self) -> &SlideCoordinates {
        &self.coordinates
    }

    /// Slide offsets use level-0 pixel coordinates. Matrix positions divide
    /// those by the level's downsample factor.
    pub fn build(&self, tile: &TileDescriptor, downsample: f64) -> FrameMetadata {
        let c = &self.coordinates;
        FrameMetadata {
            dimension_index: (tile.column_index, tile.row_index),
            slide_x_offset: c.origin_x + tile.pixel_x as f64 * c.spacing_x,
            slide_y_offset: c.origin_y + tile.pixel_y as f64 * c.spacing_y,
            slide_z_offset: 0.0,
            matrix_col_position: (tile.pixel_x as f64 / downsample).floor() as u64 + 1,
            matrix_row_position: (tile.pixel_y as f64 / downsample).floor() as u64 + 1,
        }
    }

    /// Metadata for every frame of a batch, in frame order.
    pub fn build_batch(&self, batch: &FrameBatch, downsample: f64) -> Vec<FrameMetadata> {
        batch
            .tiles
            .iter()
            .map(|tile| self.build(tile, downsample))
            .collect()
    }
}
