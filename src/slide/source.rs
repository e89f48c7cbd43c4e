//! The `ImageSource` trait: the converter's view of a multi-resolution slide.
//!
//! Everything the planner and encoder need from a slide goes through this
//! trait, so conversion logic never touches file formats directly. The
//! shipped implementation is [`super::TiffSlide`]; tests plug in synthetic
//! in-memory pyramids.

use async_trait::async_trait;
use image::RgbImage;

use crate::error::SourceError;

/// Read access to a pyramidal Whole Slide Image.
///
/// Level 0 is the full-resolution image. Higher levels are progressively
/// downsampled.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Number of pyramid levels.
    fn level_count(&self) -> usize;

    /// Native `(width, height)` of a level, or `None` if out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Ratio of level-0 pixel size to this level's pixel size.
    ///
    /// Level 0 reports 1.0. Returns `None` if the level is out of range.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Physical resolution of level 0, if the file records one.
    fn microns_per_pixel(&self) -> Option<f64> {
        None
    }

    /// Read a `width × height` RGB region of `level`.
    ///
    /// `x` and `y` are level-0 coordinates of the region's top-left corner.
    /// Pixels that fall outside the level are returned as black. Fails if
    /// the level does not exist or the origin lies outside the image.
    async fn read_region(
        &self,
        level: usize,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, SourceError>;
}
