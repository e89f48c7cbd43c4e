//! Slide access layer.
//!
//! The converter only sees the [`ImageSource`] trait:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           InstanceAssembler             │
//! └────────────────────┬────────────────────┘
//!                      │ level geometry, read_region
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          ImageSource trait              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  TiffSlide (TIFF/SVS + decoded cache)   │
//! └────────────────────┬────────────────────┘
//!                      │ byte ranges
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          RangeReader (local file)       │
//! └─────────────────────────────────────────┘
//! ```

mod cache;
mod geometry;
mod source;
mod tiff_slide;

pub use cache::{DecodedTileCache, SourceTileKey, DEFAULT_DECODED_CACHE_CAPACITY};
pub use geometry::{LevelGeometry, PyramidGeometry};
pub use source::ImageSource;
pub use tiff_slide::TiffSlide;
