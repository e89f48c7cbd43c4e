//! Parsers for the on-disk structure of Whole Slide Image files.
//!
//! - [`tiff`]: TIFF/BigTIFF headers, IFDs and pyramid levels
//! - [`jpeg`]: JPEGTables merging for abbreviated tile streams
//! - [`metadata`]: vendor metadata from `ImageDescription`

pub mod jpeg;
pub mod metadata;
pub mod tiff;

pub use jpeg::{is_abbreviated_stream, is_complete_stream, merge_jpeg_tables, prepare_tile_jpeg};
pub use metadata::SlideMetadata;
