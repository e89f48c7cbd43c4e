//! TIFF parser for Whole Slide Images.
//!
//! Handles classic TIFF and BigTIFF in either byte order. Only the structure
//! needed to find pyramid tiles is parsed: the header, the IFD chain, and
//! the tile location arrays of each level.

mod parser;
mod pyramid;
mod tags;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{PyramidLevel, TiffPyramid, TileData};
pub use tags::{Compression, FieldType, TiffTag};
pub use values::{parse_u64_array, ValueReader};
