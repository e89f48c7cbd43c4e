//! TIFF pyramid level identification.
//!
//! A WSI file holds several IFDs: the resolution levels plus label, macro
//! and thumbnail images. Levels are the tiled IFDs whose dimensions shrink by
//! roughly power-of-two factors from the largest one.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

/// Maximum number of IFDs to walk.
const MAX_IFDS: usize = 100;

/// Images smaller than this on either side are thumbnails.
const MIN_PYRAMID_DIMENSION: u32 = 256;

/// Square-ish images up to this size are labels or macros.
const MAX_LABEL_DIMENSION: u32 = 1000;

// =============================================================================
// PyramidLevel
// =============================================================================

/// One resolution level of the pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Index in the pyramid (0 = highest resolution)
    pub level_index: usize,

    /// Index of the IFD in the file's IFD chain
    pub ifd_index: usize,

    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,

    /// Downsample factor relative to level 0 (1.0 for level 0)
    pub downsample: f64,

    pub compression: Compression,

    pub ifd: Ifd,
}

impl PyramidLevel {
    /// Build a level from an IFD; `None` if the IFD is not tiled.
    fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order)?;
        let tile_height = ifd.tile_height(byte_order)?;
        let width = ifd.image_width(byte_order)?;
        let height = ifd.image_height(byte_order)?;

        if tile_width == 0 || tile_height == 0 {
            return None;
        }

        let compression = Compression::from_u16(ifd.compression(byte_order).unwrap_or(1));

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            downsample: 1.0,
            compression,
            ifd,
        })
    }

    fn has_tile_data(&self) -> bool {
        self.ifd.get_entry_by_tag(TiffTag::TileOffsets).is_some()
            && self.ifd.get_entry_by_tag(TiffTag::TileByteCounts).is_some()
    }

    /// Linear tile index for a tile coordinate (row-major, as TIFF stores them).
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<usize> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y as usize * self.tiles_x as usize + tile_x as usize)
    }

    fn entry(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.ifd.get_entry_by_tag(tag)
    }
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// The pyramid levels of a TIFF file, sorted by resolution.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    pub levels: Vec<PyramidLevel>,
}

impl TiffPyramid {
    /// Parse the header, walk the IFD chain and identify pyramid levels.
    pub async fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        let header_len = reader.size().min(BIGTIFF_HEADER_SIZE as u64) as usize;
        if header_len < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: header_len as u64,
            });
        }
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header).await?;
        let pyramid = Self::build_pyramid(header, ifds);

        if pyramid.levels.is_empty() {
            return Err(TiffError::NoPyramidLevels);
        }
        Ok(pyramid)
    }

    async fn parse_all_ifds<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
            let entry_count = if header.is_bigtiff {
                header.byte_order.read_u64(&count_bytes)
            } else {
                header.byte_order.read_u16(&count_bytes) as u64
            };

            let ifd_size = Ifd::calculate_size(entry_count, header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    fn build_pyramid(header: TiffHeader, ifds: Vec<Ifd>) -> Self {
        let mut candidates: Vec<PyramidLevel> = ifds
            .into_iter()
            .enumerate()
            .filter_map(|(i, ifd)| PyramidLevel::from_ifd(ifd, i, header.byte_order))
            .filter(Self::is_pyramid_candidate)
            .collect();

        candidates.sort_by_key(|l| std::cmp::Reverse(l.width as u64 * l.height as u64));

        TiffPyramid {
            header,
            levels: Self::filter_pyramid_levels(candidates),
        }
    }

    fn is_pyramid_candidate(level: &PyramidLevel) -> bool {
        if level.width < MIN_PYRAMID_DIMENSION || level.height < MIN_PYRAMID_DIMENSION {
            return false;
        }
        if !level.has_tile_data() {
            return false;
        }
        if level.width <= MAX_LABEL_DIMENSION && level.height <= MAX_LABEL_DIMENSION {
            let aspect_ratio = level.width as f64 / level.height as f64;
            if aspect_ratio > 0.5 && aspect_ratio < 2.0 {
                return false;
            }
        }
        true
    }

    fn filter_pyramid_levels(candidates: Vec<PyramidLevel>) -> Vec<PyramidLevel> {
        let Some(base) = candidates.first() else {
            return candidates;
        };
        let base_width = base.width as f64;
        let base_height = base.height as f64;

        let mut levels = Vec::new();
        for (idx, mut level) in candidates.into_iter().enumerate() {
            let downsample =
                (base_width / level.width as f64 + base_height / level.height as f64) / 2.0;
            if Self::is_valid_downsample(downsample, idx) {
                level.level_index = levels.len();
                level.downsample = downsample;
                levels.push(level);
            }
        }
        levels
    }

    fn is_valid_downsample(downsample: f64, level_idx: usize) -> bool {
        if level_idx == 0 {
            return (downsample - 1.0).abs() < 0.1;
        }
        let rounded = downsample.log2().round();
        if rounded < 1.0 {
            return false;
        }
        let ratio = downsample / 2.0_f64.powf(rounded);
        ratio > 0.8 && ratio < 1.2
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }
}

// =============================================================================
// Tile Data Loading
// =============================================================================

/// Tile locations and JPEG tables for one level.
#[derive(Debug, Clone)]
pub struct TileData {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Load the TileOffsets/TileByteCounts arrays and JPEGTables of a level.
    pub async fn load<R: RangeReader + ?Sized>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets_entry = level
            .entry(TiffTag::TileOffsets)
            .ok_or(TiffError::MissingTag(TiffTag::TileOffsets.name()))?;
        let counts_entry = level
            .entry(TiffTag::TileByteCounts)
            .ok_or(TiffError::MissingTag(TiffTag::TileByteCounts.name()))?;

        let offsets = values.read_u64_array(offsets_entry).await?;
        let byte_counts = values.read_u64_array(counts_entry).await?;

        let expected = level.tiles_x as usize * level.tiles_y as usize;
        if offsets.len() < expected || byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "expected {} tiles, found {} offsets and {} byte counts",
                    expected,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match level.entry(TiffTag::JpegTables) {
            Some(entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// Offset and size of the tile at `index`.
    pub fn location(&self, index: usize) -> Option<(u64, u64)> {
        Some((*self.offsets.get(index)?, *self.byte_counts.get(index)?))
    }
}
