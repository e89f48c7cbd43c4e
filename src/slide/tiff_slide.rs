//! `ImageSource` backed by a tiled pyramidal TIFF (Aperio SVS, generic
//! pyramidal TIFF, BigTIFF).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use tracing::{debug, info};

use crate::error::{SourceError, TiffError};
use crate::format::tiff::{Compression, PyramidLevel, TiffPyramid, TiffTag, TileData, ValueReader};
use crate::format::{prepare_tile_jpeg, SlideMetadata};
use crate::io::{FileRangeReader, RangeReader};

use super::cache::{DecodedTileCache, SourceTileKey};
use super::ImageSource;

/// A tiled TIFF slide read through a [`RangeReader`].
///
/// The IFD chain and every level's tile offset arrays are read once on open.
/// Tile pixels are fetched and decoded lazily, then kept in a
/// [`DecodedTileCache`].
pub struct TiffSlide<R: RangeReader> {
    reader: R,
    pyramid: TiffPyramid,
    tile_data: Vec<TileData>,
    metadata: SlideMetadata,
    cache: DecodedTileCache,
}

impl TiffSlide<FileRangeReader> {
    /// Open a slide file from the local filesystem.
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let reader = FileRangeReader::open(path).await?;
        Self::open(reader).await
    }
}

impl<R: RangeReader> TiffSlide<R> {
    /// Parse the pyramid structure behind `reader`.
    pub async fn open(reader: R) -> Result<Self, SourceError> {
        let pyramid = TiffPyramid::parse(&reader).await?;

        let mut tile_data = Vec::with_capacity(pyramid.level_count());
        for level in &pyramid.levels {
            tile_data.push(TileData::load(&reader, level, &pyramid.header).await?);
        }

        let metadata = Self::read_metadata(&reader, &pyramid).await;

        info!(
            slide = reader.identifier(),
            levels = pyramid.level_count(),
            mpp = ?metadata.mpp,
            "Opened slide"
        );
        for level in &pyramid.levels {
            debug!(
                level = level.level_index,
                width = level.width,
                height = level.height,
                downsample = level.downsample,
                compression = %level.compression.name(),
                "Pyramid level"
            );
        }

        Ok(Self {
            reader,
            pyramid,
            tile_data,
            metadata,
            cache: DecodedTileCache::new(),
        })
    }

    /// Replace the decoded-tile cache with one of `bytes` capacity.
    pub fn with_cache_capacity(mut self, bytes: usize) -> Self {
        self.cache = DecodedTileCache::with_capacity(bytes);
        self
    }

    pub fn metadata(&self) -> &SlideMetadata {
        &self.metadata
    }

    pub fn identifier(&self) -> &str {
        self.reader.identifier()
    }

    /// Vendor metadata from level 0's ImageDescription. Missing or
    /// unreadable descriptions yield empty metadata.
    async fn read_metadata(reader: &R, pyramid: &TiffPyramid) -> SlideMetadata {
        let Some(entry) = pyramid
            .get_level(0)
            .and_then(|level| level.ifd.get_entry_by_tag(TiffTag::ImageDescription))
        else {
            return SlideMetadata::default();
        };

        match ValueReader::new(reader, &pyramid.header)
            .read_string(entry)
            .await
        {
            Ok(description) => SlideMetadata::parse(&description),
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable ImageDescription");
                SlideMetadata::default()
            }
        }
    }

    fn level(&self, level: usize) -> Result<&PyramidLevel, SourceError> {
        self.pyramid.get_level(level).ok_or(SourceError::InvalidLevel {
            level,
            level_count: self.pyramid.level_count(),
        })
    }

    /// Fetch and decode one source tile, going through the cache.
    async fn source_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Arc<RgbImage>, SourceError> {
        let key = SourceTileKey {
            level,
            tile_x,
            tile_y,
        };
        if let Some(tile) = self.cache.get(&key).await {
            return Ok(tile);
        }

        let info = self.level(level)?;
        let index = info.tile_index(tile_x, tile_y).ok_or_else(|| SourceError::Decode {
            message: format!("tile ({}, {}) outside level {}", tile_x, tile_y, level),
        })?;
        let (offset, length) = self.tile_data[level]
            .location(index)
            .ok_or_else(|| SourceError::Decode {
                message: format!("no offset recorded for tile {} of level {}", index, level),
            })?;

        // Sparse files leave unscanned tiles empty
        let tile = if length == 0 {
            RgbImage::new(info.tile_width, info.tile_height)
        } else {
            let data = self.reader.read_exact_at(offset, length as usize).await?;
            let tables = self.tile_data[level].jpeg_tables.as_deref();
            self.decode_tile(info, tables, &data)?
        };

        let tile = Arc::new(tile);
        self.cache.put(key, Arc::clone(&tile)).await;
        Ok(tile)
    }

    fn decode_tile(
        &self,
        level: &PyramidLevel,
        jpeg_tables: Option<&[u8]>,
        data: &[u8],
    ) -> Result<RgbImage, SourceError> {
        match level.compression {
            Compression::None => {
                let samples = level
                    .ifd
                    .get_u32(TiffTag::SamplesPerPixel, self.pyramid.header.byte_order)
                    .unwrap_or(1);
                if samples != 3 {
                    return Err(SourceError::Decode {
                        message: format!("expected 3 samples per pixel, found {}", samples),
                    });
                }

                let expected = level.tile_width as usize * level.tile_height as usize * 3;
                if data.len() < expected {
                    return Err(SourceError::Decode {
                        message: format!(
                            "uncompressed tile has {} bytes, expected {}",
                            data.len(),
                            expected
                        ),
                    });
                }

                RgbImage::from_raw(level.tile_width, level.tile_height, data[..expected].to_vec())
                    .ok_or_else(|| SourceError::Decode {
                        message: "tile buffer does not match tile dimensions".to_string(),
                    })
            }
            Compression::Jpeg => {
                let stream = prepare_tile_jpeg(jpeg_tables, data);
                let decoded = image::load_from_memory_with_format(&stream, ImageFormat::Jpeg)
                    .map_err(|e| SourceError::Decode {
                        message: e.to_string(),
                    })?;
                Ok(decoded.to_rgb8())
            }
            other => Err(SourceError::Tiff(TiffError::UnsupportedCompression(
                other.name(),
            ))),
        }
    }
}

#[async_trait]
impl<R: RangeReader> ImageSource for TiffSlide<R> {
    fn level_count(&self) -> usize {
        self.pyramid.level_count()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.pyramid.get_level(level).map(|l| (l.width, l.height))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.pyramid.get_level(level).map(|l| l.downsample)
    }

    fn microns_per_pixel(&self) -> Option<f64> {
        self.metadata.mpp
    }

    async fn read_region(
        &self,
        level: usize,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, SourceError> {
        let info = self.level(level)?;
        let base = self.level(0)?;
        if x >= base.width as u64 || y >= base.height as u64 {
            return Err(SourceError::RegionOutOfBounds {
                level,
                x,
                y,
                width: base.width,
                height: base.height,
            });
        }

        let mut region = RgbImage::new(width, height);

        // Level-native origin of the region
        let left = (x as f64 / info.downsample).floor() as u64;
        let top = (y as f64 / info.downsample).floor() as u64;
        let right = (left + width as u64).min(info.width as u64);
        let bottom = (top + height as u64).min(info.height as u64);
        if left >= right || top >= bottom {
            return Ok(region);
        }

        let tile_w = info.tile_width as u64;
        let tile_h = info.tile_height as u64;
        let region_stride = width as usize * 3;
        let buf: &mut [u8] = &mut region;

        for tile_y in top / tile_h..=(bottom - 1) / tile_h {
            for tile_x in left / tile_w..=(right - 1) / tile_w {
                let tile = self.source_tile(level, tile_x as u32, tile_y as u32).await?;

                let tile_left = tile_x * tile_w;
                let tile_top = tile_y * tile_h;
                let x0 = left.max(tile_left);
                let x1 = right.min(tile_left + tile.width() as u64);
                let y0 = top.max(tile_top);
                let y1 = bottom.min(tile_top + tile.height() as u64);
                if x0 >= x1 || y0 >= y1 {
                    continue;
                }

                let span = (x1 - x0) as usize * 3;
                let tile_stride = tile.width() as usize * 3;
                let src = tile.as_raw();
                for row in y0..y1 {
                    let src_start =
                        (row - tile_top) as usize * tile_stride + (x0 - tile_left) as usize * 3;
                    let dst_start =
                        (row - top) as usize * region_stride + (x0 - left) as usize * 3;
                    buf[dst_start..dst_start + span]
                        .copy_from_slice(&src[src_start..src_start + span]);
                }
            }
        }

        Ok(region)
    }
}
