//! Test utilities for integration tests.
//!
//! Provides a synthetic in-memory pyramid, recording container writers and a
//! builder for tiled pyramidal TIFF files (uncompressed or JPEG tiles, with
//! or without shared JPEGTables).

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use wsi_dicom::dicom::{instance_file_name, ContainerInstance, ContainerWriter, SharedMetadata};
use wsi_dicom::error::{IoError, SourceError, WriterError};
use wsi_dicom::io::{check_range, RangeReader};
use wsi_dicom::slide::ImageSource;

// =============================================================================
// Synthetic Image Source
// =============================================================================

/// Deterministic pixel value at level-native coordinates.
///
/// Never pure black, so padding is distinguishable from image content.
pub fn synthetic_pixel(level: usize, x: u32, y: u32) -> [u8; 3] {
    [
        (x % 251) as u8 | 1,
        (y % 241) as u8 | 1,
        (level as u8).wrapping_mul(40) | 1,
    ]
}

/// An in-memory pyramid that computes pixels on demand.
pub struct SyntheticSlide {
    levels: Vec<(u32, u32, f64)>,
    failing: HashSet<(usize, u64, u64)>,
    mpp: Option<f64>,
    reads: AtomicUsize,
}

impl SyntheticSlide {
    /// Single-level slide of `width × height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            levels: vec![(width, height, 1.0)],
            failing: HashSet::new(),
            mpp: None,
            reads: AtomicUsize::new(0),
        }
    }

    /// Append a downsampled level.
    pub fn with_level(mut self, width: u32, height: u32, downsample: f64) -> Self {
        self.levels.push((width, height, downsample));
        self
    }

    /// Make reads of the region at level-0 `(x, y)` on `level` fail.
    pub fn failing_at(mut self, level: usize, x: u64, y: u64) -> Self {
        self.failing.insert((level, x, y));
        self
    }

    pub fn with_mpp(mut self, mpp: f64) -> Self {
        self.mpp = Some(mpp);
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for SyntheticSlide {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|&(w, h, _)| (w, h))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|&(_, _, ds)| ds)
    }

    fn microns_per_pixel(&self) -> Option<f64> {
        self.mpp
    }

    async fn read_region(
        &self,
        level: usize,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let &(level_w, level_h, ds) = self.levels.get(level).ok_or(SourceError::InvalidLevel {
            level,
            level_count: self.levels.len(),
        })?;
        let (base_w, base_h, _) = self.levels[0];
        if x >= base_w as u64 || y >= base_h as u64 {
            return Err(SourceError::RegionOutOfBounds {
                level,
                x,
                y,
                width: base_w,
                height: base_h,
            });
        }
        if self.failing.contains(&(level, x, y)) {
            return Err(SourceError::Decode {
                message: format!("synthetic failure at ({}, {})", x, y),
            });
        }

        let left = (x as f64 / ds).floor() as u32;
        let top = (y as f64 / ds).floor() as u32;
        Ok(RgbImage::from_fn(width, height, |dx, dy| {
            let (lx, ly) = (left + dx, top + dy);
            if lx < level_w && ly < level_h {
                Rgb(synthetic_pixel(level, lx, ly))
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }
}

// =============================================================================
// Recording Writers
// =============================================================================

/// A writer that keeps every instance in memory.
///
/// Instance numbers listed in `reject` are refused with a `WriterError`.
#[derive(Default)]
pub struct RecordingWriter {
    instances: Arc<RwLock<Vec<ContainerInstance>>>,
    reject: HashSet<u32>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(instances: impl IntoIterator<Item = u32>) -> Self {
        Self {
            instances: Arc::default(),
            reject: instances.into_iter().collect(),
        }
    }

    pub async fn instances(&self) -> Vec<ContainerInstance> {
        self.instances.read().await.clone()
    }
}

#[async_trait]
impl ContainerWriter for RecordingWriter {
    async fn write(
        &self,
        _shared: &SharedMetadata,
        instance: &ContainerInstance,
    ) -> Result<PathBuf, WriterError> {
        if self.reject.contains(&instance.instance_number) {
            return Err(WriterError {
                instance: instance.instance_number,
                message: "disk full".to_string(),
            });
        }
        self.instances.write().await.push(instance.clone());
        Ok(PathBuf::from(instance_file_name(
            instance.codec,
            instance.instance_number,
        )))
    }
}

// =============================================================================
// Mock Range Reader
// =============================================================================

/// In-memory range reader that counts requests.
///
/// Clones share the request counter.
#[derive(Clone)]
pub struct MockReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
}

impl MockReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: "mock://slide.svs".to_string(),
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeReader for MockReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        check_range(offset, len, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Test JPEG Creation
// =============================================================================

/// Encode an RGB image as a complete baseline JPEG.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(img).unwrap();
    buf
}

/// Split a complete JPEG into a `JPEGTables` stream (SOI, DQT/DHT, EOI) and
/// an abbreviated stream with the tables removed.
pub fn split_jpeg_tables(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut tables = vec![0xFF, 0xD8];
    let mut abbreviated = vec![0xFF, 0xD8];

    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        let marker = jpeg[pos + 1];
        if marker == 0xDA {
            // SOS: the rest is scan data and EOI
            abbreviated.extend_from_slice(&jpeg[pos..]);
            break;
        }
        let length = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let segment = &jpeg[pos..pos + 2 + length];
        if marker == 0xDB || marker == 0xC4 {
            tables.extend_from_slice(segment);
        } else {
            abbreviated.extend_from_slice(segment);
        }
        pos += 2 + length;
    }

    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, abbreviated)
}

// =============================================================================
// TIFF File Builder
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

/// How a level's tiles are stored.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TileEncoding {
    Raw,
    /// Self-contained JPEG per tile
    Jpeg,
    /// Abbreviated JPEG tiles sharing one `JPEGTables` tag
    JpegWithTables,
    /// Raw bytes labelled as LZW, which the reader does not decode
    Lzw,
}

/// Pixel value at level-native coordinates.
pub type PixelFn = fn(u32, u32) -> [u8; 3];

/// One tiled IFD.
#[derive(Clone)]
pub struct TiffLevel {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub encoding: TileEncoding,
    pub pixel: PixelFn,
    /// Tiles (column, row) stored with a byte count of zero
    pub sparse: Vec<(u32, u32)>,
}

impl TiffLevel {
    pub fn new(width: u32, height: u32, tile: u32, encoding: TileEncoding, pixel: PixelFn) -> Self {
        Self {
            width,
            height,
            tile_width: tile,
            tile_height: tile,
            encoding,
            pixel,
            sparse: Vec::new(),
        }
    }

    pub fn with_sparse_tile(mut self, column: u32, row: u32) -> Self {
        self.sparse.push((column, row));
        self
    }

    fn tiles(&self) -> (u32, u32) {
        (
            self.width.div_ceil(self.tile_width),
            self.height.div_ceil(self.tile_height),
        )
    }

    /// Encoded tile payloads in row-major order, plus JPEG tables if shared.
    fn encode_tiles(&self) -> (Vec<Vec<u8>>, Option<Vec<u8>>) {
        let (tiles_x, tiles_y) = self.tiles();
        let mut payloads = Vec::new();
        let mut shared_tables = None;

        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                if self.sparse.contains(&(tx, ty)) {
                    payloads.push(Vec::new());
                    continue;
                }

                let tile = RgbImage::from_fn(self.tile_width, self.tile_height, |px, py| {
                    let gx = tx * self.tile_width + px;
                    let gy = ty * self.tile_height + py;
                    if gx < self.width && gy < self.height {
                        Rgb((self.pixel)(gx, gy))
                    } else {
                        Rgb([0, 0, 0])
                    }
                });

                let payload = match self.encoding {
                    TileEncoding::Raw | TileEncoding::Lzw => tile.into_raw(),
                    TileEncoding::Jpeg => encode_jpeg(&tile, 95),
                    TileEncoding::JpegWithTables => {
                        let (tables, abbreviated) = split_jpeg_tables(&encode_jpeg(&tile, 95));
                        shared_tables.get_or_insert(tables);
                        abbreviated
                    }
                };
                payloads.push(payload);
            }
        }

        (payloads, shared_tables)
    }
}

/// A raw IFD entry with its value already encoded in file byte order.
struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    bytes: Vec<u8>,
}

/// Builder for classic (non-Big) TIFF pyramids.
pub struct SlideTiffBuilder {
    byte_order: ByteOrderType,
    levels: Vec<TiffLevel>,
    description: Option<String>,
    thumbnail: bool,
}

impl SlideTiffBuilder {
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrderType::LittleEndian,
            levels: Vec::new(),
            description: None,
            thumbnail: false,
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrderType) -> Self {
        self.byte_order = order;
        self
    }

    pub fn add_level(mut self, level: TiffLevel) -> Self {
        self.levels.push(level);
        self
    }

    /// ImageDescription of the first IFD.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Insert a small stripped thumbnail IFD after the first level.
    pub fn with_thumbnail(mut self) -> Self {
        self.thumbnail = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let bo = self.byte_order;
        let mut data = Vec::new();
        match bo {
            ByteOrderType::LittleEndian => data.extend_from_slice(b"II"),
            ByteOrderType::BigEndian => data.extend_from_slice(b"MM"),
        }
        write_value(&mut data, bo, 42, 2);
        write_value(&mut data, bo, 8, 4);

        let mut ifds: Vec<(Vec<Entry>, Vec<Vec<u8>>)> = Vec::new();
        for (i, level) in self.levels.iter().enumerate() {
            let description = if i == 0 {
                self.description.as_deref()
            } else {
                None
            };
            ifds.push(self.level_ifd(level, description));
            if i == 0 && self.thumbnail {
                ifds.push(self.thumbnail_ifd());
            }
        }

        let count = ifds.len();
        for (i, (entries, payloads)) in ifds.into_iter().enumerate() {
            let base = data.len() as u64;
            let block = encode_ifd(entries, payloads, bo, base, i + 1 == count);
            data.extend(block);
        }
        data
    }

    fn level_ifd(&self, level: &TiffLevel, description: Option<&str>) -> (Vec<Entry>, Vec<Vec<u8>>) {
        let bo = self.byte_order;
        let (payloads, tables) = level.encode_tiles();
        let (compression, photometric) = match level.encoding {
            TileEncoding::Raw => (1, 2),
            TileEncoding::Lzw => (5, 2),
            TileEncoding::Jpeg | TileEncoding::JpegWithTables => (7, 6),
        };

        let mut entries = vec![
            long_entry(bo, 256, level.width),
            long_entry(bo, 257, level.height),
            shorts_entry(bo, 258, &[8, 8, 8]),
            shorts_entry(bo, 259, &[compression]),
            shorts_entry(bo, 262, &[photometric]),
            shorts_entry(bo, 277, &[3]),
            shorts_entry(bo, 284, &[1]),
            shorts_entry(bo, 322, &[level.tile_width as u16]),
            shorts_entry(bo, 323, &[level.tile_height as u16]),
        ];
        if let Some(description) = description {
            let mut bytes = description.as_bytes().to_vec();
            bytes.push(0);
            entries.push(Entry {
                tag: 270,
                field_type: 2,
                count: bytes.len() as u32,
                bytes,
            });
        }
        if let Some(tables) = tables {
            entries.push(Entry {
                tag: 347,
                field_type: 7,
                count: tables.len() as u32,
                bytes: tables,
            });
        }
        (entries, payloads)
    }

    fn thumbnail_ifd(&self) -> (Vec<Entry>, Vec<Vec<u8>>) {
        let bo = self.byte_order;
        (
            vec![
                long_entry(bo, 256, 64),
                long_entry(bo, 257, 48),
                shorts_entry(bo, 259, &[1]),
                shorts_entry(bo, 277, &[3]),
            ],
            Vec::new(),
        )
    }
}

impl Default for SlideTiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lay out one IFD at `base`: entry table, then tile payloads, then
/// out-of-line values. Adds TileOffsets/TileByteCounts when there are
/// payloads.
fn encode_ifd(
    mut entries: Vec<Entry>,
    payloads: Vec<Vec<u8>>,
    bo: ByteOrderType,
    base: u64,
    last: bool,
) -> Vec<u8> {
    let has_tiles = !payloads.is_empty();
    let entry_count = entries.len() + if has_tiles { 2 } else { 0 };
    let table_size = 2 + entry_count * 12 + 4;
    let data_start = base + table_size as u64;

    let mut tail = Vec::new();
    let mut offsets = Vec::new();
    let mut counts = Vec::new();
    for payload in &payloads {
        offsets.push((data_start + tail.len() as u64) as u32);
        counts.push(payload.len() as u32);
        tail.extend_from_slice(payload);
        if tail.len() % 2 == 1 {
            tail.push(0);
        }
    }
    if has_tiles {
        entries.push(longs_entry(bo, 324, &offsets));
        entries.push(longs_entry(bo, 325, &counts));
    }
    entries.sort_by_key(|e| e.tag);

    let mut table = Vec::with_capacity(table_size);
    write_value(&mut table, bo, entry_count as u64, 2);
    for entry in &entries {
        write_value(&mut table, bo, entry.tag as u64, 2);
        write_value(&mut table, bo, entry.field_type as u64, 2);
        write_value(&mut table, bo, entry.count as u64, 4);
        if entry.bytes.len() <= 4 {
            let mut inline = entry.bytes.clone();
            inline.resize(4, 0);
            table.extend_from_slice(&inline);
        } else {
            let offset = data_start + tail.len() as u64;
            write_value(&mut table, bo, offset, 4);
            tail.extend_from_slice(&entry.bytes);
            if tail.len() % 2 == 1 {
                tail.push(0);
            }
        }
    }

    let next = if last {
        0
    } else {
        data_start + tail.len() as u64
    };
    write_value(&mut table, bo, next, 4);

    table.extend(tail);
    table
}

fn long_entry(bo: ByteOrderType, tag: u16, value: u32) -> Entry {
    longs_entry(bo, tag, &[value])
}

fn longs_entry(bo: ByteOrderType, tag: u16, values: &[u32]) -> Entry {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &v in values {
        write_value(&mut bytes, bo, v as u64, 4);
    }
    Entry {
        tag,
        field_type: 4,
        count: values.len() as u32,
        bytes,
    }
}

fn shorts_entry(bo: ByteOrderType, tag: u16, values: &[u16]) -> Entry {
    let mut bytes = Vec::with_capacity(values.len() * 2);
    for &v in values {
        write_value(&mut bytes, bo, v as u64, 2);
    }
    Entry {
        tag,
        field_type: 3,
        count: values.len() as u32,
        bytes,
    }
}

fn write_value(data: &mut Vec<u8>, byte_order: ByteOrderType, value: u64, size: usize) {
    match byte_order {
        ByteOrderType::LittleEndian => match size {
            2 => data.extend(&(value as u16).to_le_bytes()),
            4 => data.extend(&(value as u32).to_le_bytes()),
            _ => data.extend(&value.to_le_bytes()),
        },
        ByteOrderType::BigEndian => match size {
            2 => data.extend(&(value as u16).to_be_bytes()),
            4 => data.extend(&(value as u32).to_be_bytes()),
            _ => data.extend(&value.to_be_bytes()),
        },
    }
}

// =============================================================================
// Pixel Patterns
// =============================================================================

/// Gradient used for uncompressed slides; exact values survive the round trip.
pub fn gradient_pixel(x: u32, y: u32) -> [u8; 3] {
    [(x % 256) as u8, (y % 256) as u8, ((x / 256 + y / 256) % 256) as u8]
}

/// Flat colour per 256-pixel block; survives JPEG with small error.
pub fn block_pixel(x: u32, y: u32) -> [u8; 3] {
    let bx = x / 256;
    let by = y / 256;
    [
        (40 + bx * 50 % 200) as u8,
        (40 + by * 70 % 200) as u8,
        120,
    ]
}

/// Assert that two colours differ by at most `tolerance` per channel.
pub fn assert_close(actual: &Rgb<u8>, expected: [u8; 3], tolerance: u8) {
    for c in 0..3 {
        let diff = (actual[c] as i16 - expected[c] as i16).unsigned_abs();
        assert!(
            diff <= tolerance as u16,
            "channel {} is {}, expected {} (±{})",
            c,
            actual[c],
            expected[c],
            tolerance
        );
    }
}
