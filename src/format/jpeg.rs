//! JPEG stream helpers for TIFF tiles.
//!
//! Aperio SVS tiles are abbreviated JPEG streams: the quantization and
//! Huffman tables live once in the level's `JPEGTables` tag. Before decoding,
//! the tables are spliced in: tables without their EOI, then the tile
//! without its SOI.

use bytes::{Bytes, BytesMut};

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// Whether the stream reaches SOS without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Skip the marker segment using its 2-byte length
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Whether the stream starts with SOI and carries a quantization table.
pub fn is_complete_stream(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..2] == SOI && data[2..].windows(2).any(|w| w == DQT)
}

/// Whether `data` is framed as a JPEG image (SOI ... EOI).
pub fn is_framed_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[..2] == SOI && data[data.len() - 2..] == EOI
}

/// Splice `tables` into an abbreviated tile stream.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables_end = if tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    let tile_start = if tile_data.starts_with(&SOI) { 2 } else { 0 };

    let mut result = BytesMut::with_capacity(tables_end + tile_data.len() - tile_start);
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&tile_data[tile_start..]);
    result.freeze()
}

/// Make a tile decodable, merging tables only when the tile needs them.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    match tables {
        Some(tables) if !is_complete_stream(tile_data) && is_abbreviated_stream(tile_data) => {
            merge_jpeg_tables(tables, tile_data)
        }
        _ => Bytes::copy_from_slice(tile_data),
    }
}
