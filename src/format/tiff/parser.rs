//! TIFF header and IFD parsing.
//!
//! Both classic TIFF (32-bit offsets, 12-byte entries) and BigTIFF (64-bit
//! offsets, 20-byte entries) are handled, in either byte order.

use crate::error::TiffError;
use crate::io::fixed;

use super::tags::{FieldType, TiffTag};

const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;
const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

/// Size of the classic TIFF header.
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of the BigTIFF header.
pub const BIGTIFF_HEADER_SIZE: usize = 16;

// =============================================================================
// Byte Order
// =============================================================================

/// Byte order declared by the file's magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(fixed(bytes)),
            ByteOrder::BigEndian => u16::from_be_bytes(fixed(bytes)),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(fixed(bytes)),
            ByteOrder::BigEndian => u32::from_be_bytes(fixed(bytes)),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(fixed(bytes)),
            ByteOrder::BigEndian => u64::from_be_bytes(fixed(bytes)),
        }
    }
}

// =============================================================================
// Header
// =============================================================================

/// Parsed TIFF or BigTIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub is_bigtiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse the header from the first bytes of the file.
    ///
    /// `bytes` should hold at least [`BIGTIFF_HEADER_SIZE`] bytes when the
    /// file is large enough; classic TIFF only needs the first 8.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let (is_bigtiff, first_ifd_offset) = match byte_order.read_u16(&bytes[2..4]) {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            version => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Size of one IFD entry.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry count that starts an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of offsets (next-IFD pointer and out-of-line values).
    #[inline]
    pub const fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }
}

// =============================================================================
// IFD Entry
// =============================================================================

/// A single IFD entry.
///
/// The value field is kept raw; whether it holds the value itself or an
/// offset to it depends on the field type and count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: Option<FieldType>,
    pub field_type_raw: u16,
    pub count: u64,
    /// Raw value field (4 bytes used for classic TIFF, 8 for BigTIFF)
    pub value_offset_bytes: [u8; 8],
    pub is_inline: bool,
}

impl IfdEntry {
    fn parse(bytes: &[u8], header: &TiffHeader) -> Self {
        let byte_order = header.byte_order;
        let tag = byte_order.read_u16(&bytes[0..2]);
        let field_type_raw = byte_order.read_u16(&bytes[2..4]);
        let field_type = FieldType::from_u16(field_type_raw);

        let (count, value_start) = if header.is_bigtiff {
            (byte_order.read_u64(&bytes[4..12]), 12)
        } else {
            (byte_order.read_u32(&bytes[4..8]) as u64, 8)
        };

        let mut value_offset_bytes = [0u8; 8];
        let value_len = header.offset_size();
        value_offset_bytes[..value_len].copy_from_slice(&bytes[value_start..value_start + value_len]);

        let is_inline = field_type
            .map(|ft| ft.fits_inline(count, header.is_bigtiff))
            .unwrap_or(false);

        IfdEntry {
            tag,
            field_type,
            field_type_raw,
            count,
            value_offset_bytes,
            is_inline,
        }
    }

    /// Total size of the value in bytes, if the field type is known.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|ft| ft.size_in_bytes() as u64 * self.count)
    }

    /// Interpret the value field as an offset into the file.
    pub fn value_offset(&self, byte_order: ByteOrder, is_bigtiff: bool) -> u64 {
        if is_bigtiff {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes) as u64
        }
    }

    /// Read a single inline Short/Long/Long8 value.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u64),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes) as u64),
            FieldType::Long8 => Some(byte_order.read_u64(&self.value_offset_bytes)),
            _ => None,
        }
    }

    /// Read a single inline value that must fit in u32.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        self.inline_u64(byte_order)
            .and_then(|v| u32::try_from(v).ok())
    }
}

// =============================================================================
// IFD
// =============================================================================

/// A parsed Image File Directory.
#[derive(Debug, Clone)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Number of bytes occupied by an IFD with `entry_count` entries.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.offset_size()
    }

    /// Parse an IFD from its bytes (count, entries and next offset).
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let byte_order = header.byte_order;
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_count = if header.is_bigtiff {
            byte_order.read_u64(bytes)
        } else {
            byte_order.read_u16(bytes) as u64
        };

        let required = Self::calculate_size(entry_count, header);
        if bytes.len() < required {
            return Err(TiffError::FileTooSmall {
                required: required as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_size = header.ifd_entry_size();
        let entries = (0..entry_count as usize)
            .map(|i| {
                let start = count_size + i * entry_size;
                IfdEntry::parse(&bytes[start..start + entry_size], header)
            })
            .collect::<Vec<_>>();

        let next_start = count_size + entry_count as usize * entry_size;
        let next_ifd_offset = if header.is_bigtiff {
            byte_order.read_u64(&bytes[next_start..])
        } else {
            byte_order.read_u32(&bytes[next_start..]) as u64
        };

        Ok(Ifd {
            entries,
            next_ifd_offset,
        })
    }

    /// Look up an entry by tag.
    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag.as_u16())
    }

    /// Read a single inline integer tag.
    pub fn get_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(tag)?.inline_u32(byte_order)
    }

    pub fn image_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageWidth, byte_order)
    }

    pub fn image_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageLength, byte_order)
    }

    pub fn tile_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileWidth, byte_order)
    }

    pub fn tile_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileLength, byte_order)
    }

    pub fn compression(&self, byte_order: ByteOrder) -> Option<u16> {
        self.get_u32(TiffTag::Compression, byte_order)
            .map(|v| v as u16)
    }
}

// =============================================================================
// Tests
// =============================================================================
