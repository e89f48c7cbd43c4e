//! TIFF tag value reading.
//!
//! Values either live inline in the IFD entry or at an offset in the file.
//! Arrays (TileOffsets, TileByteCounts) are fetched with a single read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Reads tag values respecting the file's byte order and offset width.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes of an entry's value, inline or fetched from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order, self.header.is_bigtiff);
            Ok(self.reader.read_exact_at(offset, size as usize).await?)
        }
    }

    /// Read an integer array, widening Short and Long to u64.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        parse_u64_array(&bytes, entry.count as usize, field_type, self.byte_order()).ok_or_else(
            || TiffError::InvalidTagValue {
                tag: "array",
                message: format!("expected Short, Long, or Long8, got {:?}", field_type),
            },
        )
    }

    /// Read an ASCII value, stripping the NUL terminator.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: "string",
                message: format!("expected Ascii type, got {:?}", entry.field_type),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Parse `count` integers of `field_type` from raw bytes.
///
/// Returns `None` for non-integer field types.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Option<Vec<u64>> {
    let width = field_type.size_in_bytes();
    let read: fn(ByteOrder, &[u8]) -> u64 = match field_type {
        FieldType::Short => |bo, b| bo.read_u16(b) as u64,
        FieldType::Long => |bo, b| bo.read_u32(b) as u64,
        FieldType::Long8 => |bo, b| bo.read_u64(b),
        _ => return None,
    };

    Some(
        bytes
            .chunks_exact(width)
            .take(count)
            .map(|chunk| read(byte_order, chunk))
            .collect(),
    )
}
