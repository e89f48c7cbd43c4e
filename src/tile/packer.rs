//! Pixel-data stream packing.
//!
//! Raw frames are concatenated with no separators; a reader recovers frame
//! `k` at `k × frame_length`.
//!
//! Compressed frames are encapsulated:
//!
//! ```text
//! (FFFE,E000) len=4n  [offset_0 .. offset_n-1]    basic offset table
//! (FFFE,E000) len=L0  frame 0 (padded to even)
//! (FFFE,E000) len=L1  frame 1
//! ...
//! (FFFE,E0DD) len=0                               sequence delimiter
//! ```
//!
//! `offset_k` is the distance from the first fragment's item tag to frame
//! `k`'s item tag, so `offset_0` is always 0.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{EncodeError, StreamError};

use super::EncodedFrame;

const ITEM_GROUP: u16 = 0xFFFE;
const ITEM_ELEMENT: u16 = 0xE000;
const SEQUENCE_DELIMITER_ELEMENT: u16 = 0xE0DD;

/// Size of an item header: 4-byte tag plus 4-byte length
pub const ITEM_HEADER_SIZE: usize = 8;

/// Packed pixel data for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelStream {
    /// Concatenated raw frames
    Native { data: Bytes, frame_count: usize },
    /// Basic offset table plus one even-length fragment per frame
    Encapsulated {
        offset_table: Vec<u32>,
        fragments: Vec<Bytes>,
    },
}

impl PixelStream {
    /// Concatenate raw frames in order.
    pub fn native(frames: Vec<EncodedFrame>) -> Self {
        let frame_count = frames.len();
        let total = frames.iter().map(EncodedFrame::len).sum();
        let mut data = BytesMut::with_capacity(total);
        for frame in &frames {
            data.extend_from_slice(frame.as_bytes());
        }
        PixelStream::Native {
            data: data.freeze(),
            frame_count,
        }
    }

    /// Build the offset table and padded fragments for compressed frames.
    pub fn encapsulated(frames: Vec<EncodedFrame>) -> Result<Self, EncodeError> {
        let mut offset_table = Vec::with_capacity(frames.len());
        let mut fragments = Vec::with_capacity(frames.len());
        let mut offset: u64 = 0;

        for frame in frames {
            offset_table.push(u32::try_from(offset).map_err(|_| EncodeError {
                message: "encapsulated frames exceed the 4 GiB offset table range".to_string(),
            })?);

            let fragment = pad_to_even(frame.into_bytes());
            offset += (ITEM_HEADER_SIZE + fragment.len()) as u64;
            fragments.push(fragment);
        }

        Ok(PixelStream::Encapsulated {
            offset_table,
            fragments,
        })
    }

    pub fn frame_count(&self) -> usize {
        match self {
            PixelStream::Native { frame_count, .. } => *frame_count,
            PixelStream::Encapsulated { fragments, .. } => fragments.len(),
        }
    }

    pub fn is_encapsulated(&self) -> bool {
        matches!(self, PixelStream::Encapsulated { .. })
    }

    /// Total bytes of frame payloads, without item headers or the table.
    pub fn payload_len(&self) -> usize {
        match self {
            PixelStream::Native { data, .. } => data.len(),
            PixelStream::Encapsulated { fragments, .. } => fragments.iter().map(Bytes::len).sum(),
        }
    }

    /// Length of the serialized stream in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            PixelStream::Native { data, .. } => data.len(),
            PixelStream::Encapsulated {
                offset_table,
                fragments,
            } => {
                ITEM_HEADER_SIZE
                    + offset_table.len() * 4
                    + fragments
                        .iter()
                        .map(|f| ITEM_HEADER_SIZE + f.len())
                        .sum::<usize>()
                    + ITEM_HEADER_SIZE
            }
        }
    }

    /// Serialize the stream as it appears in the pixel-data element value.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            PixelStream::Native { data, .. } => data.clone(),
            PixelStream::Encapsulated {
                offset_table,
                fragments,
            } => {
                let mut out = BytesMut::with_capacity(self.byte_len());
                put_item_header(&mut out, ITEM_ELEMENT, (offset_table.len() * 4) as u32);
                for offset in offset_table {
                    out.put_u32_le(*offset);
                }
                for fragment in fragments {
                    put_item_header(&mut out, ITEM_ELEMENT, fragment.len() as u32);
                    out.extend_from_slice(fragment);
                }
                put_item_header(&mut out, SEQUENCE_DELIMITER_ELEMENT, 0);
                out.freeze()
            }
        }
    }

    /// Per-frame payloads, in frame order.
    ///
    /// Native frames are split evenly by frame count. Encapsulated fragments
    /// are returned with their pad byte, if any.
    pub fn frames(&self) -> Vec<Bytes> {
        match self {
            PixelStream::Native { data, frame_count } => {
                split_native(data.clone(), *frame_count)
            }
            PixelStream::Encapsulated { fragments, .. } => fragments.clone(),
        }
    }

    /// Parse a serialized encapsulated stream, checking the offset table
    /// against the fragment positions.
    pub fn parse_encapsulated(bytes: &[u8]) -> Result<Self, StreamError> {
        let mut pos = 0;

        let table_len = read_item_header(bytes, &mut pos, ITEM_ELEMENT)?;
        if table_len % 4 != 0 {
            return Err(StreamError::MalformedOffsetTable { length: table_len });
        }
        let table_bytes = take(bytes, &mut pos, table_len as usize)?;
        let offset_table: Vec<u32> = table_bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let first_fragment = pos;
        let mut fragments = Vec::new();
        loop {
            let item_start = pos;
            let (element, length) = peek_item_header(bytes, pos)?;
            pos += ITEM_HEADER_SIZE;

            if element == SEQUENCE_DELIMITER_ELEMENT {
                break;
            }
            if element != ITEM_ELEMENT {
                return Err(StreamError::UnexpectedTag {
                    group: ITEM_GROUP,
                    element,
                    offset: item_start,
                });
            }

            let actual = (item_start - first_fragment) as u32;
            if let Some(&expected) = offset_table.get(fragments.len()) {
                if expected != actual {
                    return Err(StreamError::OffsetMismatch {
                        index: fragments.len(),
                        expected,
                        actual,
                    });
                }
            }

            let payload = take(bytes, &mut pos, length as usize)?;
            fragments.push(Bytes::copy_from_slice(payload));
        }

        Ok(PixelStream::Encapsulated {
            offset_table,
            fragments,
        })
    }
}

/// Split `data` into `frame_count` equal frames.
pub fn split_native(data: Bytes, frame_count: usize) -> Vec<Bytes> {
    if frame_count == 0 {
        return Vec::new();
    }
    let frame_length = data.len() / frame_count;
    (0..frame_count)
        .map(|k| data.slice(k * frame_length..(k + 1) * frame_length))
        .collect()
}

fn pad_to_even(data: Bytes) -> Bytes {
    if data.len() % 2 == 0 {
        return data;
    }
    let mut padded = BytesMut::with_capacity(data.len() + 1);
    padded.extend_from_slice(&data);
    padded.put_u8(0);
    padded.freeze()
}

fn put_item_header(out: &mut BytesMut, element: u16, length: u32) {
    out.put_u16_le(ITEM_GROUP);
    out.put_u16_le(element);
    out.put_u32_le(length);
}

fn peek_item_header(bytes: &[u8], pos: usize) -> Result<(u16, u32), StreamError> {
    let header = bytes
        .get(pos..pos + ITEM_HEADER_SIZE)
        .ok_or(StreamError::Truncated { offset: pos })?;
    let group = u16::from_le_bytes([header[0], header[1]]);
    let element = u16::from_le_bytes([header[2], header[3]]);
    if group != ITEM_GROUP {
        return Err(StreamError::UnexpectedTag {
            group,
            element,
            offset: pos,
        });
    }
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    Ok((element, length))
}

fn read_item_header(bytes: &[u8], pos: &mut usize, expected: u16) -> Result<u32, StreamError> {
    let (element, length) = peek_item_header(bytes, *pos)?;
    if element != expected {
        return Err(StreamError::UnexpectedTag {
            group: ITEM_GROUP,
            element,
            offset: *pos,
        });
    }
    *pos += ITEM_HEADER_SIZE;
    Ok(length)
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], StreamError> {
    let slice = bytes
        .get(*pos..*pos + len)
        .ok_or(StreamError::Truncated { offset: *pos })?;
    *pos += len;
    Ok(slice)
}
