//! Frame encoding strategies.
//!
//! A [`FrameCodec`] is chosen once per run and drives every codec-dependent
//! decision: how a tile's pixels become bytes, how a batch of frames is
//! packed, and which transfer syntax and photometric interpretation the
//! output declares.

use std::fmt;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Serialize;

use crate::error::EncodeError;

use super::PixelStream;

/// Default JPEG quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Minimum quality the JPEG encoder accepts.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Implicit VR Little Endian, used for uncompressed output
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

/// JPEG Baseline (Process 1), used for compressed output
pub const JPEG_BASELINE: &str = "1.2.840.10008.1.2.4.50";

/// Bytes per RGB pixel
pub const SAMPLES_PER_PIXEL: usize = 3;

// =============================================================================
// Encoded Frame
// =============================================================================

/// The byte payload of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame(Bytes);

impl EncodedFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Frame Codec
// =============================================================================

/// How frames are stored in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "codec", rename_all = "lowercase")]
pub enum FrameCodec {
    /// Interleaved RGB bytes, `width × height × 3` per frame
    Raw,
    /// Baseline JPEG per frame, encapsulated with a basic offset table
    Jpeg { quality: u8 },
}

impl FrameCodec {
    /// JPEG at `quality` when `compress` is set, raw otherwise.
    pub fn from_options(compress: bool, quality: u8) -> Self {
        if compress {
            FrameCodec::Jpeg {
                quality: clamp_quality(quality),
            }
        } else {
            FrameCodec::Raw
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameCodec::Jpeg { .. })
    }

    /// Encode one tile's pixels.
    ///
    /// Each JPEG frame is a standalone image, so any frame can be decoded
    /// without touching its neighbours.
    pub fn encode(&self, pixels: &RgbImage) -> Result<EncodedFrame, EncodeError> {
        match *self {
            FrameCodec::Raw => Ok(EncodedFrame::new(pixels.as_raw().clone())),
            FrameCodec::Jpeg { quality } => {
                let mut output = Vec::new();
                let mut encoder = JpegEncoder::new_with_quality(&mut output, clamp_quality(quality));
                encoder
                    .encode_image(pixels)
                    .map_err(|e| EncodeError {
                        message: e.to_string(),
                    })?;
                Ok(EncodedFrame::new(output))
            }
        }
    }

    /// Pack a batch of encoded frames into the pixel-data stream.
    pub fn pack(&self, frames: Vec<EncodedFrame>) -> Result<PixelStream, EncodeError> {
        match self {
            FrameCodec::Raw => Ok(PixelStream::native(frames)),
            FrameCodec::Jpeg { .. } => PixelStream::encapsulated(frames),
        }
    }

    pub fn transfer_syntax(&self) -> &'static str {
        match self {
            FrameCodec::Raw => IMPLICIT_VR_LITTLE_ENDIAN,
            FrameCodec::Jpeg { .. } => JPEG_BASELINE,
        }
    }

    pub fn photometric_interpretation(&self) -> &'static str {
        match self {
            FrameCodec::Raw => "RGB",
            FrameCodec::Jpeg { .. } => "YBR_FULL_422",
        }
    }

    /// Prefix of output file names and patient identifiers.
    pub fn label(&self) -> &'static str {
        match self {
            FrameCodec::Raw => "uncompressed",
            FrameCodec::Jpeg { .. } => "compressed",
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl fmt::Display for FrameCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameCodec::Raw => write!(f, "raw"),
            FrameCodec::Jpeg { quality } => write!(f, "jpeg (quality {})", quality),
        }
    }
}

/// Clamp quality to the range the encoder accepts.
///
/// Values below 1 become 1, values above 100 become 100.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
