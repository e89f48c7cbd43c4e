//! Frame encoding and pixel-data packing.
//!
//! - [`FrameCodec`]: raw or JPEG strategy, chosen once per run
//! - [`PixelStream`]: native concatenation or encapsulation with a basic
//!   offset table

mod encoder;
mod packer;

pub use encoder::{
    clamp_quality, EncodedFrame, FrameCodec, DEFAULT_JPEG_QUALITY, IMPLICIT_VR_LITTLE_ENDIAN,
    JPEG_BASELINE, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY, SAMPLES_PER_PIXEL,
};
pub use packer::{split_native, PixelStream, ITEM_HEADER_SIZE};
