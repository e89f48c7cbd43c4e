//! TIFF tag, field type and compression vocabulary.
//!
//! Only the tags needed to locate pyramid tiles and slide metadata are named;
//! unknown tags are kept as raw numbers in the IFD and ignored.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types used by WSI files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// 8-bit unsigned integer
    Byte = 1,

    /// NUL-terminated 7-bit ASCII
    Ascii = 2,

    /// 16-bit unsigned integer
    Short = 3,

    /// 32-bit unsigned integer
    Long = 4,

    /// Opaque bytes (JPEGTables)
    Undefined = 7,

    /// 64-bit unsigned integer (BigTIFF only)
    Long8 = 16,
}

impl FieldType {
    /// Size of a single value in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Long8 => 8,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            7 => Some(FieldType::Undefined),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    /// Whether `count` values fit in the entry's value field.
    ///
    /// Classic TIFF has 4 inline bytes, BigTIFF has 8.
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let threshold = if is_bigtiff { 8 } else { 4 };
        self.size_in_bytes() as u64 * count <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// Tags read by the slide reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    ImageDescription = 270,
    SamplesPerPixel = 277,
    PlanarConfiguration = 284,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    JpegTables = 347,
}

impl TiffTag {
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::ImageDescription => "ImageDescription",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
            TiffTag::JpegTables => "JPEGTables",
        }
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// Compression schemes seen in WSI files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzw,
    Jpeg,
    Deflate,
    Jpeg2000,
    Other(u16),
}

impl Compression {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Compression::None,
            5 => Compression::Lzw,
            7 => Compression::Jpeg,
            8 | 32946 => Compression::Deflate,
            33003 | 33005 => Compression::Jpeg2000,
            other => Compression::Other(other),
        }
    }

    /// Whether tiles with this compression can be decoded.
    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(self, Compression::None | Compression::Jpeg)
    }

    pub fn name(self) -> String {
        match self {
            Compression::None => "None".to_string(),
            Compression::Lzw => "LZW".to_string(),
            Compression::Jpeg => "JPEG".to_string(),
            Compression::Deflate => "Deflate".to_string(),
            Compression::Jpeg2000 => "JPEG 2000".to_string(),
            Compression::Other(code) => format!("code {}", code),
        }
    }
}
