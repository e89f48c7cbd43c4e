use thiserror::Error;

/// I/O errors that can occur when reading slide bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Local filesystem error
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (only uncompressed and JPEG tiles are supported)")]
    UnsupportedCompression(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// No tiled pyramid level was found in the file
    #[error("No pyramid levels found")]
    NoPyramidLevels,
}

/// Errors raised by an image source while answering geometry or pixel queries
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// TIFF structure error
    #[error("Slide error: {0}")]
    Tiff(#[from] TiffError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Level index outside the pyramid
    #[error("Invalid level {level}: slide has {level_count} levels")]
    InvalidLevel { level: usize, level_count: usize },

    /// Region origin lies outside the level
    #[error("Region at ({x}, {y}) is outside level {level} ({width}x{height})")]
    RegionOutOfBounds {
        level: usize,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    },

    /// A source tile could not be decoded
    #[error("Failed to decode tile: {message}")]
    Decode { message: String },
}

/// Errors detected while planning a conversion.
///
/// These are fatal for the whole run: nothing is written once one of them
/// is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A configured target level lies outside the source pyramid
    #[error("Target level {level} exceeds the slide's level range 0..{level_count}")]
    LevelRange { level: usize, level_count: usize },

    /// A geometry query named a level outside the pyramid
    #[error("Invalid level {level}: pyramid has {level_count} levels")]
    InvalidLevel { level: usize, level_count: usize },

    /// Explicit level selection with no levels in it
    #[error("No target levels selected")]
    EmptyTargetLevels,

    /// Tile width or height is zero or above 65535
    #[error("Invalid tile size {width}x{height}")]
    InvalidTileSize { width: u32, height: u32 },

    /// Max frame count is zero
    #[error("Max frame count must be greater than 0")]
    InvalidMaxFrameCount,
}

/// Frame compression failure
#[derive(Debug, Clone, Error)]
#[error("Failed to encode frame: {message}")]
pub struct EncodeError {
    pub message: String,
}

/// Errors raised while reading back an encapsulated pixel stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Stream ended inside an item header or payload
    #[error("Stream truncated at byte {offset}")]
    Truncated { offset: usize },

    /// An item header carried an unexpected tag
    #[error("Unexpected tag ({group:04X},{element:04X}) at byte {offset}")]
    UnexpectedTag {
        group: u16,
        element: u16,
        offset: usize,
    },

    /// Basic offset table length is not a multiple of 4
    #[error("Malformed basic offset table of {length} bytes")]
    MalformedOffsetTable { length: u32 },

    /// Offset table disagrees with the fragment positions
    #[error("Offset table entry {index} is {expected}, fragment starts at {actual}")]
    OffsetMismatch {
        index: usize,
        expected: u32,
        actual: u32,
    },
}

/// Error reported by a container writer
#[derive(Debug, Clone, Error)]
#[error("Writer rejected instance {instance}: {message}")]
pub struct WriterError {
    pub instance: u32,
    pub message: String,
}

/// Errors that abort a single output instance.
///
/// Earlier and later instances of the same run are unaffected.
#[derive(Debug, Clone, Error)]
pub enum InstanceError {
    /// Source pixels for one frame could not be read
    #[error("Failed to read tile ({column}, {row}) of level {level} for instance {instance}: {source}")]
    TileRead {
        instance: u32,
        level: usize,
        column: u32,
        row: u32,
        #[source]
        source: SourceError,
    },

    /// Frame compression failed
    #[error("Failed to encode frame for instance {instance}: {message}")]
    Encoding { instance: u32, message: String },

    /// The writer refused the finished instance
    #[error(transparent)]
    Writer(#[from] WriterError),
}

impl InstanceError {
    /// Instance number the error belongs to.
    pub fn instance(&self) -> u32 {
        match self {
            InstanceError::TileRead { instance, .. } => *instance,
            InstanceError::Encoding { instance, .. } => *instance,
            InstanceError::Writer(e) => e.instance,
        }
    }
}

/// Errors that abort a whole conversion run
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    /// Planning failed before any output was produced
    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),

    /// The slide could not be opened
    #[error("Failed to open slide: {0}")]
    Source(#[from] SourceError),
}
