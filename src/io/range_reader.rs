use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Random access to the bytes of a slide file.
///
/// The TIFF layer asks only for what it needs (header, IFDs, offset arrays,
/// single tiles), so a multi-gigabyte slide is never loaded whole.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Name used in log lines and error messages.
    fn identifier(&self) -> &str;
}

/// Reject a read of `len` bytes at `offset` that would run past `size`.
pub fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}

/// Copy the first `N` bytes of `bytes` into an array.
///
/// # Panics
/// Panics if `bytes` is shorter than `N`. Callers size their reads from the
/// TIFF field type, so a short slice is a bug in the caller.
#[inline]
pub fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[..N]);
    buf
}
