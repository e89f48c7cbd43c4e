use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::{check_range, RangeReader};
use crate::error::IoError;

/// Local-file implementation of RangeReader.
///
/// The file size is read once on open. Reads share one handle, so they are
/// serialized behind a mutex (seek + read must not interleave).
pub struct FileRangeReader {
    file: Mutex<File>,
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open a slide file for range reads.
    ///
    /// Returns `IoError::NotFound` if the path does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound(path.display().to_string())
            } else {
                IoError::File(format!("{}: {}", path.display(), e))
            }
        })?;

        let size = file
            .metadata()
            .await
            .map_err(|e| IoError::File(e.to_string()))?
            .len();
        let identifier = format!("file://{}", path.display());

        Ok(Self {
            file: Mutex::new(file),
            path,
            size,
            identifier,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;

        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = vec![0u8; len];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| IoError::File(e.to_string()))?;
        file.read_exact(&mut buf)
            .await
            .map_err(|e| IoError::File(e.to_string()))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
