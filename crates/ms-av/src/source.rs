//! Media sources: the capability to read an arbitrary contiguous byte
//! range of a named file without loading the whole file into memory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use ms_core::Result;

use crate::range::ByteRange;

/// A named, length-known byte store that can serve range reads.
///
/// Owned by the caller for its whole lifetime; the extraction core never
/// retains a source past job completion.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// The file's name (used for extension dispatch and artifact naming).
    fn name(&self) -> &str;

    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Whether the source is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one contiguous byte range. The range is expected to lie within
    /// the file; a short file is an error.
    async fn read_range(&self, range: ByteRange) -> Result<Bytes>;
}

/// A local file on disk.
pub struct FileSource {
    path: PathBuf,
    name: String,
    len: u64,
}

impl FileSource {
    /// Open a file and record its length.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        Ok(Self {
            path,
            name,
            len: meta.len(),
        })
    }

    /// The underlying path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MediaSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(range.offset)).await?;
        let mut buf = vec![0u8; range.len as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// An in-memory source, used by tests.
pub struct MemorySource {
    name: String,
    data: Bytes,
}

impl MemorySource {
    /// Create a source over the given bytes.
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl MediaSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        let start = range.offset as usize;
        let end = range.end() as usize;
        if end > self.data.len() {
            return Err(ms_core::Error::internal(format!(
                "range read past end of {} ({} > {})",
                self.name,
                end,
                self.data.len()
            )));
        }
        Ok(self.data.slice(start..end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_source_range_reads() {
        let src = MemorySource::new("t.bin", &b"0123456789"[..]);
        assert_eq!(src.len(), 10);
        let bytes = src
            .read_range(ByteRange { offset: 2, len: 3 })
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"234");
    }

    #[tokio::test]
    async fn memory_source_rejects_overread() {
        let src = MemorySource::new("t.bin", &b"0123"[..]);
        let result = src.read_range(ByteRange { offset: 2, len: 5 }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn file_source_range_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mkv");
        tokio::fs::write(&path, b"abcdefghij").await.unwrap();

        let src = FileSource::open(&path).await.unwrap();
        assert_eq!(src.name(), "clip.mkv");
        assert_eq!(src.len(), 10);

        let bytes = src
            .read_range(ByteRange { offset: 5, len: 5 })
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"fghij");
    }
}
