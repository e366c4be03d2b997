use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use bytes::Bytes;

use crate::blob::{BlobIter, BlobPath, BlobSource, ReadSeek};
use crate::error::{SourceError, SourceResult};

/// Blobs held in memory, listed in URI order.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobSource {
    blobs: BTreeMap<BlobPath, Bytes>,
}

impl MemoryBlobSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blob at an absolute path (stored as a `file://` URI).
    pub fn with_blob(mut self, path: &str, content: impl Into<Bytes>) -> SourceResult<Self> {
        self.insert(BlobPath::from_path(path)?, content);
        Ok(self)
    }

    /// Add or replace a blob.
    pub fn insert(&mut self, blob: BlobPath, content: impl Into<Bytes>) {
        self.blobs.insert(blob, content.into());
    }

    /// Number of blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the source holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    fn content(&self, blob: &BlobPath) -> SourceResult<Bytes> {
        self.blobs.get(blob).cloned().ok_or_else(|| {
            SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("blob '{blob}' not found"),
            ))
        })
    }
}

impl BlobSource for MemoryBlobSource {
    fn list_blobs(&self) -> SourceResult<BlobIter<'_>> {
        Ok(Box::new(self.blobs.keys().cloned().map(Ok)))
    }

    fn open_read(&self, blob: &BlobPath) -> SourceResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.content(blob)?)))
    }

    fn open_seekable(&self, blob: &BlobPath) -> SourceResult<Box<dyn ReadSeek>> {
        Ok(Box::new(Cursor::new(self.content(blob)?)))
    }
}
