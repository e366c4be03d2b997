use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;
use walkdir::WalkDir;

use crate::blob::{BlobIter, BlobPath, BlobSource, ReadSeek};
use crate::error::{SourceError, SourceResult};

/// Lists and opens regular files below a root directory.
///
/// Blobs are `file://` URIs of absolute paths, listed in file-name order per directory.
#[derive(Debug, Clone)]
pub struct LocalBlobSource {
    root: PathBuf,
}

impl LocalBlobSource {
    /// Create a source rooted at `root`.
    ///
    /// Fails with [`SourceError::InvalidConfig`] if `root` does not exist or is not a directory.
    pub fn new(root: impl AsRef<Path>) -> SourceResult<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| {
            SourceError::config(format!("storage root '{}' is not accessible: {e}", root.display()))
        })?;
        if !root.is_dir() {
            return Err(SourceError::config(format!(
                "storage root '{}' is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn local_path(&self, blob: &BlobPath) -> SourceResult<PathBuf> {
        let path = blob
            .uri()
            .to_file_path()
            .map_err(|_| SourceError::config(format!("blob '{blob}' is not a local file uri")))?;
        if !path.starts_with(&self.root) {
            return Err(SourceError::config(format!(
                "blob '{blob}' is outside storage root '{}'",
                self.root.display()
            )));
        }
        Ok(path)
    }
}

impl BlobSource for LocalBlobSource {
    fn list_blobs(&self) -> SourceResult<BlobIter<'_>> {
        debug!(root = %self.root.display(), "listing local blobs");
        let iter = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) if e.file_type().is_file() => Some(
                    Url::from_file_path(e.path())
                        .map(BlobPath::new)
                        .map_err(|_| {
                            SourceError::config(format!(
                                "cannot express '{}' as a file uri",
                                e.path().display()
                            ))
                        }),
                ),
                Ok(_) => None,
                Err(e) => Some(Err(SourceError::Io(e.into()))),
            });
        Ok(Box::new(iter))
    }

    fn open_read(&self, blob: &BlobPath) -> SourceResult<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(self.local_path(blob)?)?))
    }

    fn open_seekable(&self, blob: &BlobPath) -> SourceResult<Box<dyn ReadSeek>> {
        Ok(Box::new(File::open(self.local_path(blob)?)?))
    }
}
