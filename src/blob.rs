//! Blob handles and the storage capability consumed by the resolver.

use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Seek};

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use url::Url;

use crate::error::{SourceError, SourceResult};

// Characters that would otherwise end the URI path or be read as an escape.
const PATH_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// An opaque, immutable handle to one file-like resource, identified by an absolute URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobPath {
    uri: Url,
}

impl BlobPath {
    /// Wrap an absolute URI.
    pub fn new(uri: Url) -> Self {
        Self { uri }
    }

    /// Parse an absolute URI string such as `file:///data/x.csv` or `s3://bucket/key.csv`.
    pub fn parse(uri: &str) -> SourceResult<Self> {
        Ok(Self::new(Url::parse(uri)?))
    }

    /// Build a `file://` blob from an absolute, forward-slash separated path.
    ///
    /// Characters such as `#`, `?` and `%` are percent-encoded, so [`BlobPath::path`] returns
    /// `path` unchanged.
    pub fn from_path(path: &str) -> SourceResult<Self> {
        if !path.starts_with('/') {
            return Err(SourceError::config(format!(
                "blob path must be absolute, got '{path}'"
            )));
        }
        Self::parse(&format!("file://{}", utf8_percent_encode(path, PATH_ESCAPES)))
    }

    /// The blob URI.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Percent-decoded URI path. Mappers and attribute extractors match against this.
    pub fn path(&self) -> Cow<'_, str> {
        percent_decode_str(self.uri.path()).decode_utf8_lossy()
    }

    /// Last path segment, if any.
    pub fn file_name(&self) -> Option<String> {
        let path = self.path();
        path.rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

/// A readable and seekable stream, required by formats that need random access.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Lazy blob listing.
pub type BlobIter<'a> = Box<dyn Iterator<Item = SourceResult<BlobPath>> + 'a>;

/// Storage capability: list blobs and open them for reading.
///
/// One storage backs many readers and many tables, so its lifetime is owned by the caller of the
/// resolver. Resolution never calls [`BlobSource::close`].
pub trait BlobSource: Send + Sync {
    /// List every blob. Each call starts a fresh listing.
    fn list_blobs(&self) -> SourceResult<BlobIter<'_>>;

    /// Open a blob as a sequential stream.
    fn open_read(&self, blob: &BlobPath) -> SourceResult<Box<dyn Read + Send>>;

    /// Open a blob for random access.
    fn open_seekable(&self, blob: &BlobPath) -> SourceResult<Box<dyn ReadSeek>>;

    /// Release backend resources.
    fn close(&self) -> SourceResult<()> {
        Ok(())
    }
}
