//! Storage backends implementing [`crate::blob::BlobSource`].
//!
//! - [`LocalBlobSource`]: a directory tree on the local filesystem
//! - [`MemoryBlobSource`]: an in-memory map of blobs, handy for tests and embedding

mod local;
mod memory;

pub use local::LocalBlobSource;
pub use memory::MemoryBlobSource;
