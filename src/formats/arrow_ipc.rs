//! Arrow IPC file support.

use std::sync::Arc;

use arrow::ipc::reader::FileReader;

use super::{FormatHandler, split_batch};
use crate::blob::{BlobPath, BlobSource};
use crate::error::{SourceError, SourceResult};
use crate::source::{BlockIter, RecordSource, VectorSource};
use crate::types::{Schema, SchemaRef};
use crate::vector::schema_from_arrow;

/// Arrow IPC file format (random access, column-native).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrowIpcFormat;

impl FormatHandler for ArrowIpcFormat {
    fn name(&self) -> &str {
        "arrow"
    }

    fn infer_schema(&self, blob: &BlobPath, storage: &dyn BlobSource) -> SourceResult<Schema> {
        let reader = FileReader::try_new(storage.open_seekable(blob)?, None)?;
        schema_from_arrow(&reader.schema())
    }

    fn create_record_source(
        &self,
        blob: &BlobPath,
        storage: &Arc<dyn BlobSource>,
        schema: SchemaRef,
    ) -> SourceResult<RecordSource> {
        Ok(RecordSource::vectors_native(ArrowIpcSource {
            blob: blob.clone(),
            storage: Arc::clone(storage),
            schema,
        }))
    }
}

/// Column-native source over one Arrow IPC file.
pub struct ArrowIpcSource {
    blob: BlobPath,
    storage: Arc<dyn BlobSource>,
    schema: SchemaRef,
}

impl VectorSource for ArrowIpcSource {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn blocks(&self, batch_size: usize) -> SourceResult<BlockIter<'_>> {
        let reader = FileReader::try_new(self.storage.open_seekable(&self.blob)?, None)?;
        let schema = Arc::clone(&self.schema);
        Ok(Box::new(reader.flat_map(move |batch| {
            split_batch(&schema, batch.map_err(SourceError::from), batch_size)
        })))
    }
}
