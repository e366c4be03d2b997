//! Parquet support.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::{FormatHandler, split_batch};
use crate::blob::{BlobPath, BlobSource};
use crate::error::{SourceError, SourceResult};
use crate::source::{BlockIter, RecordSource, VectorSource};
use crate::types::{Schema, SchemaRef};
use crate::vector::schema_from_arrow;

/// Parquet format (column-native).
///
/// The whole blob is buffered in memory so the footer can be read without a seekable handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParquetFormat;

fn read_all(storage: &dyn BlobSource, blob: &BlobPath) -> SourceResult<Bytes> {
    let mut buf = Vec::new();
    storage.open_read(blob)?.read_to_end(&mut buf)?;
    Ok(Bytes::from(buf))
}

impl FormatHandler for ParquetFormat {
    fn name(&self) -> &str {
        "parquet"
    }

    fn infer_schema(&self, blob: &BlobPath, storage: &dyn BlobSource) -> SourceResult<Schema> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(read_all(storage, blob)?)?;
        schema_from_arrow(builder.schema())
    }

    fn create_record_source(
        &self,
        blob: &BlobPath,
        storage: &Arc<dyn BlobSource>,
        schema: SchemaRef,
    ) -> SourceResult<RecordSource> {
        Ok(RecordSource::vectors_native(ParquetSource {
            blob: blob.clone(),
            storage: Arc::clone(storage),
            schema,
        }))
    }
}

/// Column-native source over one Parquet blob.
pub struct ParquetSource {
    blob: BlobPath,
    storage: Arc<dyn BlobSource>,
    schema: SchemaRef,
}

impl VectorSource for ParquetSource {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn blocks(&self, batch_size: usize) -> SourceResult<BlockIter<'_>> {
        let batch_size = batch_size.max(1);
        let reader = ParquetRecordBatchReaderBuilder::try_new(read_all(
            self.storage.as_ref(),
            &self.blob,
        )?)?
        .with_batch_size(batch_size)
        .build()?;
        let schema = Arc::clone(&self.schema);
        Ok(Box::new(reader.flat_map(move |batch| {
            split_batch(&schema, batch.map_err(SourceError::from), batch_size)
        })))
    }
}
