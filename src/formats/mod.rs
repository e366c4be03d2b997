//! File format adapters.
//!
//! A [`FormatHandler`] infers a schema from one blob and creates a lazy [`RecordSource`] per blob
//! in the format's native access mode:
//!
//! - [`csv`]: CSV and TSV, row-native
//! - [`arrow_ipc`]: Arrow IPC files, column-native
//! - [`parquet`]: Parquet, column-native
//! - [`excel`]: workbooks via `calamine`, row-native (requires the Cargo feature `excel`)

pub mod arrow_ipc;
pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod parquet;

use std::sync::Arc;

use crate::blob::{BlobPath, BlobSource};
use crate::error::SourceResult;
use crate::source::RecordSource;
use crate::types::{Schema, SchemaRef};
use crate::vector::VectorBlock;

pub use arrow_ipc::ArrowIpcFormat;
pub use csv::CsvFormat;
#[cfg(feature = "excel")]
pub use excel::ExcelFormat;
pub use parquet::ParquetFormat;

/// Format capability consumed by the resolver.
pub trait FormatHandler: Send + Sync {
    /// Short format name used in diagnostics (e.g. `csv`).
    fn name(&self) -> &str;

    /// Infer the schema of one blob.
    fn infer_schema(&self, blob: &BlobPath, storage: &dyn BlobSource) -> SourceResult<Schema>;

    /// Create a source reading `blob` against `schema`.
    ///
    /// Implementations must not open the blob here; opening happens when iteration starts.
    fn create_record_source(
        &self,
        blob: &BlobPath,
        storage: &Arc<dyn BlobSource>,
        schema: SchemaRef,
    ) -> SourceResult<RecordSource>;
}

// Maps one decoded Arrow batch onto `schema` and splits it to `batch_size`.
fn split_batch(
    schema: &SchemaRef,
    batch: SourceResult<arrow::record_batch::RecordBatch>,
    batch_size: usize,
) -> Vec<SourceResult<VectorBlock>> {
    match batch.and_then(|b| VectorBlock::from_record_batch(Arc::clone(schema), &b)) {
        Ok(block) => block.chunks(batch_size).into_iter().map(Ok).collect(),
        Err(e) => vec![Err(e)],
    }
}
