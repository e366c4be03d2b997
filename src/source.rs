//! Row-native and column-native record sources.
//!
//! A file format implements whichever access mode it supports natively. Consumers that need the
//! other mode go through [`crate::bridge`], so a format never pays for a mode it does not support.
//!
//! Both traits are restartable: every call to [`RowSource::rows`] or [`VectorSource::blocks`]
//! starts a fresh pass. The returned iterators are not `Send`; one traversal belongs to one
//! thread.

use std::sync::Arc;

use crate::bridge::{DEFAULT_BATCH_SIZE, blocks_to_rows, rows_to_blocks};
use crate::error::SourceResult;
use crate::types::{Record, SchemaRef};
use crate::vector::VectorBlock;

/// Lazy sequence of rows.
pub type RowIter<'a> = Box<dyn Iterator<Item = SourceResult<Record>> + 'a>;

/// Lazy sequence of columnar blocks.
pub type BlockIter<'a> = Box<dyn Iterator<Item = SourceResult<VectorBlock>> + 'a>;

/// A source that natively yields rows.
pub trait RowSource: Send + Sync {
    fn schema(&self) -> &SchemaRef;

    /// Start a fresh pass over the rows.
    fn rows(&self) -> SourceResult<RowIter<'_>>;
}

/// A source that natively yields columnar blocks.
pub trait VectorSource: Send + Sync {
    fn schema(&self) -> &SchemaRef;

    /// Start a fresh pass, yielding blocks of at most `batch_size` rows.
    fn blocks(&self, batch_size: usize) -> SourceResult<BlockIter<'_>>;
}

impl<T: RowSource + ?Sized> RowSource for Box<T> {
    fn schema(&self) -> &SchemaRef {
        (**self).schema()
    }

    fn rows(&self) -> SourceResult<RowIter<'_>> {
        (**self).rows()
    }
}

impl<T: VectorSource + ?Sized> VectorSource for Box<T> {
    fn schema(&self) -> &SchemaRef {
        (**self).schema()
    }

    fn blocks(&self, batch_size: usize) -> SourceResult<BlockIter<'_>> {
        (**self).blocks(batch_size)
    }
}

/// A per-blob source, in its native access mode.
pub enum RecordSource {
    Rows(Box<dyn RowSource>),
    Vectors(Box<dyn VectorSource>),
}

impl RecordSource {
    /// Wrap a row-native source.
    pub fn rows_native(source: impl RowSource + 'static) -> Self {
        Self::Rows(Box::new(source))
    }

    /// Wrap a column-native source.
    pub fn vectors_native(source: impl VectorSource + 'static) -> Self {
        Self::Vectors(Box::new(source))
    }

    pub fn schema(&self) -> &SchemaRef {
        match self {
            Self::Rows(s) => s.schema(),
            Self::Vectors(s) => s.schema(),
        }
    }

    /// Whether rows are the native access mode.
    pub fn is_row_native(&self) -> bool {
        matches!(self, Self::Rows(_))
    }

    /// Rows, bridged from blocks of [`DEFAULT_BATCH_SIZE`] for column-native sources.
    pub fn rows(&self) -> SourceResult<RowIter<'_>> {
        match self {
            Self::Rows(s) => s.rows(),
            Self::Vectors(s) => Ok(blocks_to_rows(s.blocks(DEFAULT_BATCH_SIZE)?)),
        }
    }

    /// Blocks, bridged from rows for row-native sources.
    pub fn blocks(&self, batch_size: usize) -> SourceResult<BlockIter<'_>> {
        match self {
            Self::Rows(s) => Ok(rows_to_blocks(Arc::clone(s.schema()), s.rows()?, batch_size)),
            Self::Vectors(s) => s.blocks(batch_size),
        }
    }
}

impl std::fmt::Debug for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.is_row_native() { "rows" } else { "vectors" };
        f.debug_struct("RecordSource")
            .field("mode", &mode)
            .field("fields", &self.schema().len())
            .finish()
    }
}

/// Rows held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryRowSource {
    schema: SchemaRef,
    records: Vec<Record>,
}

impl InMemoryRowSource {
    pub fn new(schema: SchemaRef, records: Vec<Record>) -> Self {
        Self { schema, records }
    }
}

impl RowSource for InMemoryRowSource {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn rows(&self) -> SourceResult<RowIter<'_>> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }
}

/// Blocks held in memory, re-split to the requested batch size.
#[derive(Debug, Clone)]
pub struct InMemoryVectorSource {
    schema: SchemaRef,
    blocks: Vec<VectorBlock>,
}

impl InMemoryVectorSource {
    pub fn new(schema: SchemaRef, blocks: Vec<VectorBlock>) -> Self {
        Self { schema, blocks }
    }
}

impl VectorSource for InMemoryVectorSource {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn blocks(&self, batch_size: usize) -> SourceResult<BlockIter<'_>> {
        Ok(Box::new(
            self.blocks
                .iter()
                .flat_map(move |b| b.clone().chunks(batch_size))
                .map(Ok),
        ))
    }
}
