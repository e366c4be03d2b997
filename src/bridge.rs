//! Conversions between row and columnar access.
//!
//! - Row → column: rows are accumulated into blocks of up to `batch_size` rows; only the last
//!   block of a pass may be smaller.
//! - Column → row: each block is walked row by row, one [`Record`] per row.
//!
//! Both directions are lazy and restartable. An iterator stops after yielding its first error.

use std::sync::Arc;

use crate::error::SourceResult;
use crate::source::{BlockIter, RowIter, RowSource, VectorSource};
use crate::types::{Record, SchemaRef};
use crate::vector::VectorBlock;

/// Batch size used when a caller does not pick one.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Group `rows` into blocks typed by `schema`.
///
/// A `batch_size` of 0 is treated as 1.
pub fn rows_to_blocks<'a>(schema: SchemaRef, rows: RowIter<'a>, batch_size: usize) -> BlockIter<'a> {
    Box::new(RowBatches {
        schema,
        rows,
        batch_size: batch_size.max(1),
        done: false,
    })
}

/// Flatten blocks into rows.
pub fn blocks_to_rows<'a>(blocks: BlockIter<'a>) -> RowIter<'a> {
    Box::new(BlockRows {
        blocks,
        current: None,
        next_row: 0,
        done: false,
    })
}

struct RowBatches<'a> {
    schema: SchemaRef,
    rows: RowIter<'a>,
    batch_size: usize,
    done: bool,
}

impl Iterator for RowBatches<'_> {
    type Item = SourceResult<VectorBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.rows.next() {
                Some(Ok(record)) => batch.push(record),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            return None;
        }
        Some(Ok(VectorBlock::from_records(Arc::clone(&self.schema), &batch)))
    }
}

struct BlockRows<'a> {
    blocks: BlockIter<'a>,
    current: Option<VectorBlock>,
    next_row: usize,
    done: bool,
}

impl Iterator for BlockRows<'_> {
    type Item = SourceResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(block) = &self.current {
                if self.next_row < block.size() {
                    let record = block.record_at(self.next_row);
                    self.next_row += 1;
                    return Some(Ok(record));
                }
                self.current = None;
            }
            match self.blocks.next() {
                Some(Ok(block)) => {
                    self.current = Some(block);
                    self.next_row = 0;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// A row-native source viewed as a column-native one.
#[derive(Debug, Clone)]
pub struct RowsAsVectors<S> {
    inner: S,
}

impl<S: RowSource> RowsAsVectors<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: RowSource> VectorSource for RowsAsVectors<S> {
    fn schema(&self) -> &SchemaRef {
        self.inner.schema()
    }

    fn blocks(&self, batch_size: usize) -> SourceResult<BlockIter<'_>> {
        Ok(rows_to_blocks(
            Arc::clone(self.inner.schema()),
            self.inner.rows()?,
            batch_size,
        ))
    }
}

/// A column-native source viewed as a row-native one.
#[derive(Debug, Clone)]
pub struct VectorsAsRows<S> {
    inner: S,
    batch_size: usize,
}

impl<S: VectorSource> VectorsAsRows<S> {
    /// Rows are read from blocks of `batch_size` rows.
    pub fn new(inner: S, batch_size: usize) -> Self {
        Self { inner, batch_size }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: VectorSource> RowSource for VectorsAsRows<S> {
    fn schema(&self) -> &SchemaRef {
        self.inner.schema()
    }

    fn rows(&self) -> SourceResult<RowIter<'_>> {
        Ok(blocks_to_rows(self.inner.blocks(self.batch_size)?))
    }
}

/// `source.as_vector_source()` for any row source.
pub trait RowSourceExt: RowSource + Sized {
    fn as_vector_source(self) -> RowsAsVectors<Self> {
        RowsAsVectors::new(self)
    }
}

impl<S: RowSource> RowSourceExt for S {}

/// `source.as_row_source(batch_size)` for any vector source.
pub trait VectorSourceExt: VectorSource + Sized {
    fn as_row_source(self, batch_size: usize) -> VectorsAsRows<Self> {
        VectorsAsRows::new(self, batch_size)
    }
}

impl<S: VectorSource> VectorSourceExt for S {}
