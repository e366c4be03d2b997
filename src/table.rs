//! Logical tables backed by many per-blob sources.

use std::slice;
use std::sync::Arc;

use crate::bridge::rows_to_blocks;
use crate::error::{SourceError, SourceResult};
use crate::source::{BlockIter, RecordSource, RowIter};
use crate::types::{Record, SchemaRef};
use crate::vector::VectorBlock;

/// A table with a fixed schema whose rows are the concatenation of its sources, in order.
///
/// Sources are opened lazily, one at a time, when iteration reaches them. A table is read-only,
/// so any number of iterators may be created over it; each iterator owns its own position.
#[derive(Debug)]
pub struct MultiFileTable {
    schema: SchemaRef,
    sources: Vec<RecordSource>,
}

impl MultiFileTable {
    pub fn new(schema: SchemaRef, sources: Vec<RecordSource>) -> Self {
        Self { schema, sources }
    }

    /// A schema-bearing table without sources.
    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(schema, Vec::new())
    }

    /// A table over a single source.
    pub fn single(schema: SchemaRef, source: RecordSource) -> Self {
        Self::new(schema, vec![source])
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn sources(&self) -> &[RecordSource] {
        &self.sources
    }

    /// Number of underlying sources (one per contributing blob).
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// All rows, source by source.
    pub fn records(&self) -> Records<'_> {
        Records {
            sources: self.sources.iter(),
            current: None,
            done: false,
        }
    }

    /// All rows as blocks of at most `batch_size` rows, typed by the table schema.
    ///
    /// Blocks never span two sources.
    pub fn vector_blocks(&self, batch_size: usize) -> VectorBlocks<'_> {
        VectorBlocks {
            schema: Arc::clone(&self.schema),
            sources: self.sources.iter(),
            current: None,
            batch_size,
            done: false,
        }
    }

    /// Collect every row.
    pub fn to_records(&self) -> SourceResult<Vec<Record>> {
        self.records().collect()
    }
}

/// Row iterator over a [`MultiFileTable`].
pub struct Records<'a> {
    sources: slice::Iter<'a, RecordSource>,
    current: Option<RowIter<'a>>,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = SourceResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(rows) = self.current.as_mut() {
                match rows.next() {
                    Some(Ok(record)) => return Some(Ok(record)),
                    Some(Err(e)) => return Some(Err(self.fail(e))),
                    None => self.current = None,
                }
            }
            let Some(source) = self.sources.next() else {
                self.done = true;
                return None;
            };
            match source.rows() {
                Ok(rows) => self.current = Some(rows),
                Err(e) => return Some(Err(self.fail(e))),
            }
        }
    }
}

impl Records<'_> {
    // Drops the open iterator so its handles are released before the error reaches the caller.
    fn fail(&mut self, e: SourceError) -> SourceError {
        self.current = None;
        self.done = true;
        e
    }
}

/// Columnar iterator over a [`MultiFileTable`].
pub struct VectorBlocks<'a> {
    schema: SchemaRef,
    sources: slice::Iter<'a, RecordSource>,
    current: Option<BlockIter<'a>>,
    batch_size: usize,
    done: bool,
}

impl VectorBlocks<'_> {
    /// The table schema every block conforms to.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn fail(&mut self, e: SourceError) -> SourceError {
        self.current = None;
        self.done = true;
        e
    }
}

impl<'a> VectorBlocks<'a> {
    fn open(&self, source: &'a RecordSource) -> SourceResult<BlockIter<'a>> {
        match source {
            RecordSource::Rows(s) => Ok(rows_to_blocks(
                Arc::clone(&self.schema),
                s.rows()?,
                self.batch_size,
            )),
            RecordSource::Vectors(s) => {
                let schema = Arc::clone(&self.schema);
                Ok(Box::new(
                    s.blocks(self.batch_size.max(1))?
                        .map(move |block| block.and_then(|b| b.conform(&schema))),
                ))
            }
        }
    }
}

impl<'a> Iterator for VectorBlocks<'a> {
    type Item = SourceResult<VectorBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(blocks) = self.current.as_mut() {
                match blocks.next() {
                    Some(Ok(block)) => return Some(Ok(block)),
                    Some(Err(e)) => return Some(Err(self.fail(e))),
                    None => self.current = None,
                }
            }
            let Some(source) = self.sources.next() else {
                self.done = true;
                return None;
            };
            match self.open(source) {
                Ok(blocks) => self.current = Some(blocks),
                Err(e) => return Some(Err(self.fail(e))),
            }
        }
    }
}
