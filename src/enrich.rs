use indexmap::IndexMap;

use crate::bridge::{DEFAULT_BATCH_SIZE, blocks_to_rows};
use crate::error::SourceResult;
use crate::source::{RecordSource, RowIter, RowSource};
use crate::types::{SchemaRef, Value};

/// Adds fixed per-blob values to every row of a base source.
///
/// Column-native bases are read through row bridging first. Extra values override base values of
/// the same name. [`RowSource::schema`] returns the augmented schema, not the base one.
#[derive(Debug)]
pub struct AttributeEnrichingSource {
    base: RecordSource,
    extra: IndexMap<String, Value>,
    schema: SchemaRef,
    batch_size: usize,
}

impl AttributeEnrichingSource {
    /// `schema` is the base schema followed by the attribute fields.
    pub fn new(base: RecordSource, extra: IndexMap<String, Value>, schema: SchemaRef) -> Self {
        Self {
            base,
            extra,
            schema,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Block size used when bridging a column-native base to rows.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn base(&self) -> &RecordSource {
        &self.base
    }

    /// Values merged into every row.
    pub fn extra(&self) -> &IndexMap<String, Value> {
        &self.extra
    }
}

impl RowSource for AttributeEnrichingSource {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn rows(&self) -> SourceResult<RowIter<'_>> {
        let rows = match &self.base {
            RecordSource::Rows(s) => s.rows()?,
            RecordSource::Vectors(s) => blocks_to_rows(s.blocks(self.batch_size)?),
        };
        Ok(Box::new(
            rows.map(move |row| row.map(|r| r.merged(&self.extra))),
        ))
    }
}
