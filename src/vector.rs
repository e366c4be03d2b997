//! Columnar blocks backed by Arrow arrays.
//!
//! A [`VectorBlock`] holds `size` rows as one typed [`Vector`] per schema field. Vectors carry a
//! validity (null) buffer only when the batch actually contained a null.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryBuilder, BooleanBuilder, Float32Builder, Float64Builder,
    Int32Builder, Int64Builder, StringBuilder, new_null_array,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType as ArrowType, Field as ArrowField, Float32Type, Float64Type, Int32Type, Int64Type,
    Schema as ArrowSchema,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::{SourceError, SourceResult};
use crate::types::{DataType, Field, Record, Schema, SchemaRef, Value};

/// Arrow storage type for a logical type.
///
/// Dates and timestamps are stored as strings at this layer.
pub fn arrow_type(data_type: DataType) -> ArrowType {
    match data_type {
        DataType::Bool => ArrowType::Boolean,
        DataType::Int32 => ArrowType::Int32,
        DataType::Int64 => ArrowType::Int64,
        DataType::Float32 => ArrowType::Float32,
        DataType::Float64 => ArrowType::Float64,
        DataType::Utf8 | DataType::Date | DataType::Timestamp => ArrowType::Utf8,
        DataType::Binary => ArrowType::Binary,
    }
}

/// Logical type for an Arrow type, if one exists.
pub fn logical_type(arrow_type: &ArrowType) -> Option<DataType> {
    match arrow_type {
        ArrowType::Boolean => Some(DataType::Bool),
        ArrowType::Int8 | ArrowType::Int16 | ArrowType::Int32 => Some(DataType::Int32),
        ArrowType::UInt8 | ArrowType::UInt16 => Some(DataType::Int32),
        ArrowType::Int64 | ArrowType::UInt32 => Some(DataType::Int64),
        ArrowType::Float16 | ArrowType::Float32 => Some(DataType::Float32),
        ArrowType::Float64 => Some(DataType::Float64),
        ArrowType::Utf8 | ArrowType::LargeUtf8 | ArrowType::Utf8View => Some(DataType::Utf8),
        ArrowType::Binary | ArrowType::LargeBinary | ArrowType::BinaryView => {
            Some(DataType::Binary)
        }
        ArrowType::Date32 | ArrowType::Date64 => Some(DataType::Date),
        ArrowType::Timestamp(_, _) => Some(DataType::Timestamp),
        _ => None,
    }
}

/// Arrow schema equivalent of `schema`.
///
/// Every Arrow field is nullable. Merged tables and normalized row values can hold nulls in
/// columns that a single file declares non-null.
pub fn arrow_schema(schema: &Schema) -> ArrowSchema {
    ArrowSchema::new(
        schema
            .fields()
            .iter()
            .map(|f| ArrowField::new(f.name.clone(), arrow_type(f.data_type), true))
            .collect::<Vec<_>>(),
    )
}

/// Convert an Arrow schema into a logical schema.
///
/// Columns without a logical equivalent are rejected with [`SourceError::SchemaMismatch`].
pub fn schema_from_arrow(arrow: &ArrowSchema) -> SourceResult<Schema> {
    let fields = arrow
        .fields()
        .iter()
        .map(|f| {
            let data_type = logical_type(f.data_type()).ok_or_else(|| {
                SourceError::schema(format!(
                    "column '{}' has unsupported type {}",
                    f.name(),
                    f.data_type()
                ))
            })?;
            let field = Field::new(f.name().clone(), data_type);
            Ok(if f.is_nullable() { field } else { field.not_null() })
        })
        .collect::<SourceResult<Vec<_>>>()?;
    Schema::try_new(fields)
}

/// One column of a block, tied to a schema field by index.
#[derive(Debug, Clone)]
pub struct Vector {
    /// Index of the field in the block schema.
    pub field_index: usize,
    /// Column values.
    pub values: ArrayRef,
}

impl Vector {
    pub fn new(field_index: usize, values: ArrayRef) -> Self {
        Self {
            field_index,
            values,
        }
    }

    /// Whether a validity buffer is attached.
    pub fn has_null_vector(&self) -> bool {
        self.values.nulls().is_some()
    }
}

/// A batch of rows in columnar form.
#[derive(Debug, Clone)]
pub struct VectorBlock {
    schema: SchemaRef,
    size: usize,
    vectors: Vec<Vector>,
}

impl VectorBlock {
    /// Fails with [`SourceError::SchemaMismatch`] if a vector length differs from `size`.
    pub fn new(schema: SchemaRef, size: usize, vectors: Vec<Vector>) -> SourceResult<Self> {
        if let Some(v) = vectors.iter().find(|v| v.values.len() != size) {
            return Err(SourceError::schema(format!(
                "vector for field index {} has {} values, block size is {size}",
                v.field_index,
                v.values.len()
            )));
        }
        Ok(Self {
            schema,
            size,
            vectors,
        })
    }

    /// Build a block from rows, one typed vector per schema field.
    ///
    /// Values are normalized to the field type: exact matches are stored, integers widen, string
    /// columns store the display form of any value, and everything else becomes null.
    pub fn from_records(schema: SchemaRef, rows: &[Record]) -> Self {
        let vectors = schema
            .fields()
            .iter()
            .map(|field| Vector::new(field.index, build_array(field, rows)))
            .collect();
        Self {
            schema,
            size: rows.len(),
            vectors,
        }
    }

    /// Map the columns of an Arrow batch onto `schema` by name.
    ///
    /// Columns are cast to the field storage type; fields missing from the batch read as null.
    pub fn from_record_batch(schema: SchemaRef, batch: &RecordBatch) -> SourceResult<Self> {
        let size = batch.num_rows();
        let vectors = schema
            .fields()
            .iter()
            .map(|field| {
                let target = arrow_type(field.data_type);
                let values = match batch.column_by_name(&field.name) {
                    Some(column) if column.data_type() == &target => Arc::clone(column),
                    Some(column) => cast(column, &target)?,
                    None => new_null_array(&target, size),
                };
                Ok(Vector::new(field.index, values))
            })
            .collect::<SourceResult<Vec<_>>>()?;
        Ok(Self {
            schema,
            size,
            vectors,
        })
    }

    /// Number of rows.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the block holds no rows.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Schema the vector field indexes refer to.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }

    /// Vector for the field at `field_index`.
    pub fn vector(&self, field_index: usize) -> Option<&Vector> {
        self.vectors.iter().find(|v| v.field_index == field_index)
    }

    /// Values of the column named `name`.
    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        let index = self.schema.index_of(name)?;
        self.vector(index).map(|v| &v.values)
    }

    /// The row at `row` as a record.
    ///
    /// Vectors whose field index is outside the schema are skipped.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.size()`.
    pub fn record_at(&self, row: usize) -> Record {
        assert!(row < self.size, "row {row} out of range for block of {}", self.size);
        self.vectors
            .iter()
            .filter_map(|v| {
                let field = self.schema.field_at(v.field_index)?;
                Some((field.name.clone(), extract_value(v.values.as_ref(), row)))
            })
            .collect()
    }

    /// All rows of the block, in order.
    pub fn to_records(&self) -> Vec<Record> {
        (0..self.size).map(|row| self.record_at(row)).collect()
    }

    /// Zero-copy view over `len` rows starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > self.size()`.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        assert!(offset + len <= self.size, "slice out of range");
        Self {
            schema: Arc::clone(&self.schema),
            size: len,
            vectors: self
                .vectors
                .iter()
                .map(|v| Vector::new(v.field_index, v.values.slice(offset, len)))
                .collect(),
        }
    }

    /// Split into blocks of at most `batch_size` rows (0 is treated as 1).
    pub fn chunks(self, batch_size: usize) -> Vec<Self> {
        let batch_size = batch_size.max(1);
        if self.size <= batch_size {
            return vec![self];
        }
        (0..self.size)
            .step_by(batch_size)
            .map(|offset| self.slice(offset, batch_size.min(self.size - offset)))
            .collect()
    }

    /// Re-express this block against `schema`, matching vectors by field name.
    ///
    /// Vectors are cast to the target storage types, fields without a vector are filled with
    /// nulls and vectors unknown to `schema` are dropped. Blocks already built against `schema`
    /// with a vector per field are returned unchanged.
    pub fn conform(self, schema: &SchemaRef) -> SourceResult<Self> {
        let complete = (0..schema.len()).all(|i| self.vector(i).is_some());
        if Arc::ptr_eq(&self.schema, schema) && complete {
            return Ok(self);
        }
        let vectors = schema
            .fields()
            .iter()
            .map(|field| {
                let target = arrow_type(field.data_type);
                let existing = self
                    .schema
                    .index_of(&field.name)
                    .and_then(|i| self.vector(i));
                let values = match existing {
                    Some(v) if v.values.data_type() == &target => Arc::clone(&v.values),
                    Some(v) => cast(&v.values, &target)?,
                    None => new_null_array(&target, self.size),
                };
                Ok(Vector::new(field.index, values))
            })
            .collect::<SourceResult<Vec<_>>>()?;
        Ok(Self {
            schema: Arc::clone(schema),
            size: self.size,
            vectors,
        })
    }

    /// Convert to an Arrow batch with one column per schema field, for SQL engines.
    pub fn to_record_batch(&self) -> SourceResult<RecordBatch> {
        let columns = self
            .schema
            .fields()
            .iter()
            .map(|field| match self.vector(field.index) {
                Some(v) => Arc::clone(&v.values),
                None => new_null_array(&arrow_type(field.data_type), self.size),
            })
            .collect();
        let options = RecordBatchOptions::new().with_row_count(Some(self.size));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(arrow_schema(&self.schema)),
            columns,
            &options,
        )?)
    }
}

/// Read one scalar from a typed array.
///
/// Covers string, 32/64-bit integer, 32/64-bit float, boolean and binary arrays. Other array
/// kinds yield [`Value::Null`].
pub fn extract_value(array: &dyn Array, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match array.data_type() {
        ArrowType::Utf8 => Value::Utf8(array.as_string::<i32>().value(row).to_owned()),
        ArrowType::Int32 => Value::Int32(array.as_primitive::<Int32Type>().value(row)),
        ArrowType::Int64 => Value::Int64(array.as_primitive::<Int64Type>().value(row)),
        ArrowType::Float32 => Value::Float32(array.as_primitive::<Float32Type>().value(row)),
        ArrowType::Float64 => Value::Float64(array.as_primitive::<Float64Type>().value(row)),
        ArrowType::Boolean => Value::Bool(array.as_boolean().value(row)),
        ArrowType::Binary => Value::Binary(array.as_binary::<i32>().value(row).to_vec()),
        _ => Value::Null,
    }
}

// Builders only materialize a validity buffer once a null is appended.
fn build_array(field: &Field, rows: &[Record]) -> ArrayRef {
    let values = rows.iter().map(|r| r.get(&field.name));
    match field.data_type {
        DataType::Bool => {
            let mut b = BooleanBuilder::with_capacity(rows.len());
            values.for_each(|v| b.append_option(as_bool(v)));
            Arc::new(b.finish())
        }
        DataType::Int32 => {
            let mut b = Int32Builder::with_capacity(rows.len());
            values.for_each(|v| b.append_option(as_i32(v)));
            Arc::new(b.finish())
        }
        DataType::Int64 => {
            let mut b = Int64Builder::with_capacity(rows.len());
            values.for_each(|v| b.append_option(as_i64(v)));
            Arc::new(b.finish())
        }
        DataType::Float32 => {
            let mut b = Float32Builder::with_capacity(rows.len());
            values.for_each(|v| b.append_option(as_f32(v)));
            Arc::new(b.finish())
        }
        DataType::Float64 => {
            let mut b = Float64Builder::with_capacity(rows.len());
            values.for_each(|v| b.append_option(as_f64(v)));
            Arc::new(b.finish())
        }
        DataType::Utf8 | DataType::Date | DataType::Timestamp => {
            let mut b = StringBuilder::with_capacity(rows.len(), rows.len() * 8);
            values.for_each(|v| b.append_option((!v.is_null()).then(|| v.to_string())));
            Arc::new(b.finish())
        }
        DataType::Binary => {
            let mut b = BinaryBuilder::with_capacity(rows.len(), rows.len() * 8);
            values.for_each(|v| match v {
                Value::Binary(bytes) => b.append_value(bytes),
                _ => b.append_null(),
            });
            Arc::new(b.finish())
        }
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn as_i32(v: &Value) -> Option<i32> {
    match v {
        Value::Int32(i) => Some(*i),
        Value::Int64(i) => i32::try_from(*i).ok(),
        _ => None,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Int32(i) => Some(i64::from(*i)),
        Value::Int64(i) => Some(*i),
        _ => None,
    }
}

fn as_f32(v: &Value) -> Option<f32> {
    match v {
        Value::Float32(f) => Some(*f),
        Value::Int32(i) => Some(*i as f32),
        Value::Int64(i) => Some(*i as f32),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Float32(f) => Some(f64::from(*f)),
        Value::Float64(f) => Some(*f),
        Value::Int32(i) => Some(f64::from(*i)),
        Value::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::VectorBlock;
    use crate::types::{DataType, Field, Record, Schema, Value};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("name", DataType::Utf8),
            Field::new("score", DataType::Float64),
        ]))
    }

    #[test]
    fn null_vector_is_attached_only_when_a_null_occurs() {
        let rows = vec![
            Record::from_pairs([("id", Value::from(1i64)), ("name", Value::from("a"))]),
            Record::from_pairs([("id", Value::from(2i64)), ("name", Value::from("b"))]),
        ];
        let block = VectorBlock::from_records(schema(), &rows);
        assert_eq!(block.size(), 2);
        assert!(!block.vector(0).unwrap().has_null_vector());
        assert!(!block.vector(1).unwrap().has_null_vector());
        assert!(block.vector(2).unwrap().has_null_vector());
    }

    #[test]
    fn values_widen_or_become_null() {
        let rows = vec![Record::from_pairs([
            ("id", Value::Int32(7)),
            ("name", Value::Int64(42)),
            ("score", Value::from("not a number")),
        ])];
        let block = VectorBlock::from_records(schema(), &rows);
        let row = block.record_at(0);
        assert_eq!(row.get("id"), &Value::Int64(7));
        assert_eq!(row.get("name"), &Value::from("42"));
        assert_eq!(row.get("score"), &Value::Null);
    }

    #[test]
    fn chunks_split_into_batches() {
        let rows: Vec<Record> = (0..5i64)
            .map(|i| Record::from_pairs([("id", Value::from(i))]))
            .collect();
        let sizes: Vec<usize> = VectorBlock::from_records(schema(), &rows)
            .chunks(2)
            .iter()
            .map(VectorBlock::size)
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn conform_fills_missing_fields_with_nulls() {
        let narrow = Arc::new(Schema::new(vec![Field::new("name", DataType::Utf8)]));
        let rows = vec![Record::from_pairs([("name", Value::from("x"))])];
        let block = VectorBlock::from_records(narrow, &rows)
            .conform(&schema())
            .unwrap();
        assert_eq!(block.vectors().len(), 3);
        let row = block.record_at(0);
        assert_eq!(row.get("name"), &Value::from("x"));
        assert_eq!(row.get("id"), &Value::Null);

        let batch = block.to_record_batch().unwrap();
        assert_eq!(batch.num_columns(), 3);
        assert_eq!(batch.num_rows(), 1);
    }
}
