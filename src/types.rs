//! Core data model types.
//!
//! A [`Schema`] is an ordered list of typed [`Field`]s. Field order is the physical column order
//! used when building columnar blocks, so every field carries its dense 0-based `index`. Rows are
//! represented as [`Record`]s: name-to-[`Value`] maps where an absent key and an explicit
//! [`Value::Null`] mean the same thing.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

use crate::error::{SourceError, SourceResult};

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point number.
    Float32,
    /// 64-bit floating point number.
    Float64,
    /// UTF-8 string.
    Utf8,
    /// Raw bytes.
    Binary,
    /// Calendar date without time zone.
    Date,
    /// Date and time without time zone.
    Timestamp,
}

impl DataType {
    /// Lower-case type name, as used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Utf8 => "utf8",
            Self::Binary => "binary",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Position of the field in its schema. Assigned by [`Schema`] construction.
    pub index: usize,
    /// Field data type.
    pub data_type: DataType,
    /// Whether the column may hold nulls.
    pub nullable: bool,
}

impl Field {
    /// Create a new nullable field. The index is assigned when the field is put into a schema.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            index: 0,
            data_type,
            nullable: true,
        }
    }

    /// Mark the field as non-nullable.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Shared, immutable schema handle.
pub type SchemaRef = Arc<Schema>;

/// An ordered list of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Create a schema from fields, renumbering indexes to match positions.
    ///
    /// # Panics
    ///
    /// Panics if two fields share a name. Use [`Schema::try_new`] for untrusted input.
    pub fn new(fields: Vec<Field>) -> Self {
        match Self::try_new(fields) {
            Ok(schema) => schema,
            Err(e) => panic!("{e}"),
        }
    }

    /// Create a schema from fields, renumbering indexes to match positions.
    ///
    /// Returns [`SourceError::SchemaMismatch`] if two fields share a name.
    pub fn try_new(mut fields: Vec<Field>) -> SourceResult<Self> {
        for (i, field) in fields.iter_mut().enumerate() {
            field.index = i;
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SourceError::schema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// A schema without fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Ordered fields.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by index. Out-of-range indexes return `None`.
    pub fn field_at(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns a new schema with `extra` appended after the existing fields.
    ///
    /// Extra fields are renumbered to follow the current fields. A name that already exists is
    /// rejected with [`SourceError::SchemaMismatch`].
    pub fn append(&self, extra: Vec<Field>) -> SourceResult<Schema> {
        let mut fields = self.fields.clone();
        fields.extend(extra);
        Self::try_new(fields)
    }
}

/// A single typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Utf8(v) => f.write_str(v),
            Value::Binary(v) => f.write_str(&String::from_utf8_lossy(v)),
            Value::Date(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Utf8,
    Vec<u8> => Binary,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

static NULL: Value = Value::Null;

/// One row: an insertion-ordered mapping from column name to value.
///
/// Equality ignores null entries, so a record holding an explicit null compares equal to one
/// where the key is absent.
#[derive(Debug, Clone, Default)]
pub struct Record {
    values: IndexMap<String, Value>,
}

impl Record {
    /// Create a record from an existing map.
    pub fn new(values: IndexMap<String, Value>) -> Self {
        Self { values }
    }

    /// Create a record from `(name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect()
    }

    /// Value for `name`; [`Value::Null`] when absent.
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    /// Whether `name` holds a non-null value.
    pub fn has_value(&self, name: &str) -> bool {
        !self.get(name).is_null()
    }

    /// Number of entries, including explicit nulls.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record has no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a copy of this record with `extra` merged in. Keys in `extra` win.
    pub fn merged(&self, extra: &IndexMap<String, Value>) -> Record {
        let mut values = self.values.clone();
        for (k, v) in extra {
            values.insert(k.clone(), v.clone());
        }
        Record { values }
    }

    /// Consume the record, returning the underlying map.
    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.values
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        let non_null = |r: &Record| r.values.values().filter(|v| !v.is_null()).count();
        non_null(self) == non_null(other)
            && self
                .values
                .iter()
                .filter(|(_, v)| !v.is_null())
                .all(|(k, v)| other.get(k) == v)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DataType, Field, Record, Schema, Value};

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int32).not_null(),
            Field::new("name", DataType::Utf8),
            Field::new("active", DataType::Bool),
        ])
    }

    #[test]
    fn schema_assigns_sequential_indexes() {
        let schema = sample_schema();
        let indexes: Vec<usize> = schema.fields().iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(schema.field("name").map(|f| f.index), Some(1));
        assert_eq!(schema.field_at(2).map(|f| f.name.as_str()), Some("active"));
        assert!(schema.field_at(10).is_none());
        assert!(schema.field("missing").is_none());
    }

    #[test]
    fn schema_rejects_duplicate_names() {
        let err = Schema::try_new(vec![
            Field::new("id", DataType::Int32),
            Field::new("id", DataType::Int64),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate field name 'id'"));
    }

    #[test]
    fn append_renumbers_extra_fields() {
        let schema = sample_schema()
            .append(vec![Field::new("year", DataType::Int32)])
            .unwrap();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.field("year").map(|f| f.index), Some(3));
        assert!(sample_schema().append(vec![Field::new("id", DataType::Utf8)]).is_err());
    }

    #[test]
    fn record_treats_absent_and_null_alike() {
        let explicit = Record::from_pairs([("id", Value::from(1)), ("name", Value::Null)]);
        let absent = Record::from_pairs([("id", Value::from(1))]);
        assert_eq!(explicit, absent);
        assert_eq!(absent.get("name"), &Value::Null);
        assert!(!explicit.has_value("name"));

        let different = Record::from_pairs([("id", Value::from(2))]);
        assert_ne!(explicit, different);
    }

    #[test]
    fn merged_lets_extra_values_win() {
        let base = Record::from_pairs([("id", Value::from(1)), ("src", Value::from("file"))]);
        let extra = [("src".to_string(), Value::from("attr"))].into_iter().collect();
        let merged = base.merged(&extra);
        assert_eq!(merged.get("src"), &Value::from("attr"));
        assert_eq!(merged.get("id"), &Value::Int32(1));
    }
}
