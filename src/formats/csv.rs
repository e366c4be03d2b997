//! CSV and TSV support.

use std::io::Read;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use super::FormatHandler;
use crate::blob::{BlobPath, BlobSource};
use crate::error::{SourceError, SourceResult};
use crate::source::{RecordSource, RowIter, RowSource};
use crate::types::{DataType, Field, Record, Schema, SchemaRef, Value};

/// Delimited text format.
///
/// Rules:
///
/// - The first row holds the column names, unless headers are disabled (then columns are named
///   `column_1`, `column_2`, ...).
/// - Schemas are inferred from up to `sample_rows` rows; each column becomes the narrowest of
///   `Int64`, `Float64`, `Bool` or `Utf8` that fits every non-empty sampled value.
/// - Rows are projected onto the table schema by column name; missing columns read as null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFormat {
    name: &'static str,
    delimiter: u8,
    has_headers: bool,
    sample_rows: usize,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            name: "csv",
            delimiter: b',',
            has_headers: true,
            sample_rows: 100,
        }
    }
}

impl CsvFormat {
    /// Comma separated, with headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tab separated, with headers.
    pub fn tsv() -> Self {
        Self {
            name: "tsv",
            delimiter: b'\t',
            ..Self::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    /// Number of data rows sampled for schema inference (at least 1).
    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows.max(1);
        self
    }

    fn reader<R: Read>(&self, input: R) -> csv::Reader<R> {
        csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .flexible(true)
            .from_reader(input)
    }

    fn column_names<R: Read>(&self, rdr: &mut csv::Reader<R>) -> SourceResult<Vec<String>> {
        if self.has_headers {
            return Ok(rdr.headers()?.iter().map(|h| h.trim().to_owned()).collect());
        }
        // peeks the first record without consuming it
        let width = rdr.headers()?.len();
        Ok((1..=width).map(|i| format!("column_{i}")).collect())
    }
}

impl FormatHandler for CsvFormat {
    fn name(&self) -> &str {
        self.name
    }

    fn infer_schema(&self, blob: &BlobPath, storage: &dyn BlobSource) -> SourceResult<Schema> {
        let mut rdr = self.reader(storage.open_read(blob)?);
        let names = self.column_names(&mut rdr)?;
        let mut candidates = vec![Candidate::default(); names.len()];
        for record in rdr.records().take(self.sample_rows) {
            let record = record?;
            for (candidate, raw) in candidates.iter_mut().zip(record.iter()) {
                candidate.observe(raw);
            }
        }
        let fields = names
            .into_iter()
            .zip(candidates)
            .map(|(name, c)| Field::new(name, c.data_type()))
            .collect();
        Schema::try_new(fields)
            .map_err(|e| SourceError::schema(format!("cannot infer schema of '{blob}': {e}")))
    }

    fn create_record_source(
        &self,
        blob: &BlobPath,
        storage: &Arc<dyn BlobSource>,
        schema: SchemaRef,
    ) -> SourceResult<RecordSource> {
        Ok(RecordSource::rows_native(CsvSource {
            format: self.clone(),
            blob: blob.clone(),
            storage: Arc::clone(storage),
            schema,
        }))
    }
}

/// Row-native source over one delimited blob.
pub struct CsvSource {
    format: CsvFormat,
    blob: BlobPath,
    storage: Arc<dyn BlobSource>,
    schema: SchemaRef,
}

impl RowSource for CsvSource {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn rows(&self) -> SourceResult<RowIter<'_>> {
        let mut rdr = self.format.reader(self.storage.open_read(&self.blob)?);
        let names = self.format.column_names(&mut rdr)?;
        // schema field -> CSV column index (allows re-ordered or missing columns)
        let projection: Vec<Option<usize>> = self
            .schema
            .fields()
            .iter()
            .map(|f| names.iter().position(|n| *n == f.name))
            .collect();
        // 1-based row number for users; the header is row 1
        let first_row = if self.format.has_headers { 2 } else { 1 };
        let schema = Arc::clone(&self.schema);

        let rows = rdr
            .into_records()
            .enumerate()
            .map(move |(idx0, record)| {
                let record = record?;
                let row = idx0 + first_row;
                schema
                    .fields()
                    .iter()
                    .zip(&projection)
                    .map(|(field, idx)| {
                        let raw = idx.and_then(|i| record.get(i)).unwrap_or("");
                        let value = parse_typed_value(row, &field.name, field.data_type, raw)?;
                        Ok((field.name.clone(), value))
                    })
                    .collect::<SourceResult<Record>>()
            });
        Ok(Box::new(rows))
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    int: bool,
    float: bool,
    bool: bool,
    seen: bool,
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            int: true,
            float: true,
            bool: true,
            seen: false,
        }
    }
}

impl Candidate {
    fn observe(&mut self, raw: &str) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        self.seen = true;
        self.int &= trimmed.parse::<i64>().is_ok();
        self.float &= trimmed.parse::<f64>().is_ok();
        self.bool &= parse_bool(trimmed).is_ok();
    }

    fn data_type(&self) -> DataType {
        match self {
            Self { seen: false, .. } => DataType::Utf8,
            Self { int: true, .. } => DataType::Int64,
            Self { float: true, .. } => DataType::Float64,
            Self { bool: true, .. } => DataType::Bool,
            _ => DataType::Utf8,
        }
    }
}

fn parse_typed_value(row: usize, column: &str, data_type: DataType, raw: &str) -> SourceResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    let parse_error = |message: String| SourceError::ParseError {
        row,
        column: column.to_owned(),
        raw: raw.to_owned(),
        message,
    };

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Binary => Ok(Value::Binary(trimmed.as_bytes().to_vec())),
        DataType::Int32 => trimmed
            .parse::<i32>()
            .map(Value::Int32)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Int64 => trimmed
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Float32 => trimmed
            .parse::<f32>()
            .map(Value::Float32)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Bool => parse_bool(trimmed).map(Value::Bool).map_err(parse_error),
        DataType::Date => trimmed
            .parse::<NaiveDate>()
            .map(Value::Date)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Timestamp => trimmed
            .parse::<NaiveDateTime>()
            .map(Value::Timestamp)
            .map_err(|e| parse_error(e.to_string())),
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Ok(true),
        "false" | "f" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/yes/no)".to_string()),
    }
}
