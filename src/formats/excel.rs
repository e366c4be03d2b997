#![cfg(feature = "excel")]

use std::io::{Cursor, Read};
use std::sync::Arc;

use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};

use super::FormatHandler;
use crate::blob::{BlobPath, BlobSource};
use crate::error::{SourceError, SourceResult};
use crate::source::{RecordSource, RowIter, RowSource};
use crate::types::{DataType, Field, Record, Schema, SchemaRef, Value};

const SAMPLE_ROWS: usize = 100;

/// Excel workbook format (`.xlsx`, `.xls`, `.ods`, ...), row-native.
///
/// Behavior:
/// - Reads `sheet` if set; otherwise the first sheet in the workbook
/// - Detects the first non-empty row as the header row
/// - Projects rows onto the table schema by header name; missing columns read as null
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcelFormat {
    sheet: Option<String>,
}

impl ExcelFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the sheet named `sheet` instead of the first one.
    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    fn load(&self, storage: &dyn BlobSource, blob: &BlobPath) -> SourceResult<Sheet> {
        let mut buf = Vec::new();
        storage.open_read(blob)?.read_to_end(&mut buf)?;
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(buf))?;
        let name = match &self.sheet {
            Some(name) => name.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| SourceError::schema(format!("workbook '{blob}' has no sheets")))?,
        };
        let range = workbook.worksheet_range(&name)?;
        let (header_row, headers) = header_row(&range)
            .ok_or_else(|| SourceError::schema(format!("sheet '{name}' has no header row")))?;
        let first_row = range.start().map_or(0, |(row, _)| row as usize);
        Ok(Sheet {
            name,
            range,
            first_row,
            header_row,
            headers,
        })
    }
}

struct Sheet {
    name: String,
    range: Range<Data>,
    // absolute index of the range's first row
    first_row: usize,
    header_row: usize,
    headers: Vec<String>,
}

impl FormatHandler for ExcelFormat {
    fn name(&self) -> &str {
        "excel"
    }

    fn infer_schema(&self, blob: &BlobPath, storage: &dyn BlobSource) -> SourceResult<Schema> {
        let sheet = self.load(storage, blob)?;
        let fields = sheet
            .headers
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let cells = (sheet.header_row + 1..sheet.range.height())
                    .take(SAMPLE_ROWS)
                    .filter_map(|row| sheet.range.get((row, col)));
                Field::new(name.clone(), infer_column(cells))
            })
            .collect();
        Schema::try_new(fields)
            .map_err(|e| SourceError::schema(format!("sheet '{}': {e}", sheet.name)))
    }

    fn create_record_source(
        &self,
        blob: &BlobPath,
        storage: &Arc<dyn BlobSource>,
        schema: SchemaRef,
    ) -> SourceResult<RecordSource> {
        Ok(RecordSource::rows_native(ExcelSource {
            format: self.clone(),
            blob: blob.clone(),
            storage: Arc::clone(storage),
            schema,
        }))
    }
}

/// Row-native source over one workbook sheet.
pub struct ExcelSource {
    format: ExcelFormat,
    blob: BlobPath,
    storage: Arc<dyn BlobSource>,
    schema: SchemaRef,
}

impl RowSource for ExcelSource {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn rows(&self) -> SourceResult<RowIter<'_>> {
        let sheet = self.format.load(self.storage.as_ref(), &self.blob)?;
        let projection: Vec<Option<usize>> = self
            .schema
            .fields()
            .iter()
            .map(|f| sheet.headers.iter().position(|h| *h == f.name))
            .collect();
        let schema = Arc::clone(&self.schema);
        let first = sheet.header_row + 1;
        let height = sheet.range.height();

        Ok(Box::new((first..height).map(move |row| {
            // 1-based row number (Excel-like)
            let user_row = sheet.first_row + row + 1;
            schema
                .fields()
                .iter()
                .zip(&projection)
                .map(|(field, col)| {
                    let cell = col
                        .and_then(|c| sheet.range.get((row, c)))
                        .unwrap_or(&Data::Empty);
                    let label = format!("{}:{}", sheet.name, field.name);
                    let value = convert_cell(user_row, &label, field.data_type, cell)?;
                    Ok((field.name.clone(), value))
                })
                .collect::<SourceResult<Record>>()
        })))
    }
}

fn header_row(range: &Range<Data>) -> Option<(usize, Vec<String>)> {
    range
        .rows()
        .enumerate()
        .find(|(_, row)| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|(idx, row)| {
            let headers = row
                .iter()
                .map(|c| cell_to_header_string(c).trim().to_owned())
                .collect();
            (idx, headers)
        })
}

fn infer_column<'a>(cells: impl Iterator<Item = &'a Data>) -> DataType {
    let mut seen = None;
    for cell in cells {
        let kind = match cell {
            Data::Empty => continue,
            Data::Int(_) => DataType::Int64,
            Data::Float(f) if f.fract() == 0.0 => DataType::Int64,
            Data::Float(_) => DataType::Float64,
            Data::Bool(_) => DataType::Bool,
            _ => return DataType::Utf8,
        };
        seen = Some(match (seen, kind) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(DataType::Int64 | DataType::Float64), DataType::Int64 | DataType::Float64) => {
                DataType::Float64
            }
            _ => return DataType::Utf8,
        });
    }
    seen.unwrap_or(DataType::Utf8)
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(f) => f.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}

fn convert_cell(row: usize, column: &str, data_type: DataType, c: &Data) -> SourceResult<Value> {
    if matches!(c, Data::Empty) {
        return Ok(Value::Null);
    }
    let parse_error = |message: String| SourceError::ParseError {
        row,
        column: column.to_owned(),
        raw: c.to_string(),
        message,
    };

    match data_type {
        DataType::Utf8 | DataType::Date | DataType::Timestamp => Ok(Value::Utf8(cell_to_string(c))),
        DataType::Binary => Ok(Value::Binary(cell_to_string(c).into_bytes())),
        DataType::Bool => match c {
            Data::Bool(b) => Ok(Value::Bool(*b)),
            Data::Int(i) => Ok(Value::Bool(*i != 0)),
            Data::Float(f) => Ok(Value::Bool(*f != 0.0)),
            Data::String(s) => parse_bool_str(s).map(Value::Bool).map_err(parse_error),
            _ => Err(parse_error("expected bool".to_owned())),
        },
        DataType::Int32 => {
            let v = parse_i64_cell(c).map_err(parse_error)?;
            i32::try_from(v)
                .map(Value::Int32)
                .map_err(|e| parse_error(e.to_string()))
        }
        DataType::Int64 => parse_i64_cell(c).map(Value::Int64).map_err(parse_error),
        DataType::Float32 => parse_f64_cell(c)
            .map(|f| Value::Float32(f as f32))
            .map_err(parse_error),
        DataType::Float64 => parse_f64_cell(c).map(Value::Float64).map_err(parse_error),
    }
}

fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        _ => c.to_string(),
    }
}

fn parse_bool_str(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}

fn parse_i64_cell(c: &Data) -> Result<i64, String> {
    match c {
        Data::Int(i) => Ok(*i),
        Data::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        Data::Float(_) => Err("expected integer (got non-integer float)".to_string()),
        Data::String(s) => s.trim().parse::<i64>().map_err(|e| e.to_string()),
        _ => Err("expected integer".to_string()),
    }
}

fn parse_f64_cell(c: &Data) -> Result<f64, String> {
    match c {
        Data::Float(f) => Ok(*f),
        Data::Int(i) => Ok(*i as f64),
        Data::String(s) => s.trim().parse::<f64>().map_err(|e| e.to_string()),
        _ => Err("expected number".to_string()),
    }
}
