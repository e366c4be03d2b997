#![cfg(feature = "excel_test_writer")]

use std::sync::Arc;

use rust_blob_tables::blob::{BlobPath, BlobSource};
use rust_blob_tables::error::SourceResult;
use rust_blob_tables::formats::{ExcelFormat, FormatHandler};
use rust_blob_tables::storage::MemoryBlobSource;
use rust_blob_tables::types::{DataType, Field, Schema, Value};
use rust_blob_tables::SourceError;

fn people_xlsx() -> Vec<u8> {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();
    let notes = wb.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "free text").unwrap();

    let ws = wb.add_worksheet();
    ws.set_name("People").unwrap();
    // header starts on the second row
    ws.write_string(1, 0, "id").unwrap();
    ws.write_string(1, 1, "name").unwrap();
    ws.write_string(1, 2, "score").unwrap();
    ws.write_string(1, 3, "active").unwrap();

    ws.write_number(2, 0, 1).unwrap();
    ws.write_string(2, 1, "Ada").unwrap();
    ws.write_number(2, 2, 98.5).unwrap();
    ws.write_boolean(2, 3, true).unwrap();

    ws.write_number(3, 0, 2).unwrap();
    ws.write_string(3, 1, "Grace").unwrap();
    ws.write_number(3, 2, 87.25).unwrap();
    ws.write_boolean(3, 3, false).unwrap();

    wb.save_to_buffer().unwrap()
}

fn storage() -> Arc<dyn BlobSource> {
    Arc::new(
        MemoryBlobSource::new()
            .with_blob("/book/people.xlsx", people_xlsx())
            .unwrap(),
    )
}

fn blob() -> BlobPath {
    BlobPath::from_path("/book/people.xlsx").unwrap()
}

#[test]
fn infers_schema_from_named_sheet() {
    let storage = storage();
    let schema = ExcelFormat::new()
        .with_sheet("People")
        .infer_schema(&blob(), storage.as_ref())
        .unwrap();
    let types: Vec<_> = schema
        .fields()
        .iter()
        .map(|f| (f.name.as_str(), f.data_type))
        .collect();
    assert_eq!(
        types,
        [
            ("id", DataType::Int64),
            ("name", DataType::Utf8),
            ("score", DataType::Float64),
            ("active", DataType::Bool),
        ]
    );
}

#[test]
fn reads_rows_projected_by_header() {
    let storage = storage();
    let schema = Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8),
        Field::new("score", DataType::Float64),
        Field::new("missing", DataType::Utf8),
    ]));
    let source = ExcelFormat::new()
        .with_sheet("People")
        .create_record_source(&blob(), &storage, schema)
        .unwrap();
    assert!(source.is_row_native());

    let rows = source.rows().unwrap().collect::<SourceResult<Vec<_>>>().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("name"), &Value::from("Grace"));
    assert_eq!(rows[1].get("score"), &Value::Float64(87.25));
    assert_eq!(rows[0].get("missing"), &Value::Null);
}

#[test]
fn first_sheet_is_the_default() {
    let storage = storage();
    let schema = ExcelFormat::new()
        .infer_schema(&blob(), storage.as_ref())
        .unwrap();
    assert_eq!(schema.field_names().collect::<Vec<_>>(), ["free text"]);
}

#[test]
fn type_mismatch_reports_excel_row() {
    let storage = storage();
    let schema = Arc::new(Schema::new(vec![Field::new("name", DataType::Int64)]));
    let source = ExcelFormat::new()
        .with_sheet("People")
        .create_record_source(&blob(), &storage, schema)
        .unwrap();
    let first = source.rows().unwrap().next().unwrap();
    match first {
        Err(SourceError::ParseError { row, column, .. }) => {
            assert_eq!(row, 3);
            assert_eq!(column, "People:name");
        }
        other => panic!("expected ParseError, got {other:?}"),
    }
}
