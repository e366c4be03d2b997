use chrono::NaiveDate;
use rust_blob_tables::attributes::{AttributeExtractor, AttributeRule, AttributeType, coerce};
use rust_blob_tables::blob::BlobPath;
use rust_blob_tables::types::{DataType, Value};

fn blob(path: &str) -> BlobPath {
    BlobPath::from_path(path).unwrap()
}

fn partition_extractor() -> AttributeExtractor {
    AttributeExtractor::new(vec![
        AttributeRule::regex(
            "region",
            r"/region=(?<region>[^/]+)/",
            "region",
            AttributeType::String,
            None,
        )
        .unwrap(),
        AttributeRule::regex(
            "day",
            r"/day=(?<day>[0-9-]+)/",
            "day",
            AttributeType::Date,
            Some("%Y-%m-%d"),
        )
        .unwrap(),
        AttributeRule::regex("part", r"part-(?<n>\d+)\.", "n", AttributeType::Int, None).unwrap(),
        AttributeRule::constant("source", "s3-export", AttributeType::String, None).unwrap(),
    ])
    .unwrap()
}

#[test]
fn extracts_typed_values_from_path() {
    let extractor = partition_extractor();
    let values = extractor.extract(&blob("/sales/region=eu/day=2024-03-01/part-007.csv"));

    assert_eq!(values["region"], Value::from("eu"));
    assert_eq!(
        values["day"],
        Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    );
    assert_eq!(values["part"], Value::Int32(7));
    assert_eq!(values["source"], Value::from("s3-export"));
    assert_eq!(
        values.keys().collect::<Vec<_>>(),
        ["region", "day", "part", "source"]
    );
}

#[test]
fn extraction_is_idempotent() {
    let extractor = partition_extractor();
    let path = blob("/sales/region=us/day=2024-12-31/part-1.csv");
    assert_eq!(extractor.extract(&path), extractor.extract(&path));
}

#[test]
fn non_matching_rule_yields_null() {
    let extractor = partition_extractor();
    let values = extractor.extract(&blob("/sales/latest.csv"));
    assert_eq!(values["region"], Value::Null);
    assert_eq!(values["day"], Value::Null);
    assert_eq!(values["part"], Value::Null);
    assert_eq!(values["source"], Value::from("s3-export"));
}

#[test]
fn unparsable_values_yield_null() {
    let extractor = partition_extractor();
    let values = extractor.extract(&blob("/sales/region=eu/day=2024-13-45/part-99999999999.csv"));
    assert_eq!(values["day"], Value::Null);
    assert_eq!(values["part"], Value::Null);
    assert_eq!(values["region"], Value::from("eu"));
}

#[test]
fn coerce_covers_every_type() {
    assert_eq!(coerce("12", AttributeType::Int, None), Value::Int32(12));
    assert_eq!(coerce("12", AttributeType::Long, None), Value::Int64(12));
    assert_eq!(coerce("1.5", AttributeType::Float, None), Value::Float32(1.5));
    assert_eq!(coerce("1.5", AttributeType::Double, None), Value::Float64(1.5));
    assert_eq!(coerce("true", AttributeType::Bool, None), Value::Bool(true));
    assert_eq!(coerce("false", AttributeType::Bool, None), Value::Bool(false));
    assert_eq!(coerce("yes", AttributeType::Bool, None), Value::Null);
    assert_eq!(coerce("abc", AttributeType::Long, None), Value::Null);
    assert!(matches!(
        coerce("2024-01-02 03:04:05", AttributeType::Timestamp, Some("%Y-%m-%d %H:%M:%S")),
        Value::Timestamp(_)
    ));
    assert_eq!(coerce("2024-01-02", AttributeType::Date, None), Value::Null);
}

#[test]
fn constant_that_does_not_coerce_is_null() {
    let rule = AttributeRule::constant("n", "not-a-number", AttributeType::Long, None).unwrap();
    assert_eq!(rule.extract("/anything"), Value::Null);
}

#[test]
fn schema_fields_are_nullable_and_indexed_after_base() {
    let fields = partition_extractor().schema_fields(3);
    let summary: Vec<_> = fields
        .iter()
        .map(|f| (f.name.as_str(), f.index, f.data_type, f.nullable))
        .collect();
    assert_eq!(
        summary,
        [
            ("region", 3, DataType::Utf8, true),
            ("day", 4, DataType::Date, true),
            ("part", 5, DataType::Int32, true),
            ("source", 6, DataType::Utf8, true),
        ]
    );
}

#[test]
fn regex_rule_without_declared_group_is_config_error() {
    let err = AttributeRule::regex("region", r"/region=([^/]+)/", "region", AttributeType::String, None)
        .unwrap_err();
    assert!(err.to_string().contains("does not declare group 'region'"));
}

#[test]
fn date_rule_without_format_is_config_error() {
    let err = AttributeRule::regex("day", r"(?<d>\d+)", "d", AttributeType::Date, None).unwrap_err();
    assert!(err.to_string().contains("requires a format"));

    assert!(AttributeRule::constant("at", "x", AttributeType::Timestamp, Some(" ")).is_err());
}

#[test]
fn invalid_regex_and_blank_name_are_config_errors() {
    assert!(AttributeRule::regex("a", r"(?<g>[", "g", AttributeType::String, None).is_err());
    assert!(AttributeRule::constant("  ", "x", AttributeType::String, None).is_err());
}

#[test]
fn duplicate_attribute_names_are_rejected() {
    let a = AttributeRule::constant("env", "prod", AttributeType::String, None).unwrap();
    let b = AttributeRule::constant("env", "dev", AttributeType::String, None).unwrap();
    assert!(AttributeExtractor::new(vec![a, b]).is_err());
}

#[test]
fn empty_extractor_extracts_nothing() {
    let extractor = AttributeExtractor::new(Vec::new()).unwrap();
    assert!(extractor.is_empty());
    assert!(extractor.extract(&blob("/a/b.csv")).is_empty());
    assert!(extractor.schema_fields(0).is_empty());
}
