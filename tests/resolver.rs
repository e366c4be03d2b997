use std::io::Read;
use std::sync::{Arc, Mutex};

use rust_blob_tables::attributes::{AttributeExtractor, AttributeRule, AttributeType};
use rust_blob_tables::blob::{BlobIter, BlobPath, BlobSource, ReadSeek};
use rust_blob_tables::conflict::{ConflictResolution, ConflictStrategy};
use rust_blob_tables::error::SourceResult;
use rust_blob_tables::formats::{CsvFormat, ParquetFormat};
use rust_blob_tables::mapping::TableMapper;
use rust_blob_tables::observability::{
    ResolutionContext, ResolutionObserver, ResolutionSeverity, ResolutionStats,
};
use rust_blob_tables::resolver::{ResolveOptions, plan_tables};
use rust_blob_tables::storage::MemoryBlobSource;
use rust_blob_tables::types::{DataType, Value};
use rust_blob_tables::{Reader, SourceError, resolve, resolve_with_options};

fn csv_reader() -> Reader {
    Reader::new(
        "csv",
        Arc::new(CsvFormat::new()),
        TableMapper::regex(r".*?(?<table>[^/]+)\.csv$").unwrap(),
    )
}

fn tsv_reader() -> Reader {
    Reader::new(
        "tsv",
        Arc::new(CsvFormat::tsv()),
        TableMapper::regex(r".*?(?<table>[^/]+)\.tsv$").unwrap(),
    )
}

fn airline_storage() -> Arc<dyn BlobSource> {
    Arc::new(
        MemoryBlobSource::new()
            .with_blob("/data/cities.csv", "id,name\n1,Berlin\n2,Paris\n")
            .unwrap()
            .with_blob("/data/flights.csv", "id,origin,destination\n10,1,2\n")
            .unwrap(),
    )
}

// cities.csv and cities.tsv both map to the raw table `cities`
fn colliding_storage() -> Arc<dyn BlobSource> {
    Arc::new(
        MemoryBlobSource::new()
            .with_blob("/in/cities.csv", "id,name\n1,Berlin\n")
            .unwrap()
            .with_blob("/in/cities.tsv", "id\tname\n2\tParis\n3\tRome\n")
            .unwrap(),
    )
}

fn table_names(tables: &rust_blob_tables::TableMap) -> Vec<&str> {
    tables.keys().map(String::as_str).collect()
}

#[test]
fn resolves_one_table_per_file_name() {
    let tables = resolve(&airline_storage(), &[csv_reader()], &ConflictResolution::default()).unwrap();
    assert_eq!(table_names(&tables), ["cities", "flights"]);
    assert_eq!(tables["cities"].source_count(), 1);
    assert_eq!(tables["flights"].source_count(), 1);

    let cities = tables["cities"].to_records().unwrap();
    assert_eq!(cities.len(), 2);
    assert_eq!(cities[1].get("name"), &Value::from("Paris"));
    assert_eq!(
        tables["flights"].schema().field("origin").map(|f| f.data_type),
        Some(DataType::Int64)
    );
}

#[test]
fn lone_labeled_reader_suffixes_table_name() {
    let tables = resolve(
        &airline_storage(),
        &[csv_reader().with_label("v1")],
        &ConflictResolution::default(),
    )
    .unwrap();
    assert_eq!(table_names(&tables), ["cities_v1", "flights_v1"]);
}

#[test]
fn blank_label_is_ignored() {
    let tables = resolve(
        &airline_storage(),
        &[csv_reader().with_label("  ")],
        &ConflictResolution::default(),
    )
    .unwrap();
    assert_eq!(table_names(&tables), ["cities", "flights"]);
}

#[test]
fn default_reject_fails_on_unlabeled_collision() {
    let err = resolve(
        &colliding_storage(),
        &[csv_reader(), tsv_reader()],
        &ConflictResolution::new(ConflictStrategy::Reject),
    )
    .unwrap_err();
    match &err {
        SourceError::TableConflict {
            table,
            readers,
            scope,
        } => {
            assert_eq!(table, "cities");
            assert_eq!(readers, &["reader[0] (csv)", "reader[1] (tsv)"]);
            assert_eq!(*scope, "default");
        }
        other => panic!("expected TableConflict, got {other:?}"),
    }
    assert!(err.to_string().contains("default conflict strategy is 'reject'"));
}

#[test]
fn default_union_merges_unlabeled_collision() {
    let tables = resolve(
        &colliding_storage(),
        &[csv_reader(), tsv_reader()],
        &ConflictResolution::new(ConflictStrategy::Union),
    )
    .unwrap();
    assert_eq!(table_names(&tables), ["cities"]);
    let cities = &tables["cities"];
    assert_eq!(cities.source_count(), 2);
    let names: Vec<Value> = cities
        .records()
        .map(|r| r.unwrap().get("name").clone())
        .collect();
    assert_eq!(names, ["Berlin", "Paris", "Rome"].map(Value::from));
}

#[test]
fn unreadable_blob_of_a_later_reader_fails_only_on_iteration() {
    let storage: Arc<dyn BlobSource> = Arc::new(
        MemoryBlobSource::new()
            .with_blob("/a/cities.csv", "id,name\n1,Berlin\n")
            .unwrap()
            .with_blob("/b/cities.parquet", "not a parquet file")
            .unwrap(),
    );
    let parquet_reader = Reader::new(
        "parquet",
        Arc::new(ParquetFormat),
        TableMapper::regex(r".*?(?<table>[^/]+)\.parquet$").unwrap(),
    );
    let tables = resolve(
        &storage,
        &[csv_reader(), parquet_reader],
        &ConflictResolution::new(ConflictStrategy::Union),
    )
    .unwrap();
    let cities = &tables["cities"];
    assert_eq!(cities.source_count(), 2);

    let rows: Vec<_> = cities.records().collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].as_ref().unwrap().get("name"), &Value::from("Berlin"));
    assert!(matches!(rows[1], Err(SourceError::Parquet(_))));
}

#[test]
fn distinct_labels_split_collision_even_under_reject() {
    let tables = resolve(
        &colliding_storage(),
        &[csv_reader().with_label("csv"), tsv_reader().with_label("tsv")],
        &ConflictResolution::new(ConflictStrategy::Reject),
    )
    .unwrap();
    assert_eq!(table_names(&tables), ["cities_csv", "cities_tsv"]);
    assert_eq!(tables["cities_tsv"].to_records().unwrap().len(), 2);
}

#[test]
fn duplicate_labels_fall_back_to_default() {
    let err = resolve(
        &colliding_storage(),
        &[csv_reader().with_label("x"), tsv_reader().with_label("x")],
        &ConflictResolution::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SourceError::TableConflict { scope: "default", .. }));

    let err = resolve(
        &colliding_storage(),
        &[csv_reader().with_label("x"), tsv_reader()],
        &ConflictResolution::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SourceError::TableConflict { .. }));
}

#[test]
fn explicit_union_merges_regardless_of_labels() {
    let conflicts = ConflictResolution::new(ConflictStrategy::Reject)
        .with_rule("cities", ConflictStrategy::Union);
    let tables = resolve(
        &colliding_storage(),
        &[csv_reader().with_label("a"), tsv_reader().with_label("b")],
        &conflicts,
    )
    .unwrap();
    assert_eq!(table_names(&tables), ["cities"]);
    assert_eq!(tables["cities"].to_records().unwrap().len(), 3);
}

#[test]
fn explicit_reject_fails_even_with_distinct_labels() {
    let conflicts = ConflictResolution::new(ConflictStrategy::Union)
        .with_rule("cities", ConflictStrategy::Reject);
    let err = resolve(
        &colliding_storage(),
        &[csv_reader().with_label("a"), tsv_reader().with_label("b")],
        &conflicts,
    )
    .unwrap_err();
    assert!(matches!(err, SourceError::TableConflict { scope: "explicit", .. }));
    assert!(err.to_string().contains("explicit conflict strategy"));
}

#[test]
fn explicit_reject_accepts_single_reader_under_raw_name() {
    let conflicts = ConflictResolution::default().with_rule("cities", ConflictStrategy::Reject);
    let tables = resolve(&airline_storage(), &[csv_reader().with_label("v2")], &conflicts).unwrap();
    assert_eq!(table_names(&tables), ["cities", "flights_v2"]);
}

#[test]
fn empty_storage_resolves_to_no_tables() {
    let storage: Arc<dyn BlobSource> = Arc::new(MemoryBlobSource::new());
    let tables = resolve(&storage, &[csv_reader()], &ConflictResolution::default()).unwrap();
    assert!(tables.is_empty());
}

#[test]
fn unmapped_blobs_are_skipped() {
    let storage: Arc<dyn BlobSource> = Arc::new(
        MemoryBlobSource::new()
            .with_blob("/data/cities.csv", "id\n1\n")
            .unwrap()
            .with_blob("/data/readme.txt", "not a table")
            .unwrap(),
    );
    let tables = resolve(&storage, &[csv_reader()], &ConflictResolution::default()).unwrap();
    assert_eq!(table_names(&tables), ["cities"]);
}

#[test]
fn plan_is_a_pure_function_of_blobs_and_readers() {
    let blobs: Vec<BlobPath> = ["/in/a.csv", "/in/b.csv", "/in/a.tsv"]
        .into_iter()
        .map(|p| BlobPath::from_path(p).unwrap())
        .collect();
    let readers = [csv_reader(), tsv_reader()];
    let conflicts = ConflictResolution::new(ConflictStrategy::Union);

    let plan = plan_tables(&blobs, &readers, &conflicts).unwrap();
    assert_eq!(plan, plan_tables(&blobs, &readers, &conflicts).unwrap());
    assert_eq!(plan.keys().collect::<Vec<_>>(), ["a", "b"]);
    let readers_of_a: Vec<usize> = plan["a"].iter().map(|c| c.reader_index).collect();
    assert_eq!(readers_of_a, [0, 1]);
}

#[test]
fn labeled_name_colliding_with_other_raw_name_follows_default() {
    // reader 1 produces `cities` + label `v1` = `cities_v1`, which reader 0 produces raw
    let storage: Arc<dyn BlobSource> = Arc::new(
        MemoryBlobSource::new()
            .with_blob("/in/cities_v1.csv", "id\n1\n")
            .unwrap()
            .with_blob("/in/cities.tsv", "id\n2\n")
            .unwrap(),
    );
    let readers = [csv_reader(), tsv_reader().with_label("v1")];

    let err = resolve(&storage, &readers, &ConflictResolution::default()).unwrap_err();
    assert!(matches!(err, SourceError::TableConflict { .. }));

    let tables = resolve(&storage, &readers, &ConflictResolution::new(ConflictStrategy::Union)).unwrap();
    assert_eq!(table_names(&tables), ["cities_v1"]);
    assert_eq!(tables["cities_v1"].source_count(), 2);
}

#[test]
fn attributes_extend_schema_and_rows() {
    let storage: Arc<dyn BlobSource> = Arc::new(
        MemoryBlobSource::new()
            .with_blob("/sales/region=eu/orders.csv", "id,amount\n1,9.5\n2,3.0\n")
            .unwrap()
            .with_blob("/sales/region=us/orders.csv", "id,amount\n3,1.25\n")
            .unwrap(),
    );
    let attributes = AttributeExtractor::new(vec![
        AttributeRule::regex(
            "region",
            r"/region=(?<region>[^/]+)/",
            "region",
            AttributeType::String,
            None,
        )
        .unwrap(),
        AttributeRule::constant("batch", "7", AttributeType::Int, None).unwrap(),
    ])
    .unwrap();
    let reader = csv_reader().with_attributes(attributes);

    let tables = resolve(&storage, &[reader], &ConflictResolution::default()).unwrap();
    let orders = &tables["orders"];
    assert_eq!(
        orders.schema().field_names().collect::<Vec<_>>(),
        ["id", "amount", "region", "batch"]
    );
    assert_eq!(orders.schema().field("region").map(|f| f.index), Some(2));

    let rows = orders.to_records().unwrap();
    let regions: Vec<&Value> = rows.iter().map(|r| r.get("region")).collect();
    assert_eq!(regions, [&Value::from("eu"), &Value::from("eu"), &Value::from("us")]);
    assert!(rows.iter().all(|r| r.get("batch") == &Value::Int32(7)));

    let block = orders.vector_blocks(8).next().unwrap().unwrap();
    assert_eq!(block.vectors().len(), 4);
    assert_eq!(block.record_at(1).get("region"), &Value::from("eu"));
}

#[test]
fn attribute_colliding_with_column_fails_resolution() {
    let attributes = AttributeExtractor::new(vec![
        AttributeRule::constant("name", "x", AttributeType::String, None).unwrap(),
    ])
    .unwrap();
    let err = resolve(
        &airline_storage(),
        &[csv_reader().with_attributes(attributes)],
        &ConflictResolution::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SourceError::SchemaMismatch { .. }));
    assert!(err.to_string().contains("collide with its columns"));
}

#[derive(Default)]
struct RecordingObserver {
    successes: Mutex<Vec<ResolutionStats>>,
    failures: Mutex<Vec<ResolutionSeverity>>,
    alerts: Mutex<Vec<ResolutionSeverity>>,
}

impl ResolutionObserver for RecordingObserver {
    fn on_success(&self, _ctx: &ResolutionContext, stats: ResolutionStats) {
        self.successes.lock().unwrap().push(stats);
    }

    fn on_failure(&self, _ctx: &ResolutionContext, severity: ResolutionSeverity, _error: &SourceError) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &ResolutionContext, severity: ResolutionSeverity, _error: &SourceError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

struct UnreachableStorage;

impl BlobSource for UnreachableStorage {
    fn list_blobs(&self) -> SourceResult<BlobIter<'_>> {
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "storage offline").into())
    }

    fn open_read(&self, _blob: &BlobPath) -> SourceResult<Box<dyn Read + Send>> {
        unreachable!("listing fails first")
    }

    fn open_seekable(&self, _blob: &BlobPath) -> SourceResult<Box<dyn ReadSeek>> {
        unreachable!("listing fails first")
    }
}

fn options_with(observer: &Arc<RecordingObserver>) -> ResolveOptions {
    ResolveOptions {
        observer: Some(Arc::clone(observer) as Arc<dyn ResolutionObserver>),
        ..ResolveOptions::default()
    }
}

#[test]
fn observer_receives_success_stats() {
    let storage: Arc<dyn BlobSource> = Arc::new(
        MemoryBlobSource::new()
            .with_blob("/data/cities.csv", "id\n1\n")
            .unwrap()
            .with_blob("/data/notes.txt", "x")
            .unwrap(),
    );
    let observer = Arc::new(RecordingObserver::default());
    resolve_with_options(
        &storage,
        &[csv_reader()],
        &ConflictResolution::default(),
        &options_with(&observer),
    )
    .unwrap();

    assert_eq!(
        *observer.successes.lock().unwrap(),
        [ResolutionStats {
            blobs_listed: 2,
            blobs_mapped: 1,
            tables: 1,
        }]
    );
    assert!(observer.failures.lock().unwrap().is_empty());
}

#[test]
fn observer_alerts_on_storage_failure() {
    let storage: Arc<dyn BlobSource> = Arc::new(UnreachableStorage);
    let observer = Arc::new(RecordingObserver::default());
    let err = resolve_with_options(
        &storage,
        &[csv_reader()],
        &ConflictResolution::default(),
        &options_with(&observer),
    )
    .unwrap_err();

    assert!(matches!(err, SourceError::Io(_)));
    assert_eq!(*observer.failures.lock().unwrap(), [ResolutionSeverity::Critical]);
    assert_eq!(*observer.alerts.lock().unwrap(), [ResolutionSeverity::Critical]);
}

#[test]
fn conflict_failure_is_below_default_alert_threshold() {
    let observer = Arc::new(RecordingObserver::default());
    resolve_with_options(
        &colliding_storage(),
        &[csv_reader(), tsv_reader()],
        &ConflictResolution::default(),
        &options_with(&observer),
    )
    .unwrap_err();

    assert_eq!(*observer.failures.lock().unwrap(), [ResolutionSeverity::Error]);
    assert!(observer.alerts.lock().unwrap().is_empty());
}
