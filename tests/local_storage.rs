use std::fs;
use std::io::Read;

use rust_blob_tables::SourceError;
use rust_blob_tables::blob::{BlobPath, BlobSource};
use rust_blob_tables::storage::{LocalBlobSource, MemoryBlobSource};

#[test]
fn lists_regular_files_in_name_order() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("b/nested")).unwrap();
    fs::create_dir_all(root.path().join("empty")).unwrap();
    fs::write(root.path().join("b/nested/z.csv"), "z").unwrap();
    fs::write(root.path().join("b/a.csv"), "a").unwrap();
    fs::write(root.path().join("a.csv"), "top").unwrap();

    let storage = LocalBlobSource::new(root.path()).unwrap();
    let names: Vec<String> = storage
        .list_blobs()
        .unwrap()
        .map(|b| {
            let blob = b.unwrap();
            blob.path()
                .strip_prefix(storage.root().to_str().unwrap())
                .unwrap()
                .to_owned()
        })
        .collect();
    assert_eq!(names, ["/a.csv", "/b/a.csv", "/b/nested/z.csv"]);
}

#[test]
fn opens_listed_blobs() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("my file.csv"), "id\n1\n").unwrap();

    let storage = LocalBlobSource::new(root.path()).unwrap();
    let blob = storage.list_blobs().unwrap().next().unwrap().unwrap();
    assert_eq!(blob.file_name().as_deref(), Some("my file.csv"));
    assert!(blob.uri().as_str().ends_with("my%20file.csv"));

    let mut content = String::new();
    storage.open_read(&blob).unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "id\n1\n");
    assert!(storage.open_seekable(&blob).is_ok());
}

#[test]
fn rejects_missing_or_non_directory_root() {
    let root = tempfile::tempdir().unwrap();
    let file = root.path().join("f.txt");
    fs::write(&file, "x").unwrap();

    assert!(matches!(
        LocalBlobSource::new(root.path().join("nope")),
        Err(SourceError::InvalidConfig { .. })
    ));
    assert!(matches!(LocalBlobSource::new(&file), Err(SourceError::InvalidConfig { .. })));
}

#[test]
fn refuses_blobs_outside_root() {
    let root = tempfile::tempdir().unwrap();
    let storage = LocalBlobSource::new(root.path()).unwrap();
    let outside = BlobPath::from_path("/etc/hostname").unwrap();
    assert!(storage.open_read(&outside).is_err());
}

#[test]
fn memory_source_lists_in_uri_order_and_reports_missing_blobs() {
    let storage = MemoryBlobSource::new()
        .with_blob("/b.csv", "b")
        .unwrap()
        .with_blob("/a.csv", "a")
        .unwrap();
    assert_eq!(storage.len(), 2);
    let paths: Vec<String> = storage
        .list_blobs()
        .unwrap()
        .map(|b| b.unwrap().path().into_owned())
        .collect();
    assert_eq!(paths, ["/a.csv", "/b.csv"]);

    let missing = BlobPath::from_path("/c.csv").unwrap();
    assert!(matches!(storage.open_read(&missing), Err(SourceError::Io(_))));
    assert!(MemoryBlobSource::new().with_blob("relative.csv", "x").is_err());
}

#[test]
fn blob_paths_keep_uri_delimiters_in_file_names() {
    let raw = "/data/q?1#part %41.csv";
    let blob = BlobPath::from_path(raw).unwrap();
    assert_eq!(blob.path(), raw);
    assert_eq!(blob.file_name().as_deref(), Some("q?1#part %41.csv"));
    assert_eq!(blob.uri().query(), None);
    assert_eq!(blob.uri().fragment(), None);

    let storage = MemoryBlobSource::new().with_blob(raw, "x").unwrap();
    let listed = storage.list_blobs().unwrap().next().unwrap().unwrap();
    assert_eq!(listed, blob);
    let mut content = String::new();
    storage.open_read(&listed).unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "x");
}
