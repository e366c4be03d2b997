//! `rust-blob-tables` turns files scattered across a blob store into schema-fixed logical tables.
//!
//! Each configured [`resolver::Reader`] pairs a file format with a strategy that maps a blob path
//! to a table name (and optionally derives extra "attribute" columns from the path). Resolution
//! reconciles the tables produced by all readers into one `{table name -> MultiFileTable}` map,
//! rejecting or merging collisions according to a [`conflict::ConflictResolution`] policy.
//!
//! ## Access modes
//!
//! Formats read data in their native mode: CSV/TSV and Excel yield rows, Arrow IPC and Parquet
//! yield columnar blocks of Arrow arrays. A [`table::MultiFileTable`] exposes both
//! [`table::MultiFileTable::records`] and [`table::MultiFileTable::vector_blocks`]; the
//! [`bridge`] module converts only when the requested mode differs from the native one.
//!
//! ## Quick example
//!
//! ```
//! use std::sync::Arc;
//!
//! use rust_blob_tables::blob::BlobSource;
//! use rust_blob_tables::conflict::ConflictResolution;
//! use rust_blob_tables::formats::CsvFormat;
//! use rust_blob_tables::mapping::TableMapper;
//! use rust_blob_tables::resolver::{Reader, resolve};
//! use rust_blob_tables::storage::MemoryBlobSource;
//!
//! # fn main() -> Result<(), rust_blob_tables::SourceError> {
//! let storage: Arc<dyn BlobSource> = Arc::new(
//!     MemoryBlobSource::new()
//!         .with_blob("/data/cities.csv", "id,name\n1,Berlin\n2,Paris\n")?
//!         .with_blob("/data/flights.csv", "id,origin,destination\n1,1,2\n")?,
//! );
//! let readers = vec![Reader::new(
//!     "csv",
//!     Arc::new(CsvFormat::new()),
//!     TableMapper::regex(r".*?(?<table>[^/]+)\.csv$")?,
//! )];
//!
//! let tables = resolve(&storage, &readers, &ConflictResolution::default())?;
//! assert_eq!(tables.keys().collect::<Vec<_>>(), ["cities", "flights"]);
//! assert_eq!(tables["cities"].to_records()?.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`mapping`]: blob path to table name strategies (regex, directory depth, glob)
//! - [`attributes`]: path-derived and constant attribute columns
//! - [`source`], [`bridge`], [`enrich`]: record sources and row/column bridging
//! - [`table`]: multi-file tables
//! - [`conflict`], [`resolver`]: collision policy and resolution
//! - [`formats`]: CSV/TSV, Arrow IPC, Parquet and (feature `excel`) workbook adapters
//! - [`storage`]: local filesystem and in-memory blob stores
//! - [`descriptor`]: declarative, `serde`-based configuration
//! - [`observability`]: resolution outcome observers
//! - [`types`], [`vector`], [`blob`], [`error`]: data model and shared types

pub mod attributes;
pub mod blob;
pub mod bridge;
pub mod conflict;
pub mod descriptor;
pub mod enrich;
pub mod error;
pub mod formats;
pub mod mapping;
pub mod observability;
pub mod resolver;
pub mod source;
pub mod storage;
pub mod table;
pub mod types;
pub mod vector;

pub use error::{SourceError, SourceResult};
pub use resolver::{Reader, TableMap, resolve, resolve_with_options};
pub use table::MultiFileTable;
