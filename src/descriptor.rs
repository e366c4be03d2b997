//! Declarative source configuration.
//!
//! A [`SourceDescriptor`] is plain `serde` data describing a storage, a list of readers and a
//! conflict policy. [`SourceMaterializer`] validates it and turns it into live objects; every
//! configuration problem is reported there, before any blob is listed.
//!
//! ```
//! use rust_blob_tables::descriptor::SourceDescriptor;
//!
//! let json = r#"{
//!     "name": "airlines",
//!     "storage": { "type": "local", "rootPath": "/data/airlines" },
//!     "conflicts": "union",
//!     "readers": [
//!         {
//!             "type": "csv",
//!             "label": "raw",
//!             "format": { "delimiter": ";" },
//!             "table": {
//!                 "mapping": { "type": "regex", "pattern": ".*?(?<table>[^/]+)\\.csv$" },
//!                 "attributes": [
//!                     { "name": "source", "source": "constant", "value": "csv" }
//!                 ]
//!             }
//!         }
//!     ]
//! }"#;
//! let descriptor: SourceDescriptor = serde_json::from_str(json).unwrap();
//! assert_eq!(descriptor.readers[0].label.as_deref(), Some("raw"));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::attributes::{AttributeExtractor, AttributeRule, AttributeType};
use crate::blob::BlobSource;
use crate::conflict::ConflictResolution;
use crate::error::{SourceError, SourceResult};
use crate::formats::{ArrowIpcFormat, CsvFormat, FormatHandler, ParquetFormat};
use crate::mapping::{
    DEFAULT_TABLE_GROUP, DirectoryTableMapper, GlobTableMapper, RegexTableMapper, TableMapper,
};
use crate::resolver::{Reader, ResolveOptions, TableMap, resolve_with_options};
use crate::storage::LocalBlobSource;
use crate::table::MultiFileTable;

/// A complete source: storage, readers and conflict policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub storage: StorageDescriptor,
    /// Default table block for readers that do not declare their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableDescriptor>,
    #[serde(default)]
    pub conflicts: ConflictResolution,
    pub readers: Vec<ReaderDescriptor>,
}

/// Where blobs live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageDescriptor {
    Local {
        #[serde(rename = "rootPath")]
        root_path: PathBuf,
    },
}

/// One reader: a format type, optional label, format options and table block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Format specific options, interpreted by the format factory.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub format: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableDescriptor>,
}

/// Table mapping plus attribute rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<TableMappingDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeDescriptor>,
}

fn default_table_group() -> String {
    DEFAULT_TABLE_GROUP.to_owned()
}

fn default_depth() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TableMappingDescriptor {
    Regex {
        pattern: String,
        #[serde(rename = "tableNameGroup", default = "default_table_group")]
        table_name_group: String,
    },
    Directory {
        #[serde(default = "default_depth")]
        depth: i64,
    },
    Glob {
        pattern: String,
        #[serde(rename = "tableName")]
        table_name: String,
    },
}

/// Attribute value source discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeSourceKind {
    #[serde(alias = "REGEX")]
    Regex,
    #[serde(alias = "CONSTANT")]
    Constant,
}

/// One attribute rule. `pattern` and `group` apply to `regex`, `value` to `constant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub source: AttributeSourceKind,
    #[serde(rename = "type", default)]
    pub attr_type: AttributeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Builds a format handler from a reader's `format` options.
pub type FormatFactory =
    Arc<dyn Fn(&Map<String, JsonValue>) -> SourceResult<Arc<dyn FormatHandler>> + Send + Sync>;

/// Turns descriptors into storages, readers and policies.
///
/// Known reader types by default: `csv`, `tsv`, `arrow`, `parquet` and, with the `excel` feature,
/// `excel`.
#[derive(Clone)]
pub struct SourceMaterializer {
    formats: IndexMap<String, FormatFactory>,
}

impl fmt::Debug for SourceMaterializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMaterializer")
            .field("formats", &self.formats.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for SourceMaterializer {
    fn default() -> Self {
        let materializer = Self::empty()
            .with_format("csv", |opts| csv_format(CsvFormat::new(), opts))
            .with_format("tsv", |opts| csv_format(CsvFormat::tsv(), opts))
            .with_format("arrow", |_| Ok(Arc::new(ArrowIpcFormat)))
            .with_format("parquet", |_| Ok(Arc::new(ParquetFormat)));
        #[cfg(feature = "excel")]
        let materializer = materializer.with_format("excel", excel_format);
        materializer
    }
}

impl SourceMaterializer {
    /// A materializer with the built-in formats.
    pub fn new() -> Self {
        Self::default()
    }

    /// A materializer without any format.
    pub fn empty() -> Self {
        Self {
            formats: IndexMap::new(),
        }
    }

    /// Register (or replace) the factory for reader type `kind`.
    pub fn with_format<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Map<String, JsonValue>) -> SourceResult<Arc<dyn FormatHandler>> + Send + Sync + 'static,
    {
        self.formats.insert(kind.into(), Arc::new(factory));
        self
    }

    /// Registered reader types.
    pub fn format_kinds(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    /// Validate `descriptor` and build its storage and readers.
    pub fn materialize(&self, descriptor: &SourceDescriptor) -> SourceResult<MaterializedSource> {
        if descriptor.name.trim().is_empty() {
            return Err(SourceError::config("source 'name' must not be blank"));
        }
        if descriptor.readers.is_empty() {
            return Err(SourceError::config(format!(
                "source '{}' must have at least one reader",
                descriptor.name
            )));
        }
        warn_duplicate_labels(descriptor);

        let readers = descriptor
            .readers
            .iter()
            .enumerate()
            .map(|(i, r)| self.reader(i, r, descriptor.table.as_ref()))
            .collect::<SourceResult<Vec<_>>>()?;
        let storage: Arc<dyn BlobSource> = match &descriptor.storage {
            StorageDescriptor::Local { root_path } => Arc::new(LocalBlobSource::new(root_path)?),
        };
        debug!(source = %descriptor.name, readers = readers.len(), "materialized source");

        Ok(MaterializedSource {
            name: descriptor.name.clone(),
            storage,
            readers,
            conflicts: descriptor.conflicts.clone(),
        })
    }

    fn reader(
        &self,
        index: usize,
        descriptor: &ReaderDescriptor,
        default_table: Option<&TableDescriptor>,
    ) -> SourceResult<Reader> {
        let context = |message: String| {
            SourceError::config(format!("reader[{index}] (type='{}'): {message}", descriptor.kind))
        };
        let factory = self
            .formats
            .get(&descriptor.kind)
            .ok_or_else(|| context("unknown reader type".to_owned()))?;
        let format = factory(&descriptor.format).map_err(|e| context(e.to_string()))?;

        // a reader-level table block replaces the source-level one
        let table = descriptor.table.as_ref().or(default_table);
        let mapping = match (table, descriptor.table.is_some()) {
            (Some(TableDescriptor { mapping: Some(mapping), .. }), _) => mapping,
            (_, true) => return Err(context("table block has no mapping".to_owned())),
            (None, false) => {
                return Err(context(
                    "no table mapping and no source-level default is defined".to_owned(),
                ));
            }
            (Some(_), false) => {
                return Err(context("source-level table block has no mapping".to_owned()));
            }
        };
        let mapper = build_mapper(mapping).map_err(|e| context(e.to_string()))?;

        let mut reader = Reader::new(descriptor.kind.clone(), format, mapper);
        if let Some(label) = &descriptor.label {
            reader = reader.with_label(label.clone());
        }
        if let Some(table) = table {
            let rules = table
                .attributes
                .iter()
                .map(build_attribute)
                .collect::<SourceResult<Vec<_>>>()
                .map_err(|e| context(e.to_string()))?;
            let extractor = AttributeExtractor::new(rules).map_err(|e| context(e.to_string()))?;
            reader = reader.with_attributes(extractor);
        }
        Ok(reader)
    }
}

fn warn_duplicate_labels(descriptor: &SourceDescriptor) {
    let mut seen = HashSet::new();
    for label in descriptor.readers.iter().filter_map(|r| r.label.as_deref()) {
        if !seen.insert(label) {
            warn!(source = %descriptor.name, label, "duplicate reader label, table names may collide");
        }
    }
}

/// Build a mapping strategy from its descriptor.
pub fn build_mapper(descriptor: &TableMappingDescriptor) -> SourceResult<TableMapper> {
    match descriptor {
        TableMappingDescriptor::Regex {
            pattern,
            table_name_group,
        } => {
            if pattern.trim().is_empty() {
                return Err(SourceError::config("regex table mapping 'pattern' must not be blank"));
            }
            let mapper = RegexTableMapper::with_group(pattern, table_name_group.clone())?;
            if !mapper.has_group() {
                return Err(SourceError::config(format!(
                    "regex pattern does not contain named group '{table_name_group}'"
                )));
            }
            Ok(TableMapper::Regex(mapper))
        }
        TableMappingDescriptor::Directory { depth } => {
            let depth = usize::try_from(*depth).map_err(|_| {
                SourceError::config(format!(
                    "directory table mapping depth must be >= 1, got {depth}"
                ))
            })?;
            Ok(TableMapper::Directory(DirectoryTableMapper::new(depth)?))
        }
        TableMappingDescriptor::Glob {
            pattern,
            table_name,
        } => Ok(TableMapper::Glob(GlobTableMapper::new(pattern, table_name.clone())?)),
    }
}

/// Build an attribute rule from its descriptor.
pub fn build_attribute(descriptor: &AttributeDescriptor) -> SourceResult<AttributeRule> {
    let name = &descriptor.name;
    let format = descriptor.format.as_deref();
    match descriptor.source {
        AttributeSourceKind::Regex => {
            let pattern = required(name, "pattern", descriptor.pattern.as_deref())?;
            let group = required(name, "group", descriptor.group.as_deref())?;
            AttributeRule::regex(name.clone(), pattern, group, descriptor.attr_type, format)
        }
        AttributeSourceKind::Constant => {
            let value = descriptor.value.as_deref().ok_or_else(|| {
                SourceError::config(format!("attribute '{name}': constant source requires 'value'"))
            })?;
            AttributeRule::constant(name.clone(), value, descriptor.attr_type, format)
        }
    }
}

fn required<'a>(attribute: &str, key: &str, value: Option<&'a str>) -> SourceResult<&'a str> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        SourceError::config(format!("attribute '{attribute}': regex source requires '{key}'"))
    })
}

fn options<T: DeserializeOwned>(options: &Map<String, JsonValue>) -> SourceResult<T> {
    serde_json::from_value(JsonValue::Object(options.clone()))
        .map_err(|e| SourceError::config(format!("invalid format options: {e}")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsvOptions {
    delimiter: Option<String>,
    has_header: Option<bool>,
    sample_rows: Option<usize>,
}

fn csv_format(base: CsvFormat, opts: &Map<String, JsonValue>) -> SourceResult<Arc<dyn FormatHandler>> {
    let opts: CsvOptions = options(opts)?;
    let mut format = base;
    if let Some(delimiter) = opts.delimiter {
        let &[byte] = delimiter.as_bytes() else {
            return Err(SourceError::config(format!(
                "csv delimiter must be a single ASCII character, got '{delimiter}'"
            )));
        };
        format = format.with_delimiter(byte);
    }
    if let Some(has_header) = opts.has_header {
        format = format.with_headers(has_header);
    }
    if let Some(sample_rows) = opts.sample_rows {
        format = format.with_sample_rows(sample_rows);
    }
    Ok(Arc::new(format))
}

#[cfg(feature = "excel")]
fn excel_format(opts: &Map<String, JsonValue>) -> SourceResult<Arc<dyn FormatHandler>> {
    #[derive(Deserialize)]
    struct ExcelOptions {
        sheet: Option<String>,
    }
    let opts: ExcelOptions = options(opts)?;
    let format = crate::formats::ExcelFormat::new();
    Ok(Arc::new(match opts.sheet {
        Some(sheet) => format.with_sheet(sheet),
        None => format,
    }))
}

/// A validated source, ready for resolution.
pub struct MaterializedSource {
    pub name: String,
    pub storage: Arc<dyn BlobSource>,
    pub readers: Vec<Reader>,
    pub conflicts: ConflictResolution,
}

impl fmt::Debug for MaterializedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializedSource")
            .field("name", &self.name)
            .field("readers", &self.readers)
            .field("conflicts", &self.conflicts)
            .finish()
    }
}

impl MaterializedSource {
    /// Resolve tables with default options. The returned source owns the storage.
    pub fn resolve(self) -> SourceResult<ResolvedSource> {
        self.resolve_with_options(&ResolveOptions::default())
    }

    pub fn resolve_with_options(self, options: &ResolveOptions) -> SourceResult<ResolvedSource> {
        let tables = resolve_with_options(&self.storage, &self.readers, &self.conflicts, options);
        match tables {
            Ok(tables) => Ok(ResolvedSource {
                name: self.name,
                storage: self.storage,
                tables,
            }),
            Err(e) => {
                close_storage(&self.name, self.storage.as_ref());
                Err(e)
            }
        }
    }
}

/// Resolved tables together with the storage backing them.
///
/// Dropping it closes the storage; close failures are logged, not propagated.
pub struct ResolvedSource {
    name: String,
    storage: Arc<dyn BlobSource>,
    tables: TableMap,
}

impl ResolvedSource {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &Arc<dyn BlobSource> {
        &self.storage
    }

    pub fn tables(&self) -> &TableMap {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&MultiFileTable> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSource")
            .field("name", &self.name)
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for ResolvedSource {
    fn drop(&mut self) {
        self.tables.clear();
        close_storage(&self.name, self.storage.as_ref());
    }
}

fn close_storage(name: &str, storage: &dyn BlobSource) {
    if let Err(error) = storage.close() {
        warn!(source = %name, %error, "failed to close storage");
    }
}
