//! Turning a blob listing and a set of readers into logical tables.
//!
//! Resolution runs in two steps:
//!
//! 1. [`plan_tables`] is a pure function of `(blobs, readers, policy)`. It maps every blob through
//!    every reader, groups the results by raw table name and reconciles collisions.
//! 2. [`resolve`] infers one schema per planned table and wraps every contributing blob in a lazy
//!    source. No blob is read except the ones needed for schema inference.
//!
//! Collision rules for a raw table name produced by several readers:
//!
//! - an explicit per-table `union` merges all contributions, an explicit `reject` fails
//! - without an explicit rule, readers that all declare distinct labels get their own tables,
//!   named `<raw>_<label>`
//! - otherwise the default strategy applies
//!
//! A lone contribution is named `<raw>_<label>` when its reader has a label, `<raw>` otherwise.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::attributes::AttributeExtractor;
use crate::blob::{BlobPath, BlobSource};
use crate::bridge::DEFAULT_BATCH_SIZE;
use crate::conflict::{ConflictResolution, ConflictStrategy};
use crate::enrich::AttributeEnrichingSource;
use crate::error::{SourceError, SourceResult};
use crate::formats::FormatHandler;
use crate::mapping::TableMapper;
use crate::observability::{
    ResolutionContext, ResolutionObserver, ResolutionSeverity, ResolutionStats,
};
use crate::source::RecordSource;
use crate::table::MultiFileTable;

/// Resolved tables, in planning order.
pub type TableMap = IndexMap<String, MultiFileTable>;

/// One ingestion rule: a format, a mapping strategy and optional attributes.
#[derive(Clone)]
pub struct Reader {
    kind: String,
    label: Option<String>,
    format: Arc<dyn FormatHandler>,
    mapper: TableMapper,
    attributes: Option<AttributeExtractor>,
}

impl Reader {
    /// A reader of type `kind` (e.g. `csv`), used in diagnostics.
    pub fn new(kind: impl Into<String>, format: Arc<dyn FormatHandler>, mapper: TableMapper) -> Self {
        Self {
            kind: kind.into(),
            label: None,
            format,
            mapper,
            attributes: None,
        }
    }

    /// Set the label. Blank labels are ignored.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.label = (!label.trim().is_empty()).then_some(label);
        self
    }

    /// Attach attribute rules. An empty extractor is ignored.
    pub fn with_attributes(mut self, attributes: AttributeExtractor) -> Self {
        self.attributes = (!attributes.is_empty()).then_some(attributes);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn format(&self) -> &Arc<dyn FormatHandler> {
        &self.format
    }

    pub fn mapper(&self) -> &TableMapper {
        &self.mapper
    }

    pub fn attributes(&self) -> Option<&AttributeExtractor> {
        self.attributes.as_ref()
    }

    fn describe(&self, index: usize) -> String {
        format!("reader[{index}] ({})", self.kind)
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("format", &self.format.name())
            .field("mapper", &self.mapper)
            .field("attributes", &self.attributes.as_ref().map(|a| a.rules().len()))
            .finish()
    }
}

/// Blobs one reader contributes to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    /// Index of the reader in the reader list.
    pub reader_index: usize,
    /// Contributed blobs, in listing order.
    pub blobs: Vec<BlobPath>,
}

/// The reconciled assignment `{final table name -> contributions}`.
pub type TablePlan = IndexMap<String, Vec<Contribution>>;

/// Options for [`resolve_with_options`].
#[derive(Clone)]
pub struct ResolveOptions {
    /// Block size used when enrichment bridges a column-native blob to rows.
    pub batch_size: usize,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn ResolutionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: ResolutionSeverity,
}

impl fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("batch_size", &self.batch_size)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            observer: None,
            alert_at_or_above: ResolutionSeverity::Critical,
        }
    }
}

struct Entry {
    reader_index: usize,
    blobs: Vec<BlobPath>,
}

/// Assign blobs to final table names.
///
/// Fails with [`SourceError::TableConflict`] when a collision falls under a `reject` rule.
pub fn plan_tables(
    blobs: &[BlobPath],
    readers: &[Reader],
    conflicts: &ConflictResolution,
) -> SourceResult<TablePlan> {
    // raw table name -> one entry per reader, in reader order
    let mut by_raw: IndexMap<String, Vec<Entry>> = IndexMap::new();
    for (reader_index, reader) in readers.iter().enumerate() {
        let mut groups: IndexMap<String, Vec<BlobPath>> = IndexMap::new();
        for blob in blobs {
            if let Some(mapping) = reader.mapper.map_to_table(blob) {
                groups.entry(mapping.table_name).or_default().push(blob.clone());
            }
        }
        debug!(reader = reader_index, kind = %reader.kind, tables = groups.len(), "grouped blobs");
        for (raw, blobs) in groups {
            by_raw.entry(raw).or_default().push(Entry {
                reader_index,
                blobs,
            });
        }
    }

    let mut plan = Plan::default();
    for (raw, entries) in by_raw {
        match conflicts.explicit_rule(&raw) {
            Some(ConflictStrategy::Union) => plan.merge(&raw, &raw, entries, readers, conflicts)?,
            Some(ConflictStrategy::Reject) if entries.len() > 1 => {
                return Err(conflict_error(&raw, &entries, readers, "explicit"));
            }
            Some(ConflictStrategy::Reject) => plan.merge(&raw, &raw, entries, readers, conflicts)?,
            None if entries.len() == 1 => {
                let name = final_name(&raw, readers[entries[0].reader_index].label());
                plan.merge(&name, &raw, entries, readers, conflicts)?;
            }
            None if distinct_labels(&entries, readers) => {
                for entry in entries {
                    let name = final_name(&raw, readers[entry.reader_index].label());
                    plan.merge(&name, &raw, vec![entry], readers, conflicts)?;
                }
            }
            None => match conflicts.default_strategy() {
                ConflictStrategy::Union => plan.merge(&raw, &raw, entries, readers, conflicts)?,
                ConflictStrategy::Reject => {
                    return Err(conflict_error(&raw, &entries, readers, "default"));
                }
            },
        }
    }
    Ok(plan.tables)
}

#[derive(Default)]
struct Plan {
    tables: TablePlan,
    // final name -> raw name it was first accepted under
    origins: IndexMap<String, String>,
}

impl Plan {
    fn merge(
        &mut self,
        name: &str,
        raw: &str,
        entries: Vec<Entry>,
        readers: &[Reader],
        conflicts: &ConflictResolution,
    ) -> SourceResult<()> {
        let foreign = self.origins.get(name).is_some_and(|origin| origin != raw);
        if foreign && conflicts.default_strategy() == ConflictStrategy::Reject {
            let mut offending: Vec<usize> = self.tables[name].iter().map(|c| c.reader_index).collect();
            offending.extend(entries.iter().map(|e| e.reader_index));
            return Err(SourceError::TableConflict {
                table: name.to_owned(),
                readers: offending.iter().map(|&i| readers[i].describe(i)).collect(),
                scope: "default",
            });
        }
        self.origins
            .entry(name.to_owned())
            .or_insert_with(|| raw.to_owned());
        let contributions = self.tables.entry(name.to_owned()).or_default();
        for entry in entries {
            match contributions
                .iter_mut()
                .find(|c| c.reader_index == entry.reader_index)
            {
                Some(existing) => existing.blobs.extend(entry.blobs),
                None => contributions.push(Contribution {
                    reader_index: entry.reader_index,
                    blobs: entry.blobs,
                }),
            }
        }
        Ok(())
    }
}

fn final_name(raw: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{raw}_{label}"),
        None => raw.to_owned(),
    }
}

fn distinct_labels(entries: &[Entry], readers: &[Reader]) -> bool {
    let mut seen = HashSet::new();
    entries
        .iter()
        .all(|e| readers[e.reader_index].label().is_some_and(|l| seen.insert(l)))
}

fn conflict_error(raw: &str, entries: &[Entry], readers: &[Reader], scope: &'static str) -> SourceError {
    SourceError::TableConflict {
        table: raw.to_owned(),
        readers: entries
            .iter()
            .map(|e| readers[e.reader_index].describe(e.reader_index))
            .collect(),
        scope,
    }
}

/// Resolve tables with default options.
///
/// The storage is never closed here; it stays owned by the caller.
pub fn resolve(
    storage: &Arc<dyn BlobSource>,
    readers: &[Reader],
    conflicts: &ConflictResolution,
) -> SourceResult<TableMap> {
    resolve_with_options(storage, readers, conflicts, &ResolveOptions::default())
}

/// Resolve tables, reporting the outcome to `options.observer`.
///
/// When an observer is configured, this function reports:
///
/// - `on_success` on success, with listing and table stats
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
pub fn resolve_with_options(
    storage: &Arc<dyn BlobSource>,
    readers: &[Reader],
    conflicts: &ConflictResolution,
    options: &ResolveOptions,
) -> SourceResult<TableMap> {
    let ctx = ResolutionContext {
        readers: readers.len(),
    };
    let result = resolve_inner(storage, readers, conflicts, options);

    if let Some(obs) = options.observer.as_ref() {
        match &result {
            Ok((_, stats)) => obs.on_success(&ctx, *stats),
            Err(e) => {
                let sev = ResolutionSeverity::of(e);
                obs.on_failure(&ctx, sev, e);
                if sev >= options.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
    }

    result.map(|(tables, _)| tables)
}

fn resolve_inner(
    storage: &Arc<dyn BlobSource>,
    readers: &[Reader],
    conflicts: &ConflictResolution,
    options: &ResolveOptions,
) -> SourceResult<(TableMap, ResolutionStats)> {
    let blobs = storage.list_blobs()?.collect::<SourceResult<Vec<_>>>()?;
    let plan = plan_tables(&blobs, readers, conflicts)?;

    let blobs_mapped = plan
        .values()
        .flatten()
        .flat_map(|c| &c.blobs)
        .collect::<HashSet<_>>()
        .len();

    let mut tables = TableMap::with_capacity(plan.len());
    for (name, contributions) in plan {
        let table = build_table(&name, storage, readers, &contributions, options)?;
        debug!(
            table = %name,
            sources = table.source_count(),
            fields = table.schema().len(),
            "built table"
        );
        tables.insert(name, table);
    }

    let stats = ResolutionStats {
        blobs_listed: blobs.len(),
        blobs_mapped,
        tables: tables.len(),
    };
    info!(
        blobs_listed = stats.blobs_listed,
        blobs_mapped = stats.blobs_mapped,
        tables = stats.tables,
        "resolution complete"
    );
    Ok((tables, stats))
}

fn build_table(
    name: &str,
    storage: &Arc<dyn BlobSource>,
    readers: &[Reader],
    contributions: &[Contribution],
    options: &ResolveOptions,
) -> SourceResult<MultiFileTable> {
    let Some((first, first_blob)) = contributions
        .iter()
        .find_map(|c| c.blobs.first().map(|b| (c, b)))
    else {
        return Err(SourceError::schema(format!("table '{name}' has no blobs")));
    };
    let first_reader = &readers[first.reader_index];
    let base = Arc::new(first_reader.format.infer_schema(first_blob, storage.as_ref())?);

    // all rows of the table share the schema of the first reader that declares attributes
    let extractor = contributions
        .iter()
        .find_map(|c| readers[c.reader_index].attributes());
    let schema = match extractor {
        Some(ex) => Arc::new(base.append(ex.schema_fields(base.len())).map_err(|e| {
            SourceError::schema(format!("attributes of table '{name}' collide with its columns: {e}"))
        })?),
        None => Arc::clone(&base),
    };

    for c in contributions.iter().filter(|c| c.reader_index != first.reader_index) {
        let reader = &readers[c.reader_index];
        let Some(blob) = c.blobs.first() else { continue };
        // read failures surface later, from the iterator that opens the blob
        match reader.format.infer_schema(blob, storage.as_ref()) {
            Ok(other) if other != *base => warn!(
                table = %name,
                reader = c.reader_index,
                blob = %blob,
                "base schema differs from the table schema; values are projected by column name"
            ),
            Err(error) => debug!(
                table = %name,
                reader = c.reader_index,
                blob = %blob,
                %error,
                "skipped schema comparison"
            ),
            Ok(_) => {}
        }
    }

    let mut sources = Vec::with_capacity(contributions.iter().map(|c| c.blobs.len()).sum());
    for c in contributions {
        let reader = &readers[c.reader_index];
        for blob in &c.blobs {
            let source = reader
                .format
                .create_record_source(blob, storage, Arc::clone(&base))?;
            let source = match reader.attributes() {
                Some(ex) => RecordSource::rows_native(
                    AttributeEnrichingSource::new(source, ex.extract(blob), Arc::clone(&schema))
                        .with_batch_size(options.batch_size),
                ),
                None => source,
            };
            sources.push(source);
        }
    }
    Ok(MultiFileTable::new(schema, sources))
}
