//! Strategies that assign a blob to a logical table.
//!
//! A [`TableMapper`] is a pure function `blob path -> table mapping | skip`:
//!
//! - [`RegexTableMapper`]: the table name is a named capture group of a regex
//! - [`DirectoryTableMapper`]: the table name is the directory `depth` levels above the file
//! - [`GlobTableMapper`]: every path matching a glob gets one fixed table name
//!
//! All strategies validate their configuration when constructed; mapping itself never fails.

use indexmap::IndexMap;
use regex::Regex;

use crate::blob::BlobPath;
use crate::error::{SourceError, SourceResult};
use crate::types::Value;

/// Default capture group holding the table name.
pub const DEFAULT_TABLE_GROUP: &str = "table";

/// The table a blob belongs to, plus optional partition metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMapping {
    /// Logical table name.
    pub table_name: String,
    /// Key-value partition metadata derived from the path.
    pub partition_values: IndexMap<String, Value>,
}

impl TableMapping {
    /// A mapping without partition values.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            partition_values: IndexMap::new(),
        }
    }
}

/// Closed set of mapping strategies.
#[derive(Debug, Clone)]
pub enum TableMapper {
    Regex(RegexTableMapper),
    Directory(DirectoryTableMapper),
    Glob(GlobTableMapper),
}

impl TableMapper {
    /// Regex strategy using the default `table` group.
    pub fn regex(pattern: &str) -> SourceResult<Self> {
        RegexTableMapper::new(pattern).map(Self::Regex)
    }

    /// Directory strategy.
    pub fn directory(depth: usize) -> SourceResult<Self> {
        DirectoryTableMapper::new(depth).map(Self::Directory)
    }

    /// Glob strategy assigning `table_name` to every match.
    pub fn glob(pattern: &str, table_name: impl Into<String>) -> SourceResult<Self> {
        GlobTableMapper::new(pattern, table_name).map(Self::Glob)
    }

    /// Map a blob to its table, or `None` to skip it.
    pub fn map_to_table(&self, blob: &BlobPath) -> Option<TableMapping> {
        self.map_path(&blob.path())
    }

    /// Map a decoded blob path to its table, or `None` to skip it.
    pub fn map_path(&self, path: &str) -> Option<TableMapping> {
        match self {
            Self::Regex(m) => m.map_path(path),
            Self::Directory(m) => m.map_path(path),
            Self::Glob(m) => m.map_path(path),
        }
    }
}

/// Extracts the table name from a named capture group.
///
/// The pattern is searched (not anchored) within the path. Example for
/// `/data/airlines/csv/cities.csv`: `.*?(?<table>[^/]+)\.csv$` yields `cities`.
#[derive(Debug, Clone)]
pub struct RegexTableMapper {
    pattern: Regex,
    group: String,
}

impl RegexTableMapper {
    /// Compile `pattern`, reading the table name from the `table` group.
    pub fn new(pattern: &str) -> SourceResult<Self> {
        Self::with_group(pattern, DEFAULT_TABLE_GROUP)
    }

    /// Compile `pattern`, reading the table name from `group`.
    pub fn with_group(pattern: &str, group: impl Into<String>) -> SourceResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| SourceError::config(format!("invalid table mapping regex: {e}")))?;
        Ok(Self {
            pattern,
            group: group.into(),
        })
    }

    /// Whether the pattern declares the configured group.
    ///
    /// A pattern without it maps nothing; [`crate::descriptor`] rejects such configurations.
    pub fn has_group(&self) -> bool {
        self.pattern
            .capture_names()
            .flatten()
            .any(|name| name == self.group)
    }

    /// The configured group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    fn map_path(&self, path: &str) -> Option<TableMapping> {
        let captures = self.pattern.captures(path)?;
        let name = captures.name(&self.group)?.as_str();
        if name.is_empty() {
            return None;
        }
        Some(TableMapping::new(name))
    }
}

/// Uses the directory `depth` levels above the file as the table name.
///
/// With `depth = 1` the immediate parent is used: `/data/cities/part-001.parquet` maps to
/// `cities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryTableMapper {
    depth: usize,
}

impl DirectoryTableMapper {
    /// Fails with [`SourceError::InvalidConfig`] if `depth` is 0.
    pub fn new(depth: usize) -> SourceResult<Self> {
        if depth < 1 {
            return Err(SourceError::config(format!(
                "directory table mapping depth must be >= 1, got {depth}"
            )));
        }
        Ok(Self { depth })
    }

    /// Configured depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn map_path(&self, path: &str) -> Option<TableMapping> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        // last segment is the file name
        let dir_index = segments.len().checked_sub(1 + self.depth)?;
        Some(TableMapping::new(segments[dir_index]))
    }
}

/// Assigns a fixed table name to every path matching a glob.
#[derive(Debug, Clone)]
pub struct GlobTableMapper {
    pattern: String,
    table_name: String,
    regex: Regex,
}

impl GlobTableMapper {
    /// Translate and compile `pattern`.
    pub fn new(pattern: &str, table_name: impl Into<String>) -> SourceResult<Self> {
        let table_name = table_name.into();
        if table_name.trim().is_empty() {
            return Err(SourceError::config("glob table mapping requires a table name"));
        }
        let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| {
            SourceError::config(format!("invalid glob pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern: pattern.to_owned(),
            table_name,
            regex,
        })
    }

    /// The glob as configured.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The fixed table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn map_path(&self, path: &str) -> Option<TableMapping> {
        self.regex
            .is_match(path)
            .then(|| TableMapping::new(self.table_name.clone()))
    }
}

/// Translate a glob into a regular expression over forward-slash separated paths.
///
/// - `**/` matches zero or more whole directories
/// - `**` matches anything, separators included
/// - `*` matches within one segment, `?` matches one non-separator character
/// - `{a,b}` alternatives are matched literally
/// - `[abc]` classes are passed through
///
/// The result is anchored at the start of the string or right after a `/`, and at the end of
/// the string, so `*.csv` never matches the middle of a segment.
pub fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let find = |from: usize, target: char| {
        chars[from..]
            .iter()
            .position(|&c| c == target)
            .map(|p| p + from)
    };

    let mut out = String::with_capacity(glob.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '{' => match find(i, '}') {
                Some(close) => {
                    let body: String = chars[i + 1..close].iter().collect();
                    let alternatives: Vec<String> = body.split(',').map(regex::escape).collect();
                    out.push_str("(?:");
                    out.push_str(&alternatives.join("|"));
                    out.push(')');
                    i = close + 1;
                }
                None => {
                    out.push_str(r"\{");
                    i += 1;
                }
            },
            '[' => match find(i + 1, ']') {
                Some(close) => {
                    out.extend(&chars[i..=close]);
                    i = close + 1;
                }
                None => {
                    out.push_str(r"\[");
                    i += 1;
                }
            },
            other => {
                out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4])));
                i += 1;
            }
        }
    }
    format!("(?:^|/){out}$")
}
