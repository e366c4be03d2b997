//! Policy for tables produced by more than one reader.
//!
//! In configuration a policy is either a bare strategy token or a map with an optional `default`
//! key plus per-table overrides:
//!
//! ```
//! use rust_blob_tables::conflict::{ConflictResolution, ConflictStrategy};
//!
//! let bare: ConflictResolution = serde_json::from_str(r#""union""#).unwrap();
//! assert_eq!(bare.default_strategy(), ConflictStrategy::Union);
//!
//! let map: ConflictResolution =
//!     serde_json::from_str(r#"{"default": "reject", "events": "union"}"#).unwrap();
//! assert_eq!(map.strategy_for("events"), ConflictStrategy::Union);
//! assert_eq!(map.strategy_for("other"), ConflictStrategy::Reject);
//! ```

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

const DEFAULT_KEY: &str = "default";

/// What to do when several readers produce the same table name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Merge every contribution into one table.
    #[serde(alias = "UNION")]
    Union,
    /// Fail resolution.
    #[default]
    #[serde(alias = "REJECT")]
    Reject,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Union => "union",
            Self::Reject => "reject",
        })
    }
}

impl FromStr for ConflictStrategy {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(Self::Union),
            "reject" => Ok(Self::Reject),
            other => Err(SourceError::config(format!(
                "unknown conflict strategy '{other}', expected 'union' or 'reject'"
            ))),
        }
    }
}

/// A default strategy plus per-table overrides.
///
/// The default is [`ConflictStrategy::Reject`] unless configured otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ResolutionRepr", into = "ResolutionRepr")]
pub struct ConflictResolution {
    default: ConflictStrategy,
    rules: IndexMap<String, ConflictStrategy>,
}

impl ConflictResolution {
    /// A policy with `default` and no overrides.
    pub fn new(default: ConflictStrategy) -> Self {
        Self {
            default,
            rules: IndexMap::new(),
        }
    }

    /// Add or replace the rule for `table`.
    pub fn with_rule(mut self, table: impl Into<String>, strategy: ConflictStrategy) -> Self {
        self.rules.insert(table.into(), strategy);
        self
    }

    pub fn default_strategy(&self) -> ConflictStrategy {
        self.default
    }

    /// Per-table overrides, in declaration order.
    pub fn rules(&self) -> &IndexMap<String, ConflictStrategy> {
        &self.rules
    }

    /// The explicit rule for `table`, if any.
    pub fn explicit_rule(&self, table: &str) -> Option<ConflictStrategy> {
        self.rules.get(table).copied()
    }

    pub fn has_explicit_rule(&self, table: &str) -> bool {
        self.rules.contains_key(table)
    }

    /// The explicit rule for `table`, falling back to the default.
    pub fn strategy_for(&self, table: &str) -> ConflictStrategy {
        self.explicit_rule(table).unwrap_or(self.default)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ResolutionRepr {
    Bare(ConflictStrategy),
    Map(IndexMap<String, ConflictStrategy>),
}

impl From<ResolutionRepr> for ConflictResolution {
    fn from(repr: ResolutionRepr) -> Self {
        match repr {
            ResolutionRepr::Bare(default) => Self::new(default),
            ResolutionRepr::Map(mut map) => {
                let default = map.shift_remove(DEFAULT_KEY).unwrap_or_default();
                Self {
                    default,
                    rules: map,
                }
            }
        }
    }
}

impl From<ConflictResolution> for ResolutionRepr {
    fn from(policy: ConflictResolution) -> Self {
        if policy.rules.is_empty() {
            return Self::Bare(policy.default);
        }
        let mut map = IndexMap::with_capacity(policy.rules.len() + 1);
        map.insert(DEFAULT_KEY.to_owned(), policy.default);
        map.extend(policy.rules);
        Self::Map(map)
    }
}
