//! Path-derived and constant attribute columns.
//!
//! An [`AttributeExtractor`] turns a blob path into `{attribute name -> value}` and describes the
//! extra schema fields those attributes contribute. Extraction never fails: a rule that does not
//! match, or a value that cannot be coerced to the declared type, yields [`Value::Null`].

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::blob::BlobPath;
use crate::error::{SourceError, SourceResult};
use crate::types::{DataType, Field, Value};

/// Declared type of an attribute value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    #[default]
    String,
    Int,
    Long,
    Float,
    Double,
    #[serde(alias = "boolean")]
    Bool,
    Date,
    Timestamp,
}

impl AttributeType {
    /// Logical column type for this attribute.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String => DataType::Utf8,
            Self::Int => DataType::Int32,
            Self::Long => DataType::Int64,
            Self::Float => DataType::Float32,
            Self::Double => DataType::Float64,
            Self::Bool => DataType::Bool,
            Self::Date => DataType::Date,
            Self::Timestamp => DataType::Timestamp,
        }
    }

    /// Whether parsing needs an explicit format string.
    pub fn requires_format(&self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }
}

/// Where an attribute value comes from.
#[derive(Debug, Clone)]
pub enum AttributeSource {
    /// A named group of a regex applied to the blob path.
    Regex { pattern: Regex, group: String },
    /// A value that is identical for every blob, coerced once at construction.
    Constant { value: Value },
}

/// One compiled attribute rule.
#[derive(Debug, Clone)]
pub struct AttributeRule {
    name: String,
    source: AttributeSource,
    attr_type: AttributeType,
    format: Option<String>,
}

impl AttributeRule {
    /// A rule reading `group` of `pattern` from the blob path.
    ///
    /// Fails with [`SourceError::InvalidConfig`] when the regex does not compile, does not declare
    /// `group`, or when a date/timestamp rule has no `format`.
    pub fn regex(
        name: impl Into<String>,
        pattern: &str,
        group: impl Into<String>,
        attr_type: AttributeType,
        format: Option<&str>,
    ) -> SourceResult<Self> {
        let name = validate_name(name.into())?;
        validate_format(&name, attr_type, format)?;
        let group = group.into();
        let pattern = Regex::new(pattern).map_err(|e| {
            SourceError::config(format!("attribute '{name}' has an invalid regex: {e}"))
        })?;
        if !pattern.capture_names().flatten().any(|g| g == group) {
            return Err(SourceError::config(format!(
                "attribute '{name}' regex does not declare group '{group}'"
            )));
        }
        Ok(Self {
            name,
            source: AttributeSource::Regex { pattern, group },
            attr_type,
            format: format.map(str::to_owned),
        })
    }

    /// A rule producing the same coerced `value` for every blob.
    pub fn constant(
        name: impl Into<String>,
        value: &str,
        attr_type: AttributeType,
        format: Option<&str>,
    ) -> SourceResult<Self> {
        let name = validate_name(name.into())?;
        validate_format(&name, attr_type, format)?;
        Ok(Self {
            source: AttributeSource::Constant {
                value: coerce(value, attr_type, format),
            },
            name,
            attr_type,
            format: format.map(str::to_owned),
        })
    }

    /// Attribute (column) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn attr_type(&self) -> AttributeType {
        self.attr_type
    }

    /// Value source.
    pub fn source(&self) -> &AttributeSource {
        &self.source
    }

    /// Value of this attribute for a decoded blob path.
    pub fn extract(&self, path: &str) -> Value {
        match &self.source {
            AttributeSource::Constant { value } => value.clone(),
            AttributeSource::Regex { pattern, group } => pattern
                .captures(path)
                .and_then(|c| c.name(group))
                .map_or(Value::Null, |m| {
                    coerce(m.as_str(), self.attr_type, self.format.as_deref())
                }),
        }
    }

    /// The nullable schema field this attribute contributes.
    pub fn field(&self) -> Field {
        Field::new(self.name.clone(), self.attr_type.data_type())
    }
}

fn validate_name(name: String) -> SourceResult<String> {
    if name.trim().is_empty() {
        return Err(SourceError::config("attribute name must not be empty"));
    }
    Ok(name)
}

fn validate_format(name: &str, attr_type: AttributeType, format: Option<&str>) -> SourceResult<()> {
    if attr_type.requires_format() && format.is_none_or(|f| f.trim().is_empty()) {
        return Err(SourceError::config(format!(
            "attribute '{name}' of type {attr_type} requires a format"
        )));
    }
    Ok(())
}

/// Coerce a raw string to `attr_type`, returning [`Value::Null`] when it does not parse.
///
/// Booleans accept exactly `true` and `false`. Dates and timestamps use chrono `strftime` syntax
/// (e.g. `%Y-%m-%d`); a missing format yields null.
pub fn coerce(raw: &str, attr_type: AttributeType, format: Option<&str>) -> Value {
    match attr_type {
        AttributeType::String => Value::Utf8(raw.to_owned()),
        AttributeType::Int => raw.parse::<i32>().ok().into(),
        AttributeType::Long => raw.parse::<i64>().ok().into(),
        AttributeType::Float => raw.parse::<f32>().ok().into(),
        AttributeType::Double => raw.parse::<f64>().ok().into(),
        AttributeType::Bool => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Null,
        },
        AttributeType::Date => format
            .and_then(|f| NaiveDate::parse_from_str(raw, f).ok())
            .into(),
        AttributeType::Timestamp => format
            .and_then(|f| NaiveDateTime::parse_from_str(raw, f).ok())
            .into(),
    }
}

/// An ordered set of attribute rules with unique names.
#[derive(Debug, Clone, Default)]
pub struct AttributeExtractor {
    rules: Vec<AttributeRule>,
}

impl AttributeExtractor {
    /// Fails with [`SourceError::InvalidConfig`] if two rules share a name.
    pub fn new(rules: Vec<AttributeRule>) -> SourceResult<Self> {
        for (i, rule) in rules.iter().enumerate() {
            if rules[..i].iter().any(|r| r.name == rule.name) {
                return Err(SourceError::config(format!(
                    "duplicate attribute name '{}'",
                    rule.name
                )));
            }
        }
        Ok(Self { rules })
    }

    /// Compiled rules, in declaration order.
    pub fn rules(&self) -> &[AttributeRule] {
        &self.rules
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// One entry per rule, in declaration order.
    pub fn extract(&self, blob: &BlobPath) -> IndexMap<String, Value> {
        self.extract_path(&blob.path())
    }

    /// Like [`AttributeExtractor::extract`], over an already decoded path.
    pub fn extract_path(&self, path: &str) -> IndexMap<String, Value> {
        self.rules
            .iter()
            .map(|rule| (rule.name.clone(), rule.extract(path)))
            .collect()
    }

    /// Extra schema fields, indexed from `start_index`.
    pub fn schema_fields(&self, start_index: usize) -> Vec<Field> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| Field {
                index: start_index + i,
                ..rule.field()
            })
            .collect()
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}
