use thiserror::Error;

/// Convenience result type used across the crate.
pub type SourceResult<T> = Result<T, SourceError>;

/// Error type returned by table mapping, resolution and iteration.
///
/// Configuration problems surface at construction time ([`SourceError::InvalidConfig`]),
/// naming collisions under a `reject` policy surface from resolution
/// ([`SourceError::TableConflict`]), and I/O or decoding failures surface from the iterator that
/// triggered them.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel decoding error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV decoding error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Arrow error (IPC decoding, casting, batch construction).
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet decoding error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// A blob URI could not be parsed.
    #[error("invalid blob uri: {0}")]
    Url(#[from] url::ParseError),

    /// A strategy, extractor or descriptor is misconfigured.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Several readers produced the same table name and the applicable rule is `reject`.
    #[error(
        "table '{table}' produced by multiple readers [{list}] and {scope} conflict strategy is 'reject'",
        list = .readers.join(", ")
    )]
    TableConflict {
        table: String,
        /// Offending readers, formatted as `reader[<index>] (<type>)`.
        readers: Vec<String>,
        /// `"explicit"` when a per-table rule applied, `"default"` otherwise.
        scope: &'static str,
    },

    /// Data does not conform to the expected schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },
}

impl SourceError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }
}
