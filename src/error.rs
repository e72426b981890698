use std::path::PathBuf;

use thiserror::Error;

/// Failure to pull rows from a source. Surfaced to the user, never retried.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed row payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worksheet '{0}' not found")]
    SheetNotFound(String),

    #[error("invalid worksheet identifier '{0}'")]
    InvalidSheetName(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("target fraction must be in (0, 1], got {0}")]
    Fraction(f64),

    #[error("freshness_secs must be a positive number of seconds, got {0}")]
    Freshness(i64),

    #[error("invalid date window '{0}': expected YYYY, YYYY-MM or label=YYYY-MM")]
    Window(String),

    #[error("invalid sort key '{0}': expected total, name or year:YYYY")]
    SortKey(String),
}
