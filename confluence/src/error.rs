use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use thiserror::Error;

/// Everything that can stop the feature pipeline.
///
/// Missing metrics are deliberately absent: a row that lacks a derived value
/// is dropped by the null-elimination pass, never reported.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("entity store failed: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("table '{table}' not found in entity store")]
    MissingTable { table: String },

    #[error("table '{table}' has no column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("column {table}.{column} cannot be cast to {target}: {source}")]
    ColumnType {
        table: String,
        column: String,
        target: DataType,
        #[source]
        source: ArrowError,
    },

    #[error("column {table}.{column} is {found}, expected {expected}")]
    UnexpectedType {
        table: String,
        column: String,
        expected: DataType,
        found: DataType,
    },

    #[error("key {key:?} appears more than once in {table}.{column}")]
    DuplicateKey {
        table: String,
        column: String,
        key: String,
    },

    #[error("seller {seller_id} has item rows but zero distinct orders")]
    DivisionByZero { seller_id: String },

    #[error("review score {score} has no review cost (expected 1..=5)")]
    InvalidReviewScore { score: i64 },

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("query engine error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("failed to start query runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
