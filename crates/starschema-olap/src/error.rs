use crate::value::Value;
use starschema_columnar::{ColumnType, ColumnarError};

pub type OlapResult<T> = Result<T, OlapError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OlapError {
    #[error(transparent)]
    Columnar(#[from] ColumnarError),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("duplicate key {key} in {table}[{column}]")]
    DuplicateKey {
        table: String,
        column: String,
        key: Value,
    },

    #[error("null key in {table}[{column}] at row {row}")]
    NullKey {
        table: String,
        column: String,
        row: usize,
    },

    #[error("unknown measure: {0}")]
    UnknownMeasure(String),

    #[error("duplicate measure: {0}")]
    DuplicateMeasure(String),

    #[error("{reduction} requires a numeric column, but {column} is {actual}")]
    TypeMismatch {
        column: String,
        reduction: &'static str,
        actual: ColumnType,
    },

    #[error("group key has no column at position {0}")]
    UnknownKeyColumn(usize),

    #[error("row mask covers {actual} rows, but {table} has {expected}")]
    MaskLengthMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },
}
