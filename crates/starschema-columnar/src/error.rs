use crate::types::ColumnType;

pub type ColumnarResult<T> = Result<T, ColumnarError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ColumnarError {
    #[error("unknown column {table}[{column}]")]
    ColumnNotFound { table: String, column: String },

    #[error("duplicate column {table}[{column}]")]
    DuplicateColumn { table: String, column: String },

    #[error("length mismatch for {table}[{column}]: expected {expected} values, got {actual}")]
    LengthMismatch {
        table: String,
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("row for {table} has {actual} values, expected {expected}")]
    RowLengthMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("type mismatch for column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: ColumnType,
    },

    #[error("quantile probability must be within [0, 1], got {0}")]
    InvalidQuantile(f64),
}
