//! Columnar storage for star-schema analytics.
//!
//! This crate focuses on:
//! - Typed, chunked columns with per-slot validity bitmaps.
//! - Chunk-transparent column access by name (`ColumnarTable::column`).
//! - Scalar predicate filtering into masks and compacted value sequences.
//! - Whole-column statistics (mean, population variance, interpolated quantiles).

#![forbid(unsafe_code)]

mod bitmap;
mod error;
mod filter;
mod reducer;
mod stats;
mod table;
mod types;

pub use crate::bitmap::BitVec;
pub use crate::error::{ColumnarError, ColumnarResult};
pub use crate::filter::{apply, filter, filter_mask, CmpOp, FilterValue};
pub use crate::reducer::{
    reduce_statistics, CompensatedSum, Quantile, StatisticalReducer, Statistics,
};
pub use crate::stats::ColumnStats;
pub use crate::table::{
    ColumnSchema, ColumnView, ColumnarTable, ColumnarTableBuilder, TableOptions,
};
pub use crate::types::{ColumnType, Value};
