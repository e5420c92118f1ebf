#![forbid(unsafe_code)]

use crate::bitmap::BitVec;
use crate::error::{ColumnarError, ColumnarResult};
use crate::table::ColumnView;
use crate::types::{ColumnType, Value};
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Lte => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Gte => ord != Ordering::Less,
        }
    }
}

/// Scalar right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Number(f64),
    Boolean(bool),
    String(Arc<str>),
}

impl FilterValue {
    fn family(&self) -> &'static str {
        match self {
            FilterValue::Int(_) | FilterValue::Number(_) => "numeric",
            FilterValue::Boolean(_) => "boolean",
            FilterValue::String(_) => "string",
        }
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Number(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Boolean(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::String(Arc::from(v))
    }
}

/// Compare two floats for a filter predicate.
///
/// Equality canonicalizes `-0.0 == 0.0` and treats NaN as equal to NaN. Ordering
/// operators never match NaN on either side.
fn cmp_f64(op: CmpOp, lhs: f64, rhs: f64) -> bool {
    match op {
        CmpOp::Eq | CmpOp::Ne => {
            let equal = if lhs.is_nan() || rhs.is_nan() {
                lhs.is_nan() && rhs.is_nan()
            } else {
                lhs == rhs
            };
            equal == (op == CmpOp::Eq)
        }
        _ => lhs.partial_cmp(&rhs).is_some_and(|ord| op.matches(ord)),
    }
}

/// `2^63`, the first float above `i64::MAX`.
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// Exact ordering of an integer against a float, without widening the integer.
///
/// `None` when `rhs` is NaN.
fn cmp_i64_f64(lhs: i64, rhs: f64) -> Option<Ordering> {
    if rhs.is_nan() {
        return None;
    }
    if rhs >= I64_UPPER {
        return Some(Ordering::Less);
    }
    if rhs < -I64_UPPER {
        return Some(Ordering::Greater);
    }
    let whole = rhs.trunc();
    match lhs.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(rhs - whole)),
        ord => Some(ord),
    }
}

/// An unordered (NaN) pair only satisfies `Ne`, as in [`cmp_f64`].
fn cmp_mixed(op: CmpOp, ord: Option<Ordering>) -> bool {
    match ord {
        Some(ord) => op.matches(ord),
        None => op == CmpOp::Ne,
    }
}

/// Evaluate `column <op> value` for every row.
///
/// Null slots never match, `Ne` included.
pub fn filter_mask(column: &ColumnView<'_>, op: CmpOp, value: &FilterValue) -> ColumnarResult<BitVec> {
    let mut mask = BitVec::with_capacity_bits(column.len());

    match (column.column_type(), value) {
        (ColumnType::Int64, FilterValue::Int(rhs)) => {
            for row in 0..column.len() {
                mask.push(
                    column
                        .get_i64(row)
                        .is_some_and(|lhs| op.matches(lhs.cmp(rhs))),
                );
            }
        }
        (ColumnType::Int64, FilterValue::Number(rhs)) => {
            for row in 0..column.len() {
                mask.push(
                    column
                        .get_i64(row)
                        .is_some_and(|lhs| cmp_mixed(op, cmp_i64_f64(lhs, *rhs))),
                );
            }
        }
        (ColumnType::Float64, FilterValue::Int(rhs)) => {
            for lhs in column.iter_f64() {
                mask.push(lhs.is_some_and(|lhs| {
                    cmp_mixed(op, cmp_i64_f64(*rhs, lhs).map(Ordering::reverse))
                }));
            }
        }
        (ColumnType::Float64, FilterValue::Number(rhs)) => {
            for lhs in column.iter_f64() {
                mask.push(lhs.is_some_and(|lhs| cmp_f64(op, lhs, *rhs)));
            }
        }
        (ColumnType::Boolean, FilterValue::Boolean(rhs)) => {
            for lhs in column.iter() {
                mask.push(matches!(lhs, Value::Boolean(lhs) if op.matches(lhs.cmp(rhs))));
            }
        }
        (ColumnType::String, FilterValue::String(rhs)) => {
            for lhs in column.iter() {
                mask.push(
                    matches!(&lhs, Value::String(lhs) if op.matches(lhs.as_ref().cmp(rhs.as_ref()))),
                );
            }
        }
        (actual, value) => {
            return Err(ColumnarError::TypeMismatch {
                column: column.name().to_string(),
                expected: value.family(),
                actual,
            });
        }
    }

    Ok(mask)
}

/// Compact the values of `column` where `mask` is set, preserving row order.
pub fn apply(mask: &BitVec, column: &ColumnView<'_>) -> ColumnarResult<Vec<Value>> {
    if mask.len() != column.len() {
        return Err(ColumnarError::LengthMismatch {
            table: column.table_name().to_string(),
            column: column.name().to_string(),
            expected: column.len(),
            actual: mask.len(),
        });
    }

    let mut out = Vec::with_capacity(mask.count_ones());
    out.extend(mask.iter_ones().map(|row| column.get(row)));
    Ok(out)
}

/// Evaluate a comparison and compact the passing values in one call.
pub fn filter(
    column: &ColumnView<'_>,
    op: CmpOp,
    value: &FilterValue,
) -> ColumnarResult<(BitVec, Vec<Value>)> {
    let mask = filter_mask(column, op, value)?;
    let values = apply(&mask, column)?;
    Ok((mask, values))
}
