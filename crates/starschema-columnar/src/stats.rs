#![forbid(unsafe_code)]

use crate::types::{ColumnType, Value};
use std::cmp::Ordering;

/// Metadata gathered while a column is built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnStats {
    pub column_type: ColumnType,
    pub null_count: u64,
    pub min: Option<Value>,
    pub max: Option<Value>,
    /// Sum of the valid values for numeric columns (`None` for strings and booleans).
    pub sum: Option<f64>,
}

fn cmp_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.as_ref().cmp(b.as_ref())),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

impl ColumnStats {
    /// Fold one valid (non-null) value into the running metadata.
    pub(crate) fn observe(&mut self, value: &Value) {
        if let Some(v) = value.as_f64() {
            if v.is_nan() {
                return;
            }
            *self.sum.get_or_insert(0.0) += v;
        }

        let replace_min = match &self.min {
            None => true,
            Some(min) => cmp_same_type(value, min) == Some(Ordering::Less),
        };
        if replace_min {
            self.min = Some(value.clone());
        }

        let replace_max = match &self.max {
            None => true,
            Some(max) => cmp_same_type(value, max) == Some(Ordering::Greater),
        };
        if replace_max {
            self.max = Some(value.clone());
        }
    }
}
