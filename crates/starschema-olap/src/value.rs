use ordered_float::OrderedFloat;
use starschema_columnar::Value as ColumnarValue;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A scalar as it appears in group keys, distinct sets and result rows.
///
/// Unlike the storage-side value this type is `Eq + Hash + Ord`: floats use
/// [`OrderedFloat`], so `-0.0 == 0.0` and every NaN is equal to every other NaN.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Number(OrderedFloat<f64>),
    Text(Arc<str>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Number(v) => Some(v.0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a value used as a join key.
    ///
    /// Integral floats inside the `i64` range become `Int`, so a `5.0` foreign key finds a
    /// `5` surrogate key.
    pub fn key_from(value: ColumnarValue) -> Value {
        match value {
            ColumnarValue::Number(n) if is_integral_i64(n) => Value::Int(n as i64),
            other => Value::from(other),
        }
    }
}

fn is_integral_i64(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64
}

impl From<ColumnarValue> for Value {
    fn from(value: ColumnarValue) -> Self {
        match value {
            ColumnarValue::Null => Value::Null,
            ColumnarValue::Int(v) => Value::Int(v),
            ColumnarValue::Number(v) => Value::Number(OrderedFloat(v)),
            ColumnarValue::String(s) => Value::Text(s),
            ColumnarValue::Boolean(b) => Value::Boolean(b),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(OrderedFloat(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(Arc::from(v))
    }
}

impl From<Arc<str>> for Value {
    fn from(v: Arc<str>) -> Self {
        Value::Text(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Number(v) => write!(f, "{}", v.0),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Total order used for group keys and ranking.
///
/// `Null < Boolean < numbers < Text`. Ints and floats compare numerically; when they are
/// numerically equal the `Int` sorts first so the order stays consistent with `Eq`.
pub fn cmp_value(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (Value::Boolean(_), _) => Ordering::Less,
        (_, Value::Boolean(_)) => Ordering::Greater,
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a.cmp(b),
        (Value::Int(a), Value::Number(b)) => OrderedFloat(*a as f64)
            .cmp(b)
            .then(Ordering::Less),
        (Value::Number(a), Value::Int(b)) => a
            .cmp(&OrderedFloat(*b as f64))
            .then(Ordering::Greater),
        (Value::Int(_) | Value::Number(_), _) => Ordering::Less,
        (_, Value::Int(_) | Value::Number(_)) => Ordering::Greater,
        (Value::Text(a), Value::Text(b)) => a.as_ref().cmp(b.as_ref()),
    }
}

/// Lexicographic order over group keys.
pub fn cmp_key(a: &[Value], b: &[Value]) -> Ordering {
    for (a, b) in a.iter().zip(b.iter()) {
        let ord = cmp_value(a, b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_value(self, other)
    }
}
