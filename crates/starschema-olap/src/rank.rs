use crate::aggregate::{GroupedResult, GroupedRow};
use crate::error::{OlapError, OlapResult};
use crate::value::{cmp_key, cmp_value, Value};
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortKey {
    /// A measure, by name.
    Measure(String),
    /// A group key column, by position.
    Key(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn measure(name: impl Into<String>, order: SortOrder) -> Self {
        Self {
            key: SortKey::Measure(name.into()),
            order,
        }
    }

    pub fn key(position: usize, order: SortOrder) -> Self {
        Self {
            key: SortKey::Key(position),
            order,
        }
    }
}

enum Column {
    Measure(usize),
    Key(usize),
}

impl Column {
    fn value<'r>(&self, row: &'r GroupedRow) -> &'r Value {
        let value = match self {
            Column::Measure(idx) => row.values.get(*idx),
            Column::Key(idx) => row.key.get(*idx),
        };
        value.unwrap_or(&Value::Null)
    }
}

/// Nulls go last whatever the direction.
fn cmp_nulls_last(a: &Value, b: &Value, order: SortOrder) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match order {
            SortOrder::Ascending => cmp_value(a, b),
            SortOrder::Descending => cmp_value(b, a),
        },
    }
}

/// Order the groups of `result` by one measure and keep the first `limit`.
pub fn rank(
    result: &GroupedResult,
    sort_key: &str,
    order: SortOrder,
    limit: Option<usize>,
) -> OlapResult<Vec<GroupedRow>> {
    rank_by(result, &[SortSpec::measure(sort_key, order)], limit)
}

/// Order the groups of `result` by several measures and key columns.
///
/// The sort is stable. Rows that tie on every spec are ordered by group key ascending and then
/// by materialization order.
pub fn rank_by(
    result: &GroupedResult,
    specs: &[SortSpec],
    limit: Option<usize>,
) -> OlapResult<Vec<GroupedRow>> {
    let mut columns = Vec::with_capacity(specs.len());
    for spec in specs {
        let column = match &spec.key {
            SortKey::Measure(name) => result
                .measure_index(name)
                .map(Column::Measure)
                .ok_or_else(|| OlapError::UnknownMeasure(name.clone()))?,
            SortKey::Key(position) => {
                if *position >= result.key_columns.len() {
                    return Err(OlapError::UnknownKeyColumn(*position));
                }
                Column::Key(*position)
            }
        };
        columns.push((column, spec.order));
    }

    let mut ranked: Vec<&GroupedRow> = result.rows.iter().collect();
    ranked.sort_by(|a, b| {
        columns
            .iter()
            .map(|(column, order)| cmp_nulls_last(column.value(a), column.value(b), *order))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| cmp_key(&a.key, &b.key))
    });

    let limit = limit.unwrap_or(ranked.len());
    Ok(ranked.into_iter().take(limit).cloned().collect())
}
