use crate::error::{OlapError, OlapResult};
use crate::lookup::LookupIndex;
use crate::parallel;
use crate::value::Value;
use starschema_columnar::{
    BitVec, ColumnType, ColumnView, ColumnarTable, CompensatedSum, Value as ColumnarValue,
};
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// How a measure collapses the rows of one group.
#[derive(Clone, Debug, PartialEq)]
pub enum Reduction {
    Sum,
    /// Non-null values of the column.
    Count,
    /// Rows in the group; no column involved.
    CountRows,
    Average,
    Min,
    Max,
    CountDistinct,
    /// `sum(column) / sum(denominator) * scale`.
    SumRatio { denominator: String, scale: f64 },
}

impl Reduction {
    pub fn name(&self) -> &'static str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Count => "count",
            Reduction::CountRows => "count_rows",
            Reduction::Average => "average",
            Reduction::Min => "min",
            Reduction::Max => "max",
            Reduction::CountDistinct => "count_distinct",
            Reduction::SumRatio { .. } => "sum_ratio",
        }
    }

    fn requires_numeric(&self) -> bool {
        matches!(
            self,
            Reduction::Sum | Reduction::Average | Reduction::SumRatio { .. }
        )
    }
}

/// A named reduction over one fact column.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasureSpec {
    name: String,
    column: Option<String>,
    reduction: Reduction,
}

impl MeasureSpec {
    fn on(column: impl Into<String>, reduction: Reduction) -> Self {
        let column = column.into();
        Self {
            name: format!("{}_{}", reduction.name(), column),
            column: Some(column),
            reduction,
        }
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::on(column, Reduction::Sum)
    }

    pub fn count(column: impl Into<String>) -> Self {
        Self::on(column, Reduction::Count)
    }

    pub fn count_rows() -> Self {
        Self {
            name: "row_count".to_string(),
            column: None,
            reduction: Reduction::CountRows,
        }
    }

    pub fn average(column: impl Into<String>) -> Self {
        Self::on(column, Reduction::Average)
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::on(column, Reduction::Min)
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::on(column, Reduction::Max)
    }

    pub fn count_distinct(column: impl Into<String>) -> Self {
        Self::on(column, Reduction::CountDistinct)
    }

    pub fn sum_ratio(
        numerator: impl Into<String>,
        denominator: impl Into<String>,
        scale: f64,
    ) -> Self {
        let denominator = denominator.into();
        let mut spec = Self::on(
            numerator,
            Reduction::SumRatio {
                denominator: denominator.clone(),
                scale,
            },
        );
        spec.name = format!("{}_over_{}", spec.name, denominator);
        spec
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn reduction(&self) -> &Reduction {
        &self.reduction
    }
}

/// Binds a lookup index to the fact column holding its foreign key.
#[derive(Clone, Copy, Debug)]
pub struct DimensionJoin<'a> {
    pub index: &'a LookupIndex,
    pub foreign_key: &'a str,
}

impl<'a> DimensionJoin<'a> {
    pub fn new(index: &'a LookupIndex, foreign_key: &'a str) -> Self {
        Self { index, foreign_key }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Split the fact scan into row ranges on the scan pool (requires the `parallel` feature).
    pub parallel: bool,
    /// Smallest row range worth handing to a worker.
    pub min_rows_per_partition: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            min_rows_per_partition: 65_536,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupedRow {
    pub key: Vec<Value>,
    pub values: Vec<Value>,
}

/// Output of a grouped aggregation: one row per distinct group key, in first-seen order.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupedResult {
    /// `dimension[attribute]` for every key position.
    pub key_columns: Vec<String>,
    pub measure_names: Vec<String>,
    pub rows: Vec<GroupedRow>,
    /// Scanned rows whose foreign key was null or missing from its index.
    pub dropped_row_count: usize,
    /// Rows visited by the scan (rows outside a filter mask are not counted).
    pub scanned_row_count: usize,
}

impl GroupedResult {
    pub fn measure_index(&self, name: &str) -> Option<usize> {
        self.measure_names.iter().position(|m| m == name)
    }

    pub fn get(&self, row: usize, measure: &str) -> Option<&Value> {
        let idx = self.measure_index(measure)?;
        self.rows.get(row)?.values.get(idx)
    }

    /// The row whose group key equals `key`.
    pub fn find(&self, key: &[Value]) -> Option<&GroupedRow> {
        self.rows.iter().find(|row| row.key == key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Clone, Debug)]
enum Accumulator {
    SumInt(Option<i128>),
    SumFloat(Option<CompensatedSum>),
    Count(u64),
    Average {
        sum: CompensatedSum,
        count: u64,
    },
    Min(Option<Value>),
    Max(Option<Value>),
    Distinct(HashSet<Value>),
    Ratio {
        numerator: Option<CompensatedSum>,
        denominator: CompensatedSum,
        scale: f64,
    },
}

/// A validated measure: the columns it reads plus an empty accumulator to clone per group.
struct MeasurePlan<'a> {
    column: Option<ColumnView<'a>>,
    denominator: Option<ColumnView<'a>>,
    empty: Accumulator,
}

/// A NaN measure value is treated as null by every reduction.
fn number(column: Option<ColumnView<'_>>, row: usize) -> Option<f64> {
    column
        .and_then(|c| c.get_f64(row))
        .filter(|v| !v.is_nan())
}

impl MeasurePlan<'_> {
    fn value(&self, row: usize) -> Value {
        match self.column.map(|column| column.get(row)) {
            Some(ColumnarValue::Number(v)) if v.is_nan() => Value::Null,
            Some(value) => Value::from(value),
            None => Value::Null,
        }
    }

    fn number(&self, row: usize) -> Option<f64> {
        number(self.column, row)
    }

    fn is_present(&self, row: usize) -> bool {
        self.column.map_or(true, |c| {
            c.is_valid(row) && !c.get_f64(row).is_some_and(f64::is_nan)
        })
    }
}

impl Accumulator {
    fn fold(&mut self, plan: &MeasurePlan<'_>, row: usize) {
        match self {
            Accumulator::SumInt(sum) => {
                if let Some(v) = plan.column.and_then(|c| c.get_i64(row)) {
                    *sum = Some(sum.unwrap_or(0) + i128::from(v));
                }
            }
            Accumulator::SumFloat(sum) => {
                if let Some(v) = plan.number(row) {
                    sum.get_or_insert_with(CompensatedSum::new).add(v);
                }
            }
            Accumulator::Count(count) => {
                if plan.is_present(row) {
                    *count += 1;
                }
            }
            Accumulator::Average { sum, count } => {
                if let Some(v) = plan.number(row) {
                    sum.add(v);
                    *count += 1;
                }
            }
            Accumulator::Min(min) => {
                let v = plan.value(row);
                if !v.is_null() && min.as_ref().map_or(true, |m| v < *m) {
                    *min = Some(v);
                }
            }
            Accumulator::Max(max) => {
                let v = plan.value(row);
                if !v.is_null() && max.as_ref().map_or(true, |m| v > *m) {
                    *max = Some(v);
                }
            }
            Accumulator::Distinct(seen) => {
                let v = plan.value(row);
                if !v.is_null() {
                    seen.insert(v);
                }
            }
            Accumulator::Ratio {
                numerator,
                denominator,
                ..
            } => {
                if let Some(v) = plan.number(row) {
                    numerator.get_or_insert_with(CompensatedSum::new).add(v);
                }
                if let Some(v) = number(plan.denominator, row) {
                    denominator.add(v);
                }
            }
        }
    }

    fn merge(&mut self, other: Accumulator) {
        match (self, other) {
            (Accumulator::SumInt(a), Accumulator::SumInt(b)) => {
                *a = match (*a, b) {
                    (Some(a), Some(b)) => Some(a + b),
                    (a, b) => a.or(b),
                };
            }
            (Accumulator::SumFloat(a), Accumulator::SumFloat(Some(b))) => {
                a.get_or_insert_with(CompensatedSum::new).merge(&b);
            }
            (Accumulator::Count(a), Accumulator::Count(b)) => *a += b,
            (
                Accumulator::Average { sum, count },
                Accumulator::Average {
                    sum: other_sum,
                    count: other_count,
                },
            ) => {
                sum.merge(&other_sum);
                *count += other_count;
            }
            (Accumulator::Min(a), Accumulator::Min(Some(b))) => {
                if a.as_ref().map_or(true, |a| b < *a) {
                    *a = Some(b);
                }
            }
            (Accumulator::Max(a), Accumulator::Max(Some(b))) => {
                if a.as_ref().map_or(true, |a| b > *a) {
                    *a = Some(b);
                }
            }
            (Accumulator::Distinct(a), Accumulator::Distinct(b)) => a.extend(b),
            (
                Accumulator::Ratio {
                    numerator,
                    denominator,
                    ..
                },
                Accumulator::Ratio {
                    numerator: other_numerator,
                    denominator: other_denominator,
                    ..
                },
            ) => {
                if let Some(b) = other_numerator {
                    numerator.get_or_insert_with(CompensatedSum::new).merge(&b);
                }
                denominator.merge(&other_denominator);
            }
            // A partial that saw nothing leaves `self` unchanged.
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::SumInt(None) | Accumulator::SumFloat(None) => Value::Null,
            Accumulator::SumInt(Some(sum)) => match i64::try_from(sum) {
                Ok(v) => Value::Int(v),
                Err(_) => Value::from(sum as f64),
            },
            Accumulator::SumFloat(Some(sum)) => Value::from(sum.value()),
            Accumulator::Count(count) => Value::Int(count as i64),
            Accumulator::Average { sum, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::from(sum.value() / count as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) => v.unwrap_or(Value::Null),
            Accumulator::Distinct(seen) => Value::Int(seen.len() as i64),
            Accumulator::Ratio {
                numerator: Some(numerator),
                denominator,
                scale,
            } => {
                let ratio = numerator.value() / denominator.value() * scale;
                if ratio.is_finite() {
                    Value::from(ratio)
                } else {
                    Value::Null
                }
            }
            Accumulator::Ratio {
                numerator: None, ..
            } => Value::Null,
        }
    }
}

/// Groups of one contiguous row range, in first-seen order.
#[derive(Default)]
struct GroupTable {
    slots: HashMap<Vec<Value>, usize>,
    keys: Vec<Vec<Value>>,
    accumulators: Vec<Vec<Accumulator>>,
    scanned: usize,
    dropped: usize,
}

impl GroupTable {
    fn slot(&mut self, key: &[Value], measures: &[MeasurePlan<'_>]) -> usize {
        if let Some(&slot) = self.slots.get(key) {
            return slot;
        }
        let slot = self.keys.len();
        self.slots.insert(key.to_vec(), slot);
        self.keys.push(key.to_vec());
        self.accumulators
            .push(measures.iter().map(|m| m.empty.clone()).collect());
        slot
    }

    /// Fold a later partition into this one. Groups new to `self` are appended in the order
    /// `other` first saw them, which keeps the sequential first-seen order.
    fn merge(&mut self, other: GroupTable) {
        self.scanned += other.scanned;
        self.dropped += other.dropped;
        for (key, accumulators) in other.keys.into_iter().zip(other.accumulators) {
            match self.slots.get(&key) {
                Some(&slot) => {
                    for (acc, other) in self.accumulators[slot].iter_mut().zip(accumulators) {
                        acc.merge(other);
                    }
                }
                None => {
                    self.slots.insert(key.clone(), self.keys.len());
                    self.keys.push(key);
                    self.accumulators.push(accumulators);
                }
            }
        }
    }

    fn into_rows(self) -> Vec<GroupedRow> {
        self.keys
            .into_iter()
            .zip(self.accumulators)
            .map(|(key, accumulators)| GroupedRow {
                key,
                values: accumulators.into_iter().map(Accumulator::finish).collect(),
            })
            .collect()
    }
}

struct ScanPlan<'a> {
    joins: Vec<(ColumnView<'a>, &'a LookupIndex)>,
    measures: Vec<MeasurePlan<'a>>,
    mask: Option<&'a BitVec>,
    key_columns: Vec<String>,
    measure_names: Vec<String>,
}

fn require_numeric(column: &ColumnView<'_>, reduction: &Reduction) -> OlapResult<()> {
    if column.column_type().is_numeric() {
        return Ok(());
    }
    Err(OlapError::TypeMismatch {
        column: column.name().to_string(),
        reduction: reduction.name(),
        actual: column.column_type(),
    })
}

impl<'a> ScanPlan<'a> {
    fn compile(
        fact: &'a ColumnarTable,
        joins: &[DimensionJoin<'a>],
        measures: &[MeasureSpec],
        mask: Option<&'a BitVec>,
    ) -> OlapResult<Self> {
        if let Some(mask) = mask {
            if mask.len() != fact.row_count() {
                return Err(OlapError::MaskLengthMismatch {
                    table: fact.name().to_string(),
                    expected: fact.row_count(),
                    actual: mask.len(),
                });
            }
        }

        let mut key_columns = Vec::new();
        let mut resolved_joins = Vec::with_capacity(joins.len());
        for join in joins {
            resolved_joins.push((fact.column(join.foreign_key)?, join.index));
            key_columns.extend(
                join.index
                    .attribute_names()
                    .iter()
                    .map(|attr| format!("{}[{}]", join.index.dimension(), attr)),
            );
        }

        let mut names = HashSet::with_capacity(measures.len());
        let mut plans = Vec::with_capacity(measures.len());
        for spec in measures {
            if !names.insert(spec.name()) {
                return Err(OlapError::DuplicateMeasure(spec.name().to_string()));
            }

            let column = spec.column().map(|name| fact.column(name)).transpose()?;
            if spec.reduction().requires_numeric() {
                if let Some(column) = &column {
                    require_numeric(column, spec.reduction())?;
                }
            }

            let mut denominator = None;
            let empty = match spec.reduction() {
                Reduction::Sum => {
                    if column.is_some_and(|c| c.column_type() == ColumnType::Int64) {
                        Accumulator::SumInt(None)
                    } else {
                        Accumulator::SumFloat(None)
                    }
                }
                Reduction::Count | Reduction::CountRows => Accumulator::Count(0),
                Reduction::Average => Accumulator::Average {
                    sum: CompensatedSum::new(),
                    count: 0,
                },
                Reduction::Min => Accumulator::Min(None),
                Reduction::Max => Accumulator::Max(None),
                Reduction::CountDistinct => Accumulator::Distinct(HashSet::new()),
                Reduction::SumRatio {
                    denominator: name,
                    scale,
                } => {
                    let view = fact.column(name)?;
                    require_numeric(&view, spec.reduction())?;
                    denominator = Some(view);
                    Accumulator::Ratio {
                        numerator: None,
                        denominator: CompensatedSum::new(),
                        scale: *scale,
                    }
                }
            };

            plans.push(MeasurePlan {
                column,
                denominator,
                empty,
            });
        }

        Ok(Self {
            joins: resolved_joins,
            measures: plans,
            mask,
            key_columns,
            measure_names: measures.iter().map(|m| m.name().to_string()).collect(),
        })
    }

    fn scan(&self, rows: Range<usize>) -> GroupTable {
        let mut groups = GroupTable::default();
        let mut key = Vec::new();

        'rows: for row in rows {
            if self.mask.is_some_and(|mask| !mask.get(row)) {
                continue;
            }
            groups.scanned += 1;

            key.clear();
            for (foreign_key, index) in &self.joins {
                let Some(attributes) = index.get(&Value::key_from(foreign_key.get(row))) else {
                    groups.dropped += 1;
                    continue 'rows;
                };
                key.extend_from_slice(attributes);
            }

            let slot = groups.slot(&key, &self.measures);
            for (acc, plan) in groups.accumulators[slot].iter_mut().zip(&self.measures) {
                acc.fold(plan, row);
            }
        }

        groups
    }
}

/// Builder for one grouped aggregation over a fact table.
///
/// ```ignore
/// let result = GroupedAggregator::new(&fact)
///     .join(&regions, "geography_key")
///     .measure(MeasureSpec::sum("gross_sales"))
///     .run()?;
/// ```
pub struct GroupedAggregator<'a> {
    fact: &'a ColumnarTable,
    joins: Vec<DimensionJoin<'a>>,
    measures: Vec<MeasureSpec>,
    mask: Option<&'a BitVec>,
    options: AggregateOptions,
}

impl<'a> GroupedAggregator<'a> {
    pub fn new(fact: &'a ColumnarTable) -> Self {
        Self {
            fact,
            joins: Vec::new(),
            measures: Vec::new(),
            mask: None,
            options: AggregateOptions::default(),
        }
    }

    pub fn join(mut self, index: &'a LookupIndex, foreign_key: &'a str) -> Self {
        self.joins.push(DimensionJoin::new(index, foreign_key));
        self
    }

    pub fn measure(mut self, measure: MeasureSpec) -> Self {
        self.measures.push(measure);
        self
    }

    pub fn measures(mut self, measures: impl IntoIterator<Item = MeasureSpec>) -> Self {
        self.measures.extend(measures);
        self
    }

    /// Only scan rows whose bit is set. Skipped rows are neither scanned nor dropped.
    pub fn filter(mut self, mask: &'a BitVec) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn run(&self) -> OlapResult<GroupedResult> {
        let plan = ScanPlan::compile(self.fact, &self.joins, &self.measures, self.mask)?;

        let rows = self.fact.row_count();
        let ranges = if self.options.parallel {
            parallel::partition_rows(
                rows,
                self.options.min_rows_per_partition,
                parallel::available_workers(),
            )
        } else {
            vec![0..rows]
        };
        let partitions = ranges.len();

        let mut partials = parallel::map_partitions(ranges, |range| plan.scan(range)).into_iter();
        let mut groups = partials.next().unwrap_or_default();
        for partial in partials {
            groups.merge(partial);
        }

        let scanned_row_count = groups.scanned;
        let dropped_row_count = groups.dropped;
        let rows = groups.into_rows();

        log::debug!(
            "aggregated {} into {} groups (scanned {}, dropped {}, {} partitions)",
            self.fact.name(),
            rows.len(),
            scanned_row_count,
            dropped_row_count,
            partitions
        );
        if dropped_row_count > 0 {
            log::warn!(
                "{}: {} rows dropped for null or unmatched dimension keys",
                self.fact.name(),
                dropped_row_count
            );
        }

        Ok(GroupedResult {
            key_columns: plan.key_columns,
            measure_names: plan.measure_names,
            rows,
            dropped_row_count,
            scanned_row_count,
        })
    }
}

/// Group every row of `fact` by the joined attributes and reduce `measures` per group.
pub fn aggregate<'a>(
    fact: &'a ColumnarTable,
    joins: &[DimensionJoin<'a>],
    measures: &[MeasureSpec],
) -> OlapResult<GroupedResult> {
    let mut aggregator = GroupedAggregator::new(fact).measures(measures.iter().cloned());
    aggregator.joins.extend_from_slice(joins);
    aggregator.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use starschema_columnar::{ColumnSchema, ColumnarError, TableOptions, Value as ColumnarValue};

    fn table(name: &str, columns: Vec<(&str, ColumnType, Vec<ColumnarValue>)>) -> ColumnarTable {
        ColumnarTable::from_columns(
            name,
            columns
                .into_iter()
                .map(|(column, ty, values)| (ColumnSchema::new(column, ty), values))
                .collect(),
            TableOptions { page_size_rows: 2 },
        )
        .unwrap()
    }

    fn products() -> ColumnarTable {
        table(
            "dim_product",
            vec![
                ("product_key", ColumnType::Int64, vec![1.into(), 2.into()]),
                ("category", ColumnType::String, vec!["A".into(), "B".into()]),
            ],
        )
    }

    fn facts(keys: Vec<ColumnarValue>, sales: Vec<ColumnarValue>) -> ColumnarTable {
        table(
            "fact_sales",
            vec![
                ("product_key", ColumnType::Int64, keys),
                ("gross_sales", ColumnType::Float64, sales),
            ],
        )
    }

    #[test]
    fn unmatched_keys_are_dropped_and_counted() {
        let dim = products();
        let index = LookupIndex::build(&dim, "product_key", &["category"]).unwrap();
        let fact = facts(
            vec![1.into(), 2.into(), 99.into()],
            vec![10.0.into(), 20.0.into(), 5.0.into()],
        );

        let result = aggregate(
            &fact,
            &[DimensionJoin::new(&index, "product_key")],
            &[MeasureSpec::sum("gross_sales")],
        )
        .unwrap();

        assert_eq!(result.key_columns, vec!["dim_product[category]".to_string()]);
        assert_eq!(result.measure_names, vec!["sum_gross_sales".to_string()]);
        assert_eq!(
            result.rows,
            vec![
                GroupedRow {
                    key: vec![Value::from("A")],
                    values: vec![Value::from(10.0)],
                },
                GroupedRow {
                    key: vec![Value::from("B")],
                    values: vec![Value::from(20.0)],
                },
            ]
        );
        assert_eq!(result.dropped_row_count, 1);
        assert_eq!(result.scanned_row_count, 3);
    }

    #[test]
    fn null_foreign_keys_are_dropped() {
        let dim = products();
        let index = LookupIndex::build(&dim, "product_key", &["category"]).unwrap();
        let fact = facts(
            vec![ColumnarValue::Null, 1.into()],
            vec![1.0.into(), 2.0.into()],
        );
        let result = GroupedAggregator::new(&fact)
            .join(&index, "product_key")
            .measure(MeasureSpec::count_rows())
            .run()
            .unwrap();
        assert_eq!(result.dropped_row_count, 1);
        assert_eq!(result.get(0, "row_count"), Some(&Value::Int(1)));
    }

    #[test]
    fn float_foreign_keys_match_int_surrogates() {
        let dim = products();
        let index = LookupIndex::build(&dim, "product_key", &["category"]).unwrap();
        let fact = table(
            "fact_sales",
            vec![("product_key", ColumnType::Float64, vec![2.0.into(), 2.5.into()])],
        );
        let result = GroupedAggregator::new(&fact)
            .join(&index, "product_key")
            .measure(MeasureSpec::count_rows())
            .run()
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0].key, vec![Value::from("B")]);
        assert_eq!(result.dropped_row_count, 1);
    }

    #[test]
    fn empty_fact_table_yields_no_groups() {
        let dim = products();
        let index = LookupIndex::build(&dim, "product_key", &["category"]).unwrap();
        let fact = facts(vec![], vec![]);
        let result = aggregate(
            &fact,
            &[DimensionJoin::new(&index, "product_key")],
            &[MeasureSpec::sum("gross_sales")],
        )
        .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.dropped_row_count, 0);

        let totals = aggregate(&fact, &[], &[MeasureSpec::count_rows()]).unwrap();
        assert!(totals.is_empty());
    }

    #[test]
    fn zero_joins_produce_one_total_row() {
        let fact = facts(
            vec![1.into(), 2.into(), 3.into()],
            vec![1.5.into(), ColumnarValue::Null, 2.5.into()],
        );
        let result = aggregate(
            &fact,
            &[],
            &[
                MeasureSpec::sum("gross_sales"),
                MeasureSpec::count("gross_sales"),
                MeasureSpec::count_rows(),
                MeasureSpec::average("gross_sales"),
                MeasureSpec::min("gross_sales"),
                MeasureSpec::max("gross_sales"),
            ],
        )
        .unwrap();

        assert_eq!(
            result.rows,
            vec![GroupedRow {
                key: vec![],
                values: vec![
                    Value::from(4.0),
                    Value::Int(2),
                    Value::Int(3),
                    Value::from(2.0),
                    Value::from(1.5),
                    Value::from(2.5),
                ],
            }]
        );
    }

    #[test]
    fn nan_measures_are_skipped_like_nulls() {
        let fact = table(
            "fact_sales",
            vec![
                (
                    "gross_sales",
                    ColumnType::Float64,
                    vec![10.0.into(), f64::NAN.into(), 20.0.into()],
                ),
                (
                    "total_cost",
                    ColumnType::Float64,
                    vec![4.0.into(), 1.0.into(), f64::NAN.into()],
                ),
            ],
        );
        let result = aggregate(
            &fact,
            &[],
            &[
                MeasureSpec::sum("gross_sales"),
                MeasureSpec::average("gross_sales"),
                MeasureSpec::min("gross_sales"),
                MeasureSpec::max("gross_sales"),
                MeasureSpec::count("gross_sales"),
                MeasureSpec::count_distinct("gross_sales"),
                MeasureSpec::sum_ratio("gross_sales", "total_cost", 100.0),
            ],
        )
        .unwrap();

        assert_eq!(
            result.rows[0].values,
            vec![
                Value::from(30.0),
                Value::from(15.0),
                Value::from(10.0),
                Value::from(20.0),
                Value::Int(2),
                Value::Int(2),
                Value::from(600.0),
            ]
        );
    }

    #[test]
    fn int_sums_stay_exact() {
        let fact = table(
            "fact_sales",
            vec![(
                "quantity",
                ColumnType::Int64,
                vec![i64::MAX.into(), 1.into(), (-2).into()],
            )],
        );
        let result = aggregate(&fact, &[], &[MeasureSpec::sum("quantity")]).unwrap();
        assert_eq!(result.rows[0].values, vec![Value::Int(i64::MAX - 1)]);

        let overflow = table(
            "fact_sales",
            vec![("quantity", ColumnType::Int64, vec![i64::MAX.into(), 1.into()])],
        );
        let result = aggregate(&overflow, &[], &[MeasureSpec::sum("quantity")]).unwrap();
        assert_eq!(result.rows[0].values, vec![Value::from(i64::MAX as f64 + 1.0)]);
    }

    #[test]
    fn all_null_measures_are_null_not_zero() {
        let fact = facts(
            vec![1.into(), 1.into()],
            vec![ColumnarValue::Null, ColumnarValue::Null],
        );
        let result = aggregate(
            &fact,
            &[],
            &[
                MeasureSpec::sum("gross_sales"),
                MeasureSpec::count("gross_sales"),
                MeasureSpec::average("gross_sales"),
                MeasureSpec::min("gross_sales"),
                MeasureSpec::count_distinct("gross_sales"),
            ],
        )
        .unwrap();
        assert_eq!(
            result.rows[0].values,
            vec![
                Value::Null,
                Value::Int(0),
                Value::Null,
                Value::Null,
                Value::Int(0),
            ]
        );
    }

    #[test]
    fn ratio_is_null_on_zero_denominator() {
        let fact = table(
            "fact_sales",
            vec![
                (
                    "category",
                    ColumnType::String,
                    vec!["A".into(), "A".into(), "B".into()],
                ),
                ("profit", ColumnType::Float64, vec![5.0.into(), 5.0.into(), 1.0.into()]),
                (
                    "gross_sales",
                    ColumnType::Float64,
                    vec![40.0.into(), 60.0.into(), 0.0.into()],
                ),
            ],
        );
        let dim = table(
            "dim_category",
            vec![("category", ColumnType::String, vec!["A".into(), "B".into()])],
        );
        let index = LookupIndex::build(&dim, "category", &["category"]).unwrap();
        let result = aggregate(
            &fact,
            &[DimensionJoin::new(&index, "category")],
            &[MeasureSpec::sum_ratio("profit", "gross_sales", 100.0).with_name("margin_pct")],
        )
        .unwrap();

        assert_eq!(result.measure_names, vec!["margin_pct".to_string()]);
        assert_eq!(result.find(&[Value::from("A")]).unwrap().values, vec![Value::from(10.0)]);
        assert_eq!(result.find(&[Value::from("B")]).unwrap().values, vec![Value::Null]);
    }

    #[test]
    fn distinct_and_extremes_on_strings() {
        let fact = table(
            "fact_sales",
            vec![(
                "city",
                ColumnType::String,
                vec!["Oslo".into(), "Bergen".into(), "Oslo".into(), ColumnarValue::Null],
            )],
        );
        let result = aggregate(
            &fact,
            &[],
            &[
                MeasureSpec::count_distinct("city"),
                MeasureSpec::min("city"),
                MeasureSpec::max("city"),
            ],
        )
        .unwrap();
        assert_eq!(
            result.rows[0].values,
            vec![Value::Int(2), Value::from("Bergen"), Value::from("Oslo")]
        );
    }

    #[test]
    fn validation_errors() {
        let dim = products();
        let index = LookupIndex::build(&dim, "product_key", &["category"]).unwrap();
        let fact = facts(vec![1.into()], vec![1.0.into()]);

        assert_eq!(
            aggregate(
                &fact,
                &[],
                &[MeasureSpec::sum("gross_sales"), MeasureSpec::sum("gross_sales")],
            )
            .unwrap_err(),
            OlapError::DuplicateMeasure("sum_gross_sales".to_string())
        );

        assert!(matches!(
            aggregate(&fact, &[], &[MeasureSpec::sum("profit")]),
            Err(OlapError::Columnar(ColumnarError::ColumnNotFound { .. }))
        ));

        assert!(matches!(
            aggregate(
                &fact,
                &[DimensionJoin::new(&index, "customer_key")],
                &[MeasureSpec::count_rows()],
            ),
            Err(OlapError::Columnar(ColumnarError::ColumnNotFound { .. }))
        ));

        let text = table(
            "fact_sales",
            vec![("category", ColumnType::String, vec!["A".into()])],
        );
        assert_eq!(
            aggregate(&text, &[], &[MeasureSpec::average("category")]).unwrap_err(),
            OlapError::TypeMismatch {
                column: "category".to_string(),
                reduction: "average",
                actual: ColumnType::String,
            }
        );
    }

    #[test]
    fn mask_limits_the_scan() {
        let fact = facts(
            vec![1.into(), 2.into(), 1.into()],
            vec![10.0.into(), 20.0.into(), 30.0.into()],
        );
        let mask = BitVec::from_bools(&[true, false, true]);
        let result = GroupedAggregator::new(&fact)
            .measure(MeasureSpec::sum("gross_sales"))
            .filter(&mask)
            .run()
            .unwrap();
        assert_eq!(result.rows[0].values, vec![Value::from(40.0)]);
        assert_eq!(result.scanned_row_count, 2);
        assert_eq!(result.dropped_row_count, 0);

        let short = BitVec::with_len_all_true(2);
        assert!(matches!(
            GroupedAggregator::new(&fact)
                .measure(MeasureSpec::count_rows())
                .filter(&short)
                .run(),
            Err(OlapError::MaskLengthMismatch {
                expected: 3,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn partitioned_scan_matches_sequential() {
        let dim = products();
        let index = LookupIndex::build(&dim, "product_key", &["category"]).unwrap();
        let keys: Vec<ColumnarValue> = (0..64).map(|i| ColumnarValue::Int(i % 3)).collect();
        let sales: Vec<ColumnarValue> = (0..64).map(|i| ColumnarValue::Number(i as f64)).collect();
        let fact = facts(keys, sales);

        let build = || {
            GroupedAggregator::new(&fact)
                .join(&index, "product_key")
                .measures([
                    MeasureSpec::sum("gross_sales"),
                    MeasureSpec::count_rows(),
                    MeasureSpec::min("gross_sales"),
                    MeasureSpec::count_distinct("gross_sales"),
                ])
        };
        let sequential = build().run().unwrap();
        let parallel = build()
            .options(AggregateOptions {
                parallel: true,
                min_rows_per_partition: 8,
            })
            .run()
            .unwrap();

        assert_eq!(parallel, sequential);
        assert_eq!(sequential.dropped_row_count, 22);
    }
}
