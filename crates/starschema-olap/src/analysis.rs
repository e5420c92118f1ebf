//! Canned analyses over the sales star schema.
//!
//! Each analysis is a composition of the core pieces: lookup indexes for the dimensions it
//! touches, one grouped aggregation (or a filtered/statistical reduction) and an ordering.

use crate::aggregate::{AggregateOptions, GroupedAggregator, GroupedResult, MeasureSpec};
use crate::config::StarSchemaConfig;
use crate::error::{OlapError, OlapResult};
use crate::lookup::LookupIndex;
use crate::rank::{rank_by, SortOrder, SortSpec};
use crate::value::Value;
use starschema_columnar::{
    filter_mask, reduce_statistics, BitVec, CmpOp, ColumnView, ColumnarTable, FilterValue,
    StatisticalReducer, Statistics,
};

/// Quantiles reported by [`StarSchema::sales_distribution`].
pub const DISTRIBUTION_QUANTILES: [f64; 5] = [0.25, 0.5, 0.75, 0.95, 0.99];

/// Default cut-off for [`StarSchema::high_value_sales`].
pub const HIGH_VALUE_THRESHOLD: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchemaOverview {
    pub sales_records: usize,
    pub time_periods: usize,
    pub geographies: usize,
    pub products: usize,
    pub customers: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SalesSummary {
    pub transactions: usize,
    pub total_quantity: Option<f64>,
    pub total_sales: Option<f64>,
    pub total_cost: Option<f64>,
    pub total_profit: Option<f64>,
    pub average_sale: Option<f64>,
    pub min_sale: Option<f64>,
    pub max_sale: Option<f64>,
    /// `sum(profit) / sum(gross_sales) * 100`.
    pub margin_pct: Option<f64>,
    /// Mean of the per-row `profit / gross_sales * 100`, skipping rows with zero sales.
    pub average_transaction_margin_pct: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HighValueSales {
    pub threshold: f64,
    /// Rows with a non-null sale amount.
    pub total_records: usize,
    pub high_value_records: usize,
    pub high_value_pct: Option<f64>,
    pub high_value_sales: f64,
    pub high_value_profit: f64,
    /// Share of all sales carried by the high-value rows, in percent.
    pub share_of_sales_pct: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SalesDistribution {
    /// Includes the [`DISTRIBUTION_QUANTILES`].
    pub gross_sales: Statistics,
    /// Mean of the per-row `profit / quantity`, skipping rows with zero quantity.
    pub average_profit_per_item: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegionTrend {
    pub region: Value,
    /// Keyed by `(year, month)`, oldest first.
    pub months: GroupedResult,
}

/// The fact table and its four dimensions, resolved by name.
#[derive(Clone, Debug)]
pub struct StarSchema<'a> {
    fact: &'a ColumnarTable,
    time: &'a ColumnarTable,
    geography: &'a ColumnarTable,
    product: &'a ColumnarTable,
    customer: &'a ColumnarTable,
    config: StarSchemaConfig,
    options: AggregateOptions,
}

fn percent(part: f64, whole: f64) -> Option<f64> {
    (whole != 0.0).then(|| part / whole * 100.0)
}

/// Mean of the row-wise ratio `numerator / denominator`, skipping nulls and zero denominators.
fn mean_of_ratios(numerator: &ColumnView<'_>, denominator: &ColumnView<'_>) -> Option<f64> {
    let ratios = (0..numerator.len()).map(|row| {
        match (numerator.get_f64(row), denominator.get_f64(row)) {
            (Some(n), Some(d)) if d != 0.0 => Some(n / d),
            _ => None,
        }
    });
    StatisticalReducer::default().reduce(ratios).mean
}

/// Keep the `limit` greatest keys, returned in ascending key order.
fn latest(mut result: GroupedResult, limit: usize) -> OlapResult<GroupedResult> {
    let specs: Vec<SortSpec> = (0..result.key_columns.len())
        .map(|position| SortSpec::key(position, SortOrder::Descending))
        .collect();
    let mut rows = rank_by(&result, &specs, Some(limit))?;
    rows.reverse();
    result.rows = rows;
    Ok(result)
}

impl<'a> StarSchema<'a> {
    /// Pick the fact and dimension tables out of `tables` by the names in `config`.
    pub fn from_tables(tables: &[&'a ColumnarTable], config: StarSchemaConfig) -> OlapResult<Self> {
        let find = |name: &str| {
            tables
                .iter()
                .copied()
                .find(|table| table.name() == name)
                .ok_or_else(|| OlapError::UnknownTable(name.to_string()))
        };
        let fact = find(config.fact_table.as_str())?;
        let time = find(config.time_table.as_str())?;
        let geography = find(config.geography_table.as_str())?;
        let product = find(config.product_table.as_str())?;
        let customer = find(config.customer_table.as_str())?;

        Ok(Self {
            fact,
            time,
            geography,
            product,
            customer,
            config,
            options: AggregateOptions::default(),
        })
    }

    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &StarSchemaConfig {
        &self.config
    }

    fn numeric_column(&self, name: &str, reduction: &'static str) -> OlapResult<ColumnView<'a>> {
        let column = self.fact.column(name)?;
        if !column.column_type().is_numeric() {
            return Err(OlapError::TypeMismatch {
                column: name.to_string(),
                reduction,
                actual: column.column_type(),
            });
        }
        Ok(column)
    }

    fn time_index(&self, attributes: &[&str]) -> OlapResult<LookupIndex> {
        LookupIndex::build(self.time, &self.config.date_key, attributes)
    }

    fn geography_index(&self, attributes: &[&str]) -> OlapResult<LookupIndex> {
        LookupIndex::build(self.geography, &self.config.geography_key, attributes)
    }

    fn product_index(&self, attributes: &[&str]) -> OlapResult<LookupIndex> {
        LookupIndex::build(self.product, &self.config.product_key, attributes)
    }

    fn customer_index(&self, attributes: &[&str]) -> OlapResult<LookupIndex> {
        LookupIndex::build(self.customer, &self.config.customer_key, attributes)
    }

    /// Run one grouped aggregation and order its rows.
    fn grouped(
        &self,
        joins: &[(&LookupIndex, &str)],
        measures: Vec<MeasureSpec>,
        order: &[SortSpec],
        limit: Option<usize>,
    ) -> OlapResult<GroupedResult> {
        let mut aggregator = GroupedAggregator::new(self.fact)
            .options(self.options)
            .measures(measures);
        for &(index, foreign_key) in joins {
            aggregator = aggregator.join(index, foreign_key);
        }
        let mut result = aggregator.run()?;
        result.rows = rank_by(&result, order, limit)?;
        Ok(result)
    }

    pub fn overview(&self) -> SchemaOverview {
        SchemaOverview {
            sales_records: self.fact.row_count(),
            time_periods: self.time.row_count(),
            geographies: self.geography.row_count(),
            products: self.product.row_count(),
            customers: self.customer.row_count(),
        }
    }

    /// Whole-table totals, averages and margins.
    pub fn sales_summary(&self) -> OlapResult<SalesSummary> {
        let c = &self.config;
        let totals = GroupedAggregator::new(self.fact)
            .options(self.options)
            .measures([
                MeasureSpec::sum(&c.quantity).with_name("quantity"),
                MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"),
                MeasureSpec::sum(&c.total_cost).with_name("total_cost"),
                MeasureSpec::sum(&c.profit).with_name("profit"),
                MeasureSpec::average(&c.gross_sales).with_name("average_sale"),
                MeasureSpec::min(&c.gross_sales).with_name("min_sale"),
                MeasureSpec::max(&c.gross_sales).with_name("max_sale"),
                MeasureSpec::sum_ratio(&c.profit, &c.gross_sales, 100.0).with_name("margin_pct"),
            ])
            .run()?;
        let number = |name: &str| totals.get(0, name).and_then(Value::as_f64);

        let profit = self.numeric_column(&c.profit, "ratio")?;
        let sales = self.numeric_column(&c.gross_sales, "ratio")?;

        Ok(SalesSummary {
            transactions: totals.scanned_row_count,
            total_quantity: number("quantity"),
            total_sales: number("gross_sales"),
            total_cost: number("total_cost"),
            total_profit: number("profit"),
            average_sale: number("average_sale"),
            min_sale: number("min_sale"),
            max_sale: number("max_sale"),
            margin_pct: number("margin_pct"),
            average_transaction_margin_pct: mean_of_ratios(&profit, &sales).map(|m| m * 100.0),
        })
    }

    /// Rows whose sale amount is strictly greater than `threshold`.
    pub fn high_value_sales(&self, threshold: f64) -> OlapResult<HighValueSales> {
        let c = &self.config;
        let sales = self.numeric_column(&c.gross_sales, "sum")?;
        let mask = filter_mask(&sales, CmpOp::Gt, &FilterValue::Number(threshold))?;

        let high = GroupedAggregator::new(self.fact)
            .options(self.options)
            .filter(&mask)
            .measures([
                MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"),
                MeasureSpec::sum(&c.profit).with_name("profit"),
            ])
            .run()?;
        let number = |name: &str| high.get(0, name).and_then(Value::as_f64).unwrap_or(0.0);

        let all = StatisticalReducer::default().reduce(sales.iter_f64());
        let total_records = all.count as usize;
        let high_value_records = mask.count_ones();
        let high_value_sales = number("gross_sales");

        Ok(HighValueSales {
            threshold,
            total_records,
            high_value_records,
            high_value_pct: percent(high_value_records as f64, total_records as f64),
            high_value_sales,
            high_value_profit: number("profit"),
            share_of_sales_pct: percent(high_value_sales, all.sum),
        })
    }

    /// Distribution of sale amounts plus average profit per item.
    pub fn sales_distribution(&self) -> OlapResult<SalesDistribution> {
        let c = &self.config;
        let gross_sales = reduce_statistics(&self.fact.column(&c.gross_sales)?, &DISTRIBUTION_QUANTILES)?;
        let profit = self.numeric_column(&c.profit, "ratio")?;
        let quantity = self.numeric_column(&c.quantity, "ratio")?;

        Ok(SalesDistribution {
            gross_sales,
            average_profit_per_item: mean_of_ratios(&profit, &quantity),
        })
    }

    /// Sales, profit and unique customers per customer type, biggest sales first.
    pub fn customer_segments(&self) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let customers = self.customer_index(&[c.customer_type.as_str()])?;
        self.grouped(
            &[(&customers, c.customer_key.as_str())],
            vec![
                MeasureSpec::sum(&c.gross_sales).with_name("total_sales"),
                MeasureSpec::average(&c.gross_sales).with_name("avg_sales_per_order"),
                MeasureSpec::sum(&c.profit).with_name("total_profit"),
                MeasureSpec::average(&c.profit).with_name("avg_profit_per_order"),
                MeasureSpec::count_distinct(&c.customer_key).with_name("unique_customers"),
                MeasureSpec::count_rows().with_name("orders"),
            ],
            &[SortSpec::measure("total_sales", SortOrder::Descending)],
            None,
        )
    }

    /// Sales per (region, category), regions ascending and sales descending within a region.
    pub fn region_by_category(&self) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let regions = self.geography_index(&[c.region.as_str()])?;
        let categories = self.product_index(&[c.category.as_str()])?;
        self.grouped(
            &[(&regions, c.geography_key.as_str()), (&categories, c.product_key.as_str())],
            vec![
                MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"),
                MeasureSpec::sum(&c.profit).with_name("profit"),
                MeasureSpec::count_rows().with_name("transactions"),
            ],
            &[
                SortSpec::key(0, SortOrder::Ascending),
                SortSpec::measure("gross_sales", SortOrder::Descending),
            ],
            None,
        )
    }

    pub fn sales_by_year(&self) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let years = self.time_index(&[c.year.as_str()])?;
        self.grouped(
            &[(&years, c.date_key.as_str())],
            vec![
                MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"),
                MeasureSpec::sum(&c.profit).with_name("profit"),
                MeasureSpec::sum(&c.quantity).with_name("quantity"),
            ],
            &[SortSpec::key(0, SortOrder::Ascending)],
            None,
        )
    }

    /// The most recent `quarters` (year, quarter) groups, oldest first.
    pub fn sales_by_quarter(&self, quarters: usize) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let periods = self.time_index(&[c.year.as_str(), c.quarter.as_str()])?;
        let result = self.grouped(
            &[(&periods, c.date_key.as_str())],
            vec![
                MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"),
                MeasureSpec::sum(&c.profit).with_name("profit"),
            ],
            &[],
            None,
        )?;
        latest(result, quarters)
    }

    pub fn weekend_vs_weekday(&self) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let day_types = self.time_index(&[c.is_weekend.as_str()])?;
        self.grouped(
            &[(&day_types, c.date_key.as_str())],
            vec![
                MeasureSpec::sum(&c.gross_sales).with_name("total_sales"),
                MeasureSpec::average(&c.gross_sales).with_name("avg_sales"),
                MeasureSpec::sum(&c.quantity).with_name("total_quantity"),
                MeasureSpec::average(&c.quantity).with_name("avg_quantity"),
            ],
            &[SortSpec::key(0, SortOrder::Ascending)],
            None,
        )
    }

    pub fn sales_by_region(&self) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let regions = self.geography_index(&[c.region.as_str()])?;
        self.grouped(
            &[(&regions, c.geography_key.as_str())],
            vec![
                MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"),
                MeasureSpec::sum(&c.profit).with_name("profit"),
                MeasureSpec::sum(&c.quantity).with_name("quantity"),
            ],
            &[SortSpec::measure("gross_sales", SortOrder::Descending)],
            None,
        )
    }

    pub fn top_countries(&self, limit: usize) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let countries = self.geography_index(&[c.country.as_str()])?;
        self.grouped(
            &[(&countries, c.geography_key.as_str())],
            vec![
                MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"),
                MeasureSpec::sum(&c.profit).with_name("profit"),
            ],
            &[SortSpec::measure("gross_sales", SortOrder::Descending)],
            Some(limit),
        )
    }

    pub fn sales_by_category(&self) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let categories = self.product_index(&[c.category.as_str()])?;
        self.grouped(
            &[(&categories, c.product_key.as_str())],
            vec![
                MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"),
                MeasureSpec::sum(&c.profit).with_name("profit"),
                MeasureSpec::sum(&c.quantity).with_name("quantity"),
            ],
            &[SortSpec::measure("gross_sales", SortOrder::Descending)],
            None,
        )
    }

    /// `sum(profit) / sum(gross_sales) * 100` per category, best margin first.
    pub fn category_margins(&self) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let categories = self.product_index(&[c.category.as_str()])?;
        self.grouped(
            &[(&categories, c.product_key.as_str())],
            vec![MeasureSpec::sum_ratio(&c.profit, &c.gross_sales, 100.0)
                .with_name("profit_margin_pct")],
            &[SortSpec::measure("profit_margin_pct", SortOrder::Descending)],
            None,
        )
    }

    pub fn top_products(&self, limit: usize) -> OlapResult<GroupedResult> {
        let c = &self.config;
        let products = self.product_index(&[c.product_name.as_str()])?;
        self.grouped(
            &[(&products, c.product_key.as_str())],
            vec![
                MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"),
                MeasureSpec::sum(&c.quantity).with_name("quantity"),
            ],
            &[SortSpec::measure("gross_sales", SortOrder::Descending)],
            Some(limit),
        )
    }

    /// Monthly sales of the region with the highest total sales, for its latest `months`
    /// (year, month) groups. `None` when no fact row resolves to a region.
    pub fn top_region_monthly_trend(&self, months: usize) -> OlapResult<Option<RegionTrend>> {
        let c = &self.config;
        let regions = self.sales_by_region()?;
        let Some(region) = regions.rows.first().and_then(|row| row.key.first()).cloned() else {
            return Ok(None);
        };

        let geography = self.geography_index(&[c.region.as_str()])?;
        let foreign_keys = self.fact.column(&c.geography_key)?;
        let mut mask = BitVec::with_capacity_bits(foreign_keys.len());
        for row in 0..foreign_keys.len() {
            let attributes = geography.get(&Value::key_from(foreign_keys.get(row)));
            mask.push(attributes.and_then(|attrs| attrs.first()) == Some(&region));
        }

        let periods = self.time_index(&[c.year.as_str(), c.month.as_str()])?;
        let trend = GroupedAggregator::new(self.fact)
            .options(self.options)
            .filter(&mask)
            .join(&periods, c.date_key.as_str())
            .measure(MeasureSpec::sum(&c.gross_sales).with_name("gross_sales"))
            .run()?;

        Ok(Some(RegionTrend {
            region,
            months: latest(trend, months)?,
        }))
    }
}
