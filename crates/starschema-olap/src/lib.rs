//! Star-schema aggregation over columnar tables.
//!
//! Dimension tables are indexed by surrogate key ([`LookupIndex`]); fact rows are resolved
//! through those indexes, grouped by the joined attributes and reduced per group
//! ([`GroupedAggregator`]). Results can be ordered and truncated with [`rank`] /
//! [`rank_by`]. [`StarSchema`] bundles the sales analyses built from these pieces.

#![forbid(unsafe_code)]

mod aggregate;
mod analysis;
mod config;
mod error;
mod lookup;
mod parallel;
mod rank;
mod value;

pub use crate::aggregate::{
    aggregate, AggregateOptions, DimensionJoin, GroupedAggregator, GroupedResult, GroupedRow,
    MeasureSpec, Reduction,
};
pub use crate::analysis::{
    HighValueSales, RegionTrend, SalesDistribution, SalesSummary, SchemaOverview, StarSchema,
    DISTRIBUTION_QUANTILES, HIGH_VALUE_THRESHOLD,
};
pub use crate::config::StarSchemaConfig;
pub use crate::error::{OlapError, OlapResult};
pub use crate::lookup::{DuplicateKeyPolicy, LookupIndex};
pub use crate::rank::{rank, rank_by, SortKey, SortOrder, SortSpec};
pub use crate::value::{cmp_key, cmp_value, Value};
