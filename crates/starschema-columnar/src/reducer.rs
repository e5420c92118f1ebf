#![forbid(unsafe_code)]

//! Whole-column statistics: sum, mean, population variance, min/max and
//! linearly interpolated quantiles.

use crate::error::{ColumnarError, ColumnarResult};
use crate::table::ColumnView;

/// Neumaier-compensated running sum. The error bound does not grow with the number of
/// additions.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn merge(&mut self, other: &CompensatedSum) {
        self.add(other.sum);
        self.add(other.compensation);
    }

    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Welford's online mean/variance state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quantile {
    pub probability: f64,
    /// `None` when the input had no eligible values.
    pub value: Option<f64>,
}

/// Result of [`StatisticalReducer::reduce`].
///
/// Everything except `count` and `sum` is `None` when no eligible value was seen, so an
/// undefined statistic can never be confused with a legitimate zero.
#[derive(Clone, Debug, PartialEq)]
pub struct Statistics {
    pub count: u64,
    pub sum: f64,
    pub mean: Option<f64>,
    /// Population variance (divisor `n`).
    pub variance: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub quantiles: Vec<Quantile>,
    m2: f64,
}

impl Statistics {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Look up a requested quantile by probability.
    pub fn quantile(&self, probability: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|q| q.probability == probability)
            .and_then(|q| q.value)
    }

    /// Sample variance (divisor `n - 1`); undefined below two values.
    pub fn sample_variance(&self) -> Option<f64> {
        (self.count >= 2).then(|| self.m2 / (self.count - 1) as f64)
    }
}

/// Computes [`Statistics`] for a requested list of quantile probabilities.
#[derive(Clone, Debug, Default)]
pub struct StatisticalReducer {
    probabilities: Vec<f64>,
}

impl StatisticalReducer {
    pub fn new(probabilities: &[f64]) -> ColumnarResult<Self> {
        for &p in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(ColumnarError::InvalidQuantile(p));
            }
        }
        Ok(Self {
            probabilities: probabilities.to_vec(),
        })
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Reduce a sequence of optional values. `None` and NaN entries are skipped.
    pub fn reduce<I>(&self, values: I) -> Statistics
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let mut welford = Welford::default();
        let mut sum = CompensatedSum::new();
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let keep_values = !self.probabilities.is_empty();
        let mut sorted = Vec::new();

        for value in values.into_iter().flatten() {
            if value.is_nan() {
                continue;
            }
            welford.update(value);
            sum.add(value);
            min = Some(min.map_or(value, |m| m.min(value)));
            max = Some(max.map_or(value, |m| m.max(value)));
            if keep_values {
                sorted.push(value);
            }
        }

        sorted.sort_unstable_by(f64::total_cmp);
        let quantiles = self
            .probabilities
            .iter()
            .map(|&probability| Quantile {
                probability,
                value: interpolate(&sorted, probability),
            })
            .collect();

        let defined = welford.count > 0;
        let variance = defined.then(|| welford.m2 / welford.count as f64);
        Statistics {
            count: welford.count,
            sum: sum.value(),
            mean: defined.then_some(welford.mean),
            variance,
            std_dev: variance.map(f64::sqrt),
            min,
            max,
            quantiles,
            m2: welford.m2,
        }
    }

    /// Reduce a numeric column. Non-numeric columns are rejected.
    pub fn reduce_column(&self, column: &ColumnView<'_>) -> ColumnarResult<Statistics> {
        if !column.column_type().is_numeric() {
            return Err(ColumnarError::TypeMismatch {
                column: column.name().to_string(),
                expected: "numeric",
                actual: column.column_type(),
            });
        }
        Ok(self.reduce(column.iter_f64()))
    }
}

/// Linear interpolation between the two order statistics bracketing `(n - 1) * p`.
fn interpolate(sorted: &[f64], probability: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let h = last as f64 * probability;
    let lo = h.floor() as usize;
    let hi = (h.ceil() as usize).min(last);
    let (a, b) = (sorted[lo], sorted[hi]);
    if lo == hi {
        return Some(a);
    }
    Some(a + (h - lo as f64) * (b - a))
}

/// Convenience wrapper: statistics plus the requested quantiles for one column.
pub fn reduce_statistics(
    column: &ColumnView<'_>,
    probabilities: &[f64],
) -> ColumnarResult<Statistics> {
    StatisticalReducer::new(probabilities)?.reduce_column(column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce(values: &[f64], probabilities: &[f64]) -> Statistics {
        StatisticalReducer::new(probabilities)
            .unwrap()
            .reduce(values.iter().copied().map(Some))
    }

    #[test]
    fn mean_variance_and_median() {
        let stats = reduce(&[100.0, 200.0, 300.0], &[0.5]);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.sum, 600.0);
        assert_eq!(stats.mean, Some(200.0));
        let variance = stats.variance.unwrap();
        assert!((variance - 6666.666_666_666_667).abs() < 1e-6);
        assert!((stats.std_dev.unwrap() - variance.sqrt()).abs() < 1e-12);
        assert_eq!(stats.quantile(0.5), Some(200.0));
        assert_eq!(stats.min, Some(100.0));
        assert_eq!(stats.max, Some(300.0));
    }

    #[test]
    fn identical_values_have_zero_variance_at_any_magnitude() {
        for a in [1.0, 1e9, 123_456_789.123, 1e15 + 0.5] {
            let stats = reduce(&[a, a], &[]);
            assert_eq!(stats.variance, Some(0.0), "a = {a}");
            assert_eq!(stats.std_dev, Some(0.0));
        }
    }

    #[test]
    fn quantile_endpoints_and_interpolation() {
        let stats = reduce(&[4.0, 1.0, 3.0, 2.0], &[0.0, 0.25, 0.5, 1.0]);
        assert_eq!(stats.quantile(0.0), Some(1.0));
        assert_eq!(stats.quantile(0.25), Some(1.75));
        assert_eq!(stats.quantile(0.5), Some(2.5));
        assert_eq!(stats.quantile(1.0), Some(4.0));
    }

    #[test]
    fn empty_input_is_undefined_not_zero() {
        let stats = StatisticalReducer::new(&[0.5])
            .unwrap()
            .reduce([None, None]);
        assert!(stats.is_empty());
        assert_eq!(stats.sum, 0.0);
        assert_eq!(stats.mean, None);
        assert_eq!(stats.variance, None);
        assert_eq!(stats.std_dev, None);
        assert_eq!(stats.min, None);
        assert_eq!(stats.quantile(0.5), None);
    }

    #[test]
    fn nulls_and_nan_are_excluded() {
        let stats = StatisticalReducer::new(&[])
            .unwrap()
            .reduce([Some(1.0), None, Some(f64::NAN), Some(3.0)]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, Some(2.0));
    }

    #[test]
    fn sample_variance_needs_two_values() {
        assert_eq!(reduce(&[5.0], &[]).sample_variance(), None);
        assert_eq!(reduce(&[1.0, 3.0], &[]).sample_variance(), Some(2.0));
    }

    #[test]
    fn rejects_out_of_range_probabilities() {
        assert_eq!(
            StatisticalReducer::new(&[0.5, 1.5]).unwrap_err(),
            ColumnarError::InvalidQuantile(1.5)
        );
        assert!(StatisticalReducer::new(&[f64::NAN]).is_err());
    }

    #[test]
    fn compensated_sum_keeps_small_addends() {
        let mut sum = CompensatedSum::new();
        sum.add(1e16);
        for _ in 0..10 {
            sum.add(1.0);
        }
        sum.add(-1e16);
        assert_eq!(sum.value(), 10.0);
    }
}
