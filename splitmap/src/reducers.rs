//! Ready-made reductions of numeric columns over the rows of a split map.
//!
//! All reducers visit the rows of the filter key by key in parallel and skip rows whose column
//! page is absent. The filter and the columns must share their key layout.
use roaring::RoaringBitmap;

use crate::{column::DoubleColumn, partition::FairRangePartitioner, split_map::SplitMap};

fn check_layouts(filter: &SplitMap, columns: &[&DoubleColumn]) {
    assert!(
        columns.iter().all(|column| column.layout() == filter.layout()),
        "filter and columns use different key layouts"
    );
}

/// Sums the values of `column` over the rows of `filter`.
///
/// # Panics
/// Panics when the filter and the column use different key layouts.
pub fn sum(
    filter: &SplitMap,
    column: &DoubleColumn,
    partitioner: impl Into<FairRangePartitioner>,
) -> f64 {
    check_layouts(filter, &[column]);
    filter.index().reduce(
        partitioner,
        0.0,
        |key, rows: &RoaringBitmap| match column.page(key) {
            Some(values) => rows.iter().map(|low| values[low as usize]).sum(),
            None => 0.0,
        },
        |a, b| a + b,
    )
}

/// Sums the products of `x` and `y` over the rows of `filter`.
///
/// # Panics
/// Panics when the filter and the columns use different key layouts.
pub fn sum_product(
    filter: &SplitMap,
    x: &DoubleColumn,
    y: &DoubleColumn,
    partitioner: impl Into<FairRangePartitioner>,
) -> f64 {
    check_layouts(filter, &[x, y]);
    filter.index().reduce(
        partitioner,
        0.0,
        |key, rows: &RoaringBitmap| match (x.page(key), y.page(key)) {
            (Some(x), Some(y)) => rows
                .iter()
                .map(|low| x[low as usize] * y[low as usize])
                .sum(),
            _ => 0.0,
        },
        |a, b| a + b,
    )
}

/// Sufficient statistics for the correlation of two variables.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct CorrelationStats {
    /// Sum of `x`.
    pub sum_x: f64,
    /// Sum of `y`.
    pub sum_y: f64,
    /// Sum of `x²`.
    pub sum_xx: f64,
    /// Sum of `y²`.
    pub sum_yy: f64,
    /// Sum of `x·y`.
    pub sum_xy: f64,
    /// Number of observations.
    pub count: f64,
}

impl CorrelationStats {
    /// Adds an observation.
    #[inline]
    pub fn push(&mut self, x: f64, y: f64) {
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xx += x * x;
        self.sum_yy += y * y;
        self.sum_xy += x * y;
        self.count += 1.0;
    }

    /// Combines the statistics of two disjoint sets of observations.
    pub fn merge(self, other: Self) -> Self {
        Self {
            sum_x: self.sum_x + other.sum_x,
            sum_y: self.sum_y + other.sum_y,
            sum_xx: self.sum_xx + other.sum_xx,
            sum_yy: self.sum_yy + other.sum_yy,
            sum_xy: self.sum_xy + other.sum_xy,
            count: self.count + other.count,
        }
    }

    /// Returns `[Σx, Σy, Σx², Σy², Σxy, n]`.
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.sum_x,
            self.sum_y,
            self.sum_xx,
            self.sum_yy,
            self.sum_xy,
            self.count,
        ]
    }

    /// Returns the product-moment correlation coefficient.
    ///
    /// This is `NaN` for fewer than two observations or when a variable is constant.
    pub fn pmcc(&self) -> f64 {
        let n = self.count;
        let covariance = n * self.sum_xy - self.sum_x * self.sum_y;
        let variance_x = n * self.sum_xx - self.sum_x * self.sum_x;
        let variance_y = n * self.sum_yy - self.sum_y * self.sum_y;
        covariance / (variance_x * variance_y).sqrt()
    }
}

impl Extend<(f64, f64)> for CorrelationStats {
    fn extend<I: IntoIterator<Item = (f64, f64)>>(&mut self, observations: I) {
        for (x, y) in observations {
            self.push(x, y);
        }
    }
}

/// Collects the correlation statistics of `x` and `y` over the rows of `filter`.
///
/// # Panics
/// Panics when the filter and the columns use different key layouts.
pub fn correlation_stats(
    filter: &SplitMap,
    x: &DoubleColumn,
    y: &DoubleColumn,
    partitioner: impl Into<FairRangePartitioner>,
) -> CorrelationStats {
    check_layouts(filter, &[x, y]);
    filter.index().fold_with(
        partitioner,
        CorrelationStats::default(),
        |stats, key, rows: &RoaringBitmap| {
            if let (Some(x), Some(y)) = (x.page(key), y.page(key)) {
                stats.extend(
                    rows.iter()
                        .map(|low| (x[low as usize], y[low as usize])),
                );
            }
        },
        CorrelationStats::merge,
    )
}
