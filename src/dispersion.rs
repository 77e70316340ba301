//! Robust dispersion statistics shared by the temporal and volume analyzers.
//!
//! # Quartiles
//! Percentiles use linear interpolation between closest ranks: for sorted
//! values x₀..xₙ₋₁ the p-th percentile sits at rank r = p/100 · (n - 1) and is
//! x⌊r⌋ + (r - ⌊r⌋)(x⌈r⌉ - x⌊r⌋).
//!
//! # Bowley Skewness
//! (Q1 + Q3 - 2·Q2) / (Q3 - Q1), a quartile-based skew in [-1, 1]. Forced to
//! 0.0 when Q3 == Q1, Q2 == Q1 or Q2 == Q3.
//!
//! # MADM
//! median(|xᵢ - median(x)|), the median absolute deviation from the median.

use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics};

/// Quartile, skew and MADM summary for one series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Dispersion {
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
    pub bowley_skew: f64,
    pub madm: f64,
}

impl Dispersion {
    /// Summarizes a series. An empty series yields all zeros.
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let q1 = percentile(&sorted, 25.0);
        let q2 = percentile(&sorted, 50.0);
        let q3 = percentile(&sorted, 75.0);

        Self {
            q1,
            q2,
            q3,
            bowley_skew: bowley_skew(q1, q2, q3),
            madm: madm(values),
        }
    }
}

/// Linear-interpolation percentile of an ascending slice, `p` in [0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            sorted[lower] + frac * (sorted[upper] - sorted[lower])
        }
    }
}

/// Bowley skewness with guards for degenerate quartiles.
pub fn bowley_skew(q1: f64, q2: f64, q3: f64) -> f64 {
    if q3 == q1 || q2 == q1 || q2 == q3 {
        return 0.0;
    }
    (q1 + q3 - 2.0 * q2) / (q3 - q1)
}

/// Median absolute deviation from the median. Zero for an empty series.
pub fn madm(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Median of a non-empty series.
fn median(values: &[f64]) -> f64 {
    let mut data = Data::new(values.to_vec());
    data.median()
}
