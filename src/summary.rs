//! One dimensional summaries of equally weighted posterior samples.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Linear interpolation quantile of an ascending slice, `q` in `[0, 1]`.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0. ..=1.).contains(&q) {
        return None;
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let frac = position - lower as f64;
    Some(sorted[lower] + frac * (sorted[upper] - sorted[lower]))
}

fn sorted(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .copied()
        .filter(|x| !x.is_nan())
        .sorted_by(|a, b| a.total_cmp(b))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub key: String,
    pub mean: f64,
    /// Sample standard deviation (divides by `n - 1`).
    pub std: f64,
    pub median: f64,
    /// 5% quantile
    pub lower_90: f64,
    /// 95% quantile
    pub upper_90: f64,
}

impl ParameterSummary {
    /// Summarize a sample column. NaN entries are skipped.
    pub fn from_samples(key: impl Into<String>, values: &[f64]) -> Option<Self> {
        let sorted = sorted(values);
        if sorted.is_empty() {
            return None;
        }
        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let std = if sorted.len() > 1 {
            (sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.)).sqrt()
        } else {
            0.
        };
        Some(Self {
            key: key.into(),
            mean,
            std,
            median: quantile(&sorted, 0.5)?,
            lower_90: quantile(&sorted, 0.05)?,
            upper_90: quantile(&sorted, 0.95)?,
        })
    }
}

impl fmt::Display for ParameterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24} {:>12.4} +/- {:<10.4} median {:>12.4}  90% [{:.4}, {:.4}]",
            self.key, self.mean, self.std, self.median, self.lower_90, self.upper_90
        )
    }
}

/// Median with the distances to the 16% and 84% quantiles, `(median, minus, plus)`.
pub fn median_and_error_bar(values: &[f64]) -> Option<(f64, f64, f64)> {
    let sorted = sorted(values);
    let median = quantile(&sorted, 0.5)?;
    let low = quantile(&sorted, 0.16)?;
    let high = quantile(&sorted, 0.84)?;
    Some((median, median - low, high - median))
}

/// Equal width histogram, the data behind a marginal posterior plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// `counts.len() + 1` ascending bin edges
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// `None` when there are no finite values or `bins == 0`.
    pub fn new(values: &[f64], bins: usize) -> Option<Self> {
        let finite = values.iter().copied().filter(|x| x.is_finite()).collect_vec();
        if finite.is_empty() || bins == 0 {
            return None;
        }
        let (min, max) = match finite.iter().copied().minmax().into_option() {
            Some((min, max)) if max > min => (min, max),
            Some((min, _)) => (min - 0.5, min + 0.5),
            None => return None,
        };
        let width = (max - min) / bins as f64;
        let edges = (0..=bins).map(|i| min + i as f64 * width).collect_vec();
        let mut counts = vec![0; bins];
        for x in finite {
            let idx = (((x - min) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }
        Some(Self { edges, counts })
    }

    /// Counts normalized so the histogram integrates to one.
    pub fn density(&self) -> Vec<f64> {
        let total: usize = self.counts.iter().sum();
        self.counts
            .iter()
            .zip(self.edges.iter().tuple_windows())
            .map(|(&count, (low, high))| count as f64 / (total as f64 * (high - low)))
            .collect()
    }
}
