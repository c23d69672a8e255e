use itertools::Itertools;
use rand::Rng;

#[inline]
pub(crate) fn logaddexp(a: f64, b: f64) -> f64 {
    if a == b {
        return a + 2f64.ln();
    }
    let diff = a - b;
    if diff > 0. {
        a + (-diff).exp().ln_1p()
    } else if diff < 0. {
        b + diff.exp().ln_1p()
    } else {
        // diff is NAN
        diff
    }
}

/// `ln(sum(exp(values)))` without overflow. Empty input gives `-inf`.
pub(crate) fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|&v| (v - max).exp()).sum::<f64>().ln()
}

/// `ln(1 - exp(x))` for `x < 0`.
#[inline]
pub(crate) fn log1mexp(x: f64) -> f64 {
    if x > -std::f64::consts::LN_2 {
        (-x.exp_m1()).ln()
    } else {
        (-x.exp()).ln_1p()
    }
}

/// Systematic resampling of weighted samples into `n` equally weighted indices.
///
/// `log_weights` need not be normalized. Indices come back sorted.
pub(crate) fn resample_equal<R: Rng + ?Sized>(
    rng: &mut R,
    log_weights: &[f64],
    n: usize,
) -> Vec<usize> {
    let norm = logsumexp(log_weights);
    if log_weights.is_empty() || !norm.is_finite() || n == 0 {
        return Vec::new();
    }
    let cumulative = log_weights
        .iter()
        .scan(0f64, |acc, &w| {
            *acc += (w - norm).exp();
            Some(*acc)
        })
        .collect_vec();

    let offset: f64 = rng.random();
    let mut indices = Vec::with_capacity(n);
    let mut j = 0;
    for i in 0..n {
        let position = (i as f64 + offset) / n as f64;
        while j + 1 < cumulative.len() && cumulative[j] < position {
            j += 1;
        }
        indices.push(j);
    }
    indices
}

/// Kish effective sample size of a set of log weights.
pub(crate) fn effective_sample_size(log_weights: &[f64]) -> f64 {
    let norm = logsumexp(log_weights);
    if !norm.is_finite() {
        return 0.;
    }
    let sum_sq: f64 = log_weights
        .iter()
        .map(|&w| (2. * (w - norm)).exp())
        .sum();
    1. / sum_sq
}
