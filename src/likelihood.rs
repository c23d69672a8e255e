//! Likelihood functions.
//!
//! A likelihood reads the values it needs out of a [`Parameters`] map and
//! returns a log-likelihood. It is evaluated for every sampler proposal, so
//! it must return a number (possibly `-inf`) for any input instead of
//! panicking.

use std::f64::consts::TAU;
use std::fmt::Debug;

use crate::parameters::Parameters;

pub trait Likelihood: Send + Sync {
    /// Names of the parameters [`Likelihood::log_likelihood`] reads.
    fn parameter_keys(&self) -> Vec<String>;

    fn log_likelihood(&self, parameters: &Parameters) -> f64;

    /// Log-likelihood of the data under the noise-only hypothesis, if defined.
    fn noise_log_likelihood(&self) -> Option<f64> {
        None
    }

    fn log_likelihood_ratio(&self, parameters: &Parameters) -> Option<f64> {
        self.noise_log_likelihood()
            .map(|noise| self.log_likelihood(parameters) - noise)
    }
}

/// Independent Gaussian observations with unknown mean and standard deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianLikelihood {
    data: Vec<f64>,
    mu_key: String,
    sigma_key: String,
}

impl GaussianLikelihood {
    /// Reads the mean from `mu` and the standard deviation from `sigma`.
    pub fn new(data: Vec<f64>) -> Self {
        Self::with_keys(data, "mu", "sigma")
    }

    pub fn with_keys(data: Vec<f64>, mu_key: impl Into<String>, sigma_key: impl Into<String>) -> Self {
        Self {
            data,
            mu_key: mu_key.into(),
            sigma_key: sigma_key.into(),
        }
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Sum of per-sample Gaussian log densities.
    ///
    /// Returns `-inf` unless `sigma` is positive and finite.
    pub fn evaluate(&self, mu: f64, sigma: f64) -> f64 {
        if !(sigma > 0. && sigma.is_finite()) || mu.is_nan() {
            return f64::NEG_INFINITY;
        }
        let n = self.data.len() as f64;
        let residual_sum: f64 = self.data.iter().map(|x| (x - mu).powi(2)).sum();
        -n * (sigma.ln() + 0.5 * TAU.ln()) - residual_sum / (2. * sigma * sigma)
    }

    /// Closed form maximum: the sample mean and the biased standard deviation.
    ///
    /// `None` for empty data.
    pub fn maximum_likelihood_estimate(&self) -> Option<(f64, f64)> {
        if self.data.is_empty() {
            return None;
        }
        let n = self.data.len() as f64;
        let mean = self.data.iter().sum::<f64>() / n;
        let variance = self.data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        Some((mean, variance.sqrt()))
    }
}

impl Likelihood for GaussianLikelihood {
    fn parameter_keys(&self) -> Vec<String> {
        vec![self.mu_key.clone(), self.sigma_key.clone()]
    }

    fn log_likelihood(&self, parameters: &Parameters) -> f64 {
        match (parameters.get(&self.mu_key), parameters.get(&self.sigma_key)) {
            (Some(mu), Some(sigma)) => self.evaluate(mu, sigma),
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Wraps a closure as a [`Likelihood`].
#[derive(Clone)]
pub struct FnLikelihood<F> {
    keys: Vec<String>,
    func: F,
    noise_log_likelihood: Option<f64>,
}

impl<F> FnLikelihood<F>
where
    F: Fn(&Parameters) -> f64 + Send + Sync,
{
    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = S>, func: F) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            func,
            noise_log_likelihood: None,
        }
    }

    pub fn with_noise_log_likelihood(mut self, value: f64) -> Self {
        self.noise_log_likelihood = Some(value);
        self
    }
}

impl<F> Debug for FnLikelihood<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnLikelihood")
            .field("keys", &self.keys)
            .field("noise_log_likelihood", &self.noise_log_likelihood)
            .finish_non_exhaustive()
    }
}

impl<F> Likelihood for FnLikelihood<F>
where
    F: Fn(&Parameters) -> f64 + Send + Sync,
{
    fn parameter_keys(&self) -> Vec<String> {
        self.keys.clone()
    }

    fn log_likelihood(&self, parameters: &Parameters) -> f64 {
        (self.func)(parameters)
    }

    fn noise_log_likelihood(&self) -> Option<f64> {
        self.noise_log_likelihood
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn draws(mu: f64, sigma: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let normal = Normal::new(mu, sigma).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    fn params(mu: f64, sigma: f64) -> Parameters {
        Parameters::from([("mu", mu), ("sigma", sigma)])
    }

    #[test]
    fn matches_per_sample_formula() {
        let data = vec![1.0, 2.5, -0.5];
        let likelihood = GaussianLikelihood::new(data.clone());
        let (mu, sigma): (f64, f64) = (0.7, 1.3);
        let expected: f64 = data
            .iter()
            .map(|x| -sigma.ln() - 0.5 * TAU.ln() - (x - mu).powi(2) / (2. * sigma * sigma))
            .sum();
        assert_relative_eq!(likelihood.log_likelihood(&params(mu, sigma)), expected, epsilon = 1e-12);
    }

    #[test]
    fn truth_beats_distant_parameters() {
        let likelihood = GaussianLikelihood::new(draws(3., 4., 100, 1));
        let truth = likelihood.log_likelihood(&params(3., 4.));
        for (mu, sigma) in [(-10., 4.), (3., 0.5), (3., 40.), (20., 20.)] {
            assert!(truth > likelihood.log_likelihood(&params(mu, sigma)));
        }
    }

    #[test]
    fn invalid_sigma_gives_neg_inf() {
        let likelihood = GaussianLikelihood::new(vec![1., 2., 3.]);
        for sigma in [0., -1., f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(likelihood.log_likelihood(&params(2., sigma)), f64::NEG_INFINITY);
        }
        assert_eq!(
            likelihood.log_likelihood(&Parameters::from([("mu", 1.)])),
            f64::NEG_INFINITY
        );
    }

    /// Golden section search for the maximum of a unimodal function.
    fn golden_max(f: impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
        let ratio = (5f64.sqrt() - 1.) / 2.;
        while b - a > 1e-10 {
            let c = b - ratio * (b - a);
            let d = a + ratio * (b - a);
            if f(c) > f(d) {
                b = d;
            } else {
                a = c;
            }
        }
        0.5 * (a + b)
    }

    #[test]
    fn numerical_maximum_matches_closed_form() {
        let data = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let likelihood = GaussianLikelihood::new(data);
        let (mean, std) = likelihood.maximum_likelihood_estimate().unwrap();
        assert_relative_eq!(mean, 5.);
        assert_relative_eq!(std, 2.);

        // the profile likelihood in sigma is maximized at the closed form
        // whatever mu is, so coordinate ascent converges in one sweep
        let mu_hat = golden_max(|mu| likelihood.evaluate(mu, 1.), -10., 20.);
        let sigma_hat = golden_max(|sigma| likelihood.evaluate(mu_hat, sigma), 0.01, 20.);
        assert_relative_eq!(mu_hat, mean, epsilon = 1e-6);
        assert_relative_eq!(sigma_hat, std, epsilon = 1e-6);
    }

    #[test]
    fn empty_data_has_no_estimate() {
        let likelihood = GaussianLikelihood::new(vec![]);
        assert_eq!(likelihood.maximum_likelihood_estimate(), None);
        assert_eq!(likelihood.log_likelihood(&params(0., 1.)), 0.);
    }

    #[test]
    fn closure_likelihood() {
        let likelihood = FnLikelihood::new(["x"], |p: &Parameters| {
            -0.5 * p.get("x").map_or(f64::INFINITY, |x| x * x)
        })
        .with_noise_log_likelihood(-2.);
        assert_eq!(likelihood.parameter_keys(), vec!["x".to_string()]);
        assert_eq!(likelihood.log_likelihood(&Parameters::from([("x", 2.)])), -2.);
        assert_eq!(
            likelihood.log_likelihood_ratio(&Parameters::from([("x", 0.)])),
            Some(2.)
        );
        assert_eq!(GaussianLikelihood::new(vec![1.]).log_likelihood_ratio(&params(0., 1.)), None);
    }

    proptest! {
        #[test]
        fn reflection_about_mean(
            data in proptest::collection::vec(-50f64..50f64, 1..30),
            mu in -10f64..10f64,
            sigma in 0.1f64..20f64,
        ) {
            let reflected = data.iter().map(|x| 2. * mu - x).collect();
            let a = GaussianLikelihood::new(data).evaluate(mu, sigma);
            let b = GaussianLikelihood::new(reflected).evaluate(mu, sigma);
            prop_assert!((a - b).abs() <= 1e-9 * a.abs().max(1.));
        }

        #[test]
        fn non_positive_sigma_never_panics(mu in -1e3f64..1e3f64, sigma in -1e3f64..=0f64) {
            let likelihood = GaussianLikelihood::new(vec![0.5, -1.5, 3.]);
            prop_assert_eq!(likelihood.evaluate(mu, sigma), f64::NEG_INFINITY);
        }
    }
}
