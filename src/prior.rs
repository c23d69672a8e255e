//! Univariate prior distributions.
//!
//! Every family can evaluate its log density, map a point of the unit
//! interval onto its support (the inverse CDF used by the samplers) and draw
//! random values.

use std::f64::consts::{FRAC_PI_2, PI, SQRT_2, TAU};
use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf_inv;

use crate::error::{PeError, Result};

/// A one dimensional prior distribution.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family")]
pub enum Prior {
    Uniform { minimum: f64, maximum: f64 },
    DeltaFunction { peak: f64 },
    Gaussian { mu: f64, sigma: f64 },
    LogUniform { minimum: f64, maximum: f64 },
    PowerLaw { alpha: f64, minimum: f64, maximum: f64 },
    Sine { minimum: f64, maximum: f64 },
    Cosine { minimum: f64, maximum: f64 },
}

fn check_bounds(family: &'static str, minimum: f64, maximum: f64) -> Result<()> {
    if !(minimum.is_finite() && maximum.is_finite() && minimum < maximum) {
        return Err(PeError::InvalidPrior {
            family,
            message: format!("need finite minimum < maximum, got [{minimum}, {maximum}]"),
        });
    }
    Ok(())
}

impl Prior {
    pub fn uniform(minimum: f64, maximum: f64) -> Result<Self> {
        check_bounds("Uniform", minimum, maximum)?;
        Ok(Prior::Uniform { minimum, maximum })
    }

    pub fn delta(peak: f64) -> Result<Self> {
        if !peak.is_finite() {
            return Err(PeError::InvalidPrior {
                family: "DeltaFunction",
                message: format!("peak must be finite, got {peak}"),
            });
        }
        Ok(Prior::DeltaFunction { peak })
    }

    pub fn gaussian(mu: f64, sigma: f64) -> Result<Self> {
        if !(mu.is_finite() && sigma.is_finite() && sigma > 0.) {
            return Err(PeError::InvalidPrior {
                family: "Gaussian",
                message: format!("need finite mu and sigma > 0, got mu={mu}, sigma={sigma}"),
            });
        }
        Ok(Prior::Gaussian { mu, sigma })
    }

    pub fn log_uniform(minimum: f64, maximum: f64) -> Result<Self> {
        check_bounds("LogUniform", minimum, maximum)?;
        if minimum <= 0. {
            return Err(PeError::InvalidPrior {
                family: "LogUniform",
                message: format!("minimum must be positive, got {minimum}"),
            });
        }
        Ok(Prior::LogUniform { minimum, maximum })
    }

    pub fn power_law(alpha: f64, minimum: f64, maximum: f64) -> Result<Self> {
        check_bounds("PowerLaw", minimum, maximum)?;
        if !alpha.is_finite() || minimum < 0. || (minimum == 0. && alpha <= -1.) {
            return Err(PeError::InvalidPrior {
                family: "PowerLaw",
                message: format!(
                    "alpha={alpha} is not normalizable on [{minimum}, {maximum}]"
                ),
            });
        }
        Ok(Prior::PowerLaw {
            alpha,
            minimum,
            maximum,
        })
    }

    /// Density proportional to `sin(x)`, by default on `[0, pi]`.
    pub fn sine(minimum: f64, maximum: f64) -> Result<Self> {
        check_bounds("Sine", minimum, maximum)?;
        if minimum < 0. || maximum > PI {
            return Err(PeError::InvalidPrior {
                family: "Sine",
                message: format!("support must lie within [0, pi], got [{minimum}, {maximum}]"),
            });
        }
        Ok(Prior::Sine { minimum, maximum })
    }

    /// Density proportional to `cos(x)`, by default on `[-pi/2, pi/2]`.
    pub fn cosine(minimum: f64, maximum: f64) -> Result<Self> {
        check_bounds("Cosine", minimum, maximum)?;
        if minimum < -FRAC_PI_2 || maximum > FRAC_PI_2 {
            return Err(PeError::InvalidPrior {
                family: "Cosine",
                message: format!(
                    "support must lie within [-pi/2, pi/2], got [{minimum}, {maximum}]"
                ),
            });
        }
        Ok(Prior::Cosine { minimum, maximum })
    }

    pub fn family(&self) -> &'static str {
        match self {
            Prior::Uniform { .. } => "Uniform",
            Prior::DeltaFunction { .. } => "DeltaFunction",
            Prior::Gaussian { .. } => "Gaussian",
            Prior::LogUniform { .. } => "LogUniform",
            Prior::PowerLaw { .. } => "PowerLaw",
            Prior::Sine { .. } => "Sine",
            Prior::Cosine { .. } => "Cosine",
        }
    }

    /// Fixed parameters are not sampled.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Prior::DeltaFunction { .. })
    }

    pub fn minimum(&self) -> f64 {
        match *self {
            Prior::Uniform { minimum, .. }
            | Prior::LogUniform { minimum, .. }
            | Prior::PowerLaw { minimum, .. }
            | Prior::Sine { minimum, .. }
            | Prior::Cosine { minimum, .. } => minimum,
            Prior::DeltaFunction { peak } => peak,
            Prior::Gaussian { .. } => f64::NEG_INFINITY,
        }
    }

    pub fn maximum(&self) -> f64 {
        match *self {
            Prior::Uniform { maximum, .. }
            | Prior::LogUniform { maximum, .. }
            | Prior::PowerLaw { maximum, .. }
            | Prior::Sine { maximum, .. }
            | Prior::Cosine { maximum, .. } => maximum,
            Prior::DeltaFunction { peak } => peak,
            Prior::Gaussian { .. } => f64::INFINITY,
        }
    }

    fn in_support(&self, x: f64) -> bool {
        x >= self.minimum() && x <= self.maximum()
    }

    /// Natural logarithm of the density at `x`, `-inf` outside the support.
    pub fn ln_prob(&self, x: f64) -> f64 {
        if x.is_nan() || !self.in_support(x) {
            return f64::NEG_INFINITY;
        }
        match *self {
            Prior::Uniform { minimum, maximum } => -(maximum - minimum).ln(),
            // A point mass has no density; it contributes nothing to ln_prob.
            Prior::DeltaFunction { .. } => 0.,
            Prior::Gaussian { mu, sigma } => {
                let z = (x - mu) / sigma;
                -0.5 * z * z - sigma.ln() - 0.5 * TAU.ln()
            }
            Prior::LogUniform { minimum, maximum } => -x.ln() - (maximum / minimum).ln().ln(),
            Prior::PowerLaw {
                alpha,
                minimum,
                maximum,
            } => {
                if alpha == -1. {
                    -x.ln() - (maximum / minimum).ln().ln()
                } else {
                    let norm = (1. + alpha)
                        / (maximum.powf(1. + alpha) - minimum.powf(1. + alpha));
                    if x > 0. {
                        alpha * x.ln() + norm.ln()
                    } else if alpha == 0. {
                        norm.ln()
                    } else {
                        // x^alpha at the origin is zero or unbounded
                        f64::NEG_INFINITY
                    }
                }
            }
            Prior::Sine { minimum, maximum } => (x.sin() / (minimum.cos() - maximum.cos())).ln(),
            Prior::Cosine { minimum, maximum } => {
                (x.cos() / (maximum.sin() - minimum.sin())).ln()
            }
        }
    }

    /// Map `u` in `[0, 1]` onto the support through the inverse CDF.
    pub fn rescale(&self, u: f64) -> f64 {
        match *self {
            Prior::Uniform { minimum, maximum } => minimum + u * (maximum - minimum),
            Prior::DeltaFunction { peak } => peak,
            Prior::Gaussian { mu, sigma } => mu + sigma * SQRT_2 * erf_inv(2. * u - 1.),
            Prior::LogUniform { minimum, maximum } => {
                (minimum.ln() + u * (maximum.ln() - minimum.ln())).exp()
            }
            Prior::PowerLaw {
                alpha,
                minimum,
                maximum,
            } => {
                if alpha == -1. {
                    (minimum.ln() + u * (maximum.ln() - minimum.ln())).exp()
                } else {
                    let low = minimum.powf(1. + alpha);
                    let high = maximum.powf(1. + alpha);
                    (low + u * (high - low)).powf(1. / (1. + alpha))
                }
            }
            Prior::Sine { minimum, maximum } => {
                let value = (minimum.cos() - u * (minimum.cos() - maximum.cos())).acos();
                value.clamp(minimum, maximum)
            }
            Prior::Cosine { minimum, maximum } => {
                let value = (minimum.sin() + u * (maximum.sin() - minimum.sin())).asin();
                value.clamp(minimum, maximum)
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Prior::Gaussian { mu, sigma } => {
                let z: f64 = StandardNormal.sample(rng);
                mu + sigma * z
            }
            _ => self.rescale(rng.random()),
        }
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Prior::Uniform { minimum, maximum } => {
                write!(f, "Uniform(minimum={minimum}, maximum={maximum})")
            }
            Prior::DeltaFunction { peak } => write!(f, "DeltaFunction(peak={peak})"),
            Prior::Gaussian { mu, sigma } => write!(f, "Gaussian(mu={mu}, sigma={sigma})"),
            Prior::LogUniform { minimum, maximum } => {
                write!(f, "LogUniform(minimum={minimum}, maximum={maximum})")
            }
            Prior::PowerLaw {
                alpha,
                minimum,
                maximum,
            } => write!(
                f,
                "PowerLaw(alpha={alpha}, minimum={minimum}, maximum={maximum})"
            ),
            Prior::Sine { minimum, maximum } => {
                write!(f, "Sine(minimum={minimum}, maximum={maximum})")
            }
            Prior::Cosine { minimum, maximum } => {
                write!(f, "Cosine(minimum={minimum}, maximum={maximum})")
            }
        }
    }
}

/// Bound on a derived parameter, checked after conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(with = "crate::nonfinite")]
    pub minimum: f64,
    #[serde(with = "crate::nonfinite")]
    pub maximum: f64,
}

impl Constraint {
    pub fn new(minimum: f64, maximum: f64) -> Result<Self> {
        if minimum.is_nan() || maximum.is_nan() || minimum >= maximum {
            return Err(PeError::InvalidPrior {
                family: "Constraint",
                message: format!("need minimum < maximum, got [{minimum}, {maximum}]"),
            });
        }
        Ok(Self { minimum, maximum })
    }

    pub fn is_satisfied(&self, x: f64) -> bool {
        x > self.minimum && x < self.maximum
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Constraint(minimum={}, maximum={})",
            self.minimum, self.maximum
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn families() -> Vec<Prior> {
        vec![
            Prior::uniform(0., 5.).unwrap(),
            Prior::gaussian(1., 2.).unwrap(),
            Prior::log_uniform(1., 100.).unwrap(),
            Prior::power_law(2., 50., 2000.).unwrap(),
            Prior::power_law(-1., 1., 10.).unwrap(),
            Prior::sine(0., PI).unwrap(),
            Prior::cosine(-FRAC_PI_2, FRAC_PI_2).unwrap(),
        ]
    }

    /// Trapezoid integral of the density over the support.
    fn integrate(prior: &Prior) -> f64 {
        let (low, high) = match prior {
            Prior::Gaussian { mu, sigma } => (mu - 10. * sigma, mu + 10. * sigma),
            _ => (prior.minimum(), prior.maximum()),
        };
        let n = 200_000;
        let h = (high - low) / n as f64;
        (0..=n)
            .map(|i| {
                let x = low + i as f64 * h;
                let w = if i == 0 || i == n { 0.5 } else { 1. };
                w * prior.ln_prob(x).exp()
            })
            .sum::<f64>()
            * h
    }

    #[test]
    fn densities_are_normalized() {
        for prior in families() {
            assert_relative_eq!(integrate(&prior), 1., epsilon = 1e-4);
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Prior::uniform(5., 0.).is_err());
        assert!(Prior::uniform(0., f64::INFINITY).is_err());
        assert!(Prior::gaussian(0., 0.).is_err());
        assert!(Prior::log_uniform(0., 1.).is_err());
        assert!(Prior::sine(0., 4.).is_err());
        assert!(Prior::delta(f64::NAN).is_err());
        assert!(Constraint::new(2., 1.).is_err());
    }

    #[test]
    fn outside_support_is_neg_inf() {
        let prior = Prior::uniform(0., 5.).unwrap();
        assert_eq!(prior.ln_prob(-0.1), f64::NEG_INFINITY);
        assert_eq!(prior.ln_prob(f64::NAN), f64::NEG_INFINITY);
        assert_relative_eq!(prior.ln_prob(2.), -(5f64.ln()));
    }

    #[test]
    fn power_law_at_zero_lower_bound() {
        let steep = Prior::power_law(-0.5, 0., 1.).unwrap();
        assert_eq!(steep.ln_prob(0.), f64::NEG_INFINITY);
        assert_relative_eq!(steep.ln_prob(0.25), -0.5 * 0.25f64.ln() + 0.5f64.ln());
        let rising = Prior::power_law(2., 0., 1.).unwrap();
        assert_eq!(rising.ln_prob(0.), f64::NEG_INFINITY);
        let flat = Prior::power_law(0., 0., 4.).unwrap();
        assert_relative_eq!(flat.ln_prob(0.), -(4f64.ln()));
    }

    #[test]
    fn gaussian_rescale_hits_quantiles() {
        let prior = Prior::gaussian(3., 2.).unwrap();
        assert_relative_eq!(prior.rescale(0.5), 3., epsilon = 1e-12);
        // 84.13% quantile is one sigma above the mean
        assert_relative_eq!(prior.rescale(0.841_344_746_068_543), 5., epsilon = 1e-6);
    }

    #[test]
    fn samples_stay_in_support() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for prior in families() {
            for _ in 0..1000 {
                let x = prior.sample(&mut rng);
                assert!(prior.ln_prob(x).is_finite(), "{prior}: {x}");
            }
        }
    }

    proptest! {
        #[test]
        fn rescale_is_monotonic_and_bounded(u in 0f64..1f64, v in 0f64..1f64) {
            for prior in families() {
                let (lo, hi) = if u < v { (u, v) } else { (v, u) };
                let a = prior.rescale(lo);
                let b = prior.rescale(hi);
                prop_assert!(a <= b + 1e-12);
                prop_assert!(a >= prior.minimum() && b <= prior.maximum());
            }
        }
    }
}
