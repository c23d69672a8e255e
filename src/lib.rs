//! Bayesian parameter estimation for a worked gravitational-wave example.
//!
//! Build a [`PriorDict`], implement [`Likelihood`] (or use
//! [`GaussianLikelihood`]), and hand both to [`run_sampler`]. The returned
//! [`SamplerResult`] holds the posterior table, the evidence for nested runs,
//! and can be written to and read back from disk.
//!
//! ```no_run
//! use pe_rs::{run_sampler, GaussianLikelihood, Prior, PriorDict, RunSettings, SamplerKind};
//!
//! # fn main() -> anyhow::Result<()> {
//! let likelihood = GaussianLikelihood::new(vec![2.9, 3.4, 1.8, 4.1]);
//! let mut priors = PriorDict::new();
//! priors.insert("mu", Prior::uniform(0., 5.)?);
//! priors.insert("sigma", Prior::uniform(0., 10.)?);
//!
//! let settings = RunSettings::new(SamplerKind::from_name("dynesty")?)
//!     .with_outdir("outdir")
//!     .with_label("gaussian");
//! let result = run_sampler(&likelihood, &priors, settings)?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub(crate) mod conversion;
pub(crate) mod csv_storage;
pub(crate) mod error;
pub(crate) mod injection;
pub(crate) mod likelihood;
pub(crate) mod math;
pub(crate) mod mcmc;
pub(crate) mod nested;
pub(crate) mod nonfinite;
pub(crate) mod parameters;
#[cfg(feature = "plot")]
pub(crate) mod plot;
pub(crate) mod prior;
pub(crate) mod prior_dict;
pub(crate) mod prior_file;
pub(crate) mod result;
pub(crate) mod sampler;
pub(crate) mod summary;

pub use conversion::{
    chirp_mass, component_masses, generate_mass_parameters, mass_ratio, symmetric_mass_ratio,
    total_mass,
};
pub use csv_storage::{read_posterior, CsvConfig};
pub use error::{PeError, Result};
pub use injection::{BinaryBlackHoleInjection, REQUIRED_BBH_KEYS};
pub use likelihood::{FnLikelihood, GaussianLikelihood, Likelihood};
pub use mcmc::MetropolisSettings;
pub use nested::NestedSettings;
pub use parameters::Parameters;
pub use prior::{Constraint, Prior};
pub use prior_dict::{ConversionFunction, PriorDict};
pub use prior_file::BINARY_BLACK_HOLE_PRIOR;
pub use result::{NestedSamples, Posterior, SamplerResult, LOG_LIKELIHOOD, LOG_PRIOR};
pub use sampler::{run_sampler, Progress, ProgressCallback, RunSettings, SamplerKind};
pub use summary::{median_and_error_bar, quantile, Histogram, ParameterSummary};
