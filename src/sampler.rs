use std::fmt::Debug;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::csv_storage::CsvConfig;
use crate::error::PeError;
use crate::likelihood::Likelihood;
use crate::mcmc::{self, MetropolisSettings};
use crate::nested::{self, NestedSettings};
use crate::parameters::Parameters;
use crate::prior_dict::PriorDict;
use crate::result::{NestedSamples, Posterior, SamplerResult, LOG_LIKELIHOOD, LOG_PRIOR};

/// Which sampling engine to run, with its settings.
#[derive(Debug, Clone, Copy)]
pub enum SamplerKind {
    Nested(NestedSettings),
    Metropolis(MetropolisSettings),
}

impl Default for SamplerKind {
    fn default() -> Self {
        SamplerKind::Nested(NestedSettings::default())
    }
}

impl SamplerKind {
    /// Look up a sampler by name, with default settings.
    pub fn from_name(name: &str) -> Result<Self, PeError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "nested" | "dynesty" => Ok(SamplerKind::Nested(NestedSettings::default())),
            "metropolis" | "mcmc" => Ok(SamplerKind::Metropolis(MetropolisSettings::default())),
            _ => Err(PeError::UnknownSampler(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SamplerKind::Nested(_) => "nested",
            SamplerKind::Metropolis(_) => "metropolis",
        }
    }
}

impl FromStr for SamplerKind {
    type Err = PeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// A progress snapshot handed to a [`ProgressCallback`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Progress {
    pub iteration: u64,
    /// Metropolis chain index, `0` for nested sampling
    pub chain: u64,
    pub tuning: bool,
    pub num_likelihood_evaluations: u64,
    /// Running evidence estimate, NaN for samplers that do not compute one
    pub log_evidence: f64,
    /// Estimated evidence still in the live points, NaN if not applicable
    pub delta_log_evidence: f64,
    pub acceptance_rate: f64,
    pub elapsed: Duration,
}

pub struct ProgressCallback {
    pub callback: Box<dyn FnMut(&Progress) + Send>,
    /// Minimum time between two calls
    pub rate: Duration,
}

/// Rate limits calls into a user supplied [`ProgressCallback`].
pub(crate) struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last_call: Option<Instant>,
    start: Instant,
}

impl ProgressReporter {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last_call: None,
            start: Instant::now(),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.callback.is_some()
    }

    /// Call back if at least `rate` has passed since the previous call.
    pub(crate) fn report(&mut self, progress: impl FnOnce(Duration) -> Progress) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        let now = Instant::now();
        if let Some(last) = self.last_call {
            if now.duration_since(last) < callback.rate {
                return;
            }
        }
        self.last_call = Some(now);
        (callback.callback)(&progress(now.duration_since(self.start)));
    }

    /// Call back regardless of the rate, used for the final state.
    pub(crate) fn finish(&mut self, progress: impl FnOnce(Duration) -> Progress) {
        self.last_call = None;
        self.report(progress);
    }
}

/// Likelihood and priors seen from the unit cube the engines work in.
pub(crate) struct Problem<'a, L: Likelihood + ?Sized> {
    pub likelihood: &'a L,
    pub priors: &'a PriorDict,
    pub ndim: usize,
}

impl<L: Likelihood + ?Sized> Problem<'_, L> {
    /// Log-likelihood at a point of the unit cube.
    ///
    /// `-inf` outside the cube, where a constraint fails, or where the
    /// likelihood is NaN.
    pub fn log_likelihood(&self, unit: &[f64]) -> f64 {
        if unit.iter().any(|u| !(0. ..=1.).contains(u)) {
            return f64::NEG_INFINITY;
        }
        let params = self.priors.rescale(unit);
        if !self.priors.evaluate_constraints(&params) {
            return f64::NEG_INFINITY;
        }
        let value = self.likelihood.log_likelihood(&params);
        if value.is_nan() {
            f64::NEG_INFINITY
        } else {
            value
        }
    }
}

/// What an engine hands back, with samples still in unit cube coordinates.
#[derive(Debug)]
pub(crate) struct EngineOutput {
    /// Equally weighted posterior draws
    pub samples: Vec<Vec<f64>>,
    pub log_likelihoods: Vec<f64>,
    /// Weighted draws as `(points, log likelihoods, log weights)`
    pub weighted: Option<(Vec<Vec<f64>>, Vec<f64>, Vec<f64>)>,
    pub log_evidence: Option<f64>,
    pub log_evidence_err: Option<f64>,
    pub num_likelihood_evaluations: u64,
}

/// Settings shared by every sampler run.
pub struct RunSettings {
    pub sampler: SamplerKind,
    pub outdir: PathBuf,
    /// Prefix of every file the run writes
    pub label: String,
    pub seed: u64,
    /// Continue from the checkpoint in `outdir` if there is one
    pub resume: bool,
    /// Write the result files when done
    pub save: bool,
    pub injection_parameters: Option<Parameters>,
    pub progress: Option<ProgressCallback>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            sampler: SamplerKind::default(),
            outdir: PathBuf::from("outdir"),
            label: "label".to_string(),
            seed: 0,
            resume: false,
            save: true,
            injection_parameters: None,
            progress: None,
        }
    }
}

impl Debug for RunSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunSettings")
            .field("sampler", &self.sampler)
            .field("outdir", &self.outdir)
            .field("label", &self.label)
            .field("seed", &self.seed)
            .field("resume", &self.resume)
            .field("save", &self.save)
            .field("injection_parameters", &self.injection_parameters)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl RunSettings {
    pub fn new(sampler: SamplerKind) -> Self {
        Self {
            sampler,
            ..Default::default()
        }
    }

    pub fn with_outdir(mut self, outdir: impl Into<PathBuf>) -> Self {
        self.outdir = outdir.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }

    pub fn with_injection_parameters(mut self, injection_parameters: Parameters) -> Self {
        self.injection_parameters = Some(injection_parameters);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.outdir.join(format!("{}_resume.json", self.label))
    }

    fn posterior_path(&self) -> PathBuf {
        self.outdir.join(format!("{}_posterior.csv", self.label))
    }
}

/// Sample the posterior of `likelihood` under `priors`.
///
/// Every parameter the likelihood reads must have a prior. When
/// `settings.save` is set the result is written to
/// `{outdir}/{label}_result.json` and the posterior to
/// `{outdir}/{label}_posterior.csv`.
pub fn run_sampler<L: Likelihood + ?Sized>(
    likelihood: &L,
    priors: &PriorDict,
    settings: RunSettings,
) -> Result<SamplerResult> {
    priors.validate_keys(&likelihood.parameter_keys())?;
    let search_keys = priors.search_keys();
    if search_keys.is_empty() {
        return Err(PeError::EmptySearchSpace.into());
    }

    if settings.save || settings.resume {
        std::fs::create_dir_all(&settings.outdir).with_context(|| {
            format!("Failed to create output directory: {:?}", settings.outdir)
        })?;
    }

    let problem = Problem {
        likelihood,
        priors,
        ndim: search_keys.len(),
    };
    let checkpoint = settings.checkpoint_path();
    let posterior_path = settings.posterior_path();
    let mut reporter = ProgressReporter::new(settings.progress);

    let start = Instant::now();
    let output = match settings.sampler {
        SamplerKind::Nested(nested_settings) => {
            let checkpoint = (settings.save || settings.resume).then_some(checkpoint.as_path());
            nested::run(
                &problem,
                &nested_settings,
                settings.seed,
                checkpoint,
                settings.resume,
                &mut reporter,
            )
            .context("Nested sampling failed")?
        }
        SamplerKind::Metropolis(metropolis_settings) => {
            mcmc::run(&problem, &metropolis_settings, settings.seed, reporter)
                .context("Metropolis sampling failed")?
        }
    };
    let sampling_time = start.elapsed();

    let posterior = posterior_table(priors, &output.samples, &output.log_likelihoods)?;
    let nested_samples = output
        .weighted
        .map(|(points, log_likelihoods, log_weights)| -> Result<NestedSamples> {
            Ok(NestedSamples {
                samples: posterior_table(priors, &points, &log_likelihoods)?,
                log_weights,
            })
        })
        .transpose()?;

    let log_noise_evidence = likelihood.noise_log_likelihood();
    let log_bayes_factor = output
        .log_evidence
        .zip(log_noise_evidence)
        .map(|(signal, noise)| signal - noise);

    let result = SamplerResult {
        label: settings.label.clone(),
        outdir: settings.outdir.clone(),
        sampler: settings.sampler.name().to_string(),
        search_parameter_keys: search_keys,
        fixed_parameter_keys: priors.fixed_keys(),
        priors: priors.clone(),
        posterior,
        nested_samples,
        log_evidence: output.log_evidence,
        log_evidence_err: output.log_evidence_err,
        log_noise_evidence,
        log_bayes_factor,
        num_likelihood_evaluations: output.num_likelihood_evaluations,
        sampling_time,
        injection_parameters: settings.injection_parameters.clone(),
    };

    if settings.save {
        result.save_to_file()?;
        CsvConfig::new().write_posterior(&result.posterior, posterior_path)?;
    }
    Ok(result)
}

/// Rescale unit cube rows into a table with the prior and likelihood columns.
fn posterior_table(
    priors: &PriorDict,
    points: &[Vec<f64>],
    log_likelihoods: &[f64],
) -> Result<Posterior> {
    let rows = points
        .iter()
        .zip(log_likelihoods)
        .map(|(point, &log_likelihood)| {
            let sampled = priors.rescale(point);
            let log_prior = priors.ln_prob(&sampled);
            let mut row = priors.convert(&sampled);
            row.insert(LOG_LIKELIHOOD, log_likelihood);
            row.insert(LOG_PRIOR, log_prior);
            row
        })
        .collect::<Vec<_>>();
    Posterior::from_rows(&rows)
}
