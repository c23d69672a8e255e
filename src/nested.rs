//! Static nested sampling with random-walk replacement of the worst live point.
//!
//! The prior volume shrinks by `exp(-1 / nlive)` per iteration. A new live
//! point is found by a fixed number of Metropolis steps from a random surviving
//! live point, accepting any proposal above the current likelihood threshold.
//! The step size is in units of the live point spread along each axis and is
//! adapted towards an even accept to reject ratio.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::PeError;
use crate::likelihood::Likelihood;
use crate::math::{effective_sample_size, log1mexp, logaddexp, resample_equal};
use crate::nonfinite;
use crate::sampler::{EngineOutput, Problem, Progress, ProgressReporter};

/// Draws per live point before giving up on finding a finite likelihood.
const MAX_INIT_TRIES: usize = 500;
const MIN_STEP_SCALE: f64 = 1e-3;
const MAX_STEP_SCALE: f64 = 10.;

const INIT_STREAM: u64 = u64::MAX;
const RESAMPLE_STREAM: u64 = u64::MAX - 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NestedSettings {
    /// Number of live points
    pub nlive: usize,
    /// Random-walk steps per replacement
    pub walks: usize,
    /// Stop once the evidence left in the live points is below this, in log units
    pub dlogz: f64,
    pub max_iterations: Option<u64>,
    /// Iterations between two checkpoint writes
    pub checkpoint_every: u64,
}

impl Default for NestedSettings {
    fn default() -> Self {
        Self {
            nlive: 500,
            walks: 100,
            dlogz: 0.1,
            max_iterations: None,
            checkpoint_every: 1000,
        }
    }
}

impl NestedSettings {
    pub fn validate(&self) -> Result<(), PeError> {
        if self.nlive < 2 {
            return Err(PeError::InvalidSettings(format!(
                "nlive must be at least 2, got {}",
                self.nlive
            )));
        }
        if self.walks == 0 {
            return Err(PeError::InvalidSettings(
                "walks must be at least 1".to_string(),
            ));
        }
        if !(self.dlogz > 0.) {
            return Err(PeError::InvalidSettings(format!(
                "dlogz must be positive, got {}",
                self.dlogz
            )));
        }
        Ok(())
    }
}

/// Everything needed to continue an interrupted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NestedState {
    seed: u64,
    ndim: usize,
    nlive: usize,
    iteration: u64,
    num_likelihood_evaluations: u64,
    #[serde(with = "nonfinite")]
    log_evidence: f64,
    #[serde(with = "nonfinite")]
    information: f64,
    step_scale: f64,
    live_points: Vec<Vec<f64>>,
    #[serde(with = "nonfinite::vec")]
    live_log_likelihoods: Vec<f64>,
    dead_points: Vec<Vec<f64>>,
    #[serde(with = "nonfinite::vec")]
    dead_log_likelihoods: Vec<f64>,
    #[serde(with = "nonfinite::vec")]
    dead_log_weights: Vec<f64>,
}

fn stream_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

impl NestedState {
    fn initialize<L: Likelihood + ?Sized>(
        problem: &Problem<'_, L>,
        nlive: usize,
        seed: u64,
    ) -> Result<Self, PeError> {
        let mut rng = stream_rng(seed, INIT_STREAM);
        let mut live_points = Vec::with_capacity(nlive);
        let mut live_log_likelihoods = Vec::with_capacity(nlive);
        let mut num_likelihood_evaluations = 0;
        for _ in 0..nlive {
            let (point, logl) = (0..MAX_INIT_TRIES)
                .find_map(|_| {
                    let point = (0..problem.ndim).map(|_| rng.random::<f64>()).collect_vec();
                    num_likelihood_evaluations += 1;
                    let logl = problem.log_likelihood(&point);
                    logl.is_finite().then_some((point, logl))
                })
                .ok_or(PeError::InitializationFailed(MAX_INIT_TRIES))?;
            live_points.push(point);
            live_log_likelihoods.push(logl);
        }
        Ok(Self {
            seed,
            ndim: problem.ndim,
            nlive,
            iteration: 0,
            num_likelihood_evaluations,
            log_evidence: f64::NEG_INFINITY,
            information: 0.,
            step_scale: 1.,
            live_points,
            live_log_likelihoods,
            dead_points: Vec::new(),
            dead_log_likelihoods: Vec::new(),
            dead_log_weights: Vec::new(),
        })
    }

    fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open checkpoint: {:?}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse checkpoint: {:?}", path))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let file = File::create(&tmp)
            .with_context(|| format!("Failed to create checkpoint: {:?}", tmp))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to write checkpoint: {:?}", path))
    }

    fn check_compatible(&self, ndim: usize, nlive: usize, seed: u64) -> Result<(), PeError> {
        if self.seed != seed {
            return Err(PeError::CheckpointMismatch(format!(
                "checkpoint was started with seed {}, the run uses {}",
                self.seed, seed
            )));
        }
        if self.ndim != ndim {
            return Err(PeError::CheckpointMismatch(format!(
                "checkpoint has {} search parameters, the run has {}",
                self.ndim, ndim
            )));
        }
        if self.nlive != nlive || self.live_points.len() != nlive {
            return Err(PeError::CheckpointMismatch(format!(
                "checkpoint has {} live points, the run uses {}",
                self.live_points.len(),
                nlive
            )));
        }
        Ok(())
    }

    fn log_volume(&self) -> f64 {
        -(self.iteration as f64) / self.nlive as f64
    }

    fn log_evidence_err(&self) -> f64 {
        (self.information.max(0.) / self.nlive as f64).sqrt()
    }

    /// Add a weighted point to the evidence and information integrals.
    fn accumulate(&mut self, log_likelihood: f64, log_weight: f64) {
        let new_log_evidence = logaddexp(self.log_evidence, log_weight);
        if new_log_evidence > f64::NEG_INFINITY {
            let mut information = -new_log_evidence;
            if log_weight > f64::NEG_INFINITY {
                information += (log_weight - new_log_evidence).exp() * log_likelihood;
            }
            if self.log_evidence > f64::NEG_INFINITY {
                information += (self.log_evidence - new_log_evidence).exp()
                    * (self.information + self.log_evidence);
            }
            self.information = information;
        }
        self.log_evidence = new_log_evidence;
    }

    /// Upper bound on the evidence change from the remaining prior volume.
    fn remaining_log_evidence(&self) -> f64 {
        let max = self
            .live_log_likelihoods
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        logaddexp(self.log_evidence, max + self.log_volume()) - self.log_evidence
    }

    fn live_spread(&self) -> Vec<f64> {
        let n = self.live_points.len() as f64;
        (0..self.ndim)
            .map(|k| {
                let mean = self.live_points.iter().map(|p| p[k]).sum::<f64>() / n;
                let var = self
                    .live_points
                    .iter()
                    .map(|p| (p[k] - mean).powi(2))
                    .sum::<f64>()
                    / n;
                var.sqrt()
            })
            .collect()
    }

    /// Replace the lowest-likelihood live point.
    fn step<L: Likelihood + ?Sized, R: Rng + ?Sized>(
        &mut self,
        problem: &Problem<'_, L>,
        walks: usize,
        rng: &mut R,
    ) -> f64 {
        let Some((worst, &threshold)) = self
            .live_log_likelihoods
            .iter()
            .position_min_by(|a, b| a.total_cmp(b))
            .map(|idx| (idx, &self.live_log_likelihoods[idx]))
        else {
            return 0.;
        };

        let log_width = self.log_volume() + log1mexp(-1. / self.nlive as f64);
        let log_weight = threshold + log_width;
        self.accumulate(threshold, log_weight);
        self.dead_points.push(self.live_points[worst].clone());
        self.dead_log_likelihoods.push(threshold);
        self.dead_log_weights.push(log_weight);

        let spread = self.live_spread();
        let start = loop {
            let idx = rng.random_range(0..self.nlive);
            if idx != worst {
                break idx;
            }
        };
        let mut current = self.live_points[start].clone();
        let mut current_logl = self.live_log_likelihoods[start];
        let mut accepted = 0usize;
        let mut rejected = 0usize;
        for _ in 0..walks {
            let proposal = current
                .iter()
                .zip(&spread)
                .map(|(&x, &s)| {
                    let z: f64 = rng.sample(StandardNormal);
                    x + self.step_scale * s * z
                })
                .collect_vec();
            let logl = problem.log_likelihood(&proposal);
            self.num_likelihood_evaluations += 1;
            if logl > threshold {
                current = proposal;
                current_logl = logl;
                accepted += 1;
            } else {
                rejected += 1;
            }
        }

        if accepted > rejected {
            self.step_scale *= (1. / accepted as f64).exp();
        } else if rejected > accepted {
            self.step_scale /= (1. / rejected as f64).exp();
        }
        self.step_scale = self.step_scale.clamp(MIN_STEP_SCALE, MAX_STEP_SCALE);

        self.live_points[worst] = current;
        self.live_log_likelihoods[worst] = current_logl;
        self.iteration += 1;
        accepted as f64 / walks as f64
    }

    /// Dead points followed by the final live points, sorted by likelihood.
    fn finalize(&self) -> (f64, f64, Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
        let mut state = self.clone();
        let log_weight_offset = state.log_volume() - (state.nlive as f64).ln();
        let order = (0..state.nlive)
            .sorted_by(|&a, &b| {
                state.live_log_likelihoods[a].total_cmp(&state.live_log_likelihoods[b])
            })
            .collect_vec();
        for idx in order {
            let logl = state.live_log_likelihoods[idx];
            let log_weight = logl + log_weight_offset;
            state.accumulate(logl, log_weight);
            state.dead_points.push(state.live_points[idx].clone());
            state.dead_log_likelihoods.push(logl);
            state.dead_log_weights.push(log_weight);
        }
        let log_evidence_err = state.log_evidence_err();
        (
            state.log_evidence,
            log_evidence_err,
            state.dead_points,
            state.dead_log_likelihoods,
            state.dead_log_weights,
        )
    }

    fn progress(&self, acceptance_rate: f64, elapsed: std::time::Duration) -> Progress {
        Progress {
            iteration: self.iteration,
            chain: 0,
            tuning: false,
            num_likelihood_evaluations: self.num_likelihood_evaluations,
            log_evidence: self.log_evidence,
            delta_log_evidence: self.remaining_log_evidence(),
            acceptance_rate,
            elapsed,
        }
    }
}

pub(crate) fn run<L: Likelihood + ?Sized>(
    problem: &Problem<'_, L>,
    settings: &NestedSettings,
    seed: u64,
    checkpoint: Option<&Path>,
    resume: bool,
    reporter: &mut ProgressReporter,
) -> Result<EngineOutput> {
    settings.validate()?;

    let mut state = match checkpoint {
        Some(path) if resume && path.exists() => {
            let state = NestedState::load(path)?;
            state.check_compatible(problem.ndim, settings.nlive, seed)?;
            state
        }
        _ => NestedState::initialize(problem, settings.nlive, seed)?,
    };

    let mut acceptance_rate = f64::NAN;
    loop {
        if state.remaining_log_evidence() < settings.dlogz {
            break;
        }
        if settings
            .max_iterations
            .is_some_and(|max| state.iteration >= max)
        {
            break;
        }

        let mut rng = stream_rng(seed, state.iteration);
        acceptance_rate = state.step(problem, settings.walks, &mut rng);

        if let Some(path) = checkpoint {
            if settings.checkpoint_every > 0 && state.iteration % settings.checkpoint_every == 0 {
                state.save(path)?;
            }
        }
        if reporter.is_active() {
            reporter.report(|elapsed| state.progress(acceptance_rate, elapsed));
        }
    }
    if let Some(path) = checkpoint {
        state.save(path)?;
    }
    reporter.finish(|elapsed| state.progress(acceptance_rate, elapsed));

    let (log_evidence, log_evidence_err, points, log_likelihoods, log_weights) =
        state.finalize();
    let log_weights = log_weights
        .into_iter()
        .map(|w| w - log_evidence)
        .collect_vec();

    let size = effective_sample_size(&log_weights).round().max(1.) as usize;
    let mut rng = stream_rng(seed, RESAMPLE_STREAM);
    let indices = resample_equal(&mut rng, &log_weights, size);
    let samples = indices.iter().map(|&i| points[i].clone()).collect();
    let sample_log_likelihoods = indices.iter().map(|&i| log_likelihoods[i]).collect();

    Ok(EngineOutput {
        samples,
        log_likelihoods: sample_log_likelihoods,
        weighted: Some((points, log_likelihoods, log_weights)),
        log_evidence: Some(log_evidence),
        log_evidence_err: Some(log_evidence_err),
        num_likelihood_evaluations: state.num_likelihood_evaluations,
    })
}
