//! Random-walk Metropolis in the unit cube, one chain per rayon task.

use std::sync::Mutex;

use anyhow::Result;
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PeError;
use crate::likelihood::Likelihood;
use crate::sampler::{EngineOutput, Problem, Progress, ProgressReporter};

const MAX_INIT_TRIES: usize = 500;
const TARGET_ACCEPT: f64 = 0.234;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetropolisSettings {
    pub num_chains: usize,
    /// Draws per chain spent adapting the step size, discarded
    pub num_tune: u64,
    /// Draws per chain kept before thinning
    pub num_draws: u64,
    /// Keep every `thin`-th draw
    pub thin: u64,
    /// Initial proposal standard deviation in unit cube coordinates
    pub initial_step: f64,
}

impl Default for MetropolisSettings {
    fn default() -> Self {
        Self {
            num_chains: 4,
            num_tune: 1000,
            num_draws: 2000,
            thin: 1,
            initial_step: 0.1,
        }
    }
}

impl MetropolisSettings {
    pub fn validate(&self) -> Result<(), PeError> {
        if self.num_chains == 0 {
            return Err(PeError::InvalidSettings(
                "num_chains must be at least 1".to_string(),
            ));
        }
        if self.num_draws == 0 || self.thin == 0 {
            return Err(PeError::InvalidSettings(
                "num_draws and thin must be at least 1".to_string(),
            ));
        }
        if self.num_draws < self.thin {
            return Err(PeError::InvalidSettings(format!(
                "num_draws ({}) is smaller than thin ({}), no draws would be kept",
                self.num_draws, self.thin
            )));
        }
        if !(self.initial_step > 0. && self.initial_step.is_finite()) {
            return Err(PeError::InvalidSettings(format!(
                "initial_step must be positive, got {}",
                self.initial_step
            )));
        }
        Ok(())
    }
}

struct ChainOutput {
    draws: Vec<Vec<f64>>,
    log_likelihoods: Vec<f64>,
    num_likelihood_evaluations: u64,
}

/// Unnormalized log posterior in the unit cube, where the prior is flat.
struct Chain<'a, 'p, L: Likelihood + ?Sized> {
    problem: &'a Problem<'p, L>,
    rng: ChaCha8Rng,
    point: Vec<f64>,
    log_likelihood: f64,
    step: f64,
    num_likelihood_evaluations: u64,
}

impl<'a, 'p, L: Likelihood + ?Sized> Chain<'a, 'p, L> {
    fn new(
        problem: &'a Problem<'p, L>,
        chain: u64,
        seed: u64,
        step: f64,
    ) -> Result<Self, PeError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(chain);

        let mut num_likelihood_evaluations = 0;
        for _ in 0..MAX_INIT_TRIES {
            let point = (0..problem.ndim).map(|_| rng.random::<f64>()).collect_vec();
            let log_likelihood = problem.log_likelihood(&point);
            num_likelihood_evaluations += 1;
            if log_likelihood.is_finite() {
                return Ok(Self {
                    problem,
                    rng,
                    point,
                    log_likelihood,
                    step,
                    num_likelihood_evaluations,
                });
            }
        }
        Err(PeError::InitializationFailed(MAX_INIT_TRIES))
    }

    fn draw(&mut self) -> bool {
        let step = self.step;
        let rng = &mut self.rng;
        let proposal = self
            .point
            .iter()
            .map(|&x| {
                let z: f64 = rng.sample(StandardNormal);
                x + step * z
            })
            .collect_vec();
        let log_likelihood = self.problem.log_likelihood(&proposal);
        self.num_likelihood_evaluations += 1;
        let log_ratio = log_likelihood - self.log_likelihood;
        let accept = log_ratio >= 0. || self.rng.random::<f64>().ln() < log_ratio;
        if accept {
            self.point = proposal;
            self.log_likelihood = log_likelihood;
        }
        accept
    }

    /// Robbins-Monro update of the proposal width.
    fn adapt(&mut self, accepted: bool, iteration: u64) {
        let rate = if accepted { 1. } else { 0. };
        let gain = 1. / (iteration as f64 + 1.).sqrt();
        self.step = (self.step * (gain * (rate - TARGET_ACCEPT)).exp()).clamp(1e-6, 1.);
    }
}

fn run_chain<L: Likelihood + ?Sized>(
    problem: &Problem<'_, L>,
    settings: &MetropolisSettings,
    chain_id: u64,
    seed: u64,
    reporter: &Mutex<ProgressReporter>,
) -> Result<ChainOutput, PeError> {
    let mut chain = Chain::new(problem, chain_id, seed, settings.initial_step)?;
    let total = settings.num_tune + settings.num_draws;
    let kept = (settings.num_draws / settings.thin) as usize;
    let mut draws = Vec::with_capacity(kept);
    let mut log_likelihoods = Vec::with_capacity(kept);
    let mut accepted = 0u64;

    for iteration in 0..total {
        let tuning = iteration < settings.num_tune;
        let accept = chain.draw();
        if tuning {
            chain.adapt(accept, iteration);
        } else {
            accepted += accept as u64;
            let draw_idx = iteration - settings.num_tune;
            if (draw_idx + 1) % settings.thin == 0 {
                draws.push(chain.point.clone());
                log_likelihoods.push(chain.log_likelihood);
            }
        }

        if let Ok(mut reporter) = reporter.try_lock() {
            let kept_draws = iteration.saturating_sub(settings.num_tune);
            reporter.report(|elapsed| Progress {
                iteration,
                chain: chain_id,
                tuning,
                num_likelihood_evaluations: chain.num_likelihood_evaluations,
                log_evidence: f64::NAN,
                delta_log_evidence: f64::NAN,
                acceptance_rate: if kept_draws > 0 {
                    accepted as f64 / kept_draws as f64
                } else {
                    f64::NAN
                },
                elapsed,
            });
        }
    }

    Ok(ChainOutput {
        draws,
        log_likelihoods,
        num_likelihood_evaluations: chain.num_likelihood_evaluations,
    })
}

pub(crate) fn run<L: Likelihood + ?Sized>(
    problem: &Problem<'_, L>,
    settings: &MetropolisSettings,
    seed: u64,
    reporter: ProgressReporter,
) -> Result<EngineOutput> {
    settings.validate()?;
    let reporter = Mutex::new(reporter);

    let chains = (0..settings.num_chains as u64)
        .into_par_iter()
        .map(|chain_id| run_chain(problem, settings, chain_id, seed, &reporter))
        .collect::<Result<Vec<_>, _>>()?;

    let num_likelihood_evaluations = chains.iter().map(|c| c.num_likelihood_evaluations).sum();
    let (samples, log_likelihoods): (Vec<_>, Vec<_>) = chains
        .into_iter()
        .flat_map(|c| c.draws.into_iter().zip(c.log_likelihoods))
        .unzip();

    Ok(EngineOutput {
        samples,
        log_likelihoods,
        weighted: None,
        log_evidence: None,
        log_evidence_err: None,
        num_likelihood_evaluations,
    })
}
