use thiserror::Error;

/// Errors raised while setting up or running a parameter-estimation job.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PeError {
    #[error("Invalid {family} prior: {message}")]
    InvalidPrior {
        family: &'static str,
        message: String,
    },
    #[error("Could not parse prior file at line {line}: {message}")]
    PriorParse { line: usize, message: String },
    #[error("No prior given for parameter '{0}'")]
    MissingPrior(String),
    #[error("Missing required parameter '{0}'")]
    MissingParameter(String),
    #[error("Unknown sampler '{0}'")]
    UnknownSampler(String),
    #[error("Invalid sampler settings: {0}")]
    InvalidSettings(String),
    #[error("All priors are fixed, there is nothing to sample")]
    EmptySearchSpace,
    #[error("Could not find a finite likelihood point after {0} tries")]
    InitializationFailed(usize),
    #[error("Checkpoint does not match the current run: {0}")]
    CheckpointMismatch(String),
}

pub type Result<T> = std::result::Result<T, PeError>;
