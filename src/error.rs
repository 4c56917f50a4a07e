//! Error taxonomy for a training run.
//!
//! [EnvError]s are raised by environments and scoring instances, and are mostly absorbed per
//! individual. [ContractError]s are raised when someone breaks the scoring protocol, and are
//! always fatal. [HarnessError] is what escapes to the caller of a run.

use core::fmt;
use thiserror::Error;

/// Which side of the protocol a vector belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Input,
    Output,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Input => f.write_str("input"),
            Side::Output => f.write_str("output"),
        }
    }
}

/// Failures raised by an environment or a scoring instance
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    /// The current episode cannot continue. The individual is scored as a failure and the
    /// run goes on.
    #[error("episode failed: {0}")]
    Episode(String),

    /// The environment itself is gone. The run stops.
    #[error("environment unavailable: {0}")]
    Fatal(String),
}

impl EnvError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EnvError::Fatal(_))
    }
}

/// Violations of the scoring protocol or of the declared encoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("expected {expected} {side} values, got {got}")]
    Arity {
        side: Side,
        expected: usize,
        got: usize,
    },

    #[error("{call} called while {state}")]
    OutOfOrder {
        call: &'static str,
        state: &'static str,
    },

    #[error("invalid encoding: {0}")]
    Encoding(String),
}

/// Anything that can go wrong while driving one instance through an episode
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EpisodeError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Errors that stop a run
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("contract violated by individual {individual} in generation {generation}: {source}")]
    Contract {
        generation: usize,
        individual: usize,
        #[source]
        source: ContractError,
    },

    #[error("environment failed for individual {individual} in generation {generation}: {source}")]
    Environment {
        generation: usize,
        individual: usize,
        #[source]
        source: EnvError,
    },

    #[error("{failed} of {population} individuals failed in generation {generation}")]
    TooManyFailures {
        generation: usize,
        failed: usize,
        population: usize,
    },

    #[error("invalid encoding: {0}")]
    Encoding(#[from] ContractError),

    #[error("controller: {0}")]
    Controller(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("run aborted in generation {generation} (fitness {fitness:.3}): {source}")]
    RunAborted {
        generation: usize,
        fitness: f64,
        #[source]
        source: Box<HarnessError>,
    },

    #[error("thread pool: {0}")]
    Pool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Attach the failing individual's context to an [EpisodeError]
    pub fn episode(generation: usize, individual: usize, err: EpisodeError) -> Self {
        match err {
            EpisodeError::Contract(source) => HarnessError::Contract {
                generation,
                individual,
                source,
            },
            EpisodeError::Env(source) => HarnessError::Environment {
                generation,
                individual,
                source,
            },
        }
    }
}
