//! The scoring protocol a controller drives to assess an individual.
//!
//! A [ScoringFunction] is the prototype handed to a controller once per generation. For each
//! individual, the controller asks it for a fresh [ScoringInstance] (or, when
//! [ScoringFunction::flush_between] is false, restarts one it kept from the last generation),
//! and then alternates [ScoringInstance::generate_input] and [ScoringInstance::accept_output]
//! until the instance answers [Input::Done]. Only then are [ScoringInstance::score] and
//! [ScoringInstance::is_winner] read.
//!
//! Instances are never shared between threads while running, but the prototype is, and a
//! prototype whose instances contend for one exclusive resource must say so through
//! [ScoringFunction::max_threads].

pub mod checked;
pub mod episode;
pub mod xor;

pub use checked::{Checked, ProtocolState};
pub use episode::{
    Clock, EpisodeInstance, EpisodeScoring, ManualClock, SeededScoring, SystemClock,
};
pub use xor::{XorInstance, XorScoring};

use crate::error::EnvError;
use core::num::NonZeroUsize;

/// What an instance has to say when asked for input
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Feed this through the network and hand the output back
    Continue(Vec<f64>),
    /// The episode is over. No more output will be accepted
    Done,
}

impl Input {
    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(self, Input::Done)
    }
}

/// How a controller should run a network against an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processing {
    /// The environment waits for every output. Network state is flushed and settled for each
    /// input, so an answer costs nothing but correctness
    TurnBased,
    /// The environment keeps ticking. The network is stepped once per input and keeps its
    /// state, so late answers are observed late
    RealTime,
}

/// One evaluation run of one individual
pub trait ScoringInstance {
    /// The next input vector, or [Input::Done] exactly once when the episode is over
    fn generate_input(&mut self) -> Result<Input, EnvError>;

    /// Consume the network's output for the most recent input, advancing the episode and
    /// accumulating score
    fn accept_output(&mut self, output: &[f64]) -> Result<(), EnvError>;

    /// Cumulative fitness so far. Not necessarily monotonic, but deterministic for a fixed
    /// seed and action sequence
    fn score(&self) -> f64;

    /// Whether the task is solved. Only meaningful once the instance is done
    fn is_winner(&self) -> bool;

    /// Begin a new episode on an instance kept alive across generations. Per-episode state is
    /// reset, resources persist
    fn restart(&mut self) -> Result<(), EnvError>;
}

/// Prototype of a scoring function
pub trait ScoringFunction: Sync {
    type Instance: ScoringInstance;

    /// A fresh, independent instance with a freshly reset episode
    fn create_new(&self) -> Result<Self::Instance, EnvError>;

    /// How many instances may run concurrently. One means every instance must be serialized
    fn max_threads(&self) -> NonZeroUsize;

    /// When true, instances are rebuilt for every generation. When false, they may be kept and
    /// restarted instead
    fn flush_between(&self) -> bool;

    /// When true, the environment advances whether or not the network has answered
    fn real_time_processing(&self) -> bool {
        false
    }

    fn processing(&self) -> Processing {
        if self.real_time_processing() {
            Processing::RealTime
        } else {
            Processing::TurnBased
        }
    }
}
