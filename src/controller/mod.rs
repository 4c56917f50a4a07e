//! The evolutionary controller, as seen from a run. A controller owns the population and
//! everything about how genomes are encoded and bred; a run only ever asks it to assess a
//! generation against a scoring function and reads the results back.

pub mod local;

pub use local::{ControllerConfig, LocalController};

use crate::{encoding::EncodingDescriptor, error::HarnessError, scoring::ScoringFunction};
use serde::{Deserialize, Serialize};

/// One member of a population, with the verdict of its latest assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual<G> {
    pub genome: G,
    pub fitness: f64,
    pub winner: bool,
}

pub trait Controller<S: ScoringFunction> {
    type Genome: Clone + Serialize;

    /// Fix the topology every genome of this run is built to. A controller accepts this once
    fn init(&mut self, descriptor: EncodingDescriptor) -> Result<(), HarnessError>;

    fn create_first_generation(&mut self) -> Result<(), HarnessError>;

    /// Assess every individual of the current generation, returning whether any of them won
    fn assess_generation(&mut self, scoring: &S) -> Result<bool, HarnessError>;

    /// Breed the next generation from the assessed current one
    fn next_generation(&mut self) -> Result<(), HarnessError>;

    /// Highest scoring individual of the latest assessment
    fn best_individual(&self) -> Option<&Individual<Self::Genome>>;

    /// Aggregate fitness of the latest assessment
    fn fitness(&self) -> f64;

    fn generation_num(&self) -> usize;
}
