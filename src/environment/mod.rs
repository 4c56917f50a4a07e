//! Simulated environments, and the conversions between their native observations and actions
//! and the flat vectors a network consumes and produces.

pub mod action;
pub mod cart_pole;
pub mod catch;
pub mod mountain_car;

pub use action::{ActionMap, Affine};
pub use cart_pole::CartPole;
pub use catch::Catch;
pub use mountain_car::MountainCar;

use crate::error::EnvError;

/// The set of observations or actions an environment deals in
#[derive(Debug, Clone, PartialEq)]
pub enum Space {
    /// One of `n` choices
    Discrete(usize),
    /// A tensor of the given shape, with every value in `low..=high`
    Continuous {
        shape: Vec<usize>,
        low: f64,
        high: f64,
    },
}

impl Space {
    /// Length of a flat vector covering this space. A discrete space needs one value per choice
    pub fn len(&self) -> usize {
        match self {
            Space::Discrete(n) => *n,
            Space::Continuous { shape, .. } => shape.iter().product(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Space::Discrete(n) => vec![*n],
            Space::Continuous { shape, .. } => shape.clone(),
        }
    }
}

/// A row-major tensor observed from an environment
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Observation {
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn tensor(shape: Vec<usize>, data: Vec<f64>) -> Self {
        debug_assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "tensor data doesn't fill its shape"
        );
        Self { shape, data }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flat view, where `[x][y][z]` of an `X*Y*Z` tensor sits at `x*Y*Z + y*Z + z`
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Value at a multi-dimensional index
    pub fn at(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, d)| i >= d) {
            return None;
        }
        let flat = index
            .iter()
            .zip(&self.shape)
            .fold(0, |acc, (i, d)| acc * d + i);
        self.data.get(flat).copied()
    }

    pub fn flatten(self) -> Vec<f64> {
        self.data
    }
}

/// An action to take in an environment
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Discrete(usize),
    Continuous(Vec<f64>),
}

/// Result of one environment step
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
}

/// A simulated environment. Implementors own all of their state, so that every scoring
/// instance can own its own environment outright
pub trait Environment {
    fn observation_space(&self) -> Space;
    fn action_space(&self) -> Space;

    /// Start a new episode, returning its first observation
    fn reset(&mut self) -> Result<Observation, EnvError>;

    /// Advance the episode by one action
    fn step(&mut self, action: &Action) -> Result<Transition, EnvError>;

    /// Episode reward at which the task counts as solved, if the environment knows one
    fn reward_threshold(&self) -> Option<f64> {
        None
    }
}

/// An environment whose episodes are fully determined by a seed
pub trait Seeded: Environment + Sized {
    fn seeded(seed: u64) -> Self;
}
