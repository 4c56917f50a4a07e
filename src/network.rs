//! The reference controller's genome, and the network it's expressed as.

use crate::{
    assess::Phenotype,
    constants::GAUNTLET_PRECISION,
    scoring::Processing,
    serialize::{deserialize_matrix_flat, deserialize_matrix_square, serialize_matrix},
};
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use rulinalg::matrix::{BaseMatrix, BaseMatrixMut, Matrix};
use serde::{Deserialize, Serialize};

pub mod activate {
    use core::f64::consts::E;

    pub fn steep_sigmoid(x: f64) -> f64 {
        1. / (1. + E.powf(-4.9 * x))
    }
}

/// Fully connected layers, each feeding only the next. Exported as is when it wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseGenome {
    /// Neurons per layer, input first
    pub layers: Vec<usize>,
    /// Per pair of consecutive layers, weight from `i` to `j` at `i * next + j`
    pub weights: Vec<Vec<f64>>,
    /// Per layer after the input, bias of every neuron
    pub bias: Vec<Vec<f64>>,
}

impl DenseGenome {
    pub fn random(layers: &[usize], rng: &mut impl RngCore) -> Self {
        let mut sample = |n: usize| {
            (0..n)
                .map(|_| rng.sample::<f64, _>(StandardNormal))
                .collect::<Vec<_>>()
        };
        Self {
            layers: layers.to_vec(),
            weights: layers.windows(2).map(|w| sample(w[0] * w[1])).collect(),
            bias: layers[1..].iter().map(|n| sample(*n)).collect(),
        }
    }

    /// Evolvable parameter count
    pub fn len(&self) -> usize {
        self.params().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn params(&self) -> impl Iterator<Item = &f64> {
        self.weights.iter().chain(self.bias.iter()).flatten()
    }

    pub fn params_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.weights
            .iter_mut()
            .chain(self.bias.iter_mut())
            .flatten()
    }

    /// Each parameter taken from either parent with even odds. Parents must share a topology
    pub fn crossover(&self, other: &Self, rng: &mut impl RngCore) -> Self {
        debug_assert_eq!(self.layers, other.layers, "crossover across topologies");
        let mut child = self.clone();
        for (c, o) in child.params_mut().zip(other.params()) {
            if rng.random_bool(0.5) {
                *c = *o;
            }
        }
        child
    }

    /// With probability `mutate` per parameter, either replace it by a uniform draw from
    /// `range` (with probability `replace`) or perturb it by gaussian noise of deviation `std`.
    /// Perturbed parameters are kept within `range`
    pub fn mutate(
        &mut self,
        rng: &mut impl RngCore,
        mutate: f64,
        replace: f64,
        std: f64,
        range: (f64, f64),
    ) {
        let (low, high) = (range.0.min(range.1), range.0.max(range.1));
        let (mutate, replace) = (mutate.clamp(0., 1.), replace.clamp(0., 1.));
        for param in self.params_mut() {
            if !rng.random_bool(mutate) {
                continue;
            }
            *param = if rng.random_bool(replace) {
                rng.random_range(low..=high)
            } else {
                (*param + std * rng.sample::<f64, _>(StandardNormal)).clamp(low, high)
            };
        }
    }

    pub fn network(&self) -> Ctrnn {
        Ctrnn::from_genome(self)
    }
}

/// A continuous-time recurrent network over the neurons of every layer, so that it can be
/// settled for a turn based problem or stepped in real time.
///
/// Based on the network described in on the dynamics of small continuous-time recurrent
/// neural networks (beer 1995). Outputs are the activated state of the last layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ctrnn {
    /// 1d state of neurons 0-N
    #[serde(
        serialize_with = "serialize_matrix",
        deserialize_with = "deserialize_matrix_flat"
    )]
    pub y: Matrix<f64>,
    /// 1d bias of neurons 0-N
    #[serde(
        serialize_with = "serialize_matrix",
        deserialize_with = "deserialize_matrix_flat"
    )]
    pub θ: Matrix<f64>,
    /// 1d inverse membrane time constant
    #[serde(
        serialize_with = "serialize_matrix",
        deserialize_with = "deserialize_matrix_flat"
    )]
    pub τ: Matrix<f64>,
    /// Nd weights between neurons, indexed as [from, to]
    #[serde(
        serialize_with = "serialize_matrix",
        deserialize_with = "deserialize_matrix_square"
    )]
    pub w: Matrix<f64>,
    /// Range of input neurons, indexing into y
    pub sensory: (usize, usize),
    /// Range of output neurons, indexing into y
    pub action: (usize, usize),
    /// Layers a signal crosses from input to output
    pub depth: usize,
    /// Integration steps per unit of time
    pub precision: usize,
}

impl Ctrnn {
    pub fn from_genome(genome: &DenseGenome) -> Self {
        let cols = genome.layers.iter().sum::<usize>();
        let offsets = genome
            .layers
            .iter()
            .scan(0, |at, n| {
                let start = *at;
                *at += n;
                Some(start)
            })
            .collect::<Vec<_>>();

        let mut w = vec![0.; cols * cols];
        for (l, weights) in genome.weights.iter().enumerate() {
            let (from, to, next) = (offsets[l], offsets[l + 1], genome.layers[l + 1]);
            for (idx, weight) in weights.iter().enumerate() {
                w[(from + idx / next) * cols + to + idx % next] = *weight;
            }
        }

        let mut θ = vec![0.; cols];
        for (l, bias) in genome.bias.iter().enumerate() {
            θ[offsets[l + 1]..offsets[l + 1] + bias.len()].copy_from_slice(bias);
        }

        let last = offsets.last().copied().unwrap_or(0);
        Self {
            y: Matrix::zeros(1, cols),
            θ: Matrix::new(1, cols, θ),
            τ: Matrix::new(1, cols, vec![1.; cols]),
            w: Matrix::new(cols, cols, w),
            sensory: (0, genome.layers.first().copied().unwrap_or(0)),
            action: (last, cols),
            depth: genome.layers.len().saturating_sub(1).max(1),
            precision: GAUNTLET_PRECISION,
        }
    }

    /// Step the network `prec` times over one unit of time, activating with σ.
    /// Input must be sized to fit the sensory range
    pub fn step<F: Fn(f64) -> f64>(&mut self, prec: usize, input: &[f64], σ: F) {
        let mut m_input = Matrix::zeros(1, self.y.cols());
        m_input.mut_data()[self.sensory.0..self.sensory.1].copy_from_slice(input);

        let inv = 1. / (prec as f64);
        for _ in 0..prec {
            self.y += (((&self.y + &self.θ).apply(&σ) * &self.w) - &self.y + &m_input)
                .elemul(&self.τ)
                .apply(&|v| v * inv);
        }
    }

    pub fn flush(&mut self) {
        self.y = Matrix::zeros(1, self.y.cols());
    }

    /// Activated state of the output neurons
    pub fn output<F: Fn(f64) -> f64>(&self, σ: F) -> Vec<f64> {
        (self.action.0..self.action.1)
            .map(|idx| σ(self.y.data()[idx] + self.θ.data()[idx]))
            .collect()
    }
}

impl Phenotype for Ctrnn {
    fn activate(&mut self, input: &[f64], processing: Processing) -> Vec<f64> {
        match processing {
            Processing::TurnBased => {
                self.flush();
                for _ in 0..self.depth * self.precision {
                    self.step(1, input, activate::steep_sigmoid);
                }
            }
            Processing::RealTime => self.step(self.precision, input, activate::steep_sigmoid),
        }
        self.output(activate::steep_sigmoid)
    }

    fn flush(&mut self) {
        Ctrnn::flush(self)
    }
}
